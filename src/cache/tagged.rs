//! Tag Cache Module
//!
//! The cache engine: JSON values with TTL, a metadata record per value, and
//! tag-index sets for group invalidation.
//!
//! Every operation is fail-open. Backend or serialization errors are logged
//! and turned into a miss, `false`, `0` or an empty list; callers must keep a
//! non-cached path.
//!
//! `delete` and `invalidate_by_pattern` leave the key inside any tag-index
//! set it belonged to. Those stale members are harmless (invalidating them
//! deletes nothing) and are pruned by [`TagCache::reconcile_tags`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::keys::{self, TAG_PREFIX};
use super::metadata::EntryMetadata;
use super::stats::{CacheStats, HitCounters, KeyHits};
use crate::backend::{KvBackend, WriteOp};
use crate::config::Config;
use crate::error::BackendResult;

// == Cache Configuration ==
/// Tunables of a [`TagCache`].
#[derive(Debug, Clone)]
pub struct TagCacheConfig {
    /// TTL in seconds used when a write does not give one
    pub default_ttl: u64,
    /// Upper bound for any entry TTL, also the lifetime of tag-index sets
    pub max_ttl: u64,
    /// Number of metadata records sampled for top keys
    pub stats_sample_size: usize,
    /// Number of keys reported as top keys
    pub top_keys: usize,
}

impl Default for TagCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: keys::ttl::MEDIUM,
            max_ttl: keys::ttl::VERY_LONG,
            stats_sample_size: 100,
            top_keys: 10,
        }
    }
}

impl From<&Config> for TagCacheConfig {
    fn from(config: &Config) -> Self {
        Self {
            default_ttl: config.default_ttl,
            max_ttl: config.max_ttl,
            stats_sample_size: config.stats_sample_size,
            ..Self::default()
        }
    }
}

// == Cache Item ==
/// A value to write through `mset` or `warm_cache`.
#[derive(Debug, Clone)]
pub struct CacheItem<T> {
    pub key: String,
    pub value: T,
    pub ttl: Option<u64>,
    pub tags: Vec<String>,
}

impl<T> CacheItem<T> {
    pub fn new(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            value,
            ttl: None,
            tags: Vec::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

// == Tag Cache ==
/// Tag-indexed cache over a [`KvBackend`].
pub struct TagCache {
    backend: Arc<dyn KvBackend>,
    config: TagCacheConfig,
    counters: HitCounters,
}

impl TagCache {
    // == Constructor ==
    pub fn new(backend: Arc<dyn KvBackend>, mut config: TagCacheConfig) -> Self {
        config.max_ttl = config.max_ttl.clamp(1, keys::ttl::CEILING);
        Self {
            backend,
            config,
            counters: HitCounters::new(),
        }
    }

    pub fn config(&self) -> &TagCacheConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Resolves the TTL a write will actually use, within `[1, max_ttl]`.
    pub fn effective_ttl(&self, ttl: Option<u64>) -> u64 {
        ttl.unwrap_or(self.config.default_ttl)
            .clamp(1, self.config.max_ttl)
    }

    /// Builds the pipeline writing one entry and its side records.
    fn entry_ops<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
        tags: &[&str],
    ) -> BackendResult<Vec<WriteOp>> {
        let ttl_secs = self.effective_ttl(ttl);
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let metadata = EntryMetadata::new(ttl_secs, tags.clone());

        let mut ops = vec![
            WriteOp::SetEx {
                key: key.to_string(),
                value: serde_json::to_string(value)?,
                ttl_secs,
            },
            WriteOp::SetEx {
                key: keys::meta_key(key),
                value: serde_json::to_string(&metadata)?,
                ttl_secs,
            },
        ];

        if !tags.is_empty() {
            for tag in &tags {
                let index = keys::tag_index_key(tag);
                ops.push(WriteOp::SAdd {
                    key: index.clone(),
                    member: key.to_string(),
                });
                ops.push(WriteOp::Expire {
                    key: index,
                    ttl_secs: self.config.max_ttl,
                });
            }
            ops.push(WriteOp::SetEx {
                key: keys::tags_key(key),
                value: serde_json::to_string(&tags)?,
                ttl_secs,
            });
        }

        Ok(ops)
    }

    // == Get ==
    /// Reads and decodes a value. Misses, backend errors and undecodable
    /// payloads all return `None` and count as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.counters.record_hit();
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "Cached payload could not be decoded, treating as miss");
                    self.counters.record_miss();
                    None
                }
            },
            Ok(None) => {
                self.counters.record_miss();
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Cache get failed");
                self.counters.record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Writes a value with its metadata and tag memberships in one pipeline.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
        tags: &[&str],
    ) -> bool {
        let ops = match self.entry_ops(key, value, ttl, tags) {
            Ok(ops) => ops,
            Err(e) => {
                warn!(key, error = %e, "Cache value could not be encoded");
                return false;
            }
        };

        match self.backend.apply(ops).await {
            Ok(()) => {
                debug!(key, tags = ?tags, "Cache set");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Cache set failed");
                false
            }
        }
    }

    // == Delete ==
    /// Removes the value, metadata and tag-list records of a key.
    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.del(&keys::entry_records(key)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    // == Exists ==
    /// Probes the value record only.
    pub async fn exists(&self, key: &str) -> bool {
        match self.backend.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key, error = %e, "Cache exists failed");
                false
            }
        }
    }

    // == Batch Get ==
    /// Order-preserving batch read; each element behaves like [`TagCache::get`].
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[&str]) -> Vec<Option<T>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await);
        }
        values
    }

    // == Batch Set ==
    /// Writes every item in a single pipeline. Submission is atomic, effect
    /// is not: a failing pipeline may leave some items written.
    pub async fn mset<T: Serialize>(&self, items: &[CacheItem<T>]) -> bool {
        let mut ops = Vec::new();
        for item in items {
            let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
            match self.entry_ops(&item.key, &item.value, item.ttl, &tags) {
                Ok(item_ops) => ops.extend(item_ops),
                Err(e) => {
                    warn!(key = %item.key, error = %e, "Cache value could not be encoded");
                    return false;
                }
            }
        }

        match self.backend.apply(ops).await {
            Ok(()) => {
                debug!(count = items.len(), "Cache mset");
                true
            }
            Err(e) => {
                warn!(count = items.len(), error = %e, "Cache mset failed");
                false
            }
        }
    }

    /// Deletes the records of each key independently; returns how many
    /// deletions went through.
    async fn purge(&self, targets: &[String]) -> usize {
        let mut purged = 0;
        for key in targets {
            match self.backend.del(&keys::entry_records(key)).await {
                Ok(_) => purged += 1,
                Err(e) => warn!(key = %key, error = %e, "Failed to purge cache entry"),
            }
        }
        purged
    }

    // == Invalidate By Tags ==
    /// Deletes every entry carrying any of `tags`, then the tag sets.
    ///
    /// Keys shared by several requested tags are deleted and counted once.
    pub async fn invalidate_by_tags(&self, tags: &[&str]) -> usize {
        let mut members = BTreeSet::new();
        let mut indexes = Vec::with_capacity(tags.len());

        for tag in tags {
            let index = keys::tag_index_key(tag);
            match self.backend.smembers(&index).await {
                Ok(keys) => members.extend(keys),
                Err(e) => warn!(tag, error = %e, "Failed to read tag index"),
            }
            indexes.push(index);
        }

        let members: Vec<String> = members.into_iter().collect();
        let invalidated = self.purge(&members).await;

        if let Err(e) = self.backend.del(&indexes).await {
            warn!(tags = ?tags, error = %e, "Failed to delete tag indexes");
        }

        info!(tags = ?tags, invalidated, "Invalidated cache by tags");
        invalidated
    }

    // == Invalidate By Pattern ==
    /// Deletes every entry whose key matches a glob. Metadata, tag-list and
    /// tag-index keys never count as matches themselves.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let matched = match self.backend.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern, error = %e, "Failed to list keys for pattern");
                return 0;
            }
        };

        let values: Vec<String> = matched
            .into_iter()
            .filter(|key| !keys::is_auxiliary(key))
            .collect();
        let invalidated = self.purge(&values).await;

        info!(pattern, invalidated, "Invalidated cache by pattern");
        invalidated
    }

    // == Warm Cache ==
    /// Writes only the items whose key is absent. The existence check and the
    /// write are separate calls, so racing warmers may both write.
    pub async fn warm_cache<T: Serialize>(&self, items: &[CacheItem<T>]) -> usize {
        let mut warmed = 0;
        for item in items {
            if self.exists(&item.key).await {
                continue;
            }
            let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
            if self.set(&item.key, &item.value, item.ttl, &tags).await {
                warmed += 1;
            }
        }
        debug!(requested = items.len(), warmed, "Cache warmed");
        warmed
    }

    // == Stats ==
    /// Local hit/miss counters plus approximate top keys.
    ///
    /// Top keys come from at most `stats_sample_size` metadata records, not
    /// from the whole keyspace.
    pub async fn get_stats(&self) -> CacheStats {
        let (hits, misses) = self.counters.snapshot();
        let mut stats = CacheStats::new(hits, misses);
        stats.backend = self.backend.name().to_string();

        stats.total_keys = self.backend.dbsize().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read backend size");
            0
        });

        let pattern = format!("*{}", keys::META_SUFFIX);
        let sample = match self.backend.scan(&pattern, self.config.stats_sample_size).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Failed to sample metadata records");
                return stats;
            }
        };

        let mut ranked = Vec::with_capacity(sample.len());
        for meta_key in sample {
            let Some(key) = meta_key.strip_suffix(keys::META_SUFFIX) else {
                continue;
            };
            if let Some(meta) = self.read_metadata(key).await {
                ranked.push(KeyHits {
                    key: key.to_string(),
                    hits: meta.hits,
                });
            }
        }
        ranked.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.key.cmp(&b.key)));
        ranked.truncate(self.config.top_keys);
        stats.top_keys = ranked;

        stats
    }

    // == Clear ==
    /// Flushes the entire backing database, not just this cache's keys.
    pub async fn clear(&self) -> bool {
        match self.backend.flush().await {
            Ok(()) => {
                warn!(backend = self.backend.name(), "Cache backend flushed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Cache clear failed");
                false
            }
        }
    }

    async fn read_metadata(&self, key: &str) -> Option<EntryMetadata> {
        let raw = match self.backend.get(&keys::meta_key(key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache metadata");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(key, error = %e, "Cache metadata could not be decoded");
                None
            }
        }
    }

    // == Metadata ==
    /// Reads the metadata record of a key. Does not touch hit counters.
    pub async fn get_metadata(&self, key: &str) -> Option<EntryMetadata> {
        self.read_metadata(key).await
    }

    // == Increment Hits ==
    /// Bumps the hit count in a key's metadata, keeping its expiry.
    pub async fn increment_hits(&self, key: &str) -> bool {
        let Some(mut meta) = self.read_metadata(key).await else {
            return false;
        };
        let remaining = meta.remaining_secs();
        if remaining == 0 {
            return false;
        }
        meta.hits += 1;

        let value = match serde_json::to_string(&meta) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache metadata could not be encoded");
                return false;
            }
        };
        let op = WriteOp::SetEx {
            key: keys::meta_key(key),
            value,
            ttl_secs: remaining,
        };
        match self.backend.apply(vec![op]).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to increment cache hits");
                false
            }
        }
    }

    // == Tag Queries ==
    /// Keys currently indexed under `tag`; may include stale members.
    pub async fn get_keys_by_tag(&self, tag: &str) -> Vec<String> {
        match self.backend.smembers(&keys::tag_index_key(tag)).await {
            Ok(mut members) => {
                members.sort();
                members
            }
            Err(e) => {
                warn!(tag, error = %e, "Failed to read tag index");
                Vec::new()
            }
        }
    }

    /// Every tag that currently has an index set.
    pub async fn get_all_tags(&self) -> Vec<String> {
        let pattern = format!("{TAG_PREFIX}*");
        match self.backend.keys(&pattern).await {
            Ok(indexes) => {
                let mut tags: Vec<String> = indexes
                    .iter()
                    .filter_map(|index| index.strip_prefix(TAG_PREFIX))
                    .map(str::to_string)
                    .collect();
                tags.sort();
                tags
            }
            Err(e) => {
                warn!(error = %e, "Failed to list tag indexes");
                Vec::new()
            }
        }
    }

    // == Reconcile Tags ==
    /// Removes tag-index members whose value no longer exists. Returns the
    /// number of members removed.
    pub async fn reconcile_tags(&self) -> usize {
        let mut removed = 0;
        for tag in self.get_all_tags().await {
            let index = keys::tag_index_key(&tag);
            let mut dead = Vec::new();
            for member in self.get_keys_by_tag(&tag).await {
                match self.backend.exists(&member).await {
                    Ok(false) => dead.push(member),
                    Ok(true) => {}
                    Err(e) => warn!(key = %member, error = %e, "Failed to probe tag member"),
                }
            }
            if dead.is_empty() {
                continue;
            }
            match self.backend.srem(&index, &dead).await {
                Ok(count) => removed += count as usize,
                Err(e) => warn!(tag = %tag, error = %e, "Failed to prune tag index"),
            }
        }
        if removed > 0 {
            info!(removed, "Pruned stale tag-index members");
        }
        removed
    }
}
