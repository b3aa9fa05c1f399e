//! In-Memory Backend Module
//!
//! HashMap storage with LRU eviction and TTL expiration, exposing the same
//! primitives as a Redis database. Used for tests and single-node setups.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KeyPattern, KvBackend, LruTracker, Slot, SlotValue, WriteOp};
use crate::error::{BackendError, BackendResult};

// == Inner State ==
#[derive(Debug)]
struct Inner {
    /// Key-value storage
    slots: HashMap<String, Slot>,
    /// LRU access tracker
    lru: LruTracker,
    /// Maximum number of keys allowed
    max_entries: usize,
    /// Number of keys evicted due to capacity
    evictions: u64,
}

impl Inner {
    /// Returns a live slot, dropping it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&mut Slot> {
        if self.slots.get(key).is_some_and(Slot::is_expired) {
            self.slots.remove(key);
            self.lru.remove(key);
            return None;
        }
        self.slots.get_mut(key)
    }

    /// Makes room for a new key by evicting the least recently used one.
    fn reserve(&mut self, key: &str) {
        if self.slots.contains_key(key) || self.slots.len() < self.max_entries {
            return;
        }
        if let Some(evicted) = self.lru.evict_oldest() {
            self.slots.remove(&evicted);
            self.evictions += 1;
        }
    }

    fn apply_one(&mut self, op: WriteOp) -> BackendResult<()> {
        match op {
            WriteOp::SetEx {
                key,
                value,
                ttl_secs,
            } => {
                self.reserve(&key);
                self.slots.insert(key.clone(), Slot::string(value, ttl_secs));
                self.lru.touch(&key);
            }
            WriteOp::SAdd { key, member } => {
                if self.live(&key).is_none() {
                    self.reserve(&key);
                    self.slots.insert(key.clone(), Slot::empty_set());
                }
                match self.slots.get_mut(&key).map(|slot| &mut slot.value) {
                    Some(SlotValue::Set(members)) => {
                        members.insert(member);
                    }
                    _ => return Err(wrong_type(&key)),
                }
                self.lru.touch(&key);
            }
            WriteOp::Expire { key, ttl_secs } => {
                if let Some(slot) = self.live(&key) {
                    slot.expire_in(ttl_secs);
                }
            }
        }
        Ok(())
    }
}

fn wrong_type(key: &str) -> BackendError {
    BackendError::Command(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

// == Memory Backend ==
/// In-process key-value backend with LRU eviction and lazy TTL expiry.
#[derive(Debug)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates a new backend holding at most `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                slots: HashMap::new(),
                lru: LruTracker::new(),
                max_entries: max_entries.max(1),
                evictions: 0,
            }),
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired keys.
    ///
    /// Returns the number of keys removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let expired: Vec<String> = inner
            .slots
            .iter()
            .filter(|(_, slot)| slot.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.slots.remove(key);
            inner.lru.remove(key);
        }
        expired.len()
    }

    /// Number of keys evicted due to capacity so far.
    pub async fn evictions(&self) -> u64 {
        self.inner.read().await.evictions
    }

    /// Number of stored keys, expired ones included until cleanup.
    pub async fn len(&self) -> usize {
        self.inner.read().await.slots.len()
    }

    /// Returns true if the backend holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining lifetime of a key in milliseconds.
    pub async fn ttl_ms(&self, key: &str) -> Option<u64> {
        let inner = self.inner.read().await;
        inner
            .slots
            .get(key)
            .filter(|slot| !slot.is_expired())
            .and_then(Slot::ttl_remaining_ms)
    }

    async fn matching(&self, pattern: &str, limit: usize) -> BackendResult<Vec<String>> {
        let pattern = KeyPattern::new(pattern)?;
        let inner = self.inner.read().await;
        Ok(inner
            .slots
            .iter()
            .filter(|(key, slot)| !slot.is_expired() && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let mut inner = self.inner.write().await;
        let value = match inner.live(key) {
            Some(slot) => match &slot.value {
                SlotValue::Str(s) => s.clone(),
                SlotValue::Set(_) => return Err(wrong_type(key)),
            },
            None => return Ok(None),
        };
        inner.lru.touch(key);
        Ok(Some(value))
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> BackendResult<()> {
        let mut inner = self.inner.write().await;
        for op in ops {
            inner.apply_one(op)?;
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> BackendResult<u64> {
        let mut inner = self.inner.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(slot) = inner.slots.remove(key) {
                inner.lru.remove(key);
                if !slot.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.slots.get(key).is_some_and(|slot| !slot.is_expired()))
    }

    async fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
        let mut inner = self.inner.write().await;
        match inner.live(key).map(|slot| &slot.value) {
            Some(SlotValue::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(SlotValue::Str(_)) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn srem(&self, key: &str, members: &[String]) -> BackendResult<u64> {
        let mut inner = self.inner.write().await;
        let (removed, now_empty) = match inner.live(key).map(|slot| &mut slot.value) {
            Some(SlotValue::Set(set)) => {
                let removed = members.iter().filter(|m| set.remove(m.as_str())).count();
                (removed as u64, set.is_empty())
            }
            Some(SlotValue::Str(_)) => return Err(wrong_type(key)),
            None => return Ok(0),
        };
        // Redis drops a set once its last member is removed
        if now_empty {
            inner.slots.remove(key);
            inner.lru.remove(key);
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> BackendResult<Vec<String>> {
        self.matching(pattern, usize::MAX).await
    }

    async fn scan(&self, pattern: &str, limit: usize) -> BackendResult<Vec<String>> {
        self.matching(pattern, limit).await
    }

    async fn dbsize(&self) -> BackendResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.slots.values().filter(|slot| !slot.is_expired()).count() as u64)
    }

    async fn flush(&self) -> BackendResult<()> {
        let mut inner = self.inner.write().await;
        inner.slots.clear();
        inner.lru = LruTracker::new();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn set_ex(key: &str, value: &str, ttl_secs: u64) -> WriteOp {
        WriteOp::SetEx {
            key: key.to_string(),
            value: value.to_string(),
            ttl_secs,
        }
    }

    fn sadd(key: &str, member: &str) -> WriteOp {
        WriteOp::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::new(100);

        backend.apply(vec![set_ex("key1", "value1", 60)]).await.unwrap();

        assert_eq!(backend.get("key1").await.unwrap().as_deref(), Some("value1"));
        assert!(backend.exists("key1").await.unwrap());
        assert_eq!(backend.dbsize().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let backend = MemoryBackend::new(100);
        assert!(backend.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let backend = MemoryBackend::new(100);
        backend.apply(vec![set_ex("key1", "value1", 1)]).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(backend.get("key1").await.unwrap().is_none());
        assert!(!backend.exists("key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_membership() {
        let backend = MemoryBackend::new(100);
        backend
            .apply(vec![sadd("tag:post", "post:1"), sadd("tag:post", "post:2")])
            .await
            .unwrap();

        let mut members = backend.smembers("tag:post").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["post:1", "post:2"]);

        let removed = backend
            .srem("tag:post", &["post:1".to_string(), "post:9".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.smembers("tag:post").await.unwrap(), vec!["post:2"]);
    }

    #[tokio::test]
    async fn test_srem_last_member_drops_set() {
        let backend = MemoryBackend::new(100);
        backend.apply(vec![sadd("tag:user", "user:1")]).await.unwrap();

        backend.srem("tag:user", &["user:1".to_string()]).await.unwrap();

        assert!(!backend.exists("tag:user").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let backend = MemoryBackend::new(100);
        backend.apply(vec![sadd("tag:post", "post:1")]).await.unwrap();

        assert!(backend.get("tag:post").await.is_err());
        assert!(backend.apply(vec![sadd("tag:post", "x")]).await.is_ok());

        backend.apply(vec![set_ex("plain", "v", 60)]).await.unwrap();
        assert!(backend.smembers("plain").await.is_err());
    }

    #[tokio::test]
    async fn test_expire_refreshes_deadline() {
        let backend = MemoryBackend::new(100);
        backend
            .apply(vec![
                sadd("tag:event", "event:1"),
                WriteOp::Expire {
                    key: "tag:event".to_string(),
                    ttl_secs: 30,
                },
            ])
            .await
            .unwrap();

        let ttl = backend.ttl_ms("tag:event").await.unwrap();
        assert!(ttl > 29_000 && ttl <= 30_000);
    }

    #[tokio::test]
    async fn test_del_counts_existing_keys() {
        let backend = MemoryBackend::new(100);
        backend
            .apply(vec![set_ex("a", "1", 60), set_ex("b", "2", 60)])
            .await
            .unwrap();

        let removed = backend
            .del(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_keys_and_scan() {
        let backend = MemoryBackend::new(100);
        backend
            .apply(vec![
                set_ex("post:1", "a", 60),
                set_ex("post:2", "b", 60),
                set_ex("user:1", "c", 60),
            ])
            .await
            .unwrap();

        let mut keys = backend.keys("post:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["post:1", "post:2"]);

        assert_eq!(backend.scan("*", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lru_eviction_at_capacity() {
        let backend = MemoryBackend::new(2);
        backend.apply(vec![set_ex("k1", "1", 60)]).await.unwrap();
        backend.apply(vec![set_ex("k2", "2", 60)]).await.unwrap();

        // k1 becomes most recently used, k2 is evicted next
        backend.get("k1").await.unwrap();
        backend.apply(vec![set_ex("k3", "3", 60)]).await.unwrap();

        assert_eq!(backend.len().await, 2);
        assert!(backend.exists("k1").await.unwrap());
        assert!(!backend.exists("k2").await.unwrap());
        assert_eq!(backend.evictions().await, 1);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let backend = MemoryBackend::new(100);
        backend
            .apply(vec![set_ex("short", "1", 1), set_ex("long", "2", 60)])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(backend.cleanup_expired().await, 1);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_flush() {
        let backend = MemoryBackend::new(100);
        backend
            .apply(vec![set_ex("a", "1", 60), sadd("tag:x", "a")])
            .await
            .unwrap();

        backend.flush().await.unwrap();

        assert_eq!(backend.dbsize().await.unwrap(), 0);
    }
}
