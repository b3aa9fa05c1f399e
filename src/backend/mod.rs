//! Backend Module
//!
//! Key-value backends the tag cache runs on. A backend only needs string
//! values with expiry, sets, pattern listing and a pipelined write path.

mod lru;
mod memory;
mod pattern;
#[cfg(feature = "redis")]
mod redis_backend;
mod slot;

use async_trait::async_trait;

use crate::error::BackendResult;

pub use lru::LruTracker;
pub use memory::MemoryBackend;
pub use pattern::KeyPattern;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use slot::{current_timestamp_ms, Slot, SlotValue};

// == Write Operations ==
/// A single write submitted as part of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Store a string value with an expiry in seconds
    SetEx {
        key: String,
        value: String,
        ttl_secs: u64,
    },
    /// Add a member to a set
    SAdd { key: String, member: String },
    /// Reset the expiry of an existing key
    Expire { key: String, ttl_secs: u64 },
}

// == Backend Trait ==
/// Primitive operations the tag cache needs from a key-value store.
///
/// Single-key calls are atomic at the backend. `apply` submits several writes
/// in one round trip but does not promise all-or-nothing effect.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Reads a string value.
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Submits a batch of writes as one pipeline.
    async fn apply(&self, ops: Vec<WriteOp>) -> BackendResult<()>;

    /// Deletes keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> BackendResult<u64>;

    /// Checks whether a key exists.
    async fn exists(&self, key: &str) -> BackendResult<bool>;

    /// Lists the members of a set.
    async fn smembers(&self, key: &str) -> BackendResult<Vec<String>>;

    /// Removes members from a set, returning how many were removed.
    async fn srem(&self, key: &str, members: &[String]) -> BackendResult<u64>;

    /// Lists every key matching a glob pattern.
    async fn keys(&self, pattern: &str) -> BackendResult<Vec<String>>;

    /// Lists at most `limit` keys matching a glob pattern.
    async fn scan(&self, pattern: &str, limit: usize) -> BackendResult<Vec<String>>;

    /// Number of live keys in the database.
    async fn dbsize(&self) -> BackendResult<u64>;

    /// Removes every key in the database.
    async fn flush(&self) -> BackendResult<()>;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}
