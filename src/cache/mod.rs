//! Cache Module
//!
//! Tag-indexed caching of JSON values with TTL, metadata and group
//! invalidation, on top of any [`crate::backend::KvBackend`].

pub mod keys;
mod metadata;
mod stats;
mod tagged;


// Re-export public types
pub use metadata::EntryMetadata;
pub use stats::{hit_rate, CacheStats, HitCounters, KeyHits};
pub use tagged::{CacheItem, TagCache, TagCacheConfig};
