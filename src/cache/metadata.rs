//! Entry Metadata Module
//!
//! Side-channel record stored next to every cached value.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// == Entry Metadata ==
/// Best-effort bookkeeping for a cached value. Not authoritative: it may
/// briefly outlive or predecease the value it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// When the value was written
    pub created_at: DateTime<Utc>,
    /// When the value expires
    pub expires_at: DateTime<Utc>,
    /// Explicit access count
    pub hits: u64,
    /// Tags the value was written under
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EntryMetadata {
    /// Creates metadata for a value written now with `ttl_secs` to live.
    pub fn new(ttl_secs: u64, tags: Vec<String>) -> Self {
        let now = Utc::now();
        let expires_at = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            created_at: now,
            expires_at,
            hits: 0,
            tags,
        }
    }

    /// Whole seconds until expiry, zero once expired.
    pub fn remaining_secs(&self) -> u64 {
        (self.expires_at - Utc::now()).num_seconds().max(0) as u64
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metadata_window() {
        let meta = EntryMetadata::new(300, vec!["post".to_string()]);

        assert_eq!(meta.hits, 0);
        assert_eq!((meta.expires_at - meta.created_at).num_seconds(), 300);
        assert!(meta.remaining_secs() <= 300 && meta.remaining_secs() >= 299);
        assert!(!meta.is_expired());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let meta = EntryMetadata::new(u64::MAX, Vec::new());
        assert_eq!(meta.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!meta.is_expired());
    }

    #[test]
    fn test_expired_metadata_has_no_remaining_time() {
        let mut meta = EntryMetadata::new(10, Vec::new());
        meta.expires_at = Utc::now() - Duration::seconds(5);

        assert!(meta.is_expired());
        assert_eq!(meta.remaining_secs(), 0);
    }

    #[test]
    fn test_tags_default_when_missing() {
        let json = r#"{"created_at":"2026-01-01T00:00:00Z","expires_at":"2026-01-01T00:05:00Z","hits":3}"#;
        let meta: EntryMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.hits, 3);
        assert!(meta.tags.is_empty());
    }
}
