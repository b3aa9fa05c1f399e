//! Backend Slot Module
//!
//! A single record held by the in-memory backend: a string or a set, with an
//! optional expiry.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

// == Slot Value ==
/// Payload kinds the backend stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    /// Plain string value
    Str(String),
    /// Unordered set of members
    Set(HashSet<String>),
}

// == Slot ==
/// Represents a single backend record with expiry metadata.
#[derive(Debug, Clone)]
pub struct Slot {
    /// The stored payload
    pub value: SlotValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl Slot {
    // == Constructors ==
    /// Creates a string slot expiring after `ttl_seconds`.
    pub fn string(value: String, ttl_seconds: u64) -> Self {
        let now = current_timestamp_ms();
        Self {
            value: SlotValue::Str(value),
            created_at: now,
            expires_at: Some(now.saturating_add(ttl_seconds.saturating_mul(1000))),
        }
    }

    /// Creates an empty set slot without expiry.
    pub fn empty_set() -> Self {
        Self {
            value: SlotValue::Set(HashSet::new()),
            created_at: current_timestamp_ms(),
            expires_at: None,
        }
    }

    // == Is Expired ==
    /// Checks if the slot has expired.
    ///
    /// A slot is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    // == Expire ==
    /// Resets the expiry to `ttl_seconds` from now.
    pub fn expire_in(&mut self, ttl_seconds: u64) {
        self.expires_at = Some(current_timestamp_ms().saturating_add(ttl_seconds.saturating_mul(1000)));
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }

    /// String payload, if this slot holds one.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            SlotValue::Str(s) => Some(s),
            SlotValue::Set(_) => None,
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
