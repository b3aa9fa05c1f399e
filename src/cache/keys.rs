//! Shared key naming, tag vocabulary and TTL presets.
//!
//! The cache does not enforce any of this; callers use these builders so
//! that writers and invalidators agree on namespaces.

use std::fmt::Display;

/// Suffix of an entry's metadata record
pub const META_SUFFIX: &str = ":meta";
/// Suffix of an entry's tag-list record
pub const TAGS_SUFFIX: &str = ":tags";
/// Prefix of tag-index sets
pub const TAG_PREFIX: &str = "tag:";

/// Fixed tag vocabulary.
pub mod tags {
    pub const USER: &str = "user";
    pub const POST: &str = "post";
    pub const ARTIST: &str = "artist";
    pub const EVENT: &str = "event";
    pub const SEARCH: &str = "search";
    pub const API_USAGE: &str = "api_usage";
    pub const MODERATION: &str = "moderation";
    pub const PAYMENT: &str = "payment";

    pub const ALL: [&str; 8] = [
        USER, POST, ARTIST, EVENT, SEARCH, API_USAGE, MODERATION, PAYMENT,
    ];
}

/// TTL presets in seconds.
pub mod ttl {
    pub const SHORT: u64 = 60;
    pub const MEDIUM: u64 = 300;
    pub const LONG: u64 = 3_600;
    pub const VERY_LONG: u64 = 86_400;
    /// Upper bound on any configured TTL (ten years).
    pub const CEILING: u64 = 10 * 365 * 86_400;
}

pub fn meta_key(key: &str) -> String {
    format!("{key}{META_SUFFIX}")
}

pub fn tags_key(key: &str) -> String {
    format!("{key}{TAGS_SUFFIX}")
}

pub fn tag_index_key(tag: &str) -> String {
    format!("{TAG_PREFIX}{tag}")
}

/// True for records that belong to an entry but are not its value.
pub fn is_auxiliary(key: &str) -> bool {
    key.ends_with(META_SUFFIX) || key.ends_with(TAGS_SUFFIX) || key.starts_with(TAG_PREFIX)
}

/// The three records an entry may own, value first.
pub fn entry_records(key: &str) -> [String; 3] {
    [key.to_string(), meta_key(key), tags_key(key)]
}

// == Key Builders ==

pub fn user(id: impl Display) -> String {
    format!("user:{id}")
}

pub fn user_profile(id: impl Display) -> String {
    format!("user_profile:{id}")
}

pub fn post(id: impl Display) -> String {
    format!("post:{id}")
}

/// Page of a community feed.
pub fn posts(community_id: impl Display, page: u32) -> String {
    format!("posts:{community_id}:{page}")
}

pub fn comments(post_id: impl Display) -> String {
    format!("comments:{post_id}")
}

pub fn community(id: impl Display) -> String {
    format!("community:{id}")
}

pub fn artist(id: impl Display) -> String {
    format!("artist:{id}")
}

pub fn artist_subscribers(artist_id: impl Display) -> String {
    format!("artist_subscribers:{artist_id}")
}

pub fn event(id: impl Display) -> String {
    format!("event:{id}")
}

/// Search results; the query is lowercased so casing variants share an entry.
pub fn search(kind: &str, query: &str) -> String {
    format!("search:{kind}:{}", query.trim().to_lowercase())
}

/// Per-service usage snapshot for a `YYYY-MM-DD` date.
pub fn api_usage(service: &str, date: impl Display) -> String {
    format!("api_usage:{service}:{date}")
}

pub fn budget_status(service: &str, period: impl Display) -> String {
    format!("budget_status:{service}:{period}")
}

pub fn budget_alert(service: &str, period: impl Display, timestamp_ms: i64) -> String {
    format!("budget_alert:{service}:{period}:{timestamp_ms}")
}

pub fn moderation_queue(status: &str) -> String {
    format!("moderation_queue:{status}")
}

pub fn payment(id: impl Display) -> String {
    format!("payment:{id}")
}

pub fn notifications(user_id: impl Display) -> String {
    format!("notifications:{user_id}")
}
