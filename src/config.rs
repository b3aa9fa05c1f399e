//! Configuration Module
//!
//! Loads service configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::budget::DEFAULT_MONITORED_SERVICES;

/// Service configuration parameters.
///
/// Every value can be set through an environment variable; unset or
/// unparsable values fall back to the defaults below.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL; the in-memory backend is used when unset
    pub redis_url: Option<String>,
    /// Postgres connection URL; the in-memory usage store is used when unset
    pub database_url: Option<String>,
    /// Entry limit of the in-memory backend
    pub max_entries: usize,
    /// TTL in seconds for entries written without one
    pub default_ttl: u64,
    /// Upper bound for any entry TTL, also the tag-index TTL
    pub max_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// In-memory expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Budget alert and tag reconcile sweep interval in seconds
    pub budget_sweep_interval: u64,
    /// Metadata records sampled for top keys in cache stats
    pub stats_sample_size: usize,
    /// Services checked by the budget sweep
    pub monitored_services: Vec<String>,
}

fn var_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    lookup(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn var_non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.trim().is_empty())
}

/// Splits a comma-separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_URL` - Redis URL (default: unset, in-memory backend)
    /// - `DATABASE_URL` - Postgres URL (default: unset, in-memory usage store)
    /// - `MAX_ENTRIES` - In-memory entry limit (default: 10000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `MAX_TTL` - Maximum TTL in seconds (default: 86400)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Expiry sweep in seconds (default: 1)
    /// - `BUDGET_SWEEP_INTERVAL` - Budget sweep in seconds (default: 300)
    /// - `STATS_SAMPLE_SIZE` - Stats sample size (default: 100)
    /// - `MONITORED_SERVICES` - Comma-separated services (default: google_maps,openai,stripe,resend,supabase)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let monitored_services = var_non_empty(&lookup, "MONITORED_SERVICES")
            .map(|raw| parse_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.monitored_services);

        Self {
            redis_url: var_non_empty(&lookup, "REDIS_URL"),
            database_url: var_non_empty(&lookup, "DATABASE_URL"),
            max_entries: var_or(&lookup, "MAX_ENTRIES", defaults.max_entries),
            default_ttl: var_or(&lookup, "DEFAULT_TTL", defaults.default_ttl),
            max_ttl: var_or(&lookup, "MAX_TTL", defaults.max_ttl),
            server_port: var_or(&lookup, "SERVER_PORT", defaults.server_port),
            cleanup_interval: var_or(&lookup, "CLEANUP_INTERVAL", defaults.cleanup_interval),
            budget_sweep_interval: var_or(
                &lookup,
                "BUDGET_SWEEP_INTERVAL",
                defaults.budget_sweep_interval,
            ),
            stats_sample_size: var_or(&lookup, "STATS_SAMPLE_SIZE", defaults.stats_sample_size),
            monitored_services,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: None,
            database_url: None,
            max_entries: 10_000,
            default_ttl: 300,
            max_ttl: 86_400,
            server_port: 3000,
            cleanup_interval: 1,
            budget_sweep_interval: 300,
            stats_sample_size: 100,
            monitored_services: DEFAULT_MONITORED_SERVICES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
