//! Tagcache - tag-indexed caching with budget-aware API usage monitoring
//!
//! A tag cache over Redis or an in-process backend, plus a usage ledger
//! that checks spend on paid third-party APIs against per-service budgets.

pub mod api;
pub mod backend;
pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use budget::BudgetMonitor;
pub use cache::TagCache;
pub use config::Config;
pub use tasks::{spawn_budget_sweep, spawn_cleanup_task};
