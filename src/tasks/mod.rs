//! Background Tasks Module
//!
//! Periodic maintenance running alongside the HTTP server.
//!
//! # Tasks
//! - Expiry cleanup: purges expired slots of the in-memory backend
//! - Budget sweep: raises budget alerts and reconciles tag indexes

mod budget_sweep;
mod cleanup;

pub use budget_sweep::{run_budget_sweep, spawn_budget_sweep};
pub use cleanup::spawn_cleanup_task;
