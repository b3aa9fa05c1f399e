//! Budget Module
//!
//! API usage ledger, per-service budgets and threshold alerts.

mod monitor;
mod period;
#[cfg(feature = "postgres")]
mod postgres;
mod store;
mod types;

// Re-export public types
pub use monitor::{BudgetMonitor, ALERT_TTL_SECS, DEFAULT_MONITORED_SERVICES};
pub use period::UsageWindow;
#[cfg(feature = "postgres")]
pub use postgres::PgUsageStore;
pub use store::{MemoryUsageStore, UsageStore};
pub use types::{
    ApiUsageEntry, BudgetAlert, BudgetConfig, BudgetConfigUpdate, BudgetLevel, BudgetPeriod,
    BudgetStatus, EndpointCost, ServiceUsageSummary, UsageAggregate, UsageRecord,
    UserServiceUsage,
};
