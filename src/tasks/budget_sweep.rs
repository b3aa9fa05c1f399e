//! Budget Sweep Task
//!
//! Periodically raises budget alerts and prunes stale tag-index members.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::budget::BudgetMonitor;

/// Runs one sweep: alert check over the monitored services, then a
/// tag-index reconcile. Returns `(alerts raised, members pruned)`.
pub async fn run_budget_sweep(monitor: &BudgetMonitor) -> (usize, usize) {
    let alerts = monitor.monitor_budget_alerts().await;
    let pruned = monitor.cache().reconcile_tags().await;
    (alerts.len(), pruned)
}

/// Spawns the periodic sweep. The first sweep runs after one interval.
pub fn spawn_budget_sweep(monitor: Arc<BudgetMonitor>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            services = ?monitor.services(),
            "Starting budget sweep with interval of {} seconds", interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let (alerts, pruned) = run_budget_sweep(&monitor).await;
            if alerts > 0 {
                info!(alerts, pruned, "Budget sweep raised alerts");
            } else {
                debug!(pruned, "Budget sweep: all services within budget");
            }
        }
    })
}
