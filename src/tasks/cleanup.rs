//! Expiry Cleanup Task
//!
//! Periodically purges expired slots from the in-memory backend. Redis
//! expires keys on its own, so this task only runs for [`MemoryBackend`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::MemoryBackend;

/// Spawns a background task that periodically removes expired slots.
///
/// Returns the task handle so it can be aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let backend = Arc::new(MemoryBackend::new(10_000));
/// let cleanup_handle = spawn_cleanup_task(backend.clone(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(backend: Arc<MemoryBackend>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry cleanup task with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = backend.cleanup_expired().await;
            if removed > 0 {
                info!("Expiry cleanup: removed {} expired slots", removed);
            } else {
                debug!("Expiry cleanup: no expired slots found");
            }
        }
    })
}
