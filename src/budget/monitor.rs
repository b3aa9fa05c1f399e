//! Budget Monitor Module
//!
//! Records outbound API usage and compares spend against per-service budgets.
//!
//! Like the cache, the monitor never returns an error. Store failures are
//! logged and surface as `None`, zero aggregates or empty lists, and the
//! guard checks (`should_rate_limit`, `is_service_enabled`) fail open.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::period::UsageWindow;
use super::store::UsageStore;
use super::types::{
    ApiUsageEntry, BudgetAlert, BudgetConfig, BudgetConfigUpdate, BudgetLevel, BudgetPeriod,
    BudgetStatus, EndpointCost, ServiceUsageSummary, UsageAggregate, UserServiceUsage,
};
use crate::cache::{keys, TagCache};

/// Services swept by [`BudgetMonitor::monitor_budget_alerts`] unless configured otherwise.
pub const DEFAULT_MONITORED_SERVICES: [&str; 5] =
    ["google_maps", "openai", "stripe", "resend", "supabase"];

/// Lifetime of an alert record in the cache.
pub const ALERT_TTL_SECS: u64 = 3600;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// == Budget Monitor ==
pub struct BudgetMonitor {
    store: Arc<dyn UsageStore>,
    cache: Arc<TagCache>,
    services: Vec<String>,
}

impl BudgetMonitor {
    pub fn new(store: Arc<dyn UsageStore>, cache: Arc<TagCache>) -> Self {
        Self {
            store,
            cache,
            services: DEFAULT_MONITORED_SERVICES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replaces the swept service list.
    pub fn with_services<S: Into<String>>(mut self, services: impl IntoIterator<Item = S>) -> Self {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn cache(&self) -> &Arc<TagCache> {
        &self.cache
    }

    // == Usage Logging ==
    /// Appends one usage entry. Returns the new row id, `None` on failure.
    pub async fn log_api_usage(&self, entry: &ApiUsageEntry) -> Option<Uuid> {
        match self.store.insert_usage(entry).await {
            Ok(id) => {
                debug!(
                    service = %entry.service_name,
                    endpoint = %entry.endpoint,
                    cost_usd = entry.cost_usd,
                    "API usage logged"
                );
                Some(id)
            }
            Err(e) => {
                warn!(service = %entry.service_name, error = %e, "Failed to log API usage");
                None
            }
        }
    }

    // == Budget Status ==
    /// Usage-to-budget view for the current period. `None` means unknown:
    /// no config, or the store could not be read.
    pub async fn check_budget_status(
        &self,
        service: &str,
        period: BudgetPeriod,
    ) -> Option<BudgetStatus> {
        let config = self.get_budget_config(service).await?;
        self.status_with_config(&config, period, Utc::now()).await
    }

    async fn status_with_config(
        &self,
        config: &BudgetConfig,
        period: BudgetPeriod,
        now: DateTime<Utc>,
    ) -> Option<BudgetStatus> {
        let window = UsageWindow::containing(period, now);
        let usage = match self.store.aggregate(&config.service_name, window).await {
            Ok(agg) => agg.total_cost_usd,
            Err(e) => {
                warn!(service = %config.service_name, %period, error = %e, "Failed to aggregate usage");
                return None;
            }
        };

        let limit = config.limit_for(period);
        let usage_percentage = usage_percentage(usage, limit);
        Some(BudgetStatus {
            service_name: config.service_name.clone(),
            period,
            budget_limit: limit,
            current_usage: usage,
            usage_percentage,
            status: BudgetLevel::classify(
                usage_percentage,
                config.warning_threshold,
                config.critical_threshold,
            ),
            days_remaining: window.days_remaining(now),
        })
    }

    // == Usage Queries ==
    /// Aggregate of one UTC day. Zero when empty or unreadable.
    pub async fn get_daily_usage(&self, service: &str, date: NaiveDate) -> UsageAggregate {
        self.aggregate_or_zero(service, UsageWindow::day(date)).await
    }

    /// Aggregate of one UTC month. Zero for an invalid month.
    pub async fn get_monthly_usage(&self, service: &str, year: i32, month: u32) -> UsageAggregate {
        match UsageWindow::month(year, month) {
            Some(window) => self.aggregate_or_zero(service, window).await,
            None => {
                warn!(service, year, month, "Invalid month requested");
                UsageAggregate::default()
            }
        }
    }

    async fn aggregate_or_zero(&self, service: &str, window: UsageWindow) -> UsageAggregate {
        self.store
            .aggregate(service, window)
            .await
            .unwrap_or_else(|e| {
                warn!(service, error = %e, "Failed to aggregate usage");
                UsageAggregate::default()
            })
    }

    /// Per-service summaries over the last `days_back` days.
    pub async fn get_usage_stats(&self, days_back: u32) -> Vec<ServiceUsageSummary> {
        let since = UsageWindow::trailing_days(days_back, Utc::now()).start;
        self.store.usage_by_service(since).await.unwrap_or_else(|e| {
            warn!(days_back, error = %e, "Failed to load usage stats");
            Vec::new()
        })
    }

    pub async fn get_top_endpoints_by_cost(&self, days_back: u32, limit: usize) -> Vec<EndpointCost> {
        let since = UsageWindow::trailing_days(days_back, Utc::now()).start;
        self.store
            .top_endpoints(since, limit)
            .await
            .unwrap_or_else(|e| {
                warn!(days_back, limit, error = %e, "Failed to load top endpoints");
                Vec::new()
            })
    }

    pub async fn get_user_usage(&self, user_id: Uuid, days_back: u32) -> Vec<UserServiceUsage> {
        let since = UsageWindow::trailing_days(days_back, Utc::now()).start;
        self.store
            .user_usage(user_id, since)
            .await
            .unwrap_or_else(|e| {
                warn!(%user_id, error = %e, "Failed to load user usage");
                Vec::new()
            })
    }

    // == Guards ==
    /// True only when today's status is known and critical.
    pub async fn should_rate_limit(&self, service: &str) -> bool {
        matches!(
            self.check_budget_status(service, BudgetPeriod::Daily).await,
            Some(BudgetStatus { status: BudgetLevel::Critical, .. })
        )
    }

    /// Reads `is_active`; an unknown service counts as enabled.
    pub async fn is_service_enabled(&self, service: &str) -> bool {
        self.get_budget_config(service)
            .await
            .map(|config| config.is_active)
            .unwrap_or(true)
    }

    // == Alerts ==
    /// Leaves an alert record in the cache for a notifier to pick up.
    pub async fn send_budget_alert(
        &self,
        service: &str,
        period: BudgetPeriod,
        status: BudgetLevel,
        current_usage: f64,
        budget_limit: f64,
    ) -> bool {
        let alert = BudgetAlert {
            service_name: service.to_string(),
            period,
            status,
            current_usage,
            budget_limit,
            created_at: Utc::now(),
        };
        let key = keys::budget_alert(service, period, alert.created_at.timestamp_millis());

        let stored = self
            .cache
            .set(&key, &alert, Some(ALERT_TTL_SECS), &[keys::tags::API_USAGE])
            .await;
        if stored {
            warn!(
                service,
                %period,
                %status,
                current_usage,
                budget_limit,
                "Budget alert raised"
            );
        }
        stored
    }

    /// Checks both periods of every monitored service and raises an alert
    /// for each non-normal status. Services configured to auto-disable are
    /// deactivated once a critical status reaches 100% of the budget.
    pub async fn monitor_budget_alerts(&self) -> Vec<BudgetAlert> {
        let now = Utc::now();
        let mut alerts = Vec::new();

        for service in &self.services {
            let Some(config) = self.get_budget_config(service).await else {
                debug!(service = %service, "No budget config, skipping");
                continue;
            };

            let mut exceeded = false;
            for period in [BudgetPeriod::Daily, BudgetPeriod::Monthly] {
                let Some(status) = self.status_with_config(&config, period, now).await else {
                    continue;
                };
                if status.status == BudgetLevel::Normal {
                    continue;
                }
                if status.status == BudgetLevel::Critical && status.usage_percentage >= 100.0 {
                    exceeded = true;
                }

                let sent = self
                    .send_budget_alert(
                        service,
                        period,
                        status.status,
                        status.current_usage,
                        status.budget_limit,
                    )
                    .await;
                if !sent {
                    continue;
                }
                alerts.push(BudgetAlert {
                    service_name: service.clone(),
                    period,
                    status: status.status,
                    current_usage: status.current_usage,
                    budget_limit: status.budget_limit,
                    created_at: now,
                });
            }

            if exceeded && config.auto_disable_on_budget_exceeded && config.is_active {
                let update = BudgetConfigUpdate {
                    is_active: Some(false),
                    ..Default::default()
                };
                if self.update_budget_config(service, &update).await {
                    info!(service = %service, "Service disabled after exceeding its budget");
                }
            }
        }

        alerts
    }

    // == Configuration ==
    pub async fn get_budget_config(&self, service: &str) -> Option<BudgetConfig> {
        match self.store.budget_config(service).await {
            Ok(config) => config,
            Err(e) => {
                warn!(service, error = %e, "Failed to load budget config");
                None
            }
        }
    }

    /// Merges `update` over the stored config, or over a zero-budget default
    /// when none exists. Rejects updates that break the config invariants.
    pub async fn update_budget_config(&self, service: &str, update: &BudgetConfigUpdate) -> bool {
        let mut config = match self.store.budget_config(service).await {
            Ok(Some(config)) => config,
            Ok(None) => BudgetConfig::new(service, 0.0, 0.0),
            Err(e) => {
                warn!(service, error = %e, "Failed to load budget config for update");
                return false;
            }
        };
        update.apply_to(&mut config);

        if let Err(e) = config.validate() {
            warn!(service, error = %e, "Rejected budget config update");
            return false;
        }

        match self.store.upsert_budget_config(&config).await {
            Ok(()) => {
                info!(service, "Budget config updated");
                true
            }
            Err(e) => {
                warn!(service, error = %e, "Failed to store budget config");
                false
            }
        }
    }

    // == Cost Model ==
    /// `cost_per_request + tokens * cost_per_token + MiB * cost_per_mb`,
    /// or 0 without a config.
    pub async fn calculate_api_cost(
        &self,
        service: &str,
        endpoint: &str,
        tokens: u64,
        bytes: u64,
    ) -> f64 {
        let Some(config) = self.get_budget_config(service).await else {
            debug!(service, endpoint, "No budget config, cost defaults to zero");
            return 0.0;
        };
        config.cost_per_request
            + tokens as f64 * config.cost_per_token
            + bytes as f64 / BYTES_PER_MB * config.cost_per_mb
    }
}

/// Share of `limit` spent, in percent. A zero limit reads 0% while unused
/// and 100% once anything was spent.
fn usage_percentage(usage: f64, limit: f64) -> f64 {
    if limit > 0.0 {
        usage / limit * 100.0
    } else if usage > 0.0 {
        100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::budget::store::MemoryUsageStore;
    use crate::cache::TagCacheConfig;
    use crate::error::{StoreError, StoreResult};
    use async_trait::async_trait;

    fn test_cache() -> Arc<TagCache> {
        let backend = Arc::new(MemoryBackend::new(1000));
        Arc::new(TagCache::new(backend, TagCacheConfig::default()))
    }

    fn monitor_with(store: MemoryUsageStore) -> (BudgetMonitor, Arc<MemoryUsageStore>) {
        let store = Arc::new(store);
        (BudgetMonitor::new(store.clone(), test_cache()), store)
    }

    async fn spend(monitor: &BudgetMonitor, service: &str, cost: f64) {
        monitor
            .log_api_usage(&ApiUsageEntry::new(service, "/v1/test", cost))
            .await
            .unwrap();
    }

    /// Store whose every call fails.
    struct DownStore;

    #[async_trait]
    impl UsageStore for DownStore {
        async fn insert_usage(&self, _: &ApiUsageEntry) -> StoreResult<Uuid> {
            Err(StoreError::Database("down".into()))
        }
        async fn aggregate(&self, _: &str, _: UsageWindow) -> StoreResult<UsageAggregate> {
            Err(StoreError::Database("down".into()))
        }
        async fn budget_config(&self, _: &str) -> StoreResult<Option<BudgetConfig>> {
            Err(StoreError::Database("down".into()))
        }
        async fn upsert_budget_config(&self, _: &BudgetConfig) -> StoreResult<()> {
            Err(StoreError::Database("down".into()))
        }
        async fn usage_by_service(&self, _: DateTime<Utc>) -> StoreResult<Vec<ServiceUsageSummary>> {
            Err(StoreError::Database("down".into()))
        }
        async fn top_endpoints(&self, _: DateTime<Utc>, _: usize) -> StoreResult<Vec<EndpointCost>> {
            Err(StoreError::Database("down".into()))
        }
        async fn user_usage(&self, _: Uuid, _: DateTime<Utc>) -> StoreResult<Vec<UserServiceUsage>> {
            Err(StoreError::Database("down".into()))
        }
    }

    #[tokio::test]
    async fn test_status_thresholds() {
        for (spent, expected) in [
            (79.0, BudgetLevel::Normal),
            (85.0, BudgetLevel::Warning),
            (96.0, BudgetLevel::Critical),
        ] {
            let store = MemoryUsageStore::new().with_config(BudgetConfig::new("openai", 100.0, 2000.0));
            let (monitor, _) = monitor_with(store);
            spend(&monitor, "openai", spent).await;

            let status = monitor
                .check_budget_status("openai", BudgetPeriod::Daily)
                .await
                .unwrap();

            assert_eq!(status.status, expected, "spent {}", spent);
            assert!((status.usage_percentage - spent).abs() < 1e-9);
            assert_eq!(status.days_remaining, 1);
        }
    }

    #[tokio::test]
    async fn test_status_unknown_without_config() {
        let (monitor, _) = monitor_with(MemoryUsageStore::new());

        assert!(monitor
            .check_budget_status("openai", BudgetPeriod::Daily)
            .await
            .is_none());
        assert!(!monitor.should_rate_limit("openai").await);
        assert!(monitor.is_service_enabled("openai").await);
    }

    #[tokio::test]
    async fn test_zero_limit_percentage() {
        let store = MemoryUsageStore::new().with_config(BudgetConfig::new("resend", 0.0, 0.0));
        let (monitor, _) = monitor_with(store);

        let idle = monitor
            .check_budget_status("resend", BudgetPeriod::Daily)
            .await
            .unwrap();
        assert_eq!(idle.usage_percentage, 0.0);
        assert_eq!(idle.status, BudgetLevel::Normal);

        spend(&monitor, "resend", 0.01).await;
        let used = monitor
            .check_budget_status("resend", BudgetPeriod::Daily)
            .await
            .unwrap();
        assert_eq!(used.usage_percentage, 100.0);
        assert_eq!(used.status, BudgetLevel::Critical);
    }

    #[tokio::test]
    async fn test_rate_limit_flips_at_critical() {
        let store = MemoryUsageStore::new().with_config(BudgetConfig::new("openai", 100.0, 2000.0));
        let (monitor, _) = monitor_with(store);

        spend(&monitor, "openai", 94.0).await;
        assert!(!monitor.should_rate_limit("openai").await);

        spend(&monitor, "openai", 2.0).await;
        assert!(monitor.should_rate_limit("openai").await);
    }

    #[tokio::test]
    async fn test_calculate_api_cost() {
        let config = BudgetConfig::new("openai", 100.0, 2000.0).with_costs(0.01, 0.00002, 0.0);
        let (monitor, _) = monitor_with(MemoryUsageStore::new().with_config(config));

        let cost = monitor.calculate_api_cost("openai", "/v1/chat", 1000, 0).await;

        assert!((cost - 0.03).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_calculate_api_cost_bytes_and_request() {
        let config = BudgetConfig::new("supabase", 10.0, 100.0).with_costs(0.001, 0.0, 0.5);
        let (monitor, _) = monitor_with(MemoryUsageStore::new().with_config(config));

        let cost = monitor
            .calculate_api_cost("supabase", "/storage", 0, 2 * 1024 * 1024)
            .await;

        assert!((cost - 1.001).abs() < 1e-9);
        assert_eq!(monitor.calculate_api_cost("unknown", "/", 10, 10).await, 0.0);
    }

    #[tokio::test]
    async fn test_send_budget_alert_writes_tagged_record() {
        let (monitor, _) = monitor_with(MemoryUsageStore::new());

        assert!(
            monitor
                .send_budget_alert("openai", BudgetPeriod::Daily, BudgetLevel::Warning, 85.0, 100.0)
                .await
        );

        let keys = monitor.cache().get_keys_by_tag(keys::tags::API_USAGE).await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("budget_alert:openai:"));

        let alert: BudgetAlert = monitor.cache().get(&keys[0]).await.unwrap();
        assert_eq!(alert.status, BudgetLevel::Warning);
        let meta = monitor.cache().get_metadata(&keys[0]).await.unwrap();
        assert!(meta.remaining_secs() <= ALERT_TTL_SECS);
    }

    #[tokio::test]
    async fn test_monitor_alerts_only_non_normal() {
        let store = MemoryUsageStore::new()
            .with_config(BudgetConfig::new("openai", 100.0, 2000.0))
            .with_config(BudgetConfig::new("stripe", 100.0, 2000.0));
        let (monitor, _) = monitor_with(store);
        spend(&monitor, "openai", 90.0).await;
        spend(&monitor, "stripe", 10.0).await;

        let alerts = monitor.monitor_budget_alerts().await;

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].service_name, "openai");
        assert_eq!(alerts[0].period, BudgetPeriod::Daily);
        assert_eq!(alerts[0].status, BudgetLevel::Warning);
    }

    #[tokio::test]
    async fn test_monitor_auto_disables_exceeded_service() {
        let mut config = BudgetConfig::new("google_maps", 10.0, 1000.0);
        config.auto_disable_on_budget_exceeded = true;
        let (monitor, _) = monitor_with(MemoryUsageStore::new().with_config(config));
        spend(&monitor, "google_maps", 12.0).await;

        let alerts = monitor.monitor_budget_alerts().await;

        assert_eq!(alerts.len(), 1);
        assert!(!monitor.is_service_enabled("google_maps").await);
    }

    #[tokio::test]
    async fn test_monitor_stores_one_alert_per_period() {
        let store = MemoryUsageStore::new().with_config(BudgetConfig::new("openai", 10.0, 12.0));
        let (monitor, _) = monitor_with(store);
        spend(&monitor, "openai", 12.0).await;

        let alerts = monitor.monitor_budget_alerts().await;

        assert_eq!(alerts.len(), 2);
        let mut stored = monitor.cache().get_keys_by_tag(keys::tags::API_USAGE).await;
        stored.sort();
        assert_eq!(stored.len(), 2);
        assert!(stored[0].starts_with("budget_alert:openai:daily:"));
        assert!(stored[1].starts_with("budget_alert:openai:monthly:"));
    }

    #[tokio::test]
    async fn test_monitor_keeps_service_without_auto_disable() {
        let store = MemoryUsageStore::new().with_config(BudgetConfig::new("google_maps", 10.0, 1000.0));
        let (monitor, _) = monitor_with(store);
        spend(&monitor, "google_maps", 12.0).await;

        monitor.monitor_budget_alerts().await;

        assert!(monitor.is_service_enabled("google_maps").await);
    }

    #[tokio::test]
    async fn test_update_creates_and_merges() {
        let (monitor, _) = monitor_with(MemoryUsageStore::new());
        let update = BudgetConfigUpdate {
            daily_budget_usd: Some(50.0),
            monthly_budget_usd: Some(1000.0),
            ..Default::default()
        };

        assert!(monitor.update_budget_config("stripe", &update).await);
        let config = monitor.get_budget_config("stripe").await.unwrap();
        assert_eq!(config.daily_budget_usd, 50.0);
        assert_eq!(config.warning_threshold, 0.8);

        let bad = BudgetConfigUpdate {
            warning_threshold: Some(0.99),
            critical_threshold: Some(0.5),
            ..Default::default()
        };
        assert!(!monitor.update_budget_config("stripe", &bad).await);
        assert_eq!(
            monitor.get_budget_config("stripe").await.unwrap().warning_threshold,
            0.8
        );
    }

    #[tokio::test]
    async fn test_daily_and_monthly_usage() {
        let (monitor, _) = monitor_with(MemoryUsageStore::new());
        spend(&monitor, "openai", 1.5).await;
        spend(&monitor, "openai", 2.5).await;
        let today = Utc::now().date_naive();

        let daily = monitor.get_daily_usage("openai", today).await;
        let monthly = monitor
            .get_monthly_usage("openai", chrono::Datelike::year(&today), chrono::Datelike::month(&today))
            .await;

        assert_eq!(daily.total_requests, 2);
        assert!((monthly.total_cost_usd - 4.0).abs() < 1e-9);
        assert_eq!(monitor.get_monthly_usage("openai", 2026, 13).await, UsageAggregate::default());
    }

    #[tokio::test]
    async fn test_store_failures_fail_open() {
        let monitor = BudgetMonitor::new(Arc::new(DownStore), test_cache());

        assert!(monitor
            .log_api_usage(&ApiUsageEntry::new("openai", "/v1/chat", 1.0))
            .await
            .is_none());
        assert!(monitor
            .check_budget_status("openai", BudgetPeriod::Monthly)
            .await
            .is_none());
        assert!(!monitor.should_rate_limit("openai").await);
        assert!(monitor.is_service_enabled("openai").await);
        assert!(monitor.get_usage_stats(7).await.is_empty());
        assert!(monitor.get_top_endpoints_by_cost(7, 5).await.is_empty());
        assert!(monitor.get_user_usage(Uuid::new_v4(), 7).await.is_empty());
        assert!(monitor.monitor_budget_alerts().await.is_empty());
        assert!(
            !monitor
                .update_budget_config("openai", &BudgetConfigUpdate::default())
                .await
        );
    }

    #[tokio::test]
    async fn test_huge_lookback_covers_everything() {
        let (monitor, _) = monitor_with(MemoryUsageStore::new());
        spend(&monitor, "openai", 3.0).await;

        let stats = monitor.get_usage_stats(u32::MAX).await;
        assert_eq!(stats.len(), 1);
        assert_eq!(monitor.get_top_endpoints_by_cost(u32::MAX, 5).await.len(), 1);
        assert!(monitor.get_user_usage(Uuid::new_v4(), u32::MAX).await.is_empty());
    }

    #[test]
    fn test_usage_percentage() {
        assert_eq!(usage_percentage(50.0, 200.0), 25.0);
        assert_eq!(usage_percentage(0.0, 0.0), 0.0);
        assert_eq!(usage_percentage(3.0, 0.0), 100.0);
    }
}
