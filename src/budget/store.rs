//! Usage Store Module
//!
//! Persistence seam of the budget monitor: an append-only usage ledger plus
//! one budget configuration per service.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::period::UsageWindow;
use super::types::{
    ApiUsageEntry, BudgetConfig, EndpointCost, ServiceUsageSummary, UsageAggregate, UsageRecord,
    UserServiceUsage,
};
use crate::error::StoreResult;

// == Store Trait ==
/// Ledger and configuration storage used by [`super::BudgetMonitor`].
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Appends one usage row and returns its id.
    async fn insert_usage(&self, entry: &ApiUsageEntry) -> StoreResult<Uuid>;

    /// Rolls up one service's usage inside `window`.
    async fn aggregate(&self, service: &str, window: UsageWindow) -> StoreResult<UsageAggregate>;

    async fn budget_config(&self, service: &str) -> StoreResult<Option<BudgetConfig>>;

    /// Inserts or replaces the config keyed by `config.service_name`.
    async fn upsert_budget_config(&self, config: &BudgetConfig) -> StoreResult<()>;

    /// Per-service summaries since `since`, most expensive first.
    async fn usage_by_service(&self, since: DateTime<Utc>) -> StoreResult<Vec<ServiceUsageSummary>>;

    /// Most expensive endpoints since `since`.
    async fn top_endpoints(&self, since: DateTime<Utc>, limit: usize) -> StoreResult<Vec<EndpointCost>>;

    /// Spend of one user per service since `since`, most expensive first.
    async fn user_usage(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<Vec<UserServiceUsage>>;
}

// == Memory Store ==
/// In-process store for tests and database-less deployments.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    records: RwLock<Vec<UsageRecord>>,
    configs: RwLock<HashMap<String, BudgetConfig>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder that seeds one budget config.
    pub fn with_config(mut self, config: BudgetConfig) -> Self {
        self.configs
            .get_mut()
            .insert(config.service_name.clone(), config);
        self
    }

    /// Appends a record with an explicit timestamp (backfills, tests).
    pub async fn insert_record(&self, record: UsageRecord) {
        self.records.write().await.push(record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn by_cost_desc(a: f64, b: f64) -> std::cmp::Ordering {
    b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn insert_usage(&self, entry: &ApiUsageEntry) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        self.records.write().await.push(UsageRecord {
            id,
            entry: entry.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn aggregate(&self, service: &str, window: UsageWindow) -> StoreResult<UsageAggregate> {
        let records = self.records.read().await;
        Ok(UsageAggregate::from_records(records.iter().filter(|r| {
            r.entry.service_name == service && window.contains(r.created_at)
        })))
    }

    async fn budget_config(&self, service: &str) -> StoreResult<Option<BudgetConfig>> {
        Ok(self.configs.read().await.get(service).cloned())
    }

    async fn upsert_budget_config(&self, config: &BudgetConfig) -> StoreResult<()> {
        config.validate()?;
        self.configs
            .write()
            .await
            .insert(config.service_name.clone(), config.clone());
        Ok(())
    }

    async fn usage_by_service(&self, since: DateTime<Utc>) -> StoreResult<Vec<ServiceUsageSummary>> {
        let records = self.records.read().await;
        let mut grouped: HashMap<&str, Vec<&UsageRecord>> = HashMap::new();
        for record in records.iter().filter(|r| r.created_at >= since) {
            grouped
                .entry(record.entry.service_name.as_str())
                .or_default()
                .push(record);
        }

        let mut summaries: Vec<ServiceUsageSummary> = grouped
            .into_iter()
            .map(|(service, rows)| {
                let agg = UsageAggregate::from_records(rows);
                ServiceUsageSummary {
                    service_name: service.to_string(),
                    total_cost_usd: agg.total_cost_usd,
                    total_requests: agg.total_requests,
                    total_tokens: agg.total_tokens,
                    avg_response_time_ms: agg.avg_response_time_ms,
                    error_rate: agg.error_count as f64 / agg.total_requests.max(1) as f64,
                }
            })
            .collect();
        summaries.sort_by(|a, b| by_cost_desc(a.total_cost_usd, b.total_cost_usd));
        Ok(summaries)
    }

    async fn top_endpoints(&self, since: DateTime<Utc>, limit: usize) -> StoreResult<Vec<EndpointCost>> {
        let records = self.records.read().await;
        let mut grouped: HashMap<(&str, &str), (f64, u64)> = HashMap::new();
        for record in records.iter().filter(|r| r.created_at >= since) {
            let slot = grouped
                .entry((record.entry.service_name.as_str(), record.entry.endpoint.as_str()))
                .or_default();
            slot.0 += record.entry.cost_usd;
            slot.1 += 1;
        }

        let mut endpoints: Vec<EndpointCost> = grouped
            .into_iter()
            .map(|((service, endpoint), (total, count))| EndpointCost {
                service_name: service.to_string(),
                endpoint: endpoint.to_string(),
                total_cost_usd: total,
                request_count: count,
                avg_cost_usd: total / count.max(1) as f64,
            })
            .collect();
        endpoints.sort_by(|a, b| by_cost_desc(a.total_cost_usd, b.total_cost_usd));
        endpoints.truncate(limit);
        Ok(endpoints)
    }

    async fn user_usage(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<Vec<UserServiceUsage>> {
        let records = self.records.read().await;
        let mut grouped: HashMap<&str, UserServiceUsage> = HashMap::new();
        for record in records
            .iter()
            .filter(|r| r.created_at >= since && r.entry.user_id == Some(user_id))
        {
            let service = record.entry.service_name.as_str();
            let usage = grouped.entry(service).or_insert_with(|| UserServiceUsage {
                service_name: service.to_string(),
                total_cost_usd: 0.0,
                request_count: 0,
                total_tokens: 0,
            });
            usage.total_cost_usd += record.entry.cost_usd;
            usage.request_count += 1;
            usage.total_tokens += record.entry.tokens_used;
        }

        let mut usage: Vec<UserServiceUsage> = grouped.into_values().collect();
        usage.sort_by(|a, b| by_cost_desc(a.total_cost_usd, b.total_cost_usd));
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(service: &str, endpoint: &str, cost: f64, at: DateTime<Utc>) -> UsageRecord {
        UsageRecord {
            id: Uuid::new_v4(),
            entry: ApiUsageEntry::new(service, endpoint, cost),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_aggregate_today() {
        let store = MemoryUsageStore::new();
        store
            .insert_usage(&ApiUsageEntry::new("openai", "/v1/chat", 1.25))
            .await
            .unwrap();
        store
            .insert_usage(&ApiUsageEntry::new("openai", "/v1/embeddings", 0.75))
            .await
            .unwrap();
        store
            .insert_usage(&ApiUsageEntry::new("stripe", "/v1/charges", 9.0))
            .await
            .unwrap();

        let window = UsageWindow::day(Utc::now().date_naive());
        let agg = store.aggregate("openai", window).await.unwrap();

        assert_eq!(agg.total_requests, 2);
        assert!((agg.total_cost_usd - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_aggregate_respects_window() {
        let store = MemoryUsageStore::new();
        let in_window = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        store.insert_record(record("openai", "/v1/chat", 3.0, in_window)).await;
        store.insert_record(record("openai", "/v1/chat", 5.0, outside)).await;

        let march = UsageWindow::month(2026, 3).unwrap();
        let agg = store.aggregate("openai", march).await.unwrap();

        assert_eq!(agg.total_requests, 1);
        assert!((agg.total_cost_usd - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_config() {
        let store = MemoryUsageStore::new();
        let bad = BudgetConfig::new("openai", 100.0, 2000.0).with_thresholds(0.99, 0.5);

        assert!(store.upsert_budget_config(&bad).await.is_err());
        assert!(store.budget_config("openai").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_with_config_seeds() {
        let store = MemoryUsageStore::new().with_config(BudgetConfig::new("resend", 5.0, 100.0));

        let config = store.budget_config("resend").await.unwrap().unwrap();
        assert_eq!(config.daily_budget_usd, 5.0);
    }

    #[tokio::test]
    async fn test_top_endpoints_sorted_and_limited() {
        let store = MemoryUsageStore::new();
        let now = Utc::now();
        store.insert_record(record("openai", "/v1/chat", 4.0, now)).await;
        store.insert_record(record("openai", "/v1/chat", 2.0, now)).await;
        store.insert_record(record("google_maps", "/geocode", 1.0, now)).await;
        store.insert_record(record("stripe", "/v1/charges", 3.0, now)).await;

        let top = store
            .top_endpoints(now - Duration::days(1), 2)
            .await
            .unwrap();

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].endpoint, "/v1/chat");
        assert_eq!(top[0].request_count, 2);
        assert!((top[0].avg_cost_usd - 3.0).abs() < 1e-9);
        assert_eq!(top[1].service_name, "stripe");
    }

    #[tokio::test]
    async fn test_usage_by_service_error_rate() {
        let store = MemoryUsageStore::new();
        let now = Utc::now();
        let mut failed = record("openai", "/v1/chat", 1.0, now);
        failed.entry.response_status = 429;
        store.insert_record(failed).await;
        store.insert_record(record("openai", "/v1/chat", 1.0, now)).await;
        store
            .insert_record(record("openai", "/v1/chat", 1.0, now - Duration::days(30)))
            .await;

        let summaries = store
            .usage_by_service(now - Duration::days(7))
            .await
            .unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_requests, 2);
        assert!((summaries[0].error_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_user_usage_filters_by_user() {
        let store = MemoryUsageStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let mut mine = record("openai", "/v1/chat", 2.0, now);
        mine.entry.user_id = Some(user);
        mine.entry.tokens_used = 500;
        store.insert_record(mine).await;
        store.insert_record(record("openai", "/v1/chat", 7.0, now)).await;

        let usage = store.user_usage(user, now - Duration::days(1)).await.unwrap();

        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].request_count, 1);
        assert_eq!(usage[0].total_tokens, 500);
    }
}
