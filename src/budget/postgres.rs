//! Postgres-backed usage store.
//!
//! Schema and stored routines live in `migrations/`. Rows are decoded into
//! private `FromRow` structs and converted once into the budget types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use super::period::UsageWindow;
use super::store::UsageStore;
use super::types::{
    ApiUsageEntry, BudgetConfig, EndpointCost, ServiceUsageSummary, UsageAggregate,
    UserServiceUsage,
};
use crate::error::StoreResult;

// == Rows ==
#[derive(Debug, sqlx::FromRow)]
struct AggregateRow {
    total_cost_usd: f64,
    total_requests: i64,
    total_tokens: i64,
    avg_response_time_ms: f64,
    error_count: i64,
}

impl From<AggregateRow> for UsageAggregate {
    fn from(row: AggregateRow) -> Self {
        UsageAggregate {
            total_cost_usd: row.total_cost_usd,
            total_requests: row.total_requests.max(0) as u64,
            total_tokens: row.total_tokens.max(0) as u64,
            avg_response_time_ms: row.avg_response_time_ms,
            error_count: row.error_count.max(0) as u64,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BudgetConfigRow {
    service_name: String,
    daily_budget_usd: f64,
    monthly_budget_usd: f64,
    warning_threshold: f64,
    critical_threshold: f64,
    requests_per_minute: Option<i32>,
    requests_per_hour: Option<i32>,
    requests_per_day: Option<i32>,
    cost_per_request: f64,
    cost_per_token: f64,
    cost_per_mb: f64,
    is_active: bool,
    auto_disable_on_budget_exceeded: bool,
    updated_at: DateTime<Utc>,
}

impl From<BudgetConfigRow> for BudgetConfig {
    fn from(row: BudgetConfigRow) -> Self {
        let rate = |v: Option<i32>| v.map(|n| n.max(0) as u32);
        BudgetConfig {
            service_name: row.service_name,
            daily_budget_usd: row.daily_budget_usd,
            monthly_budget_usd: row.monthly_budget_usd,
            warning_threshold: row.warning_threshold,
            critical_threshold: row.critical_threshold,
            requests_per_minute: rate(row.requests_per_minute),
            requests_per_hour: rate(row.requests_per_hour),
            requests_per_day: rate(row.requests_per_day),
            cost_per_request: row.cost_per_request,
            cost_per_token: row.cost_per_token,
            cost_per_mb: row.cost_per_mb,
            is_active: row.is_active,
            auto_disable_on_budget_exceeded: row.auto_disable_on_budget_exceeded,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ServiceSummaryRow {
    service_name: String,
    total_cost_usd: f64,
    total_requests: i64,
    total_tokens: i64,
    avg_response_time_ms: f64,
    error_count: i64,
}

impl From<ServiceSummaryRow> for ServiceUsageSummary {
    fn from(row: ServiceSummaryRow) -> Self {
        let requests = row.total_requests.max(0) as u64;
        ServiceUsageSummary {
            service_name: row.service_name,
            total_cost_usd: row.total_cost_usd,
            total_requests: requests,
            total_tokens: row.total_tokens.max(0) as u64,
            avg_response_time_ms: row.avg_response_time_ms,
            error_rate: row.error_count.max(0) as f64 / requests.max(1) as f64,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EndpointCostRow {
    service_name: String,
    endpoint: String,
    total_cost_usd: f64,
    request_count: i64,
}

impl From<EndpointCostRow> for EndpointCost {
    fn from(row: EndpointCostRow) -> Self {
        let count = row.request_count.max(0) as u64;
        EndpointCost {
            service_name: row.service_name,
            endpoint: row.endpoint,
            total_cost_usd: row.total_cost_usd,
            request_count: count,
            avg_cost_usd: row.total_cost_usd / count.max(1) as f64,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserUsageRow {
    service_name: String,
    total_cost_usd: f64,
    request_count: i64,
    total_tokens: i64,
}

impl From<UserUsageRow> for UserServiceUsage {
    fn from(row: UserUsageRow) -> Self {
        UserServiceUsage {
            service_name: row.service_name,
            total_cost_usd: row.total_cost_usd,
            request_count: row.request_count.max(0) as u64,
            total_tokens: row.total_tokens.max(0) as u64,
        }
    }
}

// == Store ==
#[derive(Clone)]
pub struct PgUsageStore {
    pool: PgPool,
}

/// Counters are `u64` in Rust and `BIGINT` in Postgres.
fn saturating_i64(value: impl TryInto<i64>) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool and applies pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Usage store migrations applied");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn insert_usage(&self, entry: &ApiUsageEntry) -> StoreResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "SELECT log_api_usage($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&entry.service_name)
        .bind(&entry.endpoint)
        .bind(&entry.method)
        .bind(i32::from(entry.response_status))
        .bind(entry.cost_usd)
        .bind(saturating_i64(entry.tokens_used))
        .bind(saturating_i64(entry.response_time_ms))
        .bind(entry.user_id)
        .bind(&entry.session_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn aggregate(&self, service: &str, window: UsageWindow) -> StoreResult<UsageAggregate> {
        let row: AggregateRow = sqlx::query_as(
            "SELECT total_cost_usd, total_requests, total_tokens, avg_response_time_ms, error_count \
             FROM api_usage_aggregate($1, $2, $3)",
        )
        .bind(service)
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn budget_config(&self, service: &str) -> StoreResult<Option<BudgetConfig>> {
        let row: Option<BudgetConfigRow> = sqlx::query_as(
            r#"
            SELECT service_name, daily_budget_usd, monthly_budget_usd, warning_threshold,
                   critical_threshold, requests_per_minute, requests_per_hour, requests_per_day,
                   cost_per_request, cost_per_token, cost_per_mb, is_active,
                   auto_disable_on_budget_exceeded, updated_at
            FROM api_budget_configs
            WHERE service_name = $1
            "#,
        )
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert_budget_config(&self, config: &BudgetConfig) -> StoreResult<()> {
        config.validate()?;
        let rate = |v: Option<u32>| v.map(|n| n.min(i32::MAX as u32) as i32);
        sqlx::query(
            r#"
            INSERT INTO api_budget_configs (
                service_name, daily_budget_usd, monthly_budget_usd, warning_threshold,
                critical_threshold, requests_per_minute, requests_per_hour, requests_per_day,
                cost_per_request, cost_per_token, cost_per_mb, is_active,
                auto_disable_on_budget_exceeded, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (service_name) DO UPDATE SET
                daily_budget_usd = EXCLUDED.daily_budget_usd,
                monthly_budget_usd = EXCLUDED.monthly_budget_usd,
                warning_threshold = EXCLUDED.warning_threshold,
                critical_threshold = EXCLUDED.critical_threshold,
                requests_per_minute = EXCLUDED.requests_per_minute,
                requests_per_hour = EXCLUDED.requests_per_hour,
                requests_per_day = EXCLUDED.requests_per_day,
                cost_per_request = EXCLUDED.cost_per_request,
                cost_per_token = EXCLUDED.cost_per_token,
                cost_per_mb = EXCLUDED.cost_per_mb,
                is_active = EXCLUDED.is_active,
                auto_disable_on_budget_exceeded = EXCLUDED.auto_disable_on_budget_exceeded,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&config.service_name)
        .bind(config.daily_budget_usd)
        .bind(config.monthly_budget_usd)
        .bind(config.warning_threshold)
        .bind(config.critical_threshold)
        .bind(rate(config.requests_per_minute))
        .bind(rate(config.requests_per_hour))
        .bind(rate(config.requests_per_day))
        .bind(config.cost_per_request)
        .bind(config.cost_per_token)
        .bind(config.cost_per_mb)
        .bind(config.is_active)
        .bind(config.auto_disable_on_budget_exceeded)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn usage_by_service(&self, since: DateTime<Utc>) -> StoreResult<Vec<ServiceUsageSummary>> {
        let rows: Vec<ServiceSummaryRow> = sqlx::query_as(
            r#"
            SELECT service_name,
                   COALESCE(SUM(cost_usd), 0)::float8 AS total_cost_usd,
                   COUNT(*)::int8 AS total_requests,
                   COALESCE(SUM(tokens_used), 0)::int8 AS total_tokens,
                   COALESCE(AVG(response_time_ms), 0)::float8 AS avg_response_time_ms,
                   COUNT(*) FILTER (WHERE response_status >= 400)::int8 AS error_count
            FROM api_usage_logs
            WHERE created_at >= $1
            GROUP BY service_name
            ORDER BY total_cost_usd DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn top_endpoints(&self, since: DateTime<Utc>, limit: usize) -> StoreResult<Vec<EndpointCost>> {
        let rows: Vec<EndpointCostRow> = sqlx::query_as(
            r#"
            SELECT service_name, endpoint,
                   COALESCE(SUM(cost_usd), 0)::float8 AS total_cost_usd,
                   COUNT(*)::int8 AS request_count
            FROM api_usage_logs
            WHERE created_at >= $1
            GROUP BY service_name, endpoint
            ORDER BY total_cost_usd DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(saturating_i64(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn user_usage(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<Vec<UserServiceUsage>> {
        let rows: Vec<UserUsageRow> = sqlx::query_as(
            r#"
            SELECT service_name,
                   COALESCE(SUM(cost_usd), 0)::float8 AS total_cost_usd,
                   COUNT(*)::int8 AS request_count,
                   COALESCE(SUM(tokens_used), 0)::int8 AS total_tokens
            FROM api_usage_logs
            WHERE user_id = $1 AND created_at >= $2
            GROUP BY service_name
            ORDER BY total_cost_usd DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_row_conversion() {
        let row = AggregateRow {
            total_cost_usd: 12.5,
            total_requests: 4,
            total_tokens: 1200,
            avg_response_time_ms: 87.5,
            error_count: 1,
        };

        let agg: UsageAggregate = row.into();

        assert_eq!(agg.total_requests, 4);
        assert_eq!(agg.total_tokens, 1200);
        assert_eq!(agg.error_count, 1);
    }

    #[test]
    fn test_endpoint_row_average() {
        let row = EndpointCostRow {
            service_name: "openai".into(),
            endpoint: "/v1/chat".into(),
            total_cost_usd: 9.0,
            request_count: 3,
        };

        let cost: EndpointCost = row.into();

        assert!((cost.avg_cost_usd - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_row_error_rate() {
        let row = ServiceSummaryRow {
            service_name: "stripe".into(),
            total_cost_usd: 1.0,
            total_requests: 0,
            total_tokens: 0,
            avg_response_time_ms: 0.0,
            error_count: 0,
        };

        let summary: ServiceUsageSummary = row.into();

        assert_eq!(summary.error_rate, 0.0);
    }

    #[test]
    fn test_counters_saturate_at_bigint_max() {
        assert_eq!(saturating_i64(420u64), 420);
        assert_eq!(saturating_i64(u64::MAX), i64::MAX);
        assert_eq!(saturating_i64(usize::MAX), i64::MAX);
    }
}
