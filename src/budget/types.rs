//! Budget and usage types shared by the monitor and the usage stores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

// == Budget Period ==
/// Accounting window a budget applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Daily,
    Monthly,
}

impl BudgetPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetPeriod::Daily => "daily",
            BudgetPeriod::Monthly => "monthly",
        }
    }
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BudgetPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(BudgetPeriod::Daily),
            "monthly" => Ok(BudgetPeriod::Monthly),
            other => Err(format!("unknown budget period '{}'", other)),
        }
    }
}

// == Budget Level ==
/// Threshold classification of a usage percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    Normal,
    Warning,
    Critical,
}

impl BudgetLevel {
    /// Classifies `usage_percentage` (0–100+) against fractional thresholds.
    pub fn classify(usage_percentage: f64, warning_threshold: f64, critical_threshold: f64) -> Self {
        if usage_percentage < warning_threshold * 100.0 {
            BudgetLevel::Normal
        } else if usage_percentage < critical_threshold * 100.0 {
            BudgetLevel::Warning
        } else {
            BudgetLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetLevel::Normal => "normal",
            BudgetLevel::Warning => "warning",
            BudgetLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for BudgetLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Budget Config ==
/// Spend ceilings, thresholds and cost model of one external service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub service_name: String,
    pub daily_budget_usd: f64,
    pub monthly_budget_usd: f64,
    /// Fraction of the budget where status becomes `warning`
    pub warning_threshold: f64,
    /// Fraction of the budget where status becomes `critical`
    pub critical_threshold: f64,
    /// Advisory rate ceilings; enforcement is up to callers
    pub requests_per_minute: Option<u32>,
    pub requests_per_hour: Option<u32>,
    pub requests_per_day: Option<u32>,
    pub cost_per_request: f64,
    pub cost_per_token: f64,
    pub cost_per_mb: f64,
    pub is_active: bool,
    pub auto_disable_on_budget_exceeded: bool,
    pub updated_at: DateTime<Utc>,
}

impl BudgetConfig {
    /// Config with default thresholds (0.8 / 0.95) and a zero cost model.
    pub fn new(service_name: impl Into<String>, daily_budget_usd: f64, monthly_budget_usd: f64) -> Self {
        Self {
            service_name: service_name.into(),
            daily_budget_usd,
            monthly_budget_usd,
            warning_threshold: 0.8,
            critical_threshold: 0.95,
            requests_per_minute: None,
            requests_per_hour: None,
            requests_per_day: None,
            cost_per_request: 0.0,
            cost_per_token: 0.0,
            cost_per_mb: 0.0,
            is_active: true,
            auto_disable_on_budget_exceeded: false,
            updated_at: Utc::now(),
        }
    }

    pub fn with_thresholds(mut self, warning: f64, critical: f64) -> Self {
        self.warning_threshold = warning;
        self.critical_threshold = critical;
        self
    }

    pub fn with_costs(mut self, per_request: f64, per_token: f64, per_mb: f64) -> Self {
        self.cost_per_request = per_request;
        self.cost_per_token = per_token;
        self.cost_per_mb = per_mb;
        self
    }

    /// Budget ceiling for a period.
    pub fn limit_for(&self, period: BudgetPeriod) -> f64 {
        match period {
            BudgetPeriod::Daily => self.daily_budget_usd,
            BudgetPeriod::Monthly => self.monthly_budget_usd,
        }
    }

    /// Checks threshold ordering and non-negative amounts.
    pub fn validate(&self) -> Result<(), StoreError> {
        let in_range = |t: f64| t > 0.0 && t <= 1.0;
        if !in_range(self.warning_threshold) || !in_range(self.critical_threshold) {
            return Err(StoreError::InvalidConfig(
                "thresholds must be fractions in (0, 1]".to_string(),
            ));
        }
        if self.warning_threshold > self.critical_threshold {
            return Err(StoreError::InvalidConfig(
                "warning threshold exceeds critical threshold".to_string(),
            ));
        }
        let amounts = [
            self.daily_budget_usd,
            self.monthly_budget_usd,
            self.cost_per_request,
            self.cost_per_token,
            self.cost_per_mb,
        ];
        if amounts.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(StoreError::InvalidConfig(
                "budgets and cost coefficients must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

// == Budget Config Update ==
/// Partial update of a [`BudgetConfig`]; absent fields are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfigUpdate {
    pub daily_budget_usd: Option<f64>,
    pub monthly_budget_usd: Option<f64>,
    pub warning_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,
    pub requests_per_minute: Option<u32>,
    pub requests_per_hour: Option<u32>,
    pub requests_per_day: Option<u32>,
    pub cost_per_request: Option<f64>,
    pub cost_per_token: Option<f64>,
    pub cost_per_mb: Option<f64>,
    pub is_active: Option<bool>,
    pub auto_disable_on_budget_exceeded: Option<bool>,
}

impl BudgetConfigUpdate {
    /// Applies the present fields onto `config`.
    pub fn apply_to(&self, config: &mut BudgetConfig) {
        let merge = |target: &mut f64, value: Option<f64>| {
            if let Some(v) = value {
                *target = v;
            }
        };
        merge(&mut config.daily_budget_usd, self.daily_budget_usd);
        merge(&mut config.monthly_budget_usd, self.monthly_budget_usd);
        merge(&mut config.warning_threshold, self.warning_threshold);
        merge(&mut config.critical_threshold, self.critical_threshold);
        merge(&mut config.cost_per_request, self.cost_per_request);
        merge(&mut config.cost_per_token, self.cost_per_token);
        merge(&mut config.cost_per_mb, self.cost_per_mb);
        if let Some(active) = self.is_active {
            config.is_active = active;
        }
        if let Some(auto_disable) = self.auto_disable_on_budget_exceeded {
            config.auto_disable_on_budget_exceeded = auto_disable;
        }
        if self.requests_per_minute.is_some() {
            config.requests_per_minute = self.requests_per_minute;
        }
        if self.requests_per_hour.is_some() {
            config.requests_per_hour = self.requests_per_hour;
        }
        if self.requests_per_day.is_some() {
            config.requests_per_day = self.requests_per_day;
        }
        config.updated_at = Utc::now();
    }
}

// == Usage Entry ==
/// One outbound API call to record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiUsageEntry {
    pub service_name: String,
    pub endpoint: String,
    pub method: String,
    pub response_status: u16,
    pub cost_usd: f64,
    pub tokens_used: u64,
    pub response_time_ms: u64,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ApiUsageEntry {
    pub fn new(service_name: impl Into<String>, endpoint: impl Into<String>, cost_usd: f64) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: endpoint.into(),
            method: "POST".to_string(),
            response_status: 200,
            cost_usd,
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.response_status >= 400
    }
}

/// A usage entry as stored in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub entry: ApiUsageEntry,
    pub created_at: DateTime<Utc>,
}

// == Aggregates ==
/// Rolled-up usage over a window. All zero when nothing was logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageAggregate {
    pub total_cost_usd: f64,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub avg_response_time_ms: f64,
    pub error_count: u64,
}

impl UsageAggregate {
    /// Folds records into an aggregate.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> Self {
        let mut agg = UsageAggregate::default();
        let mut latency_sum = 0u64;
        for record in records {
            agg.total_cost_usd += record.entry.cost_usd;
            agg.total_requests += 1;
            agg.total_tokens += record.entry.tokens_used;
            latency_sum += record.entry.response_time_ms;
            if record.entry.is_error() {
                agg.error_count += 1;
            }
        }
        if agg.total_requests > 0 {
            agg.avg_response_time_ms = latency_sum as f64 / agg.total_requests as f64;
        }
        agg
    }
}

/// Cross-service summary row for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUsageSummary {
    pub service_name: String,
    pub total_cost_usd: f64,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub avg_response_time_ms: f64,
    pub error_rate: f64,
}

/// Spend of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointCost {
    pub service_name: String,
    pub endpoint: String,
    pub total_cost_usd: f64,
    pub request_count: u64,
    pub avg_cost_usd: f64,
}

/// Spend of one user on one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserServiceUsage {
    pub service_name: String,
    pub total_cost_usd: f64,
    pub request_count: u64,
    pub total_tokens: u64,
}

// == Budget Status ==
/// Derived usage-to-budget view of a service over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub service_name: String,
    pub period: BudgetPeriod,
    pub budget_limit: f64,
    pub current_usage: f64,
    pub usage_percentage: f64,
    pub status: BudgetLevel,
    /// Days left in the period, today included
    pub days_remaining: u32,
}

// == Budget Alert ==
/// Signal left in the cache for a notifier to pick up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub service_name: String,
    pub period: BudgetPeriod,
    pub status: BudgetLevel,
    pub current_usage: f64,
    pub budget_limit: f64,
    pub created_at: DateTime<Utc>,
}
