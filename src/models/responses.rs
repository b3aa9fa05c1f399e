//! Response DTOs for the operational API
//!
//! Defines the structure of outgoing response bodies. Cache stats, budget
//! status and budget config are serialized from their domain types directly.

use serde::Serialize;

use crate::budget::{BudgetAlert, EndpointCost, ServiceUsageSummary, UserServiceUsage};

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Name of the key-value backend in use
    pub backend: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(backend: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            backend: backend.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for `POST /cache/invalidate`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Number of entries removed
    pub invalidated: usize,
}

/// Response body for `GET /cache/tags`
#[derive(Debug, Clone, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<String>,
}

/// Response body for `GET /cache/tags/:tag`
#[derive(Debug, Clone, Serialize)]
pub struct TagKeysResponse {
    pub tag: String,
    pub keys: Vec<String>,
}

/// Response body for `GET /budget/usage`
#[derive(Debug, Clone, Serialize)]
pub struct UsageReportResponse {
    pub days_back: u32,
    pub services: Vec<ServiceUsageSummary>,
    pub top_endpoints: Vec<EndpointCost>,
}

/// Response body for `GET /budget/users/:user_id/usage`
#[derive(Debug, Clone, Serialize)]
pub struct UserUsageResponse {
    pub user_id: uuid::Uuid,
    pub days_back: u32,
    pub services: Vec<UserServiceUsage>,
}

/// Response body for `POST /budget/monitor`
#[derive(Debug, Clone, Serialize)]
pub struct MonitorResponse {
    pub alert_count: usize,
    pub alerts: Vec<BudgetAlert>,
}

impl MonitorResponse {
    pub fn new(alerts: Vec<BudgetAlert>) -> Self {
        Self {
            alert_count: alerts.len(),
            alerts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy("memory");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("memory"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_monitor_response_counts_alerts() {
        let resp = MonitorResponse::new(Vec::new());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["alert_count"], 0);
        assert!(json["alerts"].as_array().unwrap().is_empty());
    }
}
