//! API Handlers
//!
//! HTTP request handlers for the operational endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::backend::MemoryBackend;
use crate::budget::{
    BudgetConfig, BudgetConfigUpdate, BudgetMonitor, BudgetPeriod, BudgetStatus, MemoryUsageStore,
};
use crate::cache::{CacheStats, TagCache, TagCacheConfig};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    HealthResponse, InvalidateRequest, InvalidateResponse, MonitorResponse, StatusQuery,
    TagKeysResponse, TagListResponse, UsageQuery, UsageReportResponse, UserUsageResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<TagCache>,
    pub monitor: Arc<BudgetMonitor>,
}

impl AppState {
    pub fn new(cache: Arc<TagCache>, monitor: Arc<BudgetMonitor>) -> Self {
        Self { cache, monitor }
    }

    /// State over the in-memory backend and usage store.
    pub fn in_memory(config: &Config) -> Self {
        let backend = Arc::new(MemoryBackend::new(config.max_entries));
        Self::with_memory_store(config, backend, MemoryUsageStore::new())
    }

    /// State over a given in-memory backend and usage store.
    pub fn with_memory_store(
        config: &Config,
        backend: Arc<MemoryBackend>,
        store: MemoryUsageStore,
    ) -> Self {
        let cache = Arc::new(TagCache::new(backend, TagCacheConfig::from(config)));
        let monitor = BudgetMonitor::new(Arc::new(store), cache.clone())
            .with_services(config.monitored_services.clone());
        Self::new(cache, Arc::new(monitor))
    }
}

// == Health ==
/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.cache.backend().name()))
}

// == Cache ==
/// Handler for GET /cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.get_stats().await)
}

/// Handler for POST /cache/invalidate
///
/// Accepts `{"tags": [...]}` or `{"pattern": "..."}`.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }

    let invalidated = match (&req.tags, &req.pattern) {
        (Some(tags), _) => {
            let tags: Vec<&str> = tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect();
            state.cache.invalidate_by_tags(&tags).await
        }
        (None, Some(pattern)) => state.cache.invalidate_by_pattern(pattern).await,
        (None, None) => 0,
    };

    Ok(Json(InvalidateResponse { invalidated }))
}

/// Handler for GET /cache/tags
pub async fn tags_handler(State(state): State<AppState>) -> Json<TagListResponse> {
    Json(TagListResponse {
        tags: state.cache.get_all_tags().await,
    })
}

/// Handler for GET /cache/tags/:tag
pub async fn tag_keys_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Json<TagKeysResponse> {
    let keys = state.cache.get_keys_by_tag(&tag).await;
    Json(TagKeysResponse { tag, keys })
}

// == Budget ==
/// Handler for GET /budget/usage
pub async fn usage_report_handler(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Json<UsageReportResponse> {
    let days_back = query.days_back();
    let services = state.monitor.get_usage_stats(days_back).await;
    let top_endpoints = state
        .monitor
        .get_top_endpoints_by_cost(days_back, query.limit())
        .await;

    Json(UsageReportResponse {
        days_back,
        services,
        top_endpoints,
    })
}

/// Handler for GET /budget/users/:user_id/usage
pub async fn user_usage_handler(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<UsageQuery>,
) -> Json<UserUsageResponse> {
    let days_back = query.days_back();
    Json(UserUsageResponse {
        user_id,
        days_back,
        services: state.monitor.get_user_usage(user_id, days_back).await,
    })
}

/// Handler for GET /budget/:service/status
///
/// 404 when the status is unknown (no config or store failure).
pub async fn budget_status_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<BudgetStatus>> {
    let period = match query.period.as_deref() {
        Some(raw) => raw.parse::<BudgetPeriod>().map_err(AppError::InvalidRequest)?,
        None => BudgetPeriod::Daily,
    };

    state
        .monitor
        .check_budget_status(&service, period)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No budget status for service '{}'", service)))
}

/// Handler for GET /budget/:service/config
pub async fn get_budget_config_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<BudgetConfig>> {
    state
        .monitor
        .get_budget_config(&service)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No budget config for service '{}'", service)))
}

/// Handler for PUT /budget/:service/config
///
/// Partial update; absent fields keep their stored value.
pub async fn update_budget_config_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(update): Json<BudgetConfigUpdate>,
) -> Result<Json<BudgetConfig>> {
    if !state.monitor.update_budget_config(&service, &update).await {
        return Err(AppError::InvalidRequest(format!(
            "Budget config update for '{}' was rejected",
            service
        )));
    }

    state
        .monitor
        .get_budget_config(&service)
        .await
        .map(Json)
        .ok_or_else(|| AppError::Internal("Budget config vanished after update".to_string()))
}

/// Handler for POST /budget/monitor
pub async fn monitor_handler(State(state): State<AppState>) -> Json<MonitorResponse> {
    Json(MonitorResponse::new(state.monitor.monitor_budget_alerts().await))
}
