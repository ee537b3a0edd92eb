//! Health Check and Metrics Endpoints
//!
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness check (simple OK)
//! - `GET /readyz` - Readiness check (a cycle succeeded or prices are cached)
//! - `GET /metrics` - Prometheus metrics in text format

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{AppState, SharedAppState};
use crate::application::services::CycleMetrics;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Engine version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Configured quote sources.
    pub sources: Vec<String>,
    /// Open stream subscribers.
    pub subscribers: usize,
    /// Aggregation cycle counters.
    pub cycles: CycleMetrics,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// The most recent failure has not been followed by a success.
    Degraded,
    /// No quote sources are configured.
    Unhealthy,
}

// =============================================================================
// HTTP Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler(State(state): State<SharedAppState>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

/// `GET /healthz`
pub async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `GET /readyz`
pub async fn readiness_handler(State(state): State<SharedAppState>) -> impl IntoResponse {
    if is_ready(&state.engine.metrics(), state.prices.is_primed()) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let cycles = state.engine.metrics();
    let sources: Vec<String> = state
        .engine
        .aggregation()
        .source_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    HealthResponse {
        status: determine_health_status(sources.len(), state.engine.last_cycle_failed()),
        version: state.version().to_string(),
        uptime_secs: state.uptime().as_secs(),
        current_time: Utc::now(),
        sources,
        subscribers: state.hub.subscriber_count(),
        cycles,
    }
}

const fn is_ready(cycles: &CycleMetrics, prices_cached: bool) -> bool {
    cycles.successes > 0 || prices_cached
}

const fn determine_health_status(source_count: usize, last_cycle_failed: bool) -> HealthStatus {
    if source_count == 0 {
        HealthStatus::Unhealthy
    } else if last_cycle_failed {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

// =============================================================================
// Tests
// =============================================================================
