//! HTTP Interface
//!
//! One axum router serves the API, the price stream and the operational
//! endpoints.
//!
//! # Endpoints
//!
//! - `GET /market-data` - Verified snapshots, optional history and metrics
//! - `GET /prices` - Flat last-resort price list
//! - `GET /ws` - WebSocket price stream
//! - `GET /health`, `/healthz`, `/readyz`, `/metrics` - Operational endpoints

use axum::Router;
use axum::routing::get;

mod error;
mod handlers;
mod health;
mod server;
mod state;
mod websocket;

pub use error::{ApiError, ErrorBody};
pub use handlers::{MarketDataQuery, MarketDataResponse, PricesQuery, PricesResponse};
pub use health::{HealthResponse, HealthStatus};
pub use server::{HttpServer, HttpServerError, serve};
pub use state::{API_KEY_HEADER, AppState, SharedAppState};

/// Build the router over shared state.
#[must_use]
pub fn create_router(state: SharedAppState) -> Router {
    Router::new()
        .route("/market-data", get(handlers::market_data_handler))
        .route("/prices", get(handlers::prices_handler))
        .route("/ws", get(websocket::ws_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .with_state(state)
}
