//! Market data and price list handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::state::SharedAppState;
use crate::application::services::{CycleMetrics, MarketDataReport, MarketDataRequest};
use crate::domain::history::RollingAverages;
use crate::domain::streaming::PriceMap;
use crate::domain::verification::AggregatedSnapshot;
use crate::infrastructure::config::parse_bool;

// =============================================================================
// Wire Types
// =============================================================================

/// Query string of `GET /market-data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketDataQuery {
    /// Comma-separated symbols; absent means the configured defaults.
    pub symbols: Option<String>,
    /// `1` to include cycle metrics.
    pub metrics: Option<String>,
    /// `1` to include rolling history summaries.
    pub history: Option<String>,
}

/// Body of a successful `GET /market-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataResponse {
    /// Always `"ok"`.
    pub status: String,
    /// One snapshot per requested symbol.
    pub data: Vec<AggregatedSnapshot>,
    /// Rolling averages per symbol, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<BTreeMap<String, RollingAverages>>,
    /// Cycle metrics, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<CycleMetrics>,
    /// Present and true when served from the memo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    /// Memo computation time, epoch milliseconds, when served from the memo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<i64>,
}

impl From<MarketDataReport> for MarketDataResponse {
    fn from(report: MarketDataReport) -> Self {
        Self {
            status: "ok".to_string(),
            data: report.data,
            history: report.history,
            metrics: report.metrics,
            cached: report.cached.then_some(true),
            fetched_at: report.cached.then_some(report.fetched_at),
        }
    }
}

/// Query string of `GET /prices`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricesQuery {
    /// Comma-separated symbols; absent means the configured defaults.
    pub symbols: Option<String>,
}

/// Body of `GET /prices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricesResponse {
    /// Last known verified mid per symbol.
    pub prices: PriceMap,
}

/// Query flags accept the same spellings as boolean environment variables.
fn flag(value: Option<&str>) -> bool {
    value.and_then(parse_bool).unwrap_or(false)
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /market-data`
pub async fn market_data_handler(
    State(state): State<SharedAppState>,
    headers: HeaderMap,
    Query(query): Query<MarketDataQuery>,
) -> Result<Json<MarketDataResponse>, ApiError> {
    state.authorize(&headers)?;

    let request = MarketDataRequest {
        symbols: state.resolve_symbols(query.symbols.as_deref())?,
        include_history: flag(query.history.as_deref()),
        include_metrics: flag(query.metrics.as_deref()),
    };

    let report = state.engine.market_data(&request).await?;
    Ok(Json(report.into()))
}

/// `GET /prices`
pub async fn prices_handler(
    State(state): State<SharedAppState>,
    Query(query): Query<PricesQuery>,
) -> Result<Json<PricesResponse>, ApiError> {
    let symbols = state.resolve_symbols(query.symbols.as_deref())?;
    let list = state.prices.prices(&symbols).await?;

    if list.stale {
        tracing::debug!(fetched_at = list.fetched_at, "Serving stale prices");
    }

    Ok(Json(PricesResponse {
        prices: list.prices,
    }))
}
