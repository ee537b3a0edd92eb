//! Shared handler state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

use super::error::ApiError;
use crate::application::services::{MarketDataEngine, PriceListService};
use crate::domain::market::Symbol;
use crate::infrastructure::broadcast::SharedDistributionHub;
use crate::infrastructure::config::ApiKey;

/// Header carrying the client's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Everything the router needs, injected at startup.
pub struct AppState {
    /// Aggregation cycles, memo, history and cycle metrics.
    pub engine: Arc<MarketDataEngine>,
    /// Flat price list for `/prices`, the stream and readiness.
    pub prices: Arc<PriceListService>,
    /// Stream subscriber registry.
    pub hub: SharedDistributionHub,
    api_key: Option<ApiKey>,
    default_symbols: Vec<Symbol>,
    version: String,
    started_at: Instant,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub fn new(
        engine: Arc<MarketDataEngine>,
        prices: Arc<PriceListService>,
        hub: SharedDistributionHub,
        api_key: Option<ApiKey>,
        default_symbols: Vec<Symbol>,
    ) -> Self {
        Self {
            engine,
            prices,
            hub,
            api_key,
            default_symbols,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }

    /// Service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Time since the state was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Symbols used when a request names none.
    #[must_use]
    pub fn default_symbols(&self) -> &[Symbol] {
        &self.default_symbols
    }

    /// Check the `x-api-key` header when a key is configured.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` if the header is missing or wrong.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = &self.api_key else {
            return Ok(());
        };

        let presented = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if expected.matches(presented) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    /// Resolve the `symbols` parameter: absent means the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidSymbols` if the list is present but empty
    /// or contains a malformed symbol.
    pub fn resolve_symbols(&self, raw: Option<&str>) -> Result<Vec<Symbol>, ApiError> {
        match raw {
            None => Ok(self.default_symbols.clone()),
            Some(csv) => Ok(Symbol::parse_list(csv)?),
        }
    }
}

/// Shared handler state reference.
pub type SharedAppState = Arc<AppState>;
