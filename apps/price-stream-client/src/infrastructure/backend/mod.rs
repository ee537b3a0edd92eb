//! Engine REST strategies.
//!
//! Tier 2 polls `GET /market-data`; tier 4 reads the last known prices from
//! `GET /prices` and dresses them up as single-source snapshots.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use market_data_engine::infrastructure::http::{
    API_KEY_HEADER, MarketDataResponse, PricesResponse,
};
use market_data_engine::{ApiKey, Symbol};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::application::ports::{FetchError, PriceStrategy};
use crate::domain::tiers::Tier;
use crate::domain::view::{TierData, placeholder_snapshot};

const USER_AGENT: &str = concat!("price-stream-client/", env!("CARGO_PKG_VERSION"));

/// JSON GET client bound to the engine's base URL.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    api_key: Option<ApiKey>,
}

impl BackendClient {
    /// Create a client whose every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Network` if the TLS backend cannot be initialized.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<ApiKey>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// GET `path` with `query` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport failure, timeout, non-success status
    /// or an undecodable body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.base_url);

        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key.expose());
        }

        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Engine request rejected");
            return Err(categorize_status(status));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

const fn categorize_status(status: StatusCode) -> FetchError {
    match status.as_u16() {
        429 => FetchError::RateLimited,
        code => FetchError::Status(code),
    }
}

fn map_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_decode() {
        FetchError::Decode(e.to_string())
    } else {
        FetchError::Network(e.to_string())
    }
}

fn symbol_csv(symbols: &[Symbol]) -> String {
    symbols
        .iter()
        .map(Symbol::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Tier 2: Polling
// =============================================================================

/// Polls the engine's verified market data, with rolling history.
#[derive(Debug, Clone)]
pub struct PollingStrategy {
    backend: BackendClient,
}

impl PollingStrategy {
    /// Create a polling strategy over `backend`.
    #[must_use]
    pub const fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PriceStrategy for PollingStrategy {
    fn tier(&self) -> Tier {
        Tier::Polling
    }

    async fn fetch_prices(&self, symbols: &[Symbol]) -> Result<TierData, FetchError> {
        let csv = symbol_csv(symbols);
        let response: MarketDataResponse = self
            .backend
            .get_json("/market-data", &[("symbols", csv.as_str()), ("history", "1")])
            .await?;

        Ok(TierData {
            snapshots: response.data,
            history: response.history.unwrap_or_default(),
        })
    }
}

// =============================================================================
// Tier 4: Static Placeholder
// =============================================================================

/// Last-resort prices from the engine's price list.
#[derive(Debug, Clone)]
pub struct StaticPlaceholderStrategy {
    backend: BackendClient,
}

impl StaticPlaceholderStrategy {
    /// Create a placeholder strategy over `backend`.
    #[must_use]
    pub const fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PriceStrategy for StaticPlaceholderStrategy {
    fn tier(&self) -> Tier {
        Tier::StaticPlaceholder
    }

    async fn fetch_prices(&self, symbols: &[Symbol]) -> Result<TierData, FetchError> {
        let csv = symbol_csv(symbols);
        let response: PricesResponse = self
            .backend
            .get_json("/prices", &[("symbols", csv.as_str())])
            .await?;

        let now = Utc::now().timestamp_millis();
        let snapshots: Vec<_> = symbols
            .iter()
            .filter_map(|symbol| {
                let price = *response.prices.get(symbol.as_str())?;
                match placeholder_snapshot(symbol.clone(), price, now) {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        tracing::warn!(symbol = %symbol, error = %e, "Unusable placeholder price");
                        None
                    }
                }
            })
            .collect();

        if snapshots.is_empty() {
            return Err(FetchError::NoPrices);
        }

        Ok(TierData {
            snapshots,
            history: BTreeMap::new(),
        })
    }
}
