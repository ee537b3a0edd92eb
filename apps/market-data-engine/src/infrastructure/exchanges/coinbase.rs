//! Coinbase Exchange ticker adapter.
//!
//! Combines `GET /products/BTC-USD/ticker` (book and volume) with
//! `GET /products/BTC-USD/stats` (open and last) to derive the 24h change.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::http_client::{ExchangeHttpClient, parse_number};
use crate::application::ports::{QuoteSource, SourceError};
use crate::domain::market::{Quote, Symbol, change_pct};

/// Default public REST endpoint.
pub const COINBASE_BASE_URL: &str = "https://api.exchange.coinbase.com";

#[derive(Debug, Deserialize)]
struct ProductTicker {
    bid: String,
    ask: String,
    volume: String,
}

#[derive(Debug, Deserialize)]
struct ProductStats {
    #[serde(default)]
    open: Option<String>,
    #[serde(default)]
    last: Option<String>,
}

/// Coinbase quote source.
#[derive(Debug, Clone)]
pub struct CoinbaseSource {
    http: ExchangeHttpClient,
}

impl CoinbaseSource {
    /// Create a source against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            http: ExchangeHttpClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl QuoteSource for CoinbaseSource {
    fn name(&self) -> &'static str {
        "coinbase"
    }

    fn pair(&self, symbol: &Symbol) -> String {
        format!("{}-{}", symbol.base(), symbol.quote_currency())
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, SourceError> {
        let pair = self.pair(symbol);
        let ticker_path = format!("/products/{pair}/ticker");
        let stats_path = format!("/products/{pair}/stats");

        let (ticker, stats) = tokio::join!(
            self.http.get_json::<ProductTicker>(&ticker_path, &[]),
            self.http.get_json::<ProductStats>(&stats_path, &[]),
        );
        let ticker = ticker?;

        // Stats only feed the 24h change, which falls back to 0.
        let (open, last) = match stats {
            Ok(stats) => (
                stats.open.as_deref().and_then(|v| v.parse().ok()),
                stats.last.as_deref().and_then(|v| v.parse().ok()),
            ),
            Err(e) => {
                tracing::debug!(pair = %pair, error = %e, "Coinbase stats unavailable");
                (None, None)
            }
        };

        Ok(Quote::normalized(
            parse_number("bid", &ticker.bid)?,
            parse_number("ask", &ticker.ask)?,
            parse_number("volume", &ticker.volume)?,
            change_pct(open, last),
        )?)
    }
}
