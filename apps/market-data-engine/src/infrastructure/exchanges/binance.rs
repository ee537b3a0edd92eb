//! Binance spot ticker adapter.
//!
//! `GET /api/v3/ticker/24hr?symbol=BTCUSDT`. USD pairs trade against USDT.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::http_client::{ExchangeHttpClient, parse_number};
use crate::application::ports::{QuoteSource, SourceError};
use crate::domain::market::{Quote, Symbol, change_pct};

/// Default public REST endpoint.
pub const BINANCE_BASE_URL: &str = "https://api.binance.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    bid_price: String,
    ask_price: String,
    volume: String,
    #[serde(default)]
    price_change_percent: Option<String>,
    #[serde(default)]
    open_price: Option<String>,
    #[serde(default)]
    last_price: Option<String>,
}

/// Binance quote source.
#[derive(Debug, Clone)]
pub struct BinanceSource {
    http: ExchangeHttpClient,
}

impl BinanceSource {
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
impl QuoteSource for BinanceSource {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn pair(&self, symbol: &Symbol) -> String {
        let quote = match symbol.quote_currency() {
            "USD" => "USDT",
            other => other,
        };
        format!("{}{quote}", symbol.base())
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, SourceError> {
        let pair = self.pair(symbol);
        let ticker: Ticker24h = self
            .http
            .get_json("/api/v3/ticker/24hr", &[("symbol", pair.as_str())])
            .await?;

        let change = match ticker.price_change_percent.as_deref().map(str::parse::<f64>) {
            Some(Ok(pct)) => pct,
            _ => change_pct(
                ticker.open_price.as_deref().and_then(|v| v.parse().ok()),
                ticker.last_price.as_deref().and_then(|v| v.parse().ok()),
            ),
        };

        Ok(Quote::normalized(
            parse_number("bidPrice", &ticker.bid_price)?,
            parse_number("askPrice", &ticker.ask_price)?,
            parse_number("volume", &ticker.volume)?,
            change,
        )?)
    }
}
