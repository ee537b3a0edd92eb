//! Kraken public ticker adapter.
//!
//! `GET /0/public/Ticker?pair=XBTUSD`. Kraken names bitcoin `XBT` and wraps
//! results in `{"error": [...], "result": {"<pair>": {...}}}`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::http_client::{ExchangeHttpClient, parse_number};
use crate::application::ports::{QuoteSource, SourceError};
use crate::domain::market::{Quote, Symbol, change_pct};

/// Default public REST endpoint.
pub const KRAKEN_BASE_URL: &str = "https://api.kraken.com";

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, TickerInfo>,
}

/// Array fields are `[price, whole lot volume, lot volume]` style tuples.
#[derive(Debug, Deserialize)]
struct TickerInfo {
    a: Vec<String>,
    b: Vec<String>,
    #[serde(default)]
    c: Vec<String>,
    #[serde(default)]
    v: Vec<String>,
    #[serde(default)]
    o: Option<String>,
}

fn field<'a>(values: &'a [String], index: usize, name: &str) -> Result<&'a str, SourceError> {
    values
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| SourceError::Decode(format!("missing {name}[{index}]")))
}

/// Kraken quote source.
#[derive(Debug, Clone)]
pub struct KrakenSource {
    http: ExchangeHttpClient,
}

impl KrakenSource {
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
impl QuoteSource for KrakenSource {
    fn name(&self) -> &'static str {
        "kraken"
    }

    fn pair(&self, symbol: &Symbol) -> String {
        let base = match symbol.base() {
            "BTC" => "XBT",
            other => other,
        };
        format!("{base}{}", symbol.quote_currency())
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, SourceError> {
        let pair = self.pair(symbol);
        let response: TickerResponse = self
            .http
            .get_json("/0/public/Ticker", &[("pair", pair.as_str())])
            .await?;

        if !response.error.is_empty() {
            return Err(SourceError::Upstream(response.error.join("; ")));
        }

        // Kraken keys the result by its canonical pair name (e.g. XXBTZUSD).
        let ticker = response
            .result
            .into_values()
            .next()
            .ok_or_else(|| SourceError::Decode(format!("no ticker for {pair}")))?;

        let open = ticker.o.as_deref().and_then(|v| v.parse().ok());
        let last = ticker.c.first().and_then(|v| v.parse().ok());
        let volume = match ticker.v.get(1) {
            Some(v) => parse_number("v", v)?,
            None => 0.0,
        };

        Ok(Quote::normalized(
            parse_number("b", field(&ticker.b, 0, "b")?)?,
            parse_number("a", field(&ticker.a, 0, "a")?)?,
            volume,
            change_pct(open, last),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn btc() -> Symbol {
        Symbol::parse("BTCUSD").unwrap()
    }

    #[test]
    fn maps_btc_to_xbt() {
        let source = KrakenSource::new(KRAKEN_BASE_URL, Duration::from_secs(1)).unwrap();
        assert_eq!(source.pair(&btc()), "XBTUSD");
        assert_eq!(source.pair(&Symbol::parse("ETHUSD").unwrap()), "ETHUSD");
    }

    #[tokio::test]
    async fn parses_ticker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/0/public/Ticker"))
            .and(query_param("pair", "XBTUSD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": [],
                "result": {
                    "XXBTZUSD": {
                        "a": ["64010.0", "1", "1.000"],
                        "b": ["64000.0", "2", "2.000"],
                        "c": ["64005.0", "0.1"],
                        "v": ["100.0", "2500.5"],
                        "o": "62000.0"
                    }
                }
            })))
            .mount(&server)
            .await;

        let source = KrakenSource::new(server.uri(), Duration::from_secs(2)).unwrap();
        let quote = source.fetch_quote(&btc()).await.unwrap();

        assert_eq!(quote.bid, 64000.0);
        assert_eq!(quote.ask, 64010.0);
        assert_eq!(quote.volume_24h, 2500.5);
        let expected = (64005.0 - 62000.0) / 62000.0 * 100.0;
        assert!((quote.change_24h_pct - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn error_array_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": ["EQuery:Unknown asset pair"],
                "result": {}
            })))
            .mount(&server)
            .await;

        let source = KrakenSource::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = source.fetch_quote(&btc()).await.unwrap_err();
        assert_eq!(
            err,
            SourceError::Upstream("EQuery:Unknown asset pair".to_string())
        );
    }

    #[tokio::test]
    async fn non_positive_price_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": [],
                "result": {"XXBTZUSD": {"a": ["0"], "b": ["0"]}}
            })))
            .mount(&server)
            .await;

        let source = KrakenSource::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = source.fetch_quote(&btc()).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidQuote(_)));
    }
}
