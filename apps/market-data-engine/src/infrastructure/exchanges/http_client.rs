//! Shared HTTP client for exchange REST endpoints.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::application::ports::SourceError;

const USER_AGENT: &str = concat!("market-data-engine/", env!("CARGO_PKG_VERSION"));

/// Thin JSON GET client bound to one exchange base URL.
#[derive(Debug, Clone)]
pub struct ExchangeHttpClient {
    client: Client,
    base_url: String,
}

impl ExchangeHttpClient {
    /// Create a client whose every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Network` if the TLS backend cannot be initialized.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// The base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with `query` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` on transport failure, timeout, non-success
    /// status or an undecodable body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Exchange request rejected");
            return Err(categorize_status(status));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))
    }
}

/// Map a non-success status to a source error.
const fn categorize_status(status: StatusCode) -> SourceError {
    match status.as_u16() {
        429 => SourceError::RateLimited,
        code => SourceError::Status { status: code },
    }
}

fn map_transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else if e.is_decode() {
        SourceError::Decode(e.to_string())
    } else {
        SourceError::Network(e.to_string())
    }
}

/// Parse an exchange's string-encoded number.
///
/// # Errors
///
/// Returns `SourceError::Decode` if the value is not a number.
pub fn parse_number(field: &str, value: &str) -> Result<f64, SourceError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| SourceError::Decode(format!("{field}: not a number: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorize_rate_limited() {
        assert_eq!(
            categorize_status(StatusCode::TOO_MANY_REQUESTS),
            SourceError::RateLimited
        );
    }

    #[test]
    fn categorize_other_status() {
        assert_eq!(
            categorize_status(StatusCode::BAD_GATEWAY),
            SourceError::Status { status: 502 }
        );
        assert_eq!(
            categorize_status(StatusCode::NOT_FOUND),
            SourceError::Status { status: 404 }
        );
    }

    #[test]
    fn parse_number_accepts_strings() {
        assert_eq!(parse_number("bid", " 42.5 ").unwrap(), 42.5);
        assert!(matches!(
            parse_number("bid", "abc"),
            Err(SourceError::Decode(_))
        ));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = ExchangeHttpClient::new("http://localhost:1/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:1");
    }
}
