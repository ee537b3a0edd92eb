//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `QuoteSource`: One exchange's ticker endpoint, normalized to `Quote`

use async_trait::async_trait;

use crate::domain::market::{Quote, QuoteError, Symbol};

/// Why a source could not produce a quote.
///
/// Every variant is a `SourceUnavailable` condition from the caller's point
/// of view; the aggregator records it and moves on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// The call exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// The exchange rate-limited us (HTTP 429).
    #[error("rate limited by upstream")]
    RateLimited,

    /// Non-success HTTP status.
    #[error("upstream returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The exchange reported an error in its payload.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The exchange returned an unusable price.
    #[error(transparent)]
    InvalidQuote(#[from] QuoteError),
}

impl SourceError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Status { .. } => "status",
            Self::Network(_) => "network",
            Self::Decode(_) => "decode",
            Self::Upstream(_) => "upstream",
            Self::InvalidQuote(_) => "invalid_quote",
        }
    }
}

/// Port for fetching one exchange's quote for a symbol.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Stable source name, used as the key in snapshot `sources`.
    fn name(&self) -> &'static str;

    /// The exchange's pair identifier for a symbol.
    fn pair(&self, symbol: &Symbol) -> String;

    /// Fetch and normalize the current quote.
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, SourceError>;
}
