//! Port Interfaces
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceStrategy`: One fallback tier's way of producing prices
//! - `PriceStream`: The engine's persistent price channel

use std::time::Duration;

use async_trait::async_trait;
use market_data_engine::{PriceMessage, Symbol};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::tiers::Tier;
use crate::domain::view::TierData;

/// Why a fallback tier produced no prices.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The engine answered HTTP 429.
    #[error("rate limited by upstream")]
    RateLimited,

    /// Non-success HTTP status.
    #[error("upstream returned HTTP {0}")]
    Status(u16),

    /// The call exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The tier answered but priced nothing.
    #[error("no prices available for requested symbols")]
    NoPrices,

    /// The host reports no network access.
    #[error("offline: showing last known prices")]
    Offline,

    /// Every eligible tier failed.
    #[error("all price sources exhausted")]
    AllTiersExhausted,
}

/// Port for one fallback tier.
#[async_trait]
pub trait PriceStrategy: Send + Sync {
    /// The tier this strategy implements.
    fn tier(&self) -> Tier;

    /// Produce prices for `symbols`.
    async fn fetch_prices(&self, symbols: &[Symbol]) -> Result<TierData, FetchError>;
}

/// Why the price stream gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The stream URL could not be parsed.
    #[error("invalid stream URL: {0}")]
    InvalidUrl(String),

    /// The stream host is not on the allow list.
    #[error("stream host {0:?} is not allowed")]
    DisallowedHost(String),

    /// Handshake or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The server ended the channel without a clean close.
    #[error("stream closed abnormally")]
    ClosedAbnormally,

    /// The handshake did not finish within the connect timeout.
    #[error("stream connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// Reconnect retries ran out.
    #[error("reconnect attempts exhausted after {0} retries")]
    RetriesExhausted(u32),
}

/// Events emitted while the stream runs.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The channel opened.
    Connected,
    /// A price message arrived.
    Message(PriceMessage),
    /// The channel dropped.
    Disconnected,
    /// A reconnect is scheduled.
    Reconnecting {
        /// Retry number within the episode, from 1.
        attempt: u32,
        /// Wait before the retry.
        delay: Duration,
    },
}

/// Port for the engine's persistent price channel.
#[async_trait]
pub trait PriceStream: Send + Sync {
    /// Run the channel, reconnecting as needed, until it ends.
    ///
    /// Returns `Ok(())` on a clean close or cancellation.
    ///
    /// # Errors
    ///
    /// Returns `StreamError` once the channel is given up on.
    async fn run(
        &self,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<(), StreamError>;
}
