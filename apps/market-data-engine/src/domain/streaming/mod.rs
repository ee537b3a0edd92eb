//! Stream Messages
//!
//! Server-to-subscriber messages on the persistent price channel.
//!
//! ```text
//! {"type":"INITIAL_PRICES","data":{"BTCUSD":64250.5}}
//! {"type":"PRICE_UPDATE","data":{"BTCUSD":64251.0}}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flat symbol to price map.
pub type PriceMap = BTreeMap<String, f64>;

/// Message pushed to stream subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceMessage {
    /// Sent once, immediately after a subscriber connects.
    InitialPrices(PriceMap),
    /// Sent on every broadcast tick.
    PriceUpdate(PriceMap),
}

impl PriceMessage {
    /// The prices carried by this message.
    #[must_use]
    pub const fn prices(&self) -> &PriceMap {
        match self {
            Self::InitialPrices(prices) | Self::PriceUpdate(prices) => prices,
        }
    }

    /// Message type label, for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InitialPrices(_) => "initial_prices",
            Self::PriceUpdate(_) => "price_update",
        }
    }
}
