//! Fallback Tiers
//!
//! The four ways the client can obtain prices, the connectivity signals that
//! rule some of them out, and the cooldown that pins the client to the
//! static placeholder after the network tiers have failed.
//!
//! ```text
//! Stream ──retries exhausted──► Polling ──fails──► DirectAggregation ──fails──► StaticPlaceholder
//!                                  ▲                                                 │
//!                                  └──────────────── cooldown (5 min) ◄──────────────┘
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// How long Tiers 2 and 3 are skipped after falling back to Tier 4.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// A price acquisition tier, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Tier 1: the engine's persistent price stream.
    Stream,
    /// Tier 2: periodic requests to the engine's aggregation endpoint.
    Polling,
    /// Tier 3: local fan-out to the exchanges.
    DirectAggregation,
    /// Tier 4: synthetic snapshots from the engine's last-resort price list.
    StaticPlaceholder,
}

impl Tier {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Polling => "polling",
            Self::DirectAggregation => "direct_aggregation",
            Self::StaticPlaceholder => "static_placeholder",
        }
    }

    /// Tiers skipped while the cooldown is active.
    #[must_use]
    pub const fn is_network_fallback(self) -> bool {
        matches!(self, Self::Polling | Self::DirectAggregation)
    }

    /// The indicator shown while this tier supplies prices.
    #[must_use]
    pub const fn indicator(self) -> ConnectionIndicator {
        match self {
            Self::Stream => ConnectionIndicator::Live,
            Self::Polling | Self::DirectAggregation | Self::StaticPlaceholder => {
                ConnectionIndicator::PeriodicUpdates
            }
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionIndicator {
    /// Prices arrive over the open stream.
    Live,
    /// Prices are refreshed on a timer by a fallback tier.
    PeriodicUpdates,
    /// No tier is currently producing prices.
    ConnectionError,
}

impl ConnectionIndicator {
    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Live => "Live",
            Self::PeriodicUpdates => "Periodic updates",
            Self::ConnectionError => "Connection Error",
        }
    }
}

impl fmt::Display for ConnectionIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Environment facts re-read on every refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivitySignals {
    /// The host has network access.
    pub online: bool,
    /// Deployed without the engine's aggregation endpoint.
    pub static_hosting: bool,
    /// Direct calls to exchanges are forbidden.
    pub external_calls_disabled: bool,
}

impl Default for ConnectivitySignals {
    fn default() -> Self {
        Self {
            online: true,
            static_hosting: false,
            external_calls_disabled: false,
        }
    }
}

impl ConnectivitySignals {
    /// Whether the signals rule `tier` out regardless of cooldown.
    #[must_use]
    pub const fn excludes(&self, tier: Tier) -> bool {
        if !self.online {
            return true;
        }
        match tier {
            Tier::Stream | Tier::Polling => self.static_hosting,
            Tier::DirectAggregation => self.external_calls_disabled,
            Tier::StaticPlaceholder => false,
        }
    }
}

/// Window during which the network fallback tiers are skipped.
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    duration: Duration,
    until: Option<Instant>,
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl Cooldown {
    /// An inactive cooldown of the given length.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: None,
        }
    }

    /// Start (or restart) the window at `now`.
    pub fn start(&mut self, now: Instant) {
        self.until = Some(now + self.duration);
    }

    /// Whether the window covers `now`.
    #[must_use]
    pub fn is_active(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    /// Time left at `now`, if active.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Whether `tier` is skipped at `now`.
    #[must_use]
    pub fn skips(&self, tier: Tier, now: Instant) -> bool {
        tier.is_network_fallback() && self.is_active(now)
    }
}
