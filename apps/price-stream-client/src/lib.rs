#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Stream Client - Resilient Market Data Consumer
//!
//! Keeps an up-to-date price view for a set of symbols, degrading through
//! four tiers when the engine's stream is unavailable.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure client logic
//!   - `backoff`: Capped exponential backoff with jitter
//!   - `tiers`: Tier order, connectivity signals, placeholder cooldown
//!   - `view`: The published market view and placeholder snapshots
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `PriceStream` and `PriceStrategy` interfaces
//!   - `services`: Fallback chain and the stream-first client loop
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: WebSocket subscriber with reconnect
//!   - `backend`: Engine REST polling and static placeholder
//!   - `direct`: In-process exchange aggregation
//!   - `config`, `metrics`: Environment configuration and observability
//!
//! # Tiers
//!
//! ```text
//! 1. Stream            ws /ws            Live
//! 2. Polling           GET /market-data  Periodic updates   (30 s, 60 s after 429)
//! 3. Direct            exchange REST     Periodic updates
//! 4. Static            GET /prices       Periodic updates   (pinned 5 min)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Client state with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::backoff::{BackoffConfig, BackoffPolicy};
pub use domain::tiers::{ConnectionIndicator, ConnectivitySignals, Cooldown, DEFAULT_COOLDOWN, Tier};
pub use domain::view::{MarketView, TierData};

// Application layer
pub use application::ports::{FetchError, PriceStrategy, PriceStream, StreamError, StreamEvent};
pub use application::services::{FallbackChain, ResilientPriceClient};

// Infrastructure
pub use infrastructure::backend::{BackendClient, PollingStrategy, StaticPlaceholderStrategy};
pub use infrastructure::config::ClientConfig;
pub use infrastructure::direct::DirectAggregationStrategy;
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::stream::{StreamClient, StreamClientConfig};
