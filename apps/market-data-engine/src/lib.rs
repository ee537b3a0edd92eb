#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Data Engine - Multi-Source Price Aggregation
//!
//! Fetches ticker quotes from several exchanges, cross-validates them into
//! one verified price per symbol, keeps a rolling history, and distributes
//! prices over HTTP and a persistent WebSocket stream.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure pricing logic
//!   - `market`: Symbols and normalized quotes
//!   - `verification`: Mid, median discrepancy, alert and VWAP
//!   - `history`: Bounded per-symbol time series and rolling averages
//!   - `streaming`: Stream message envelope
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The `QuoteSource` interface
//!   - `services`: Aggregation fan-out, engine context, memo, price list
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchanges`: Binance, Coinbase and Kraken REST adapters
//!   - `broadcast`: Distribution hub and periodic broadcaster
//!   - `http`: API, stream upgrade and health endpoints
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! Binance  ──┐
//!            │     ┌────────────┐     ┌──────────┐
//! Coinbase ──┼────►│ Aggregator │────►│ History  │
//!            │     │ + Verifier │     │ + Memo   │──► GET /market-data
//! Kraken   ──┘     └─────┬──────┘     └──────────┘
//!                        │
//!                        ▼
//!                  ┌────────────┐
//!                  │ Price List │──► GET /prices
//!                  └─────┬──────┘
//!                        ▼
//!                  ┌────────────┐
//!                  │    Hub     │──► /ws subscribers (every 5 s)
//!                  └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core pricing types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::history::{DEFAULT_HISTORY_CAPACITY, HistoryPoint, HistoryStore, RollingAverages};
pub use domain::market::{Quote, QuoteError, Symbol, SymbolError};
pub use domain::streaming::{PriceMap, PriceMessage};
pub use domain::verification::{ALERT_THRESHOLD_PCT, AggregatedSnapshot, VerifiedPrice, verify};

// Ports and services
pub use application::ports::{QuoteSource, SourceError};
pub use application::services::{
    AggregationService, CycleMetrics, EngineError, MarketDataEngine, MarketDataReport,
    MarketDataRequest, PriceListService, SnapshotCache,
};

// Infrastructure config
pub use infrastructure::config::{
    ApiKey, ConfigError, EngineConfig, ExchangeSettings, HubSettings, ServerSettings,
};

// Distribution hub (for integration tests)
pub use infrastructure::broadcast::{
    DistributionHub, HubConfig, PriceBroadcaster, SharedDistributionHub,
};

// HTTP surface (for integration tests and the client)
pub use infrastructure::http::{
    API_KEY_HEADER, AppState, ErrorBody, HttpServer, MarketDataResponse, PricesResponse,
    SharedAppState, create_router,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
