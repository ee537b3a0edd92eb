//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP and stream surfaces.

/// Exchange REST adapters (Binance, Coinbase, Kraken).
pub mod exchanges;

/// Subscriber registry and periodic price broadcast.
pub mod broadcast;

/// Configuration from environment variables.
pub mod config;

/// HTTP API, WebSocket stream and health endpoints.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
