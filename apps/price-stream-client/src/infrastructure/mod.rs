//! Infrastructure Layer
//!
//! Adapters behind the client's ports plus its ambient concerns.

/// Engine REST strategies (polling and static placeholder).
pub mod backend;

/// Client configuration.
pub mod config;

/// In-process exchange aggregation strategy.
pub mod direct;

/// Prometheus metrics.
pub mod metrics;

/// WebSocket price stream.
pub mod stream;
