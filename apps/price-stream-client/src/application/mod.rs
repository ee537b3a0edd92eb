//! Application Layer - Use cases and port definitions.

/// Port interfaces for price strategies and the price stream.
pub mod ports;

/// Fallback chain and client orchestration.
pub mod services;
