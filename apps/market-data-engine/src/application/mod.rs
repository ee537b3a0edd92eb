//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with exchanges and consumers.

/// Port interfaces for external systems (exchange quote sources).
pub mod ports;

/// Application services for aggregation, caching and price lists.
pub mod services;
