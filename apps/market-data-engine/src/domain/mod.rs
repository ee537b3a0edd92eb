//! Domain Layer - Core market data types and business logic.
//!
//! This layer contains the pure pricing logic (quote normalization,
//! cross-exchange verification, rolling history) with no I/O. The client
//! crate links these types directly so server and client agree on every
//! calculation.

/// Symbols and normalized exchange quotes.
pub mod market;

/// Cross-exchange price verification.
pub mod verification;

/// Bounded per-symbol price history.
pub mod history;

/// Messages pushed to stream subscribers.
pub mod streaming;
