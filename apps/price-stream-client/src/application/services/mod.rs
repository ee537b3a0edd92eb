//! Application Services
//!
//! - `fallback`: ordered tier chain with cooldown and last-known retention
//! - `client`: stream-first orchestration publishing a watch channel

pub mod client;
pub mod fallback;

pub use client::ResilientPriceClient;
pub use fallback::FallbackChain;
