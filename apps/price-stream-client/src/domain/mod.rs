//! Domain Layer - Client-side resilience logic.
//!
//! Pricing math lives in the engine crate and is linked directly; this layer
//! adds only what the client decides on its own: retry schedules, tier
//! selection rules and the published view.

/// Capped exponential backoff shared by reconnect and polling.
pub mod backoff;

/// Fallback tiers, connectivity signals and cooldown.
pub mod tiers;

/// The client's published market view.
pub mod view;
