//! Prometheus Metrics Module
//!
//! # Metrics Categories
//!
//! - **Refreshes**: Fallback tier attempts by tier and outcome
//! - **Stream**: Reconnect attempts and channel state
//! - **Tier**: Which tier currently supplies prices
//!
//! # Integration
//!
//! [`init_metrics`] serves the text format on its own listener. Recording
//! functions are no-ops until a recorder is installed.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::tiers::Tier;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// Calling it again is a no-op.
///
/// # Errors
///
/// Returns `BuildError` if the recorder or listener cannot be installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    let _ = INSTALLED.set(());
    Ok(())
}

fn register_metrics() {
    describe_counter!(
        "price_client_refreshes_total",
        "Fallback tier attempts by tier and outcome"
    );
    describe_counter!(
        "price_client_stream_reconnects_total",
        "Scheduled price stream reconnects"
    );
    describe_gauge!(
        "price_client_stream_connected",
        "1 while the price stream is open"
    );
    describe_gauge!(
        "price_client_active_tier",
        "Tier currently supplying prices (1 = stream .. 4 = static placeholder, 0 = none)"
    );
}

/// Outcome label for a tier attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The tier produced prices.
    Success,
    /// The tier failed.
    Failure,
    /// The tier was ruled out by signals or cooldown.
    Skipped,
}

impl RefreshOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

const fn tier_level(tier: Option<Tier>) -> u8 {
    match tier {
        None => 0,
        Some(Tier::Stream) => 1,
        Some(Tier::Polling) => 2,
        Some(Tier::DirectAggregation) => 3,
        Some(Tier::StaticPlaceholder) => 4,
    }
}

/// Record one tier attempt.
pub fn record_refresh(tier: Tier, outcome: RefreshOutcome) {
    counter!(
        "price_client_refreshes_total",
        "tier" => tier.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect() {
    counter!("price_client_stream_reconnects_total").increment(1);
}

/// Update the stream connection gauge.
pub fn set_stream_connected(connected: bool) {
    gauge!("price_client_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the active tier gauge.
pub fn set_active_tier(tier: Option<Tier>) {
    gauge!("price_client_active_tier").set(f64::from(tier_level(tier)));
}
