//! Prometheus Metrics Module
//!
//! Exposes engine metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Cycles**: Aggregation cycle outcomes and durations
//! - **Sources**: Per-exchange failures by kind
//! - **Cache**: Snapshot memo hits
//! - **Hub**: Subscriber count, deliveries and evictions
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the engine listener. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Cycles
    describe_counter!(
        "market_data_cycles_total",
        "Aggregation cycles by outcome"
    );
    describe_histogram!(
        "market_data_cycle_duration_seconds",
        "Wall time of one aggregation cycle"
    );

    // Sources
    describe_counter!(
        "market_data_source_failures_total",
        "Exchange calls that produced no quote, by source and kind"
    );

    // Cache
    describe_counter!(
        "market_data_cache_hits_total",
        "Requests answered from the snapshot memo"
    );

    // Hub
    describe_gauge!(
        "market_data_hub_subscribers",
        "Open distribution hub subscribers"
    );
    describe_counter!(
        "market_data_hub_messages_sent_total",
        "Price messages delivered to subscribers, by type"
    );
    describe_counter!(
        "market_data_hub_subscribers_dropped_total",
        "Subscribers removed after a failed send"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for cycle outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle produced snapshots.
    Success,
    /// The cycle failed.
    Failure,
}

impl CycleOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Record one aggregation cycle.
pub fn record_cycle(success: bool, duration: Duration) {
    let outcome = if success {
        CycleOutcome::Success
    } else {
        CycleOutcome::Failure
    };
    counter!("market_data_cycles_total", "outcome" => outcome.as_str()).increment(1);
    histogram!("market_data_cycle_duration_seconds").record(duration.as_secs_f64());
}

/// Record a source that produced no quote.
pub fn record_source_failure(source: &'static str, kind: &'static str) {
    counter!(
        "market_data_source_failures_total",
        "source" => source,
        "kind" => kind
    )
    .increment(1);
}

/// Record a request served from the snapshot memo.
pub fn record_cache_hit() {
    counter!("market_data_cache_hits_total").increment(1);
}

/// Update the open subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_hub_subscribers(count: usize) {
    gauge!("market_data_hub_subscribers").set(count as f64);
}

/// Record messages delivered to subscribers.
pub fn record_messages_sent(message_type: &'static str, count: u64) {
    counter!(
        "market_data_hub_messages_sent_total",
        "message_type" => message_type
    )
    .increment(count);
}

/// Record subscribers removed after a failed send.
pub fn record_subscribers_dropped(count: u64) {
    counter!("market_data_hub_subscribers_dropped_total").increment(count);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_outcome_as_str() {
        assert_eq!(CycleOutcome::Success.as_str(), "success");
        assert_eq!(CycleOutcome::Failure.as_str(), "failure");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_cycle(true, Duration::from_millis(5));
        record_source_failure("binance", "timeout");
        record_cache_hit();
        set_hub_subscribers(3);
        record_messages_sent("price_update", 3);
        record_subscribers_dropped(1);
    }

    #[test]
    fn handle_renders_registered_metrics() {
        let handle = init_metrics();
        record_cache_hit();
        assert!(get_metrics_handle().is_some());
        assert!(handle.render().contains("market_data_cache_hits_total"));
    }
}
