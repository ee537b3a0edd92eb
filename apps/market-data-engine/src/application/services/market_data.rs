//! Market data engine context.
//!
//! Owns the snapshot cache, the history store and the cycle metrics, and
//! serializes aggregation cycles so the snapshot a cycle caches is exactly
//! the one it appends to history.
//!
//! # Request handling
//!
//! ```text
//! request ──► lock cycle ──► fresh memo? ──yes──► cached response
//!                               │ no
//!                               ▼
//!                         aggregate all symbols
//!                               │
//!                 append history ─► store memo ─► response
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::aggregation::AggregationService;
use super::snapshot_cache::{CachedSnapshots, SnapshotCache};
use crate::domain::history::{HistoryError, HistoryStore, RollingAverages};
use crate::domain::market::Symbol;
use crate::domain::verification::AggregatedSnapshot;
use crate::infrastructure::metrics;

// =============================================================================
// Request / Report
// =============================================================================

/// A market data request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDataRequest {
    /// Symbols to aggregate.
    pub symbols: Vec<Symbol>,
    /// Include rolling history summaries.
    pub include_history: bool,
    /// Include cycle metrics.
    pub include_metrics: bool,
}

impl MarketDataRequest {
    /// A plain request for `symbols` with no extras.
    #[must_use]
    pub const fn new(symbols: Vec<Symbol>) -> Self {
        Self {
            symbols,
            include_history: false,
            include_metrics: false,
        }
    }

    /// Whether this request bypasses the memo freshness check.
    #[must_use]
    pub const fn wants_extras(&self) -> bool {
        self.include_history || self.include_metrics
    }
}

/// The answer to a market data request.
#[derive(Debug, Clone)]
pub struct MarketDataReport {
    /// One snapshot per requested symbol.
    pub data: Vec<AggregatedSnapshot>,
    /// Rolling averages per symbol, when requested.
    pub history: Option<BTreeMap<String, RollingAverages>>,
    /// Cycle metrics, when requested.
    pub metrics: Option<CycleMetrics>,
    /// Whether the data came from the memo.
    pub cached: bool,
    /// When the data was aggregated, epoch milliseconds.
    pub fetched_at: i64,
}

/// Process-wide aggregation cycle counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleMetrics {
    /// Completed cycles.
    pub successes: u64,
    /// Failed cycles.
    pub failures: u64,
    /// Duration of the most recent cycle.
    pub last_duration_ms: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// Aggregation cycle errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine was built without any quote sources.
    #[error("no quote sources configured")]
    NoSources,

    /// The history store rejected the cycle.
    #[error(transparent)]
    History(#[from] HistoryError),
}

// =============================================================================
// Engine
// =============================================================================

struct CycleState {
    cache: SnapshotCache,
    history: HistoryStore,
}

/// Explicit server context shared by the HTTP handlers.
pub struct MarketDataEngine {
    aggregation: Arc<AggregationService>,
    cycle: Mutex<CycleState>,
    metrics: RwLock<CycleMetrics>,
    last_cycle_failed: AtomicBool,
}

impl MarketDataEngine {
    /// Create an engine with its own cache and history.
    #[must_use]
    pub fn new(
        aggregation: Arc<AggregationService>,
        cache: SnapshotCache,
        history: HistoryStore,
    ) -> Self {
        Self {
            aggregation,
            cycle: Mutex::new(CycleState { cache, history }),
            metrics: RwLock::new(CycleMetrics::default()),
            last_cycle_failed: AtomicBool::new(false),
        }
    }

    /// The shared aggregation service.
    #[must_use]
    pub fn aggregation(&self) -> &Arc<AggregationService> {
        &self.aggregation
    }

    /// Current cycle metrics.
    #[must_use]
    pub fn metrics(&self) -> CycleMetrics {
        self.metrics.read().clone()
    }

    /// Whether the most recent cycle failed.
    #[must_use]
    pub fn last_cycle_failed(&self) -> bool {
        self.last_cycle_failed.load(Ordering::Relaxed)
    }

    /// Answer a market data request.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` when the aggregation cycle fails. The failure is
    /// recorded in the cycle metrics before returning.
    pub async fn market_data(
        &self,
        request: &MarketDataRequest,
    ) -> Result<MarketDataReport, EngineError> {
        let requested_at = Instant::now();
        let mut state = self.cycle.lock().await;

        let reusable = if request.wants_extras() {
            state.cache.completed_since(&request.symbols, requested_at)
        } else {
            state.cache.fresh(&request.symbols, Instant::now())
        };

        if let Some(entry) = reusable.cloned() {
            metrics::record_cache_hit();
            tracing::debug!(symbols = request.symbols.len(), "Serving memoized snapshots");
            return Ok(self.report(&state.history, request, entry, true));
        }

        let started = Instant::now();
        let outcome = self.run_cycle(&mut state, &request.symbols).await;
        let elapsed = started.elapsed();
        self.record_cycle(elapsed, outcome.as_ref().err());

        let entry = outcome?;
        Ok(self.report(&state.history, request, entry, false))
    }

    async fn run_cycle(
        &self,
        state: &mut CycleState,
        symbols: &[Symbol],
    ) -> Result<CachedSnapshots, EngineError> {
        if self.aggregation.source_count() == 0 {
            return Err(EngineError::NoSources);
        }

        let timestamp = cycle_timestamp(&state.history, symbols, Utc::now().timestamp_millis());
        let snapshots = self.aggregation.aggregate_all(symbols, timestamp).await;

        for snapshot in &snapshots {
            state.history.check_order(&snapshot.symbol, timestamp)?;
        }
        for snapshot in &snapshots {
            state.history.append(&snapshot.symbol, snapshot.history_point())?;
        }

        let entry = CachedSnapshots {
            symbols: symbols.to_vec(),
            snapshots,
            computed_at: Instant::now(),
            computed_at_ms: timestamp,
        };
        state.cache.store(entry.clone());
        Ok(entry)
    }

    fn record_cycle(&self, elapsed: std::time::Duration, error: Option<&EngineError>) {
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let mut counters = self.metrics.write();
        counters.last_duration_ms = duration_ms;

        match error {
            None => {
                counters.successes += 1;
                tracing::info!(duration_ms, "Aggregation cycle completed");
            }
            Some(e) => {
                counters.failures += 1;
                counters.last_error = Some(e.to_string());
                tracing::error!(error = %e, duration_ms, "Aggregation cycle failed");
            }
        }
        drop(counters);

        self.last_cycle_failed.store(error.is_some(), Ordering::Relaxed);
        metrics::record_cycle(error.is_none(), elapsed);
    }

    fn report(
        &self,
        history: &HistoryStore,
        request: &MarketDataRequest,
        entry: CachedSnapshots,
        cached: bool,
    ) -> MarketDataReport {
        let history = request.include_history.then(|| {
            let now = Utc::now().timestamp_millis();
            request
                .symbols
                .iter()
                .map(|s| (s.to_string(), history.summarize(s, now)))
                .collect()
        });

        MarketDataReport {
            data: entry.snapshots,
            history,
            metrics: request.include_metrics.then(|| self.metrics()),
            cached,
            fetched_at: entry.computed_at_ms,
        }
    }
}

/// `now`, held at the newest stored point so a clock step-back cannot
/// reorder history.
fn cycle_timestamp(history: &HistoryStore, symbols: &[Symbol], now: i64) -> i64 {
    symbols
        .iter()
        .filter_map(|s| history.latest(s).map(|p| p.t))
        .fold(now, i64::max)
}

// =============================================================================
// Tests
// =============================================================================
