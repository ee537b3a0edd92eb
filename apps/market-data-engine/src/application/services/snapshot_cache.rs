//! Short-lived memo of the last aggregation cycle.
//!
//! Absorbs request bursts: a plain request arriving within the TTL is
//! answered from the memo without calling any exchange.

use std::time::{Duration, Instant};

use crate::domain::market::Symbol;
use crate::domain::verification::AggregatedSnapshot;

/// Default freshness window for cached snapshots.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_millis(2000);

/// The last completed cycle.
#[derive(Debug, Clone)]
pub struct CachedSnapshots {
    /// Symbols the cycle covered, in request order.
    pub symbols: Vec<Symbol>,
    /// One snapshot per symbol.
    pub snapshots: Vec<AggregatedSnapshot>,
    /// Monotonic completion time.
    pub computed_at: Instant,
    /// Wall-clock cycle time, epoch milliseconds.
    pub computed_at_ms: i64,
}

/// Single-entry snapshot memo keyed by symbol list.
#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Duration,
    entry: Option<CachedSnapshots>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_TTL)
    }
}

impl SnapshotCache {
    /// Create an empty cache.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// Freshness window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The memo if it covers `symbols` and is younger than the TTL at `now`.
    #[must_use]
    pub fn fresh(&self, symbols: &[Symbol], now: Instant) -> Option<&CachedSnapshots> {
        self.entry.as_ref().filter(|e| {
            e.symbols == symbols && now.saturating_duration_since(e.computed_at) < self.ttl
        })
    }

    /// The memo if it covers `symbols` and completed at or after `since`.
    ///
    /// Used by requests that bypass the TTL: a cycle that finished while
    /// they waited is as good as one they would run themselves.
    #[must_use]
    pub fn completed_since(&self, symbols: &[Symbol], since: Instant) -> Option<&CachedSnapshots> {
        self.entry
            .as_ref()
            .filter(|e| e.symbols == symbols && e.computed_at >= since)
    }

    /// Replace the memo.
    pub fn store(&mut self, entry: CachedSnapshots) {
        self.entry = Some(entry);
    }

    /// The memo regardless of age.
    #[must_use]
    pub const fn last(&self) -> Option<&CachedSnapshots> {
        self.entry.as_ref()
    }
}
