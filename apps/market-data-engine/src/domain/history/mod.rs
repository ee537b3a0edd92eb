//! Price History
//!
//! Bounded, in-memory time series per symbol. Each symbol keeps at most
//! `capacity` points; the oldest point is evicted first.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::market::Symbol;

/// Points retained per symbol (one day at one point per minute).
pub const DEFAULT_HISTORY_CAPACITY: usize = 1440;

/// Rolling window lengths, in milliseconds.
const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// One aggregation cycle's result for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Epoch milliseconds.
    pub t: i64,
    /// Verified mid price (0 when no source succeeded).
    pub mid: f64,
    /// Volume-weighted price.
    pub vwap: f64,
    /// Volume that contributed to the VWAP.
    pub vol: f64,
}

/// Mean VWAP over the trailing minute, hour and day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingAverages {
    /// Points aged 60 seconds or less.
    pub minute: f64,
    /// Points aged one hour or less.
    pub hourly: f64,
    /// Points aged one day or less.
    pub daily: f64,
}

/// History store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// A point was older than the newest stored point.
    #[error("history point for {symbol} at {timestamp} precedes latest point at {latest}")]
    OutOfOrder {
        /// Symbol being appended.
        symbol: String,
        /// Rejected timestamp.
        timestamp: i64,
        /// Newest stored timestamp.
        latest: i64,
    },
}

/// Per-symbol bounded FIFO of history points.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    capacity: usize,
    series: HashMap<Symbol, VecDeque<HistoryPoint>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStore {
    /// Create a store keeping at most `capacity` points per symbol.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: HashMap::new(),
        }
    }

    /// Maximum points kept per symbol.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a point, evicting the oldest when full.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::OutOfOrder` if `point` is older than the
    /// symbol's newest point.
    pub fn append(&mut self, symbol: &Symbol, point: HistoryPoint) -> Result<(), HistoryError> {
        self.check_order(symbol, point.t)?;

        let series = self.series.entry(symbol.clone()).or_default();
        while series.len() >= self.capacity {
            series.pop_front();
        }
        series.push_back(point);
        Ok(())
    }

    /// Check that a point at `timestamp` could be appended for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::OutOfOrder` if `timestamp` precedes the
    /// symbol's newest point.
    pub fn check_order(&self, symbol: &Symbol, timestamp: i64) -> Result<(), HistoryError> {
        match self.latest(symbol) {
            Some(latest) if timestamp < latest.t => Err(HistoryError::OutOfOrder {
                symbol: symbol.to_string(),
                timestamp,
                latest: latest.t,
            }),
            _ => Ok(()),
        }
    }

    /// Stored points for a symbol, oldest first.
    pub fn points(&self, symbol: &Symbol) -> impl Iterator<Item = &HistoryPoint> {
        self.series.get(symbol).into_iter().flatten()
    }

    /// Number of points stored for a symbol.
    #[must_use]
    pub fn len(&self, symbol: &Symbol) -> usize {
        self.series.get(symbol).map_or(0, VecDeque::len)
    }

    /// Whether no points are stored for any symbol.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.values().all(VecDeque::is_empty)
    }

    /// Newest point for a symbol.
    #[must_use]
    pub fn latest(&self, symbol: &Symbol) -> Option<&HistoryPoint> {
        self.series.get(symbol).and_then(VecDeque::back)
    }

    /// Rolling VWAP averages relative to `now_ms`.
    ///
    /// A window with no points averages to zero.
    #[must_use]
    pub fn summarize(&self, symbol: &Symbol, now_ms: i64) -> RollingAverages {
        let Some(series) = self.series.get(symbol) else {
            return RollingAverages::default();
        };

        let window_mean = |window: i64| {
            let (sum, count) = series
                .iter()
                .filter(|p| now_ms - p.t <= window)
                .fold((0.0, 0u32), |(sum, count), p| (sum + p.vwap, count + 1));
            if count == 0 {
                0.0
            } else {
                sum / f64::from(count)
            }
        };

        RollingAverages {
            minute: window_mean(MINUTE_MS),
            hourly: window_mean(HOUR_MS),
            daily: window_mean(DAY_MS),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn btc() -> Symbol {
        Symbol::parse("BTCUSD").unwrap()
    }

    fn point(t: i64, vwap: f64) -> HistoryPoint {
        HistoryPoint {
            t,
            mid: vwap,
            vwap,
            vol: 1.0,
        }
    }

    #[test]
    fn default_capacity() {
        assert_eq!(HistoryStore::default().capacity(), 1440);
    }

    #[test]
    fn fifo_eviction_after_2000_appends() {
        let mut store = HistoryStore::default();
        for i in 1..=2000 {
            store.append(&btc(), point(i, 1.0)).unwrap();
        }

        assert_eq!(store.len(&btc()), 1440);
        let earliest = store.points(&btc()).next().unwrap();
        assert!(earliest.t >= 561);
        assert_eq!(earliest.t, 561);
        assert_eq!(store.latest(&btc()).unwrap().t, 2000);
    }

    #[test]
    fn out_of_order_append_rejected() {
        let mut store = HistoryStore::new(10);
        store.append(&btc(), point(100, 1.0)).unwrap();
        store.append(&btc(), point(100, 2.0)).unwrap();

        let err = store.append(&btc(), point(99, 3.0)).unwrap_err();
        assert_eq!(
            err,
            HistoryError::OutOfOrder {
                symbol: "BTCUSD".to_string(),
                timestamp: 99,
                latest: 100,
            }
        );
        assert_eq!(store.len(&btc()), 2);
    }

    #[test]
    fn symbols_are_independent() {
        let eth = Symbol::parse("ETHUSD").unwrap();
        let mut store = HistoryStore::new(2);
        store.append(&btc(), point(10, 1.0)).unwrap();
        store.append(&eth, point(5, 1.0)).unwrap();
        assert_eq!(store.len(&btc()), 1);
        assert_eq!(store.len(&eth), 1);
    }

    #[test]
    fn summarize_windows() {
        let now = 10 * DAY_MS;
        let mut store = HistoryStore::default();
        store.append(&btc(), point(now - 2 * DAY_MS, 1000.0)).unwrap();
        store.append(&btc(), point(now - 2 * HOUR_MS, 40.0)).unwrap();
        store.append(&btc(), point(now - 30 * MINUTE_MS, 20.0)).unwrap();
        store.append(&btc(), point(now - 30_000, 12.0)).unwrap();
        store.append(&btc(), point(now, 10.0)).unwrap();

        let averages = store.summarize(&btc(), now);
        assert_eq!(averages.minute, 11.0);
        assert_eq!(averages.hourly, 14.0);
        assert_eq!(averages.daily, 20.5);
    }

    #[test]
    fn summarize_boundaries_are_inclusive() {
        let now = DAY_MS;
        let mut store = HistoryStore::default();
        store.append(&btc(), point(now - MINUTE_MS, 6.0)).unwrap();

        let averages = store.summarize(&btc(), now);
        assert_eq!(averages.minute, 6.0);
    }

    #[test]
    fn summarize_empty_is_zero() {
        let store = HistoryStore::default();
        assert_eq!(store.summarize(&btc(), 0), RollingAverages::default());

        let mut stale = HistoryStore::default();
        stale.append(&btc(), point(0, 5.0)).unwrap();
        let averages = stale.summarize(&btc(), 2 * DAY_MS);
        assert_eq!(averages, RollingAverages::default());
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..64, appends in 0usize..256) {
            let mut store = HistoryStore::new(capacity);
            for i in 0..appends {
                store.append(&btc(), point(i64::try_from(i).unwrap(), 1.0)).unwrap();
            }
            prop_assert!(store.len(&btc()) <= capacity);
            prop_assert_eq!(store.len(&btc()), appends.min(capacity));
        }
    }
}
