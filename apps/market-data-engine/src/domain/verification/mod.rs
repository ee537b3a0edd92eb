//! Price Verification
//!
//! Blends quotes from independent exchanges into one verified price and
//! flags cross-exchange disagreement.
//!
//! # Algorithm
//!
//! 1. `mid = (bid + ask) / 2` per quote; non-finite or non-positive mids are dropped.
//! 2. `price_mid` is the mean of the surviving mids.
//! 3. `discrepancy_pct` is the largest deviation of any mid from the median, in percent.
//! 4. `alert` fires at or above [`ALERT_THRESHOLD_PCT`].
//! 5. `vwap` weights mids by 24h volume, falling back to the mean when no
//!    volume is available.
//!
//! This is the only implementation of the algorithm. The server cycle and
//! the client's direct aggregation both call [`verify`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::history::HistoryPoint;
use super::market::{Quote, Symbol};

/// Discrepancy, in percent, at which a snapshot is flagged.
pub const ALERT_THRESHOLD_PCT: f64 = 1.5;

// =============================================================================
// Verified Price
// =============================================================================

/// Result of cross-validating one symbol's quotes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPrice {
    /// Mean of valid mids; `None` only when no source produced one.
    pub price_mid: Option<f64>,
    /// Volume-weighted mid, or the mean when no volume is known. Zero with no mids.
    pub vwap: f64,
    /// Largest deviation of a mid from the median, in percent.
    pub discrepancy_pct: f64,
    /// Whether `discrepancy_pct` reached the alert threshold.
    pub alert: bool,
}

impl VerifiedPrice {
    /// The degraded result produced when no source succeeded.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            price_mid: None,
            vwap: 0.0,
            discrepancy_pct: 0.0,
            alert: false,
        }
    }

    /// True when no source contributed a price.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.price_mid.is_none()
    }
}

/// Whether a discrepancy crosses the alert threshold.
#[must_use]
pub fn is_alert(discrepancy_pct: f64) -> bool {
    discrepancy_pct >= ALERT_THRESHOLD_PCT
}

/// Statistical median. Even-length input averages the two middle values.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Verify a set of quotes for one symbol.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn verify<'a, I>(quotes: I) -> VerifiedPrice
where
    I: IntoIterator<Item = &'a Quote>,
{
    let mut mids = Vec::new();
    let mut weighted_sum = 0.0;
    let mut total_volume = 0.0;

    for quote in quotes {
        let mid = quote.mid();
        if !mid.is_finite() || mid <= 0.0 {
            continue;
        }
        mids.push(mid);

        let volume = quote.volume_24h;
        if volume.is_finite() && volume >= 0.0 {
            weighted_sum += mid * volume;
            total_volume += volume;
        }
    }

    let Some(median) = median(&mids) else {
        return VerifiedPrice::empty();
    };

    let mean = mids.iter().sum::<f64>() / mids.len() as f64;

    let discrepancy_pct = if median > 0.0 {
        mids.iter()
            .map(|mid| (mid - median).abs() * 100.0 / median)
            .fold(0.0, f64::max)
    } else {
        0.0
    };

    let vwap = if total_volume > 0.0 {
        weighted_sum / total_volume
    } else {
        mean
    };

    VerifiedPrice {
        price_mid: Some(mean),
        vwap,
        discrepancy_pct,
        alert: is_alert(discrepancy_pct),
    }
}

/// Sum of volumes that count toward the VWAP.
#[must_use]
pub fn eligible_volume<'a, I>(quotes: I) -> f64
where
    I: IntoIterator<Item = &'a Quote>,
{
    quotes
        .into_iter()
        .filter(|q| {
            let mid = q.mid();
            mid.is_finite() && mid > 0.0 && q.volume_24h.is_finite() && q.volume_24h >= 0.0
        })
        .map(|q| q.volume_24h)
        .sum()
}

// =============================================================================
// Aggregated Snapshot
// =============================================================================

/// All sources' quotes for one symbol plus the verified result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSnapshot {
    /// The symbol.
    pub symbol: Symbol,
    /// Quote per source name; `None` where the source failed.
    pub sources: BTreeMap<String, Option<Quote>>,
    /// Verified price derived from the successful sources.
    pub verified: VerifiedPrice,
    /// Aggregation time, epoch milliseconds.
    pub timestamp: i64,
}

impl AggregatedSnapshot {
    /// Build a snapshot and verify its quotes.
    #[must_use]
    pub fn new(symbol: Symbol, sources: BTreeMap<String, Option<Quote>>, timestamp: i64) -> Self {
        let verified = verify(sources.values().flatten());
        Self {
            symbol,
            sources,
            verified,
            timestamp,
        }
    }

    /// Number of sources that returned a quote.
    #[must_use]
    pub fn successful_sources(&self) -> usize {
        self.sources.values().filter(|q| q.is_some()).count()
    }

    /// The history point this snapshot contributes.
    #[must_use]
    pub fn history_point(&self) -> HistoryPoint {
        HistoryPoint {
            t: self.timestamp,
            mid: self.verified.price_mid.unwrap_or(0.0),
            vwap: self.verified.vwap,
            vol: eligible_volume(self.sources.values().flatten()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    /// Build a quote whose mid is exactly `mid`.
    fn quote(mid: f64, volume: f64) -> Quote {
        Quote {
            bid: mid - 0.5,
            ask: mid + 0.5,
            volume_24h: volume,
            change_24h_pct: 0.0,
        }
    }

    #[test]
    fn three_sources_with_mixed_volume() {
        let quotes = [quote(100.0, 10.0), quote(102.0, 0.0), quote(98.0, 5.0)];
        let mids: Vec<f64> = quotes.iter().map(Quote::mid).collect();
        assert_eq!(median(&mids), Some(100.0));

        let verified = verify(&quotes);
        assert_eq!(verified.price_mid, Some(100.0));
        assert!((verified.discrepancy_pct - 2.0).abs() < 1e-9);
        assert!(verified.alert);
        assert!((verified.vwap - 99.333_333).abs() < 1e-3);
    }

    #[test]
    fn zero_sources_is_degraded() {
        let verified = verify(&Vec::<Quote>::new());
        assert_eq!(verified, VerifiedPrice::empty());
        assert!(verified.is_degraded());
        assert_eq!(verified.vwap, 0.0);
        assert_eq!(verified.discrepancy_pct, 0.0);
        assert!(!verified.alert);
    }

    #[test_case(1.499_999, false ; "just below threshold")]
    #[test_case(1.5, true ; "at threshold")]
    #[test_case(0.0, false ; "no discrepancy")]
    #[test_case(7.25, true ; "well above threshold")]
    fn alert_boundary(discrepancy: f64, expected: bool) {
        assert_eq!(is_alert(discrepancy), expected);
    }

    #[test]
    fn alert_fires_at_exact_threshold_from_quotes() {
        let quotes = [quote(100.0, 1.0), quote(100.0, 1.0), quote(101.5, 1.0)];
        let verified = verify(&quotes);
        assert_eq!(verified.discrepancy_pct, 1.5);
        assert!(verified.alert);
    }

    #[test]
    fn median_even_count_averages_middle() {
        assert_eq!(median(&[1.0, 4.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[5.0]), Some(5.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn median_not_mean_drives_discrepancy() {
        // mean = 105, median = 100; deviation against the median is 15%
        let quotes = [quote(100.0, 0.0), quote(100.0, 0.0), quote(115.0, 0.0)];
        let verified = verify(&quotes);
        assert_eq!(verified.price_mid, Some(105.0));
        assert_eq!(verified.discrepancy_pct, 15.0);
    }

    #[test]
    fn invalid_mids_are_dropped() {
        let bad = Quote {
            bid: f64::NAN,
            ask: 1.0,
            volume_24h: 100.0,
            change_24h_pct: 0.0,
        };
        let negative = Quote {
            bid: -10.0,
            ask: -8.0,
            volume_24h: 100.0,
            change_24h_pct: 0.0,
        };
        let verified = verify(&[bad, negative, quote(50.0, 2.0)]);
        assert_eq!(verified.price_mid, Some(50.0));
        assert_eq!(verified.vwap, 50.0);
        assert_eq!(verified.discrepancy_pct, 0.0);
    }

    #[test]
    fn non_finite_volume_is_ineligible() {
        let quotes = [quote(100.0, f64::NAN), quote(110.0, 1.0)];
        let verified = verify(&quotes);
        assert_eq!(verified.vwap, 110.0);
        assert_eq!(eligible_volume(&quotes), 1.0);
    }

    #[test]
    fn snapshot_marks_failed_sources() {
        let mut sources = BTreeMap::new();
        sources.insert("binance".to_string(), Some(quote(100.0, 3.0)));
        sources.insert("kraken".to_string(), None);

        let snapshot = AggregatedSnapshot::new(Symbol::parse("BTCUSD").unwrap(), sources, 42);
        assert_eq!(snapshot.successful_sources(), 1);
        assert_eq!(snapshot.verified.price_mid, Some(100.0));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["sources"]["kraken"].is_null());
        assert_eq!(json["verified"]["priceMid"], 100.0);

        let point = snapshot.history_point();
        assert_eq!(point.t, 42);
        assert_eq!(point.vol, 3.0);
    }

    #[test]
    fn degraded_snapshot_serializes_null_mid() {
        let snapshot =
            AggregatedSnapshot::new(Symbol::parse("ETHUSD").unwrap(), BTreeMap::new(), 1);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["verified"]["priceMid"].is_null());
        assert_eq!(snapshot.history_point().mid, 0.0);
    }

    fn mid_strategy() -> impl Strategy<Value = f64> {
        1.0f64..100_000.0
    }

    proptest! {
        #[test]
        fn any_valid_quote_yields_finite_mid(
            mids in prop::collection::vec(mid_strategy(), 1..8),
            volumes in prop::collection::vec(0.0f64..1e6, 8),
        ) {
            let quotes: Vec<Quote> = mids
                .iter()
                .zip(&volumes)
                .map(|(m, v)| quote(*m, *v))
                .collect();
            let verified = verify(&quotes);
            let price = verified.price_mid.unwrap();
            prop_assert!(price.is_finite());
            prop_assert!(verified.vwap.is_finite());
            prop_assert!(verified.discrepancy_pct >= 0.0);
            prop_assert_eq!(verified.alert, verified.discrepancy_pct >= ALERT_THRESHOLD_PCT);
        }

        #[test]
        fn equal_mids_have_no_discrepancy(mid in mid_strategy(), count in 1usize..6) {
            let quotes = vec![quote(mid, 1.0); count];
            let verified = verify(&quotes);
            prop_assert_eq!(verified.discrepancy_pct, 0.0);
            prop_assert!(!verified.alert);
        }

        #[test]
        fn zero_volume_vwap_is_mean(mids in prop::collection::vec(mid_strategy(), 1..6)) {
            let quotes: Vec<Quote> = mids.iter().map(|m| quote(*m, 0.0)).collect();
            let verified = verify(&quotes);
            prop_assert_eq!(Some(verified.vwap), verified.price_mid);
        }
    }
}
