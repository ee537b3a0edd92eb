//! Market View
//!
//! What the client publishes to its consumers: the latest prices, where
//! they came from, and whether they can be trusted.

use std::collections::BTreeMap;
use std::time::Duration;

use market_data_engine::{
    AggregatedSnapshot, PriceMap, Quote, QuoteError, RollingAverages, Symbol, VerifiedPrice,
};

use super::tiers::{ConnectionIndicator, Tier};

/// Source name used for synthesized placeholder quotes.
pub const PLACEHOLDER_SOURCE: &str = "static";

/// Half-spread applied around a placeholder price.
pub const PLACEHOLDER_SPREAD: f64 = 0.001;

/// Prices produced by one fallback tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierData {
    /// One snapshot per priced symbol.
    pub snapshots: Vec<AggregatedSnapshot>,
    /// Rolling averages per symbol, where the tier provides them.
    pub history: BTreeMap<String, RollingAverages>,
}

impl TierData {
    /// Verified mid per symbol; degraded snapshots are left out.
    #[must_use]
    pub fn prices(&self) -> PriceMap {
        prices_of(&self.snapshots)
    }

    /// Whether no snapshot carries a price.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.iter().all(|s| s.verified.is_degraded())
    }
}

/// Verified mid per symbol for the non-degraded snapshots.
#[must_use]
pub fn prices_of(snapshots: &[AggregatedSnapshot]) -> PriceMap {
    snapshots
        .iter()
        .filter_map(|s| s.verified.price_mid.map(|p| (s.symbol.to_string(), p)))
        .collect()
}

/// Build a single-source snapshot around a last-resort price.
///
/// `bid = price·0.999`, `ask = price·1.001`; the verified block reports the
/// price itself with no discrepancy.
///
/// # Errors
///
/// Returns `QuoteError` if `price` is not finite and positive.
pub fn placeholder_snapshot(
    symbol: Symbol,
    price: f64,
    timestamp: i64,
) -> Result<AggregatedSnapshot, QuoteError> {
    let quote = Quote::normalized(
        price * (1.0 - PLACEHOLDER_SPREAD),
        price * (1.0 + PLACEHOLDER_SPREAD),
        0.0,
        0.0,
    )?;

    let mut sources = BTreeMap::new();
    sources.insert(PLACEHOLDER_SOURCE.to_string(), Some(quote));

    Ok(AggregatedSnapshot {
        symbol,
        sources,
        verified: VerifiedPrice {
            price_mid: Some(price),
            vwap: price,
            discrepancy_pct: 0.0,
            alert: false,
        },
        timestamp,
    })
}

/// The client's published state.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketView {
    /// Latest price per symbol.
    pub prices: PriceMap,
    /// Full snapshots, when the current tier provides them.
    pub snapshots: Vec<AggregatedSnapshot>,
    /// Rolling averages, when the current tier provides them.
    pub history: BTreeMap<String, RollingAverages>,
    /// Tier that produced `prices`; `None` before the first data.
    pub tier: Option<Tier>,
    /// Connection status for display.
    pub indicator: ConnectionIndicator,
    /// Prices are a retained copy, not a fresh result.
    pub stale: bool,
    /// Non-fatal condition worth surfacing.
    pub warning: Option<String>,
    /// Why no tier produced fresh prices.
    pub error: Option<String>,
    /// Refresh interval while a timed tier is active.
    pub poll_interval: Option<Duration>,
    /// When `prices` were produced, epoch milliseconds.
    pub updated_at: Option<i64>,
}

impl Default for MarketView {
    fn default() -> Self {
        Self {
            prices: PriceMap::new(),
            snapshots: Vec::new(),
            history: BTreeMap::new(),
            tier: None,
            indicator: ConnectionIndicator::ConnectionError,
            stale: false,
            warning: None,
            error: None,
            poll_interval: None,
            updated_at: None,
        }
    }
}

impl MarketView {
    /// Fresh prices from a fallback tier.
    #[must_use]
    pub fn from_tier(tier: Tier, data: TierData, now_ms: i64) -> Self {
        Self {
            prices: data.prices(),
            snapshots: data.snapshots,
            history: data.history,
            tier: Some(tier),
            indicator: tier.indicator(),
            updated_at: Some(now_ms),
            ..Self::default()
        }
    }

    /// Fresh prices from the stream.
    #[must_use]
    pub fn from_stream(prices: PriceMap, now_ms: i64) -> Self {
        Self {
            prices,
            tier: Some(Tier::Stream),
            indicator: ConnectionIndicator::Live,
            updated_at: Some(now_ms),
            ..Self::default()
        }
    }

    /// Whether any price is held.
    #[must_use]
    pub fn has_prices(&self) -> bool {
        !self.prices.is_empty()
    }

    /// This view retained as stale data with a warning.
    ///
    /// The indicator drops to `ConnectionError`.
    #[must_use]
    pub fn stale_with_warning(mut self, warning: impl Into<String>) -> Self {
        self.stale = true;
        self.indicator = ConnectionIndicator::ConnectionError;
        self.warning = Some(warning.into());
        self.error = None;
        self
    }

    /// This view retained as stale data after a failure.
    ///
    /// The indicator drops to `ConnectionError`.
    #[must_use]
    pub fn stale_with_error(mut self, error: impl Into<String>) -> Self {
        self.stale = true;
        self.indicator = ConnectionIndicator::ConnectionError;
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn btc() -> Symbol {
        Symbol::parse("BTCUSD").unwrap()
    }

    #[test]
    fn placeholder_brackets_price() {
        let snapshot = placeholder_snapshot(btc(), 50_000.0, 7).unwrap();
        let quote = snapshot.sources[PLACEHOLDER_SOURCE].unwrap();

        assert!((quote.bid - 49_950.0).abs() < 1e-6);
        assert!((quote.ask - 50_050.0).abs() < 1e-6);
        assert_eq!(snapshot.verified.price_mid, Some(50_000.0));
        assert_eq!(snapshot.verified.discrepancy_pct, 0.0);
        assert!(!snapshot.verified.alert);
        assert_eq!(snapshot.timestamp, 7);
    }

    #[test]
    fn placeholder_rejects_unusable_price() {
        assert!(placeholder_snapshot(btc(), 0.0, 0).is_err());
        assert!(placeholder_snapshot(btc(), f64::NAN, 0).is_err());
    }

    #[test]
    fn degraded_snapshots_are_not_priced() {
        let mut sources = BTreeMap::new();
        sources.insert("binance".to_string(), None);
        let degraded = AggregatedSnapshot::new(Symbol::parse("ETHUSD").unwrap(), sources, 1);
        let priced = placeholder_snapshot(btc(), 10.0, 1).unwrap();

        let data = TierData {
            snapshots: vec![degraded.clone(), priced],
            history: BTreeMap::new(),
        };
        assert_eq!(data.prices().len(), 1);
        assert!(!data.is_empty());

        let only_degraded = TierData {
            snapshots: vec![degraded],
            history: BTreeMap::new(),
        };
        assert!(only_degraded.is_empty());
    }

    #[test]
    fn stale_error_drops_indicator() {
        let mut prices = PriceMap::new();
        prices.insert("BTCUSD".to_string(), 1.0);
        let view = MarketView::from_stream(prices, 1).stale_with_error("boom");

        assert!(view.stale);
        assert!(view.has_prices());
        assert_eq!(view.indicator, ConnectionIndicator::ConnectionError);
        assert_eq!(view.error.as_deref(), Some("boom"));
    }
}
