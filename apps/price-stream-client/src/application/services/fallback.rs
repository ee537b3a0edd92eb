//! Tiered fallback chain.
//!
//! Tries each strategy in order and returns the first that prices anything.
//! Tier eligibility is recomputed on every refresh from the current
//! connectivity signals and the cooldown.

use std::sync::Arc;

use chrono::Utc;
use market_data_engine::Symbol;
use tokio::time::Instant;

use crate::application::ports::{FetchError, PriceStrategy};
use crate::domain::tiers::{ConnectivitySignals, Cooldown, Tier};
use crate::domain::view::MarketView;
use crate::infrastructure::metrics::{self, RefreshOutcome};

/// Ordered fallback strategies plus the memory needed between refreshes.
pub struct FallbackChain {
    strategies: Vec<Arc<dyn PriceStrategy>>,
    cooldown: Cooldown,
    last_known: Option<MarketView>,
    rate_limited: bool,
}

impl FallbackChain {
    /// Create a chain. Strategies are tried in the given order.
    #[must_use]
    pub fn new(strategies: Vec<Arc<dyn PriceStrategy>>, cooldown: Cooldown) -> Self {
        Self {
            strategies,
            cooldown,
            last_known: None,
            rate_limited: false,
        }
    }

    /// Whether the last refresh saw a rate-limit response.
    #[must_use]
    pub const fn rate_limited(&self) -> bool {
        self.rate_limited
    }

    /// Whether the static placeholder cooldown covers `now`.
    #[must_use]
    pub fn cooldown_active(&self, now: Instant) -> bool {
        self.cooldown.is_active(now)
    }

    /// The last fresh view, from any tier or the stream.
    #[must_use]
    pub const fn last_known(&self) -> Option<&MarketView> {
        self.last_known.as_ref()
    }

    /// Record a fresh view obtained outside the chain.
    pub fn remember(&mut self, view: MarketView) {
        if view.has_prices() {
            self.last_known = Some(view);
        }
    }

    /// Produce the best view available right now.
    ///
    /// Never fails: when no tier succeeds the last known view comes back
    /// marked stale, with an error explaining why.
    pub async fn refresh(&mut self, symbols: &[Symbol], signals: ConnectivitySignals) -> MarketView {
        self.rate_limited = false;

        if !signals.online {
            tracing::warn!("Offline, serving last known prices");
            return self.retained(&FetchError::Offline, true);
        }

        let now = Instant::now();
        for strategy in &self.strategies {
            let tier = strategy.tier();

            if signals.excludes(tier) || self.cooldown.skips(tier, now) {
                tracing::debug!(tier = %tier, "Tier skipped");
                metrics::record_refresh(tier, RefreshOutcome::Skipped);
                continue;
            }

            if tier == Tier::StaticPlaceholder && !self.cooldown.is_active(now) {
                tracing::warn!("Network tiers exhausted, pinning static placeholder");
                self.cooldown.start(now);
            }

            match strategy.fetch_prices(symbols).await {
                Ok(data) if !data.is_empty() => {
                    metrics::record_refresh(tier, RefreshOutcome::Success);
                    tracing::debug!(tier = %tier, symbols = data.snapshots.len(), "Tier priced");
                    let view = MarketView::from_tier(tier, data, Utc::now().timestamp_millis());
                    self.last_known = Some(view.clone());
                    return view;
                }
                Ok(_) => {
                    metrics::record_refresh(tier, RefreshOutcome::Failure);
                    tracing::warn!(tier = %tier, "Tier returned no prices");
                }
                Err(e) => {
                    metrics::record_refresh(tier, RefreshOutcome::Failure);
                    if e == FetchError::RateLimited {
                        self.rate_limited = true;
                    }
                    tracing::warn!(tier = %tier, error = %e, "Tier failed");
                }
            }
        }

        tracing::error!("All price tiers failed");
        self.retained(&FetchError::AllTiersExhausted, false)
    }

    fn retained(&self, problem: &FetchError, as_warning: bool) -> MarketView {
        match self.last_known.clone() {
            Some(view) if as_warning => view.stale_with_warning(problem.to_string()),
            Some(view) => view.stale_with_error(problem.to_string()),
            None => MarketView {
                error: Some(problem.to_string()),
                ..MarketView::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use market_data_engine::AggregatedSnapshot;
    use parking_lot::Mutex;

    use super::*;
    use crate::domain::tiers::{ConnectionIndicator, DEFAULT_COOLDOWN};
    use crate::domain::view::{TierData, placeholder_snapshot};

    struct ScriptedStrategy {
        tier: Tier,
        results: Mutex<Vec<Result<f64, FetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedStrategy {
        /// Replays `results` in order, repeating the last one.
        fn new(tier: Tier, results: Vec<Result<f64, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                tier,
                results: Mutex::new(results),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceStrategy for ScriptedStrategy {
        fn tier(&self) -> Tier {
            self.tier
        }

        async fn fetch_prices(&self, symbols: &[Symbol]) -> Result<TierData, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = {
                let mut results = self.results.lock();
                if results.len() > 1 {
                    results.remove(0)
                } else {
                    results[0].clone()
                }
            };
            let price = result?;
            let snapshots: Vec<AggregatedSnapshot> = symbols
                .iter()
                .map(|s| placeholder_snapshot(s.clone(), price, 1).unwrap())
                .collect();
            Ok(TierData {
                snapshots,
                history: Default::default(),
            })
        }
    }

    fn symbols() -> Vec<Symbol> {
        vec![Symbol::parse("BTCUSD").unwrap()]
    }

    fn chain(strategies: &[&Arc<ScriptedStrategy>]) -> FallbackChain {
        FallbackChain::new(
            strategies
                .iter()
                .map(|s| Arc::clone(*s) as Arc<dyn PriceStrategy>)
                .collect(),
            Cooldown::default(),
        )
    }

    fn online() -> ConnectivitySignals {
        ConnectivitySignals::default()
    }

    #[tokio::test]
    async fn first_success_wins() {
        let polling = ScriptedStrategy::new(Tier::Polling, vec![Ok(100.0)]);
        let direct = ScriptedStrategy::new(Tier::DirectAggregation, vec![Ok(200.0)]);
        let mut chain = chain(&[&polling, &direct]);

        let view = chain.refresh(&symbols(), online()).await;
        assert_eq!(view.tier, Some(Tier::Polling));
        assert_eq!(view.prices["BTCUSD"], 100.0);
        assert_eq!(view.indicator, ConnectionIndicator::PeriodicUpdates);
        assert_eq!(direct.calls(), 0);
    }

    #[tokio::test]
    async fn rate_limit_falls_through_and_is_reported() {
        let polling = ScriptedStrategy::new(Tier::Polling, vec![Err(FetchError::RateLimited)]);
        let direct = ScriptedStrategy::new(Tier::DirectAggregation, vec![Ok(200.0)]);
        let mut chain = chain(&[&polling, &direct]);

        let view = chain.refresh(&symbols(), online()).await;
        assert_eq!(view.tier, Some(Tier::DirectAggregation));
        assert!(chain.rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn static_placeholder_starts_cooldown() {
        let polling = ScriptedStrategy::new(Tier::Polling, vec![Err(FetchError::Status(502))]);
        let direct = ScriptedStrategy::new(
            Tier::DirectAggregation,
            vec![Err(FetchError::Network("dns".into()))],
        );
        let placeholder = ScriptedStrategy::new(Tier::StaticPlaceholder, vec![Ok(50.0)]);
        let mut chain = chain(&[&polling, &direct, &placeholder]);

        let view = chain.refresh(&symbols(), online()).await;
        assert_eq!(view.tier, Some(Tier::StaticPlaceholder));
        assert!(chain.cooldown_active(Instant::now()));

        // Within the cooldown the network tiers are not called again.
        tokio::time::advance(Duration::from_secs(60)).await;
        let view = chain.refresh(&symbols(), online()).await;
        assert_eq!(view.tier, Some(Tier::StaticPlaceholder));
        assert_eq!(polling.calls(), 1);
        assert_eq!(direct.calls(), 1);
        assert_eq!(placeholder.calls(), 2);

        // After it expires they are retried.
        tokio::time::advance(DEFAULT_COOLDOWN).await;
        let _ = chain.refresh(&symbols(), online()).await;
        assert_eq!(polling.calls(), 2);
        assert_eq!(direct.calls(), 2);
    }

    #[tokio::test]
    async fn all_tiers_failing_returns_stale_last_known() {
        let polling = ScriptedStrategy::new(
            Tier::Polling,
            vec![Ok(100.0), Err(FetchError::Timeout)],
        );
        let placeholder = ScriptedStrategy::new(
            Tier::StaticPlaceholder,
            vec![Err(FetchError::Status(503))],
        );
        let mut chain = chain(&[&polling, &placeholder]);

        let fresh = chain.refresh(&symbols(), online()).await;
        assert!(!fresh.stale);

        let view = chain.refresh(&symbols(), online()).await;
        assert!(view.stale);
        assert_eq!(view.prices["BTCUSD"], 100.0);
        assert_eq!(view.indicator, ConnectionIndicator::ConnectionError);
        assert_eq!(
            view.error.as_deref(),
            Some(FetchError::AllTiersExhausted.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn nothing_known_yields_empty_error_view() {
        let polling = ScriptedStrategy::new(Tier::Polling, vec![Err(FetchError::Timeout)]);
        let mut chain = chain(&[&polling]);

        let view = chain.refresh(&symbols(), online()).await;
        assert!(!view.has_prices());
        assert!(view.error.is_some());
        assert_eq!(view.tier, None);
    }

    #[tokio::test]
    async fn offline_skips_every_tier() {
        let polling = ScriptedStrategy::new(Tier::Polling, vec![Ok(100.0)]);
        let mut chain = chain(&[&polling]);
        let _ = chain.refresh(&symbols(), online()).await;

        let offline = ConnectivitySignals {
            online: false,
            ..online()
        };
        let view = chain.refresh(&symbols(), offline).await;
        assert_eq!(polling.calls(), 1);
        assert!(view.stale);
        assert_eq!(view.prices["BTCUSD"], 100.0);
        assert!(view.warning.is_some());
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn signals_exclude_tiers() {
        let polling = ScriptedStrategy::new(Tier::Polling, vec![Ok(1.0)]);
        let direct = ScriptedStrategy::new(Tier::DirectAggregation, vec![Ok(2.0)]);
        let placeholder = ScriptedStrategy::new(Tier::StaticPlaceholder, vec![Ok(3.0)]);
        let mut chain = chain(&[&polling, &direct, &placeholder]);

        let static_hosting = ConnectivitySignals {
            static_hosting: true,
            ..online()
        };
        let view = chain.refresh(&symbols(), static_hosting).await;
        assert_eq!(view.tier, Some(Tier::DirectAggregation));

        let locked_down = ConnectivitySignals {
            static_hosting: true,
            external_calls_disabled: true,
            ..online()
        };
        let view = chain.refresh(&symbols(), locked_down).await;
        assert_eq!(view.tier, Some(Tier::StaticPlaceholder));
        assert_eq!(polling.calls(), 0);
    }

    #[tokio::test]
    async fn remembered_stream_view_backs_failures() {
        let polling = ScriptedStrategy::new(Tier::Polling, vec![Err(FetchError::Timeout)]);
        let mut chain = chain(&[&polling]);

        let mut prices = market_data_engine::PriceMap::new();
        prices.insert("BTCUSD".to_string(), 42.0);
        chain.remember(MarketView::from_stream(prices, 1));

        let view = chain.refresh(&symbols(), online()).await;
        assert!(view.stale);
        assert_eq!(view.prices["BTCUSD"], 42.0);
        assert_eq!(view.tier, Some(Tier::Stream));
    }
}
