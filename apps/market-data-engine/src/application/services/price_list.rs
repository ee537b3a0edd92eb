//! Flat price list.
//!
//! A lighter path than the full market data cycle: one verified mid per
//! symbol, cached for a few seconds, with the last known price served when
//! a fresh computation yields nothing. Feeds the `/prices` endpoint and the
//! stream broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;

use super::aggregation::AggregationService;
use crate::domain::market::Symbol;
use crate::domain::streaming::PriceMap;

/// Default freshness window for the price list.
pub const DEFAULT_PRICE_LIST_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price: f64,
    fetched_at: Instant,
    fetched_at_ms: i64,
}

/// Prices for a set of symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceList {
    /// Verified mid per symbol; symbols with no price are omitted.
    pub prices: PriceMap,
    /// True when at least one price is older than the TTL.
    pub stale: bool,
    /// Oldest contributing price time, epoch milliseconds.
    pub fetched_at: i64,
}

/// Price list errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceListError {
    /// No source produced a price and nothing was cached.
    #[error("no prices available for requested symbols")]
    Unavailable,
}

/// Cached, stale-tolerant price list over the shared aggregation service.
pub struct PriceListService {
    aggregation: Arc<AggregationService>,
    ttl: Duration,
    cache: Mutex<HashMap<Symbol, CachedPrice>>,
    primed: AtomicBool,
}

impl PriceListService {
    /// Create a service with the given TTL.
    #[must_use]
    pub fn new(aggregation: Arc<AggregationService>, ttl: Duration) -> Self {
        Self {
            aggregation,
            ttl,
            cache: Mutex::new(HashMap::new()),
            primed: AtomicBool::new(false),
        }
    }

    /// Whether any price has ever been cached.
    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.primed.load(Ordering::Relaxed)
    }

    /// Current prices for `symbols`.
    ///
    /// Fresh cached prices are returned without calling any source. Symbols
    /// that fail to price fall back to their last cached value.
    ///
    /// # Errors
    ///
    /// Returns `PriceListError::Unavailable` if no symbol could be priced
    /// and none has a cached price.
    pub async fn prices(&self, symbols: &[Symbol]) -> Result<PriceList, PriceListError> {
        let mut cache = self.cache.lock().await;
        let now = Instant::now();

        let all_fresh = symbols.iter().all(|s| {
            cache
                .get(s)
                .is_some_and(|c| now.saturating_duration_since(c.fetched_at) < self.ttl)
        });

        if !all_fresh {
            let timestamp = Utc::now().timestamp_millis();
            let snapshots = self.aggregation.aggregate_all(symbols, timestamp).await;
            let fetched_at = Instant::now();

            for snapshot in snapshots {
                if let Some(price) = snapshot.verified.price_mid {
                    cache.insert(
                        snapshot.symbol,
                        CachedPrice {
                            price,
                            fetched_at,
                            fetched_at_ms: timestamp,
                        },
                    );
                    self.primed.store(true, Ordering::Relaxed);
                } else {
                    tracing::warn!(
                        symbol = %snapshot.symbol,
                        "Price unavailable, serving last known value"
                    );
                }
            }
        }

        let now = Instant::now();
        let mut prices = PriceMap::new();
        let mut stale = false;
        let mut oldest: Option<i64> = None;

        for symbol in symbols {
            if let Some(cached) = cache.get(symbol) {
                prices.insert(symbol.to_string(), cached.price);
                stale |= now.saturating_duration_since(cached.fetched_at) >= self.ttl;
                oldest = Some(
                    oldest.map_or(cached.fetched_at_ms, |o| o.min(cached.fetched_at_ms)),
                );
            }
        }
        drop(cache);

        match oldest {
            Some(fetched_at) => Ok(PriceList {
                prices,
                stale,
                fetched_at,
            }),
            None => Err(PriceListError::Unavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::application::ports::{QuoteSource, SourceError};
    use crate::domain::market::Quote;

    struct ToggleSource {
        up: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteSource for ToggleSource {
        fn name(&self) -> &'static str {
            "toggle"
        }

        fn pair(&self, symbol: &Symbol) -> String {
            symbol.to_string()
        }

        async fn fetch_quote(&self, _symbol: &Symbol) -> Result<Quote, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.up.load(Ordering::SeqCst) {
                Ok(Quote::normalized(9.0, 11.0, 1.0, 0.0).unwrap())
            } else {
                Err(SourceError::Network("down".to_string()))
            }
        }
    }

    fn service(ttl: Duration) -> (PriceListService, Arc<ToggleSource>) {
        let source = Arc::new(ToggleSource {
            up: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        });
        let sources: Vec<Arc<dyn QuoteSource>> = vec![source.clone()];
        let aggregation = Arc::new(AggregationService::new(sources, Duration::from_secs(1)));
        (PriceListService::new(aggregation, ttl), source)
    }

    #[tokio::test]
    async fn caches_within_ttl() {
        let (service, source) = service(Duration::from_secs(60));
        let symbols = Symbol::parse_list("BTCUSD,ETHUSD").unwrap();

        assert!(!service.is_primed());
        let first = service.prices(&symbols).await.unwrap();
        assert!(service.is_primed());
        assert_eq!(first.prices.get("BTCUSD"), Some(&10.0));
        assert!(!first.stale);

        let _ = service.prices(&symbols).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn serves_stale_when_computation_fails() {
        let (service, source) = service(Duration::ZERO);
        let symbols = Symbol::parse_list("BTCUSD").unwrap();

        service.prices(&symbols).await.unwrap();
        source.up.store(false, Ordering::SeqCst);

        let list = service.prices(&symbols).await.unwrap();
        assert_eq!(list.prices.get("BTCUSD"), Some(&10.0));
        assert!(list.stale);
    }

    #[tokio::test]
    async fn unavailable_without_history() {
        let (service, source) = service(Duration::ZERO);
        source.up.store(false, Ordering::SeqCst);

        let err = service
            .prices(&Symbol::parse_list("BTCUSD").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, PriceListError::Unavailable);
    }
}
