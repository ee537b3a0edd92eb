//! Tier 3: direct exchange aggregation.
//!
//! Runs the engine's aggregation and verification in-process against the
//! public exchange APIs, keeping a private rolling history.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use market_data_engine::application::services::AggregationService;
use market_data_engine::infrastructure::exchanges::default_sources;
use market_data_engine::{ExchangeSettings, HistoryStore, SourceError, Symbol};
use parking_lot::Mutex;

use crate::application::ports::{FetchError, PriceStrategy};
use crate::domain::tiers::Tier;
use crate::domain::view::TierData;

/// Aggregates exchange quotes without the engine.
pub struct DirectAggregationStrategy {
    aggregation: Arc<AggregationService>,
    history: Mutex<HistoryStore>,
}

impl DirectAggregationStrategy {
    /// Create a strategy over an existing aggregation service.
    #[must_use]
    pub fn new(aggregation: Arc<AggregationService>, history: HistoryStore) -> Self {
        Self {
            aggregation,
            history: Mutex::new(history),
        }
    }

    /// Create a strategy over the standard exchange set.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if an exchange HTTP client cannot be built.
    pub fn from_settings(settings: &ExchangeSettings) -> Result<Self, SourceError> {
        let sources = default_sources(settings)?;
        let aggregation = AggregationService::new(sources, settings.source_timeout);
        Ok(Self::new(Arc::new(aggregation), HistoryStore::default()))
    }
}

#[async_trait]
impl PriceStrategy for DirectAggregationStrategy {
    fn tier(&self) -> Tier {
        Tier::DirectAggregation
    }

    async fn fetch_prices(&self, symbols: &[Symbol]) -> Result<TierData, FetchError> {
        let now = Utc::now().timestamp_millis();
        let snapshots = self.aggregation.aggregate_all(symbols, now).await;

        if snapshots.iter().all(|s| s.verified.is_degraded()) {
            return Err(FetchError::NoPrices);
        }

        let mut history = BTreeMap::new();
        {
            let mut store = self.history.lock();
            for snapshot in snapshots.iter().filter(|s| !s.verified.is_degraded()) {
                if let Err(e) = store.append(&snapshot.symbol, snapshot.history_point()) {
                    tracing::warn!(error = %e, "Skipping history point");
                }
            }
            for symbol in symbols {
                history.insert(symbol.to_string(), store.summarize(symbol, now));
            }
        }

        Ok(TierData { snapshots, history })
    }
}
