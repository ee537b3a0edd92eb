//! Multi-source aggregation.
//!
//! Fans out to every quote source concurrently for each symbol, waits for
//! all of them to settle, and verifies whatever succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::application::ports::{QuoteSource, SourceError};
use crate::domain::market::{Quote, Symbol};
use crate::domain::verification::AggregatedSnapshot;
use crate::infrastructure::metrics;

/// Default per-call deadline for a source.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_millis(2500);

/// Settle-all fan-out over a fixed set of quote sources.
pub struct AggregationService {
    sources: Vec<Arc<dyn QuoteSource>>,
    source_timeout: Duration,
}

impl AggregationService {
    /// Create a service over `sources`, bounding each call by `source_timeout`.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn QuoteSource>>, source_timeout: Duration) -> Self {
        Self {
            sources,
            source_timeout,
        }
    }

    /// Number of configured sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Names of configured sources, in fan-out order.
    #[must_use]
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Aggregate one symbol.
    ///
    /// Never fails: a source that errors or times out appears with no quote.
    pub async fn aggregate(&self, symbol: &Symbol, timestamp: i64) -> AggregatedSnapshot {
        let calls = self.sources.iter().map(|source| async move {
            let result = self.fetch_bounded(source.as_ref(), symbol).await;
            (source.name(), result)
        });

        let mut quotes: BTreeMap<String, Option<Quote>> = BTreeMap::new();
        for (name, result) in join_all(calls).await {
            match result {
                Ok(quote) => {
                    quotes.insert(name.to_string(), Some(quote));
                }
                Err(e) => {
                    tracing::warn!(
                        source = name,
                        symbol = %symbol,
                        error = %e,
                        "Quote source failed"
                    );
                    metrics::record_source_failure(name, e.kind());
                    quotes.insert(name.to_string(), None);
                }
            }
        }

        let snapshot = AggregatedSnapshot::new(symbol.clone(), quotes, timestamp);

        if snapshot.verified.is_degraded() {
            tracing::warn!(symbol = %symbol, "No source produced a usable quote");
        } else if snapshot.verified.alert {
            tracing::warn!(
                symbol = %symbol,
                discrepancy_pct = snapshot.verified.discrepancy_pct,
                "Cross-exchange discrepancy above threshold"
            );
        }

        snapshot
    }

    /// Aggregate several symbols concurrently, preserving input order.
    pub async fn aggregate_all(
        &self,
        symbols: &[Symbol],
        timestamp: i64,
    ) -> Vec<AggregatedSnapshot> {
        join_all(symbols.iter().map(|s| self.aggregate(s, timestamp))).await
    }

    async fn fetch_bounded(
        &self,
        source: &dyn QuoteSource,
        symbol: &Symbol,
    ) -> Result<Quote, SourceError> {
        tokio::time::timeout(self.source_timeout, source.fetch_quote(symbol))
            .await
            .unwrap_or(Err(SourceError::Timeout))
    }
}
