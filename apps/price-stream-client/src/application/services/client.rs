//! Resilient price client.
//!
//! Runs the stream first. When the stream gives up (retries exhausted,
//! disallowed host, or a clean close) the client switches to the fallback
//! chain on the polling schedule for the rest of its life. A stream skipped
//! because the connectivity signals excluded it is started from the polling
//! loop once they allow it.
//!
//! ```text
//! ┌────────┐  gives up   ┌────────────────────────────────┐
//! │ Stream │────────────►│ refresh ─► publish ─► sleep(30s │ 60s) ─┐
//! └───┬────┘             └────▲───────────────────────────────────┘
//!     │ events                └───────────────────────────────────┘
//!     ▼
//!  publish (Live)
//! ```

use std::sync::Arc;

use chrono::Utc;
use market_data_engine::Symbol;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::fallback::FallbackChain;
use crate::application::ports::{PriceStream, StreamEvent};
use crate::domain::backoff::BackoffConfig;
use crate::domain::tiers::{ConnectionIndicator, ConnectivitySignals, Tier};
use crate::domain::view::MarketView;
use crate::infrastructure::metrics;

const STREAM_EVENT_BUFFER: usize = 64;

/// Publishes the best available prices through a watch channel.
pub struct ResilientPriceClient {
    stream: Option<Arc<dyn PriceStream>>,
    chain: FallbackChain,
    symbols: Vec<Symbol>,
    polling: BackoffConfig,
    signals: watch::Receiver<ConnectivitySignals>,
    view_tx: watch::Sender<MarketView>,
    cancel: CancellationToken,
}

impl ResilientPriceClient {
    /// Create a client. Pass no stream to start directly in the fallback tiers.
    #[must_use]
    pub fn new(
        stream: Option<Arc<dyn PriceStream>>,
        chain: FallbackChain,
        symbols: Vec<Symbol>,
        polling: BackoffConfig,
        signals: watch::Receiver<ConnectivitySignals>,
        cancel: CancellationToken,
    ) -> Self {
        let (view_tx, _) = watch::channel(MarketView::default());
        Self {
            stream,
            chain,
            symbols,
            polling,
            signals,
            view_tx,
            cancel,
        }
    }

    /// Receive every published view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MarketView> {
        self.view_tx.subscribe()
    }

    /// Run until cancelled.
    pub async fn run(mut self) {
        let mut deferred = self.stream.clone();
        if !self.signals.borrow().excludes(Tier::Stream) {
            if let Some(stream) = deferred.take() {
                self.run_stream(stream.as_ref()).await;
            }
        } else if deferred.is_some() {
            tracing::info!("Connectivity excludes the stream, starting in fallback tiers");
        }

        if self.cancel.is_cancelled() {
            tracing::info!("Price client stopped");
            return;
        }

        self.run_polling(deferred).await;
        tracing::info!("Price client stopped");
    }

    async fn run_stream(&mut self, stream: &dyn PriceStream) {
        let (events_tx, mut events) = mpsc::channel(STREAM_EVENT_BUFFER);
        let task = stream.run(events_tx, self.cancel.child_token());
        tokio::pin!(task);

        let outcome = loop {
            tokio::select! {
                result = &mut task => break result,
                Some(event) = events.recv() => self.on_stream_event(event),
            }
        };

        while let Ok(event) = events.try_recv() {
            self.on_stream_event(event);
        }
        metrics::set_stream_connected(false);

        match outcome {
            Ok(()) if self.cancel.is_cancelled() => {}
            Ok(()) => tracing::info!("Price stream closed, switching to polling"),
            Err(e) => tracing::warn!(error = %e, "Price stream unavailable, switching to polling"),
        }
    }

    fn on_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => {
                metrics::set_stream_connected(true);
                tracing::info!("Price stream connected");
                let current = self.view_tx.borrow().clone();
                if current.tier == Some(Tier::Stream) && current.has_prices() {
                    self.publish(MarketView {
                        indicator: ConnectionIndicator::Live,
                        stale: false,
                        warning: None,
                        ..current
                    });
                }
            }
            StreamEvent::Message(message) => {
                tracing::debug!(kind = message.kind(), "Stream prices received");
                let view = MarketView::from_stream(
                    message.prices().clone(),
                    Utc::now().timestamp_millis(),
                );
                self.chain.remember(view.clone());
                self.publish(view);
            }
            StreamEvent::Disconnected => {
                metrics::set_stream_connected(false);
                let current = self.view_tx.borrow().clone();
                self.publish(current.stale_with_warning("price stream disconnected"));
            }
            StreamEvent::Reconnecting { attempt, delay } => {
                metrics::record_reconnect();
                tracing::debug!(attempt, delay_ms = delay.as_millis(), "Stream reconnect scheduled");
            }
        }
    }

    /// Poll the fallback chain; `deferred` is a stream that has not run yet.
    async fn run_polling(&mut self, mut deferred: Option<Arc<dyn PriceStream>>) {
        loop {
            let signals = *self.signals.borrow();
            if !signals.excludes(Tier::Stream)
                && let Some(stream) = deferred.take()
            {
                tracing::info!("Connectivity allows the stream, connecting");
                self.run_stream(stream.as_ref()).await;
                if self.cancel.is_cancelled() {
                    break;
                }
                continue;
            }

            let mut view = self.chain.refresh(&self.symbols, signals).await;
            let interval = self.polling.poll_interval(self.chain.rate_limited());
            view.poll_interval = Some(interval);

            tracing::debug!(
                tier = view.tier.map_or("none", Tier::as_str),
                interval_secs = interval.as_secs(),
                stale = view.stale,
                "Prices refreshed"
            );
            self.publish(view);

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    fn publish(&self, view: MarketView) {
        metrics::set_active_tier(view.tier);
        self.view_tx.send_replace(view);
    }
}
