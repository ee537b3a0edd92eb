//! Distribution Hub
//!
//! Fan-out of price messages to stream subscribers.
//!
//! # Architecture
//!
//! Each subscriber owns a bounded `mpsc` queue; the hub keeps the sending
//! halves in a registry. A send that fails (receiver gone or queue full)
//! evicts that subscriber only. Dropping the evicted sender closes the
//! subscriber's queue, which its socket task observes as end of stream.
//!
//! ```text
//!                       ┌──────────────┐
//!  PriceBroadcaster ───►│ Distribution │──► mpsc ──► socket task 1
//!   (every interval)    │     Hub      │──► mpsc ──► socket task 2
//!                       └──────────────┘──► mpsc ──► socket task N
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::services::PriceListService;
use crate::domain::market::Symbol;
use crate::domain::streaming::PriceMessage;
use crate::infrastructure::config::HubSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Subscribers
// =============================================================================

/// Unique identifier for a stream subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of one subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Upgrade accepted, initial prices not yet sent.
    Connecting,
    /// Receiving broadcasts.
    Open,
    /// Closed by either side without error.
    ClosedClean,
    /// Closed after a transport or delivery failure.
    ClosedError,
}

impl SubscriberState {
    /// Label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ClosedClean => "closed_clean",
            Self::ClosedError => "closed_error",
        }
    }

    /// Whether the connection has ended.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::ClosedClean | Self::ClosedError)
    }
}

/// A registered subscriber's receiving half.
#[derive(Debug)]
pub struct Subscription {
    /// The subscriber's id.
    pub id: SubscriberId,
    /// Messages addressed to this subscriber.
    pub receiver: mpsc::Receiver<PriceMessage>,
}

// =============================================================================
// Hub
// =============================================================================

/// Hub configuration.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Per-subscriber queue depth.
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
        }
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        Self {
            channel_capacity: settings.channel_capacity,
        }
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the message was queued for.
    pub delivered: usize,
    /// Subscribers evicted because the send failed.
    pub dropped: usize,
}

/// Registry of subscriber channels.
#[derive(Debug)]
pub struct DistributionHub {
    config: HubConfig,
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<PriceMessage>>>,
}

impl DistributionHub {
    /// Create a new hub.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(HubConfig::default())
    }

    /// Register a subscriber and return its receiving half.
    pub fn register(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        self.insert(tx, rx)
    }

    /// Register a subscriber whose queue starts with `initial`.
    ///
    /// The message is queued before the subscriber becomes visible to
    /// [`broadcast`](Self::broadcast), so it is always delivered first.
    pub fn subscribe(&self, initial: PriceMessage) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let kind = initial.kind();
        if tx.try_send(initial).is_ok() {
            metrics::record_messages_sent(kind, 1);
        }
        self.insert(tx, rx)
    }

    fn insert(
        &self,
        tx: mpsc::Sender<PriceMessage>,
        rx: mpsc::Receiver<PriceMessage>,
    ) -> Subscription {
        let id = SubscriberId::new();

        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        metrics::set_hub_subscribers(count);
        tracing::debug!(subscriber = %id, subscribers = count, "Subscriber registered");

        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn deregister(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.write();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            metrics::set_hub_subscribers(count);
            tracing::debug!(subscriber = %id, subscribers = count, "Subscriber removed");
        }
        removed
    }

    /// Queue a message for every subscriber, evicting those whose send fails.
    pub fn broadcast(&self, message: &PriceMessage) -> BroadcastReport {
        let mut failed = Vec::new();
        let mut delivered = 0;

        for (id, tx) in self.subscribers.read().iter() {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(subscriber = %id, error = %e, "Send failed, evicting subscriber");
                    failed.push(*id);
                }
            }
        }

        self.evict(&failed);
        metrics::record_messages_sent(message.kind(), delivered as u64);

        BroadcastReport {
            delivered,
            dropped: failed.len(),
        }
    }

    fn evict(&self, ids: &[SubscriberId]) {
        if ids.is_empty() {
            return;
        }
        let count = {
            let mut subscribers = self.subscribers.write();
            for id in ids {
                subscribers.remove(id);
            }
            subscribers.len()
        };
        metrics::record_subscribers_dropped(ids.len() as u64);
        metrics::set_hub_subscribers(count);
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscriber_count(),
            channel_capacity: self.config.channel_capacity,
        }
    }
}

/// Shared hub reference.
pub type SharedDistributionHub = Arc<DistributionHub>;

/// Statistics about the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Registered subscribers.
    pub subscribers: usize,
    /// Per-subscriber queue depth.
    pub channel_capacity: usize,
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Periodically prices the tracked symbols and broadcasts `PRICE_UPDATE`.
pub struct PriceBroadcaster {
    hub: SharedDistributionHub,
    prices: Arc<PriceListService>,
    symbols: Vec<Symbol>,
    interval: Duration,
    cancel: CancellationToken,
}

impl PriceBroadcaster {
    /// Create a broadcaster.
    #[must_use]
    pub const fn new(
        hub: SharedDistributionHub,
        prices: Arc<PriceListService>,
        symbols: Vec<Symbol>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hub,
            prices,
            symbols,
            interval,
            cancel,
        }
    }

    /// Run until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; new subscribers already get
        // INITIAL_PRICES on connect.
        ticker.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            symbols = self.symbols.len(),
            "Price broadcaster started"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Price broadcaster stopped");
    }

    /// Price the symbols once and broadcast the result.
    ///
    /// Skipped when nobody is subscribed.
    pub async fn tick(&self) -> Option<BroadcastReport> {
        if self.hub.subscriber_count() == 0 {
            return None;
        }

        match self.prices.prices(&self.symbols).await {
            Ok(list) => {
                let report = self.hub.broadcast(&PriceMessage::PriceUpdate(list.prices));
                tracing::debug!(
                    delivered = report.delivered,
                    dropped = report.dropped,
                    stale = list.stale,
                    "Price update broadcast"
                );
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "No prices to broadcast");
                None
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::ports::{QuoteSource, SourceError};
    use crate::application::services::AggregationService;
    use crate::domain::market::Quote;
    use crate::domain::streaming::PriceMap;

    fn update(price: f64) -> PriceMessage {
        PriceMessage::PriceUpdate(PriceMap::from([("BTCUSD".to_string(), price)]))
    }

    #[test]
    fn hub_creation() {
        let hub = DistributionHub::with_defaults();
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.stats().channel_capacity, 32);
    }

    #[test]
    fn register_and_deregister() {
        let hub = DistributionHub::with_defaults();
        let a = hub.register();
        let b = hub.register();
        assert_eq!(hub.subscriber_count(), 2);
        assert_ne!(a.id, b.id);

        assert!(hub.deregister(a.id));
        assert!(!hub.deregister(a.id));
        assert_eq!(hub.subscriber_count(), 1);
        assert!(hub.is_registered(b.id));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let hub = DistributionHub::with_defaults();
        let mut a = hub.register();
        let mut b = hub.register();

        let report = hub.broadcast(&update(10.0));
        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 0 });

        assert_eq!(a.receiver.recv().await.unwrap(), update(10.0));
        assert_eq!(b.receiver.recv().await.unwrap(), update(10.0));
    }

    #[tokio::test]
    async fn closed_subscriber_is_evicted_without_affecting_others() {
        let hub = DistributionHub::with_defaults();
        let closed = hub.register();
        let mut open = hub.register();
        drop(closed.receiver);

        let report = hub.broadcast(&update(1.0));
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 1 });
        assert!(!hub.is_registered(closed.id));
        assert_eq!(open.receiver.recv().await.unwrap(), update(1.0));
    }

    #[tokio::test]
    async fn full_queue_evicts_and_closes_stream() {
        let hub = DistributionHub::new(HubConfig {
            channel_capacity: 1,
        });
        let mut slow = hub.register();

        assert_eq!(hub.broadcast(&update(1.0)).delivered, 1);
        assert_eq!(hub.broadcast(&update(2.0)).dropped, 1);

        assert_eq!(slow.receiver.recv().await.unwrap(), update(1.0));
        assert!(slow.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn initial_message_precedes_broadcasts() {
        let hub = DistributionHub::with_defaults();
        let initial = PriceMessage::InitialPrices(PriceMap::from([("BTCUSD".to_string(), 1.0)]));
        let mut sub = hub.subscribe(initial.clone());
        hub.broadcast(&update(2.0));

        assert_eq!(sub.receiver.recv().await.unwrap(), initial);
        assert_eq!(sub.receiver.recv().await.unwrap(), update(2.0));
    }

    #[test]
    fn subscriber_state_labels() {
        assert_eq!(SubscriberState::Connecting.as_str(), "connecting");
        assert!(!SubscriberState::Open.is_closed());
        assert!(SubscriberState::ClosedClean.is_closed());
        assert!(SubscriberState::ClosedError.is_closed());
    }

    struct FlatSource;

    #[async_trait]
    impl QuoteSource for FlatSource {
        fn name(&self) -> &'static str {
            "flat"
        }

        fn pair(&self, symbol: &Symbol) -> String {
            symbol.to_string()
        }

        async fn fetch_quote(&self, _symbol: &Symbol) -> Result<Quote, SourceError> {
            Ok(Quote::normalized(99.0, 101.0, 1.0, 0.0).unwrap())
        }
    }

    fn broadcaster(hub: SharedDistributionHub) -> PriceBroadcaster {
        let sources: Vec<Arc<dyn QuoteSource>> = vec![Arc::new(FlatSource)];
        let aggregation = Arc::new(AggregationService::new(sources, Duration::from_secs(1)));
        PriceBroadcaster::new(
            hub,
            Arc::new(PriceListService::new(aggregation, Duration::from_secs(3))),
            Symbol::parse_list("BTCUSD").unwrap(),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn tick_skipped_without_subscribers() {
        let hub = Arc::new(DistributionHub::with_defaults());
        assert!(broadcaster(hub).tick().await.is_none());
    }

    #[tokio::test]
    async fn tick_sends_price_update() {
        let hub = Arc::new(DistributionHub::with_defaults());
        let mut sub = hub.register();

        let report = broadcaster(Arc::clone(&hub)).tick().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(sub.receiver.recv().await.unwrap(), update(100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn run_broadcasts_on_interval_until_cancelled() {
        let hub = Arc::new(DistributionHub::with_defaults());
        let mut sub = hub.register();
        let broadcaster = broadcaster(Arc::clone(&hub));
        let cancel = broadcaster.cancel.clone();
        let handle = tokio::spawn(broadcaster.run());

        let first = sub.receiver.recv().await.unwrap();
        assert_eq!(first.kind(), "price_update");

        cancel.cancel();
        handle.await.unwrap();
    }
}
