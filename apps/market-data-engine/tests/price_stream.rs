//! Price Stream Integration Tests
//!
//! Connects real WebSocket subscribers to the hub through the router.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use market_data_engine::infrastructure::http::serve;
use market_data_engine::{
    AggregationService, AppState, DistributionHub, HistoryStore, MarketDataEngine,
    PriceBroadcaster, PriceListService, PriceMessage, Quote, QuoteSource, SharedDistributionHub,
    SnapshotCache, SourceError, Symbol, create_router,
};

struct FixedSource;

#[async_trait]
impl QuoteSource for FixedSource {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn pair(&self, symbol: &Symbol) -> String {
        symbol.to_string()
    }

    async fn fetch_quote(&self, _symbol: &Symbol) -> Result<Quote, SourceError> {
        Ok(Quote::normalized(249.0, 251.0, 1.0, 0.0)?)
    }
}

struct Harness {
    url: String,
    hub: SharedDistributionHub,
    prices: Arc<PriceListService>,
    cancel: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start() -> Harness {
    let sources: Vec<Arc<dyn QuoteSource>> = vec![Arc::new(FixedSource)];
    let aggregation = Arc::new(AggregationService::new(sources, Duration::from_secs(1)));
    let engine = Arc::new(MarketDataEngine::new(
        Arc::clone(&aggregation),
        SnapshotCache::default(),
        HistoryStore::default(),
    ));
    let prices = Arc::new(PriceListService::new(aggregation, Duration::from_millis(10)));
    let hub = Arc::new(DistributionHub::with_defaults());
    let state = Arc::new(AppState::new(
        engine,
        Arc::clone(&prices),
        Arc::clone(&hub),
        None,
        vec![Symbol::parse("SOLUSD").unwrap()],
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(serve(listener, create_router(state), cancel.clone()));

    Harness {
        url: format!("ws://{addr}/ws"),
        hub,
        prices,
        cancel,
    }
}

async fn next_message<S>(stream: &mut S) -> PriceMessage
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_for_subscribers(hub: &SharedDistributionHub, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while hub.subscriber_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never reached");
}

#[tokio::test]
async fn initial_prices_then_updates() {
    let harness = start().await;
    let (mut ws, _) = connect_async(harness.url.as_str()).await.unwrap();

    match next_message(&mut ws).await {
        PriceMessage::InitialPrices(prices) => assert_eq!(prices["SOLUSD"], 250.0),
        other => panic!("expected INITIAL_PRICES, got {other:?}"),
    }
    wait_for_subscribers(&harness.hub, 1).await;

    let broadcaster = PriceBroadcaster::new(
        Arc::clone(&harness.hub),
        Arc::clone(&harness.prices),
        vec![Symbol::parse("SOLUSD").unwrap()],
        Duration::from_millis(50),
        harness.cancel.clone(),
    );
    tokio::spawn(broadcaster.run());

    for _ in 0..2 {
        match next_message(&mut ws).await {
            PriceMessage::PriceUpdate(prices) => assert_eq!(prices["SOLUSD"], 250.0),
            other => panic!("expected PRICE_UPDATE, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn clean_close_deregisters_subscriber() {
    let harness = start().await;
    let (mut ws, _) = connect_async(harness.url.as_str()).await.unwrap();
    let _ = next_message(&mut ws).await;
    wait_for_subscribers(&harness.hub, 1).await;

    ws.send(Message::Close(None)).await.unwrap();
    wait_for_subscribers(&harness.hub, 0).await;
}

#[tokio::test]
async fn every_subscriber_receives_the_broadcast() {
    let harness = start().await;
    let (mut a, _) = connect_async(harness.url.as_str()).await.unwrap();
    let (mut b, _) = connect_async(harness.url.as_str()).await.unwrap();
    let _ = next_message(&mut a).await;
    let _ = next_message(&mut b).await;
    wait_for_subscribers(&harness.hub, 2).await;

    let mut prices = market_data_engine::PriceMap::new();
    prices.insert("SOLUSD".to_string(), 251.0);
    let report = harness.hub.broadcast(&PriceMessage::PriceUpdate(prices.clone()));
    assert_eq!(report.delivered, 2);

    assert_eq!(next_message(&mut a).await, PriceMessage::PriceUpdate(prices.clone()));
    assert_eq!(next_message(&mut b).await, PriceMessage::PriceUpdate(prices));
}
