//! Resilience Integration Tests
//!
//! Drives the full client against a mocked engine, a closed port and a
//! real in-process engine.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use market_data_engine::infrastructure::http::serve;
use market_data_engine::{
    AggregationService, AppState, DistributionHub, ExchangeSettings, HistoryStore,
    MarketDataEngine, PriceListService, Quote, QuoteSource, SnapshotCache, SourceError, Symbol,
    create_router,
};
use price_stream_client::{
    BackendClient, BackoffConfig, ConnectionIndicator, ConnectivitySignals, Cooldown,
    DEFAULT_COOLDOWN, DirectAggregationStrategy, FallbackChain, MarketView, PollingStrategy,
    PriceStrategy, PriceStream, ResilientPriceClient, StaticPlaceholderStrategy, StreamClient,
    StreamClientConfig, Tier,
};

// =============================================================================
// Harness
// =============================================================================

struct RunningClient {
    views: watch::Receiver<MarketView>,
    cancel: CancellationToken,
}

impl Drop for RunningClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl RunningClient {
    async fn wait_for(&mut self, predicate: impl FnMut(&MarketView) -> bool) -> MarketView {
        timeout(Duration::from_secs(5), self.views.wait_for(predicate))
            .await
            .expect("timed out waiting for view")
            .expect("client stopped")
            .clone()
    }
}

fn fast_reconnect() -> BackoffConfig {
    BackoffConfig {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        max_jitter: Duration::ZERO,
        max_attempts: 5,
    }
}

fn stream_to(url: String, allowed_hosts: Vec<String>) -> Arc<dyn PriceStream> {
    Arc::new(StreamClient::new(StreamClientConfig {
        allowed_hosts,
        reconnect: fast_reconnect(),
        ..StreamClientConfig::new(url)
    }))
}

/// Every exchange call lands on `exchange_url` and fails unless mocked.
fn start_client(
    stream: Option<Arc<dyn PriceStream>>,
    api_url: &str,
    exchange_url: &str,
    signals: ConnectivitySignals,
    symbols: &str,
) -> RunningClient {
    let backend = BackendClient::new(api_url, None, Duration::from_secs(2)).unwrap();
    let exchanges = ExchangeSettings {
        binance_url: exchange_url.to_string(),
        coinbase_url: exchange_url.to_string(),
        kraken_url: exchange_url.to_string(),
        source_timeout: Duration::from_secs(1),
    };
    let strategies: Vec<Arc<dyn PriceStrategy>> = vec![
        Arc::new(PollingStrategy::new(backend.clone())),
        Arc::new(DirectAggregationStrategy::from_settings(&exchanges).unwrap()),
        Arc::new(StaticPlaceholderStrategy::new(backend)),
    ];
    let chain = FallbackChain::new(strategies, Cooldown::new(DEFAULT_COOLDOWN));

    let (signals_tx, signals_rx) = watch::channel(signals);
    let cancel = CancellationToken::new();
    let client = ResilientPriceClient::new(
        stream,
        chain,
        Symbol::parse_list(symbols).unwrap(),
        BackoffConfig::polling(),
        signals_rx,
        cancel.clone(),
    );
    let views = client.subscribe();
    tokio::spawn(async move {
        let _signals_tx = signals_tx;
        client.run().await;
    });

    RunningClient { views, cancel }
}

fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/ws")
}

async fn mock_engine() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/market-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "data": [{
                "symbol": "BTCUSD",
                "sources": {
                    "binance": {"bid": 99.0, "ask": 101.0, "volume24h": 1.0, "change24hPct": 0.0},
                    "coinbase": null,
                    "kraken": null
                },
                "verified": {"priceMid": 100.0, "vwap": 100.0, "discrepancyPct": 0.0, "alert": false},
                "timestamp": 1_700_000_000_000_i64
            }]
        })))
        .mount(&server)
        .await;
    server
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test]
async fn unreachable_stream_falls_back_to_polling() {
    let engine = mock_engine().await;
    let mut client = start_client(
        Some(stream_to(closed_port_url(), Vec::new())),
        &engine.uri(),
        &engine.uri(),
        ConnectivitySignals::default(),
        "BTCUSD",
    );

    let view = client.wait_for(|v| v.tier == Some(Tier::Polling)).await;
    assert_eq!(view.prices["BTCUSD"], 100.0);
    assert_eq!(view.indicator, ConnectionIndicator::PeriodicUpdates);
    assert_eq!(view.poll_interval, Some(Duration::from_secs(30)));
    assert!(!view.stale);
}

#[tokio::test]
async fn disallowed_stream_host_goes_straight_to_polling() {
    let engine = mock_engine().await;
    let mut client = start_client(
        Some(stream_to(
            "ws://127.0.0.1:9/ws".to_string(),
            vec!["prices.example.com".to_string()],
        )),
        &engine.uri(),
        &engine.uri(),
        ConnectivitySignals::default(),
        "BTCUSD",
    );

    let view = client.wait_for(|v| v.tier.is_some()).await;
    assert_eq!(view.tier, Some(Tier::Polling));
}

#[tokio::test]
async fn rate_limited_engine_widens_interval_and_uses_placeholder() {
    let engine = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/market-data"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&engine)
        .await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prices": {"BTCUSD": 2000.0}})))
        .mount(&engine)
        .await;

    let mut client = start_client(
        None,
        &engine.uri(),
        &engine.uri(),
        ConnectivitySignals {
            external_calls_disabled: true,
            ..ConnectivitySignals::default()
        },
        "BTCUSD",
    );

    let view = client.wait_for(|v| v.tier.is_some()).await;
    assert_eq!(view.tier, Some(Tier::StaticPlaceholder));
    assert_eq!(view.prices["BTCUSD"], 2000.0);
    assert_eq!(view.poll_interval, Some(Duration::from_secs(60)));

    let quote = view.snapshots[0].sources["static"].unwrap();
    assert!((quote.bid - 1998.0).abs() < 1e-9);
    assert!((quote.ask - 2002.0).abs() < 1e-9);
}

#[tokio::test]
async fn direct_aggregation_covers_engine_outage() {
    let exchanges = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bidPrice": "99.0",
            "askPrice": "101.0",
            "volume": "10.0",
            "priceChangePercent": "1.5"
        })))
        .mount(&exchanges)
        .await;

    let mut client = start_client(
        None,
        &closed_port_url().replace("ws://", "http://").replace("/ws", ""),
        &exchanges.uri(),
        ConnectivitySignals::default(),
        "BTCUSD",
    );

    let view = client.wait_for(|v| v.tier.is_some()).await;
    assert_eq!(view.tier, Some(Tier::DirectAggregation));
    assert_eq!(view.prices["BTCUSD"], 100.0);
    assert!(view.history.contains_key("BTCUSD"));
}

#[tokio::test]
async fn nothing_reachable_reports_error_without_prices() {
    let dead = closed_port_url().replace("ws://", "http://").replace("/ws", "");
    let mut client = start_client(
        None,
        &dead,
        &dead,
        ConnectivitySignals::default(),
        "BTCUSD",
    );

    let view = client.wait_for(|v| v.error.is_some()).await;
    assert!(!view.has_prices());
    assert_eq!(view.indicator, ConnectionIndicator::ConnectionError);
}

// =============================================================================
// Against a Real Engine
// =============================================================================

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

struct Engine {
    http_url: String,
    ws_url: String,
    cancel: CancellationToken,
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start_engine() -> Engine {
    let sources: Vec<Arc<dyn QuoteSource>> = vec![Arc::new(FixedSource)];
    let aggregation = Arc::new(AggregationService::new(sources, Duration::from_secs(1)));
    let engine = Arc::new(MarketDataEngine::new(
        Arc::clone(&aggregation),
        SnapshotCache::default(),
        HistoryStore::default(),
    ));
    let prices = Arc::new(PriceListService::new(aggregation, Duration::from_millis(10)));
    let state = Arc::new(AppState::new(
        engine,
        prices,
        Arc::new(DistributionHub::with_defaults()),
        None,
        vec![Symbol::parse("SOLUSD").unwrap()],
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(serve(listener, create_router(state), cancel.clone()));

    Engine {
        http_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        cancel,
    }
}

#[tokio::test]
async fn live_stream_from_engine() {
    let engine = start_engine().await;
    let mut client = start_client(
        Some(stream_to(engine.ws_url.clone(), vec!["127.0.0.1".to_string()])),
        &engine.http_url,
        &engine.http_url,
        ConnectivitySignals::default(),
        "SOLUSD",
    );

    let view = client.wait_for(|v| v.has_prices()).await;
    assert_eq!(view.tier, Some(Tier::Stream));
    assert_eq!(view.indicator, ConnectionIndicator::Live);
    assert_eq!(view.prices["SOLUSD"], 250.0);
    assert!(!view.stale);
}

#[tokio::test]
async fn polls_real_engine_when_stream_disabled() {
    let engine = start_engine().await;
    let mut client = start_client(
        None,
        &engine.http_url,
        &engine.http_url,
        ConnectivitySignals::default(),
        "SOLUSD",
    );

    let view = client.wait_for(|v| v.has_prices()).await;
    assert_eq!(view.tier, Some(Tier::Polling));
    assert_eq!(view.prices["SOLUSD"], 250.0);
    assert!(view.history.contains_key("SOLUSD"));
}
