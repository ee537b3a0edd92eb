//! Market Data Engine Binary
//!
//! Starts the aggregation API and the price stream.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-data-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `ENGINE_PORT`: HTTP port for API, stream and health (default: 8080)
//! - `ENGINE_API_KEY`: Secret required in `x-api-key` for `/market-data` (default: none)
//! - `ENGINE_SYMBOLS`: Default symbols (default: BTCUSD,ETHUSD,LTCUSD,XRPUSD)
//! - `ENGINE_CACHE_TTL_MS`: Snapshot memo TTL (default: 2000)
//! - `ENGINE_PRICES_TTL_MS`: Price list TTL (default: 3000)
//! - `ENGINE_HISTORY_CAPACITY`: Points per symbol (default: 1440)
//! - `ENGINE_BROADCAST_INTERVAL_SECS`: Stream update interval (default: 5)
//! - `ENGINE_HUB_CHANNEL_CAPACITY`: Per-subscriber queue depth (default: 32)
//! - `ENGINE_SOURCE_TIMEOUT_MS`: Per-exchange call deadline (default: 2500)
//! - `ENGINE_BINANCE_URL`, `ENGINE_COINBASE_URL`, `ENGINE_KRAKEN_URL`: Exchange base URLs
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: market-data-engine)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use market_data_engine::infrastructure::exchanges::default_sources;
use market_data_engine::infrastructure::telemetry;
use market_data_engine::{
    AggregationService, AppState, DistributionHub, EngineConfig, HistoryStore, HttpServer,
    HubConfig, MarketDataEngine, PriceBroadcaster, PriceListService, SnapshotCache, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Market Data Engine");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Exchange adapters and the shared aggregation service
    let sources = default_sources(&config.exchanges)?;
    let aggregation = Arc::new(AggregationService::new(
        sources,
        config.exchanges.source_timeout,
    ));

    // Engine context: memo, history and cycle metrics
    let engine = Arc::new(MarketDataEngine::new(
        Arc::clone(&aggregation),
        SnapshotCache::new(config.server.cache_ttl),
        HistoryStore::new(config.server.history_capacity),
    ));

    let prices = Arc::new(PriceListService::new(
        aggregation,
        config.server.prices_ttl,
    ));

    // Distribution hub for stream subscribers
    let hub = Arc::new(DistributionHub::new(HubConfig::from(&config.hub)));

    let state = Arc::new(AppState::new(
        engine,
        Arc::clone(&prices),
        Arc::clone(&hub),
        config.api_key.clone(),
        config.symbols.clone(),
    ));

    // Spawn periodic broadcaster
    let broadcaster = PriceBroadcaster::new(
        hub,
        prices,
        config.symbols.clone(),
        config.hub.broadcast_interval,
        shutdown_token.clone(),
    );
    tokio::spawn(broadcaster.run());

    // Spawn HTTP server
    let http_server = HttpServer::new(config.server.port, state, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Market data engine ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Market data engine stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    let symbols: Vec<&str> = config.symbols.iter().map(|s| s.as_str()).collect();
    tracing::info!(
        port = config.server.port,
        symbols = ?symbols,
        auth = config.api_key.is_some(),
        cache_ttl_ms = config.server.cache_ttl.as_millis(),
        broadcast_interval_secs = config.hub.broadcast_interval.as_secs(),
        "Configuration loaded"
    );
    tracing::debug!(
        binance = %config.exchanges.binance_url,
        coinbase = %config.exchanges.coinbase_url,
        kraken = %config.exchanges.kraken_url,
        timeout_ms = config.exchanges.source_timeout.as_millis(),
        "Exchange endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
