//! Price Stream Client Binary
//!
//! Follows the engine's price stream and logs every published view.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-stream-client
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `PRICE_CLIENT_API_URL`: Engine REST base URL (default: <http://localhost:8080>)
//! - `PRICE_CLIENT_STREAM_URL`: Engine stream URL, or `off` (default: ws://localhost:8080/ws)
//! - `PRICE_CLIENT_ALLOWED_HOSTS`: Comma-separated stream hosts (default: any)
//! - `PRICE_CLIENT_API_KEY`: Sent as `x-api-key` (default: none)
//! - `PRICE_CLIENT_SYMBOLS`: Symbols to track (default: BTCUSD,ETHUSD,LTCUSD,XRPUSD)
//! - `PRICE_CLIENT_ONLINE`, `PRICE_CLIENT_STATIC_HOSTING`, `PRICE_CLIENT_EXTERNAL_CALLS_DISABLED`: Connectivity signals,
//!   re-read every poll interval (edits to `.env` apply without a restart)
//! - `PRICE_CLIENT_RECONNECT_BASE_MS`, `_MAX_MS`, `_JITTER_MS`, `_MAX_ATTEMPTS`: Reconnect schedule (1000, 10000, 1000, 5)
//! - `PRICE_CLIENT_STREAM_CONNECT_TIMEOUT_MS`: Stream handshake deadline (default: 10000)
//! - `PRICE_CLIENT_POLL_INTERVAL_SECS`: Polling interval (default: 30)
//! - `PRICE_CLIENT_RATE_LIMITED_INTERVAL_SECS`: Interval after a 429 (default: 60)
//! - `PRICE_CLIENT_COOLDOWN_SECS`: Static placeholder pin (default: 300)
//! - `PRICE_CLIENT_REQUEST_TIMEOUT_MS`: Engine call deadline (default: 10000)
//! - `PRICE_CLIENT_BINANCE_URL`, `PRICE_CLIENT_COINBASE_URL`, `PRICE_CLIENT_KRAKEN_URL`: Exchange base URLs
//! - `PRICE_CLIENT_SOURCE_TIMEOUT_MS`: Per-exchange call deadline (default: 2500)
//! - `PRICE_CLIENT_METRICS_PORT`: Prometheus exporter port (default: 9464)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`, `RUST_LOG`: Telemetry

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use market_data_engine::infrastructure::telemetry::{self, TelemetryConfig};
use price_stream_client::infrastructure::config::reload_signals;
use price_stream_client::{
    BackendClient, ClientConfig, ConnectivitySignals, Cooldown, DirectAggregationStrategy, FallbackChain, MarketView,
    PollingStrategy, PriceStrategy, PriceStream, ResilientPriceClient, StaticPlaceholderStrategy,
    StreamClient, StreamClientConfig, init_metrics,
};
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "price-stream-client";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let env_file = load_dotenv();

    let _telemetry_guard = telemetry::init_with_config(TelemetryConfig::from_env(SERVICE_NAME));

    tracing::info!("Starting Price Stream Client");

    let config = ClientConfig::from_env()?;
    log_config(&config);

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    if let Err(e) = init_metrics(metrics_addr) {
        tracing::warn!(error = %e, "Prometheus exporter unavailable");
    }

    let shutdown_token = CancellationToken::new();

    let stream = config.stream_url.as_ref().map(|url| {
        Arc::new(StreamClient::new(StreamClientConfig {
            url: url.clone(),
            allowed_hosts: config.allowed_hosts.clone(),
            reconnect: config.reconnect,
            connect_timeout: config.stream_connect_timeout,
        })) as Arc<dyn PriceStream>
    });

    // Fallback tiers 2-4, in order
    let backend = BackendClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.request_timeout,
    )?;
    let strategies: Vec<Arc<dyn PriceStrategy>> = vec![
        Arc::new(PollingStrategy::new(backend.clone())),
        Arc::new(DirectAggregationStrategy::from_settings(&config.exchanges)?),
        Arc::new(StaticPlaceholderStrategy::new(backend)),
    ];
    let chain = FallbackChain::new(strategies, Cooldown::new(config.cooldown));

    let (signals_tx, signals_rx) = watch::channel(config.signals);
    tokio::spawn(refresh_signals(
        signals_tx,
        env_file,
        config.polling.base_delay,
        shutdown_token.clone(),
    ));

    let client = ResilientPriceClient::new(
        stream,
        chain,
        config.symbols.clone(),
        config.polling,
        signals_rx,
        shutdown_token.clone(),
    );
    let views = client.subscribe();

    let client_task = tokio::spawn(client.run());
    tokio::spawn(log_views(views));

    await_shutdown(shutdown_token).await;

    if let Err(e) = client_task.await {
        tracing::error!(error = %e, "Price client task failed");
    }

    tracing::info!("Price stream client stopped");
    Ok(())
}

/// Log each published view.
async fn log_views(mut views: watch::Receiver<MarketView>) {
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        tracing::info!(
            tier = view.tier.map_or("none", |t| t.as_str()),
            indicator = %view.indicator,
            stale = view.stale,
            prices = ?view.prices,
            warning = view.warning.as_deref(),
            error = view.error.as_deref(),
            "Market view updated"
        );
    }
}

/// Re-read the connectivity signals every `interval` and publish changes.
async fn refresh_signals(
    tx: watch::Sender<ConnectivitySignals>,
    env_file: Option<PathBuf>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let fresh = reload_signals(env_file.as_deref(), *tx.borrow());
        tx.send_if_modified(|current| {
            if *current == fresh {
                return false;
            }
            tracing::info!(from = ?current, to = ?fresh, "Connectivity signals changed");
            *current = fresh;
            true
        });
    }
}

/// Load .env file from current or ancestor directories, returning its path.
fn load_dotenv() -> Option<PathBuf> {
    if let Ok(path) = dotenvy::dotenv() {
        return Some(path);
    }
    let cwd = std::env::current_dir().ok()?;
    for dir in cwd.ancestors().skip(1) {
        let env_path = dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
            return Some(env_path);
        }
    }
    None
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    let symbols: Vec<&str> = config.symbols.iter().map(|s| s.as_str()).collect();
    tracing::info!(
        api_url = %config.api_url,
        stream_url = config.stream_url.as_deref().unwrap_or("off"),
        symbols = ?symbols,
        auth = config.api_key.is_some(),
        poll_interval_secs = config.polling.base_delay.as_secs(),
        cooldown_secs = config.cooldown.as_secs(),
        "Configuration loaded"
    );
    tracing::debug!(signals = ?config.signals, allowed_hosts = ?config.allowed_hosts, "Connectivity");
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
}
