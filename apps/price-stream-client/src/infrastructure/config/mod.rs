//! Client Configuration
//!
//! Loaded from `PRICE_CLIENT_*` environment variables. Unset or unparsable
//! numeric values fall back to their defaults; a malformed symbol list is
//! an error.

use std::path::Path;
use std::time::Duration;

use market_data_engine::infrastructure::config::{
    parse_bool, parse_env_duration_millis, parse_env_duration_secs, parse_env_u16,
    parse_env_u32, parse_symbols,
};
use market_data_engine::{ApiKey, ConfigError, ExchangeSettings, Symbol};

use crate::domain::backoff::BackoffConfig;
use crate::domain::tiers::{ConnectivitySignals, DEFAULT_COOLDOWN};
use crate::infrastructure::stream::DEFAULT_CONNECT_TIMEOUT;

const ENV_PREFIX: &str = "PRICE_CLIENT_";

/// Default engine REST base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Default engine price stream URL.
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8080/ws";

/// Default deadline for engine REST calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default Prometheus exporter port.
pub const DEFAULT_METRICS_PORT: u16 = 9464;

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Engine REST base URL.
    pub api_url: String,
    /// Engine WebSocket URL; `None` disables the stream tier.
    pub stream_url: Option<String>,
    /// Hosts the stream may connect to; empty allows any.
    pub allowed_hosts: Vec<String>,
    /// Sent as `x-api-key` on engine REST calls.
    pub api_key: Option<ApiKey>,
    /// Symbols to track.
    pub symbols: Vec<Symbol>,
    /// Initial connectivity signals.
    pub signals: ConnectivitySignals,
    /// Stream reconnect schedule.
    pub reconnect: BackoffConfig,
    /// Deadline for the stream handshake.
    pub stream_connect_timeout: Duration,
    /// Poll interval (`base_delay`) and rate-limited interval (`max_delay`).
    pub polling: BackoffConfig,
    /// How long the static placeholder stays pinned.
    pub cooldown: Duration,
    /// Deadline for engine REST calls.
    pub request_timeout: Duration,
    /// Exchange endpoints for direct aggregation.
    pub exchanges: ExchangeSettings,
    /// Prometheus exporter port.
    pub metrics_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            stream_url: Some(DEFAULT_STREAM_URL.to_string()),
            allowed_hosts: Vec::new(),
            api_key: None,
            symbols: Symbol::defaults(),
            signals: ConnectivitySignals::default(),
            reconnect: BackoffConfig::reconnect(),
            stream_connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            polling: BackoffConfig::polling(),
            cooldown: DEFAULT_COOLDOWN,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            exchanges: ExchangeSettings::default(),
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICE_CLIENT_SYMBOLS` is set but not a valid
    /// symbol list.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let stream_url = match env_string("PRICE_CLIENT_STREAM_URL") {
            Some(url) if url.eq_ignore_ascii_case("off") => None,
            Some(url) => Some(url),
            None => defaults.stream_url,
        };

        let signals = signals_from(|key| std::env::var(key).ok(), defaults.signals);

        let reconnect = BackoffConfig {
            base_delay: parse_env_duration_millis(
                "PRICE_CLIENT_RECONNECT_BASE_MS",
                defaults.reconnect.base_delay,
            ),
            max_delay: parse_env_duration_millis(
                "PRICE_CLIENT_RECONNECT_MAX_MS",
                defaults.reconnect.max_delay,
            ),
            max_jitter: parse_env_duration_millis(
                "PRICE_CLIENT_RECONNECT_JITTER_MS",
                defaults.reconnect.max_jitter,
            ),
            max_attempts: parse_env_u32(
                "PRICE_CLIENT_RECONNECT_MAX_ATTEMPTS",
                defaults.reconnect.max_attempts,
            ),
        };

        let polling = BackoffConfig {
            base_delay: parse_env_duration_secs(
                "PRICE_CLIENT_POLL_INTERVAL_SECS",
                defaults.polling.base_delay,
            ),
            max_delay: parse_env_duration_secs(
                "PRICE_CLIENT_RATE_LIMITED_INTERVAL_SECS",
                defaults.polling.max_delay,
            ),
            ..defaults.polling
        };

        Ok(Self {
            api_url: env_string("PRICE_CLIENT_API_URL").unwrap_or(defaults.api_url),
            stream_url,
            allowed_hosts: env_string("PRICE_CLIENT_ALLOWED_HOSTS")
                .map(|v| parse_hosts(&v))
                .unwrap_or_default(),
            api_key: env_string("PRICE_CLIENT_API_KEY").and_then(ApiKey::new),
            symbols: parse_symbols(
                "PRICE_CLIENT_SYMBOLS",
                env_string("PRICE_CLIENT_SYMBOLS").as_deref(),
            )?,
            signals,
            reconnect,
            stream_connect_timeout: parse_env_duration_millis(
                "PRICE_CLIENT_STREAM_CONNECT_TIMEOUT_MS",
                defaults.stream_connect_timeout,
            ),
            polling,
            cooldown: parse_env_duration_secs("PRICE_CLIENT_COOLDOWN_SECS", defaults.cooldown),
            request_timeout: parse_env_duration_millis(
                "PRICE_CLIENT_REQUEST_TIMEOUT_MS",
                defaults.request_timeout,
            ),
            exchanges: ExchangeSettings::from_env(ENV_PREFIX),
            metrics_port: parse_env_u16("PRICE_CLIENT_METRICS_PORT", defaults.metrics_port),
        })
    }
}

/// Read the connectivity signals through `lookup`, keeping `fallback` for
/// unset or unparsable keys.
pub fn signals_from(
    lookup: impl Fn(&str) -> Option<String>,
    fallback: ConnectivitySignals,
) -> ConnectivitySignals {
    let flag = |key: &str, default: bool| {
        lookup(key)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(default)
    };
    ConnectivitySignals {
        online: flag("PRICE_CLIENT_ONLINE", fallback.online),
        static_hosting: flag("PRICE_CLIENT_STATIC_HOSTING", fallback.static_hosting),
        external_calls_disabled: flag(
            "PRICE_CLIENT_EXTERNAL_CALLS_DISABLED",
            fallback.external_calls_disabled,
        ),
    }
}

/// Re-read the connectivity signals at runtime.
///
/// Values in `env_file` win over the process environment, so editing the
/// file changes the signals without a restart. An unreadable file falls
/// back to the process environment alone.
#[must_use]
pub fn reload_signals(
    env_file: Option<&Path>,
    fallback: ConnectivitySignals,
) -> ConnectivitySignals {
    let from_env = signals_from(|key| std::env::var(key).ok(), fallback);

    let Some(path) = env_file else {
        return from_env;
    };
    match dotenvy::from_path_iter(path) {
        Ok(iter) => {
            let entries: Vec<(String, String)> = iter.filter_map(Result::ok).collect();
            signals_from(
                |key| {
                    entries
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone())
                },
                from_env,
            )
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Env file unreadable");
            from_env
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Split a comma-separated host list, dropping blanks.
fn parse_hosts(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_lowercase)
        .collect()
}
