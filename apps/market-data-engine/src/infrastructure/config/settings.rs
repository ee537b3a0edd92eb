//! Engine Configuration Settings
//!
//! Configuration types for the engine, loaded from environment variables.
//! The `parse_env_*` helpers fall back to the default when a variable is
//! unset or unparsable.

use std::time::Duration;

use crate::application::services::{
    DEFAULT_PRICE_LIST_TTL, DEFAULT_SNAPSHOT_TTL, DEFAULT_SOURCE_TIMEOUT,
};
use crate::domain::history::DEFAULT_HISTORY_CAPACITY;
use crate::domain::market::Symbol;
use crate::infrastructure::exchanges::{BINANCE_BASE_URL, COINBASE_BASE_URL, KRAKEN_BASE_URL};

const ENV_PREFIX: &str = "ENGINE_";

/// Shared secret expected in the `x-api-key` header.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key. Returns `None` for an empty or blank value.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// Get the raw key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Compare against a presented key without short-circuiting on the
    /// first differing byte.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// HTTP listener and cache settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listener port for the API, stream and operational endpoints.
    pub port: u16,
    /// Snapshot memo freshness window.
    pub cache_ttl: Duration,
    /// Flat price list freshness window.
    pub prices_ttl: Duration,
    /// Points retained per symbol.
    pub history_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            cache_ttl: DEFAULT_SNAPSHOT_TTL,
            prices_ttl: DEFAULT_PRICE_LIST_TTL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Distribution hub settings.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Interval between `PRICE_UPDATE` broadcasts.
    pub broadcast_interval: Duration,
    /// Per-subscriber outbound queue depth.
    pub channel_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            broadcast_interval: Duration::from_secs(5),
            channel_capacity: 32,
        }
    }
}

/// Exchange endpoints and call deadline.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// Binance REST base URL.
    pub binance_url: String,
    /// Coinbase REST base URL.
    pub coinbase_url: String,
    /// Kraken REST base URL.
    pub kraken_url: String,
    /// Per-call deadline.
    pub source_timeout: Duration,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            binance_url: BINANCE_BASE_URL.to_string(),
            coinbase_url: COINBASE_BASE_URL.to_string(),
            kraken_url: KRAKEN_BASE_URL.to_string(),
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }
}

impl ExchangeSettings {
    /// Read `{prefix}BINANCE_URL`, `{prefix}COINBASE_URL`, `{prefix}KRAKEN_URL`
    /// and `{prefix}SOURCE_TIMEOUT_MS`.
    #[must_use]
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        Self {
            binance_url: env_string(&format!("{prefix}BINANCE_URL"))
                .unwrap_or(defaults.binance_url),
            coinbase_url: env_string(&format!("{prefix}COINBASE_URL"))
                .unwrap_or(defaults.coinbase_url),
            kraken_url: env_string(&format!("{prefix}KRAKEN_URL")).unwrap_or(defaults.kraken_url),
            source_timeout: parse_env_duration_millis(
                &format!("{prefix}SOURCE_TIMEOUT_MS"),
                defaults.source_timeout,
            ),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Listener and cache settings.
    pub server: ServerSettings,
    /// Distribution hub settings.
    pub hub: HubSettings,
    /// Exchange settings.
    pub exchanges: ExchangeSettings,
    /// Required `x-api-key` value; `None` leaves the API open.
    pub api_key: Option<ApiKey>,
    /// Symbols used when a request names none, and for the broadcast.
    pub symbols: Vec<Symbol>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            hub: HubSettings::default(),
            exchanges: ExchangeSettings::default(),
            api_key: None,
            symbols: Symbol::defaults(),
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `ENGINE_SYMBOLS` is set but not a valid symbol list.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_defaults = ServerSettings::default();
        let hub_defaults = HubSettings::default();

        let server = ServerSettings {
            port: parse_env_u16("ENGINE_PORT", server_defaults.port),
            cache_ttl: parse_env_duration_millis("ENGINE_CACHE_TTL_MS", server_defaults.cache_ttl),
            prices_ttl: parse_env_duration_millis(
                "ENGINE_PRICES_TTL_MS",
                server_defaults.prices_ttl,
            ),
            history_capacity: parse_env_usize(
                "ENGINE_HISTORY_CAPACITY",
                server_defaults.history_capacity,
            ),
        };

        let hub = HubSettings {
            broadcast_interval: parse_env_duration_secs(
                "ENGINE_BROADCAST_INTERVAL_SECS",
                hub_defaults.broadcast_interval,
            ),
            channel_capacity: parse_env_usize(
                "ENGINE_HUB_CHANNEL_CAPACITY",
                hub_defaults.channel_capacity,
            )
            .max(1),
        };

        Ok(Self {
            server,
            hub,
            exchanges: ExchangeSettings::from_env(ENV_PREFIX),
            api_key: env_string("ENGINE_API_KEY").and_then(ApiKey::new),
            symbols: parse_symbols("ENGINE_SYMBOLS", env_string("ENGINE_SYMBOLS").as_deref())?,
        })
    }
}

/// Parse a symbol list variable, falling back to the defaults when unset.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the value is not a valid list.
pub fn parse_symbols(key: &str, value: Option<&str>) -> Result<Vec<Symbol>, ConfigError> {
    match value {
        None => Ok(Symbol::defaults()),
        Some(csv) => Symbol::parse_list(csv).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be interpreted.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read a `u16`, or `default`.
#[must_use]
pub fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a `u32`, or `default`.
#[must_use]
pub fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a `usize`, or `default`.
#[must_use]
pub fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Interpret a boolean flag (`1`/`true`/`yes`/`on` and their negatives);
/// `None` if it is neither.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read whole seconds as a `Duration`, or `default`.
#[must_use]
pub fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

/// Read milliseconds as a `Duration`, or `default`.
#[must_use]
pub fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
