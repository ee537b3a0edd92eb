//! Configuration Module
//!
//! Configuration loading for the engine service.

mod settings;

pub use settings::{
    ApiKey, ConfigError, EngineConfig, ExchangeSettings, HubSettings, ServerSettings,
    parse_bool, parse_env_duration_millis, parse_env_duration_secs, parse_env_u16,
    parse_env_u32, parse_env_usize, parse_symbols,
};
