//! Exchange REST adapters.
//!
//! Each adapter implements [`QuoteSource`] and normalizes its exchange's
//! ticker payload into a [`Quote`](crate::domain::market::Quote) before it
//! leaves the module.

use std::sync::Arc;

mod binance;
mod coinbase;
mod http_client;
mod kraken;

pub use binance::{BINANCE_BASE_URL, BinanceSource};
pub use coinbase::{COINBASE_BASE_URL, CoinbaseSource};
pub use http_client::{ExchangeHttpClient, parse_number};
pub use kraken::{KRAKEN_BASE_URL, KrakenSource};

use crate::application::ports::{QuoteSource, SourceError};
use crate::infrastructure::config::ExchangeSettings;

/// Build the standard Binance, Coinbase and Kraken source set.
///
/// # Errors
///
/// Returns `SourceError` if an HTTP client cannot be built.
pub fn default_sources(
    settings: &ExchangeSettings,
) -> Result<Vec<Arc<dyn QuoteSource>>, SourceError> {
    let timeout = settings.source_timeout;
    Ok(vec![
        Arc::new(BinanceSource::new(settings.binance_url.clone(), timeout)?),
        Arc::new(CoinbaseSource::new(settings.coinbase_url.clone(), timeout)?),
        Arc::new(KrakenSource::new(settings.kraken_url.clone(), timeout)?),
    ])
}
