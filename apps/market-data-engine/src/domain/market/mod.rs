//! Market Types
//!
//! Trading symbols and the normalized `Quote` every exchange adapter
//! produces. Exchange payloads never leave the adapter boundary; only
//! `Quote` values flow into aggregation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Symbols tracked when a request does not name any.
pub const DEFAULT_SYMBOLS: [&str; 4] = ["BTCUSD", "ETHUSD", "LTCUSD", "XRPUSD"];

const MIN_SYMBOL_LEN: usize = 6;
const MAX_SYMBOL_LEN: usize = 12;
const QUOTE_CURRENCY_LEN: usize = 3;

// =============================================================================
// Symbol
// =============================================================================

/// A trading pair identifier such as `BTCUSD`.
///
/// Always upper-case ASCII alphanumerics, ending in a three-letter quote
/// currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::Invalid` if the value is not a well-formed pair.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let normalized = raw.trim().to_ascii_uppercase();
        let len = normalized.len();

        let well_formed = (MIN_SYMBOL_LEN..=MAX_SYMBOL_LEN).contains(&len)
            && normalized.bytes().all(|b| b.is_ascii_alphanumeric())
            && normalized.as_bytes()[len - QUOTE_CURRENCY_LEN..]
                .iter()
                .all(u8::is_ascii_alphabetic);

        if well_formed {
            Ok(Self(normalized))
        } else {
            Err(SymbolError::Invalid(raw.to_string()))
        }
    }

    /// Parse a comma-separated list of symbols.
    ///
    /// Items are trimmed, empty items are skipped and duplicates are dropped
    /// while preserving first-seen order.
    ///
    /// # Errors
    ///
    /// Returns an error if any item is invalid or the list is empty.
    pub fn parse_list(csv: &str) -> Result<Vec<Self>, SymbolError> {
        let mut symbols: Vec<Self> = Vec::new();
        for item in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let symbol = Self::parse(item)?;
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        if symbols.is_empty() {
            return Err(SymbolError::Empty);
        }
        Ok(symbols)
    }

    /// The default tracked symbol set.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        DEFAULT_SYMBOLS
            .iter()
            .map(|s| Self((*s).to_string()))
            .collect()
    }

    /// The symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base asset, e.g. `BTC` for `BTCUSD`.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.0[..self.0.len() - QUOTE_CURRENCY_LEN]
    }

    /// Quote currency, e.g. `USD` for `BTCUSD`.
    #[must_use]
    pub fn quote_currency(&self) -> &str {
        &self.0[self.0.len() - QUOTE_CURRENCY_LEN..]
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// Symbol parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// The symbol is not a well-formed trading pair.
    #[error("invalid symbol: {0:?}")]
    Invalid(String),
    /// No symbols were supplied.
    #[error("symbol list is empty")]
    Empty,
}

// =============================================================================
// Quote
// =============================================================================

/// One exchange's view of one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Best bid price.
    pub bid: f64,
    /// Best ask price.
    pub ask: f64,
    /// Traded volume over the last 24 hours, in base units.
    #[serde(rename = "volume24h")]
    pub volume_24h: f64,
    /// Price change over the last 24 hours, in percent.
    #[serde(rename = "change24hPct")]
    pub change_24h_pct: f64,
}

impl Quote {
    /// Build a quote from raw exchange values.
    ///
    /// Bid and ask must be finite and positive. A non-finite or negative
    /// volume, or a non-finite change, is normalized to zero.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError::InvalidPrice` if bid or ask is unusable.
    pub fn normalized(
        bid: f64,
        ask: f64,
        volume_24h: f64,
        change_24h_pct: f64,
    ) -> Result<Self, QuoteError> {
        if !bid.is_finite() || bid <= 0.0 {
            return Err(QuoteError::InvalidPrice {
                side: "bid",
                value: bid,
            });
        }
        if !ask.is_finite() || ask <= 0.0 {
            return Err(QuoteError::InvalidPrice {
                side: "ask",
                value: ask,
            });
        }

        Ok(Self {
            bid,
            ask,
            volume_24h: if volume_24h.is_finite() && volume_24h >= 0.0 {
                volume_24h
            } else {
                0.0
            },
            change_24h_pct: if change_24h_pct.is_finite() {
                change_24h_pct
            } else {
                0.0
            },
        })
    }

    /// Mid price between bid and ask.
    #[must_use]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Absolute spread.
    #[must_use]
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Quote normalization errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuoteError {
    /// Bid or ask is non-finite or not positive.
    #[error("invalid {side} price: {value}")]
    InvalidPrice {
        /// Which side of the book.
        side: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// 24-hour change in percent from an open and a last price.
///
/// Zero when either price is missing or the open is zero.
#[must_use]
pub fn change_pct(open: Option<f64>, last: Option<f64>) -> f64 {
    match (open, last) {
        (Some(open), Some(last)) if open != 0.0 && open.is_finite() && last.is_finite() => {
            (last - open) / open * 100.0
        }
        _ => 0.0,
    }
}

// =============================================================================
// Tests
// =============================================================================
