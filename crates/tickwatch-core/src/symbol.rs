//! Instrument identification.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted symbol length.
pub const MAX_SYMBOL_LEN: usize = 16;

/// Instrument symbol (e.g., "2330" for TSMC, "0050" for an ETF).
///
/// Validated on construction: non-empty, ASCII alphanumeric, at most
/// [`MAX_SYMBOL_LEN`] characters. Surrounding whitespace is trimmed and
/// letters are upper-cased, so "tsla " and "TSLA" name the same instrument.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidSymbol("symbol is empty".to_string()));
        }
        if trimmed.len() > MAX_SYMBOL_LEN {
            return Err(CoreError::InvalidSymbol(format!(
                "symbol longer than {MAX_SYMBOL_LEN} characters: {trimmed}"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidSymbol(format!(
                "symbol must be alphanumeric: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
