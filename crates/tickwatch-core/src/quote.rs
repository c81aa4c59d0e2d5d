//! Inbound tick from the live quote feed. Never persisted.

use crate::decimal::{Price, Volume};
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    /// Last traded price; absent when the instrument has not traded.
    pub price: Option<Price>,
    /// Cumulative traded volume for the session.
    pub volume: Volume,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(symbol: Symbol, price: Option<Price>, volume: Volume, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol,
            price,
            volume,
            timestamp,
        }
    }

    /// The last price if it can be matched against thresholds.
    ///
    /// Zero and negative prices are feed artifacts and are treated as absent.
    #[inline]
    pub fn tradable_price(&self) -> Option<Price> {
        self.price.filter(|p| p.is_positive())
    }
}
