//! Market data types shared across the workspace.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exchange {
    Bitfinex,
}

/// Best bid and ask for a trading pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTop {
    pub exchange: Exchange,
    pub symbol: String,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub timestamp_ms: i64,
}

impl BookTop {
    pub fn new(symbol: impl Into<String>, best_bid: Decimal, best_ask: Decimal, timestamp_ms: i64) -> Self {
        Self {
            exchange: Exchange::Bitfinex,
            symbol: symbol.into(),
            best_bid,
            best_ask,
            timestamp_ms,
        }
    }

    pub fn mid_price(&self) -> Decimal {
        (self.best_bid + self.best_ask) / Decimal::TWO
    }

    pub fn spread(&self) -> Decimal {
        self.best_ask - self.best_bid
    }

    /// A book is crossed or locked when bid >= ask; quotes from it are unusable.
    pub fn is_crossed(&self) -> bool {
        self.best_bid >= self.best_ask
    }
}
