//! Latest best bid/ask per symbol, used by the maker-only check.

use std::collections::HashMap;
use std::sync::Arc;

use model::BookTop;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct QuoteBoard {
    quotes: RwLock<HashMap<String, BookTop>>,
}

impl QuoteBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a quote unless an equally fresh or newer one is already held.
    pub fn update(&self, top: BookTop) {
        let mut quotes = self.quotes.write();
        match quotes.get(&top.symbol) {
            Some(existing) if existing.timestamp_ms > top.timestamp_ms => {}
            _ => {
                quotes.insert(top.symbol.clone(), top);
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<BookTop> {
        self.quotes.read().get(symbol).cloned()
    }
}

pub type SharedQuoteBoard = Arc<QuoteBoard>;

pub fn create_quote_board() -> SharedQuoteBoard {
    Arc::new(QuoteBoard::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_older_quote_ignored() {
        let board = QuoteBoard::new();
        board.update(BookTop::new("tBTCUSD", dec!(100), dec!(101), 2_000));
        board.update(BookTop::new("tBTCUSD", dec!(90), dec!(91), 1_000));

        let top = board.get("tBTCUSD").unwrap();
        assert_eq!(top.best_bid, dec!(100));

        board.update(BookTop::new("tBTCUSD", dec!(102), dec!(103), 3_000));
        assert_eq!(board.get("tBTCUSD").unwrap().best_bid, dec!(102));
    }
}
