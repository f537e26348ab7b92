//! Pre-flight checks run before any request leaves the process.

use std::sync::Arc;
use std::time::Duration;

use common::{now_ms, BitfinexEnvironment};
use execution_core::{OrderRequest, OrderSide};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::ValidationError;
use crate::quotes::SharedQuoteBoard;

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Minimum order notional, if any.
    pub min_order_notional: Option<Decimal>,
    /// Maximum order notional, if any.
    pub max_order_notional: Option<Decimal>,
    /// Quotes older than this are not trusted for the crossing check.
    pub max_quote_age: Option<Duration>,
    /// Decides which symbols are tradable.
    pub environment: BitfinexEnvironment,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_order_notional: None,
            max_order_notional: None,
            max_quote_age: Some(Duration::from_secs(30)),
            environment: BitfinexEnvironment::Production,
        }
    }
}

/// Maker-only and sanity checks for order requests.
pub struct OrderValidator {
    config: ValidationConfig,
    quotes: SharedQuoteBoard,
}

impl OrderValidator {
    pub fn new(config: ValidationConfig, quotes: SharedQuoteBoard) -> Self {
        Self { config, quotes }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn quotes(&self) -> &SharedQuoteBoard {
        &self.quotes
    }

    /// Validate a request that is about to be submitted.
    pub fn validate_request(&self, request: &OrderRequest) -> Result<(), ValidationError> {
        if request.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(request.amount));
        }
        if request.price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice(request.price));
        }
        if !self.config.environment.allows_symbol(&request.symbol) {
            return Err(ValidationError::SymbolNotAllowed {
                symbol: request.symbol.clone(),
                environment: self.config.environment.to_string(),
            });
        }
        self.validate_notional(request.notional())?;
        self.validate_maker(&request.symbol, request.side, request.price)?;

        debug!(
            symbol = %request.symbol,
            side = request.side.as_str(),
            price = %request.price,
            amount = %request.amount,
            "Request validated"
        );
        Ok(())
    }

    fn validate_notional(&self, notional: Decimal) -> Result<(), ValidationError> {
        if let Some(min) = self.config.min_order_notional {
            if notional < min {
                return Err(ValidationError::NotionalTooSmall { notional, min });
            }
        }
        if let Some(max) = self.config.max_order_notional {
            if notional > max {
                return Err(ValidationError::NotionalTooLarge { notional, max });
            }
        }
        Ok(())
    }

    /// A buy must rest below the best ask and a sell above the best bid.
    /// Without a usable quote the order is refused.
    pub fn validate_maker(&self, symbol: &str, side: OrderSide, price: Decimal) -> Result<(), ValidationError> {
        let top = self
            .quotes
            .get(symbol)
            .ok_or_else(|| ValidationError::NoQuote(symbol.to_string()))?;

        if let Some(max_age) = self.config.max_quote_age {
            let age_ms = now_ms() - top.timestamp_ms;
            if age_ms > max_age.as_millis() as i64 {
                return Err(ValidationError::StaleQuote {
                    symbol: symbol.to_string(),
                    age_ms,
                });
            }
        }

        let crosses = match side {
            OrderSide::Buy => price >= top.best_ask,
            OrderSide::Sell => price <= top.best_bid,
        };
        if crosses {
            return Err(ValidationError::WouldCross {
                side,
                price,
                best_bid: top.best_bid,
                best_ask: top.best_ask,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for OrderValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderValidator")
            .field("config", &self.config)
            .finish()
    }
}

pub type SharedValidator = Arc<OrderValidator>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::create_quote_board;
    use model::BookTop;
    use rust_decimal_macros::dec;

    fn validator(config: ValidationConfig) -> OrderValidator {
        let quotes = create_quote_board();
        quotes.update(BookTop::new("tBTCUSD", dec!(99), dec!(101), now_ms()));
        quotes.update(BookTop::new("tTESTBTC:TESTUSD", dec!(99), dec!(101), now_ms()));
        OrderValidator::new(config, quotes)
    }

    fn buy(price: Decimal) -> OrderRequest {
        OrderRequest::new("tBTCUSD", OrderSide::Buy, dec!(1), price)
    }

    #[test]
    fn test_resting_orders_pass() {
        let v = validator(ValidationConfig::default());
        assert!(v.validate_request(&buy(dec!(100))).is_ok());
        assert!(v
            .validate_request(&OrderRequest::new("tBTCUSD", OrderSide::Sell, dec!(1), dec!(100)))
            .is_ok());
    }

    #[test]
    fn test_crossing_orders_rejected() {
        let v = validator(ValidationConfig::default());
        assert!(matches!(
            v.validate_request(&buy(dec!(101))),
            Err(ValidationError::WouldCross { .. })
        ));
        assert!(matches!(
            v.validate_request(&OrderRequest::new("tBTCUSD", OrderSide::Sell, dec!(1), dec!(99))),
            Err(ValidationError::WouldCross { .. })
        ));
    }

    #[test]
    fn test_missing_and_stale_quotes() {
        let v = validator(ValidationConfig::default());
        let eth = OrderRequest::new("tETHUSD", OrderSide::Buy, dec!(1), dec!(10));
        assert!(matches!(v.validate_request(&eth), Err(ValidationError::NoQuote(_))));

        v.quotes()
            .update(BookTop::new("tETHUSD", dec!(9), dec!(11), now_ms() - 60_000));
        assert!(matches!(
            v.validate_request(&eth),
            Err(ValidationError::StaleQuote { .. })
        ));
    }

    #[test]
    fn test_notional_bounds() {
        let v = validator(ValidationConfig {
            min_order_notional: Some(dec!(50)),
            max_order_notional: Some(dec!(150)),
            ..Default::default()
        });
        let small = OrderRequest::new("tBTCUSD", OrderSide::Buy, dec!(0.1), dec!(100));
        assert!(matches!(
            v.validate_request(&small),
            Err(ValidationError::NotionalTooSmall { .. })
        ));
        let large = OrderRequest::new("tBTCUSD", OrderSide::Buy, dec!(2), dec!(100));
        assert!(matches!(
            v.validate_request(&large),
            Err(ValidationError::NotionalTooLarge { .. })
        ));
    }

    #[test]
    fn test_paper_environment_requires_test_pairs() {
        let v = validator(ValidationConfig {
            environment: BitfinexEnvironment::Paper,
            ..Default::default()
        });
        assert!(matches!(
            v.validate_request(&buy(dec!(100))),
            Err(ValidationError::SymbolNotAllowed { .. })
        ));
        let test_pair = OrderRequest::new("tTESTBTC:TESTUSD", OrderSide::Buy, dec!(1), dec!(100));
        assert!(v.validate_request(&test_pair).is_ok());
    }

    #[test]
    fn test_non_positive_values() {
        let v = validator(ValidationConfig::default());
        let mut request = buy(dec!(100));
        request.amount = dec!(0);
        assert!(matches!(
            v.validate_request(&request),
            Err(ValidationError::NonPositiveAmount(_))
        ));
        assert!(matches!(
            v.validate_request(&buy(dec!(-1))),
            Err(ValidationError::NonPositivePrice(_))
        ));
    }
}
