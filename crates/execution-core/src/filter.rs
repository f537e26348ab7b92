use rust_decimal::Decimal;

use crate::order::{Order, OrderSide, OrderStatus};

/// Criteria for selecting orders from the working set.
///
/// All set fields must match. Price bounds are strict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub symbol: Option<String>,
    pub side: Option<OrderSide>,
    pub statuses: Option<Vec<OrderStatus>>,
    /// Only `live` / `partially_filled` orders.
    pub active_only: bool,
    /// Exact unsigned remaining amount.
    pub amount: Option<Decimal>,
    pub price_below: Option<Decimal>,
    pub price_above: Option<Decimal>,
}

impl OrderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_side(mut self, side: OrderSide) -> Self {
        self.side = Some(side);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount.abs());
        self
    }

    pub fn with_price_below(mut self, price: Decimal) -> Self {
        self.price_below = Some(price);
        self
    }

    pub fn with_price_above(mut self, price: Decimal) -> Self {
        self.price_above = Some(price);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        if self.active_only && !order.status().is_active() {
            return false;
        }
        if let Some(symbol) = &self.symbol {
            if order.symbol() != symbol {
                return false;
            }
        }
        if let Some(side) = self.side {
            if order.side() != side {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&order.status()) {
                return false;
            }
        }
        if let Some(amount) = self.amount {
            if order.remaining() != amount {
                return false;
            }
        }
        if let Some(below) = self.price_below {
            if order.price() >= below {
                return false;
            }
        }
        if let Some(above) = self.price_above {
            if order.price() <= above {
                return false;
            }
        }
        true
    }
}
