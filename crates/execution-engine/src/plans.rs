//! Ready-made batch plans for common operations.

use execution_core::{Order, OrderRequest, OrderSide};
use model::BookTop;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::batch::BatchPlan;
use crate::command::Command;
use crate::error::ValidationError;
use crate::resolver::UpdateRequest;

/// Closest the spread filler spaces its orders, as a fraction of mid.
const MIN_FILL_SPACING: Decimal = Decimal::from_parts(5, 0, 0, false, 4);

/// Cancel every given order, independently of each other.
pub fn cancel_all<'a>(orders: impl IntoIterator<Item = &'a Order>) -> BatchPlan {
    orders
        .into_iter()
        .enumerate()
        .fold(BatchPlan::continue_and_report(), |plan, (i, order)| {
            plan.with_command(Command::cancel(format!("cancel-{}-{}", i, order.id()), order.id()))
        })
}

/// Apply the same change to every given order, independently of each other.
pub fn update_all<'a>(orders: impl IntoIterator<Item = &'a Order>, update: UpdateRequest) -> BatchPlan {
    orders
        .into_iter()
        .enumerate()
        .fold(BatchPlan::continue_and_report(), |plan, (i, order)| {
            plan.with_command(Command::update(format!("update-{}-{}", i, order.id()), order.id(), update))
        })
}

/// Evenly spaced post-only orders stepping away from the spread.
#[derive(Debug, Clone)]
pub struct LadderSpec {
    pub symbol: String,
    pub side: OrderSide,
    /// Price of the level closest to the spread.
    pub start_price: Decimal,
    /// Distance between levels, always positive.
    pub step: Decimal,
    pub levels: usize,
    /// Amount per level.
    pub amount: Decimal,
}

impl LadderSpec {
    /// Price of each level. Buys step down, sells step up.
    pub fn prices(&self) -> Vec<Decimal> {
        let step = self.step * -self.side.sign();
        (0..self.levels)
            .map(|i| self.start_price + step * Decimal::from(i))
            .collect()
    }

    /// One place command per level, each depending on the previous, so a
    /// failed level unwinds the ones already resting.
    pub fn plan(&self) -> Result<BatchPlan, ValidationError> {
        if self.levels == 0 {
            return Err(ValidationError::InvalidPlan("ladder needs at least one level".to_string()));
        }
        if self.step <= Decimal::ZERO {
            return Err(ValidationError::InvalidPlan(format!("ladder step must be positive, got {}", self.step)));
        }
        let prices = self.prices();
        if let Some(last) = prices.last().filter(|p| **p <= Decimal::ZERO) {
            return Err(ValidationError::NonPositivePrice(*last));
        }

        let mut plan = BatchPlan::abort_on_first_failure();
        for (level, price) in prices.into_iter().enumerate() {
            let request = OrderRequest::new(self.symbol.clone(), self.side, self.amount, price);
            let mut command = Command::place(format!("level-{}", level), request);
            if level > 0 {
                command = command.after(format!("level-{}", level - 1));
            }
            plan.push(command);
        }
        Ok(plan)
    }
}

/// Which sides of the book a quoting plan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteSides {
    #[default]
    Both,
    BuyOnly,
    SellOnly,
}

impl QuoteSides {
    pub fn includes(&self, side: OrderSide) -> bool {
        match self {
            Self::Both => true,
            Self::BuyOnly => side == OrderSide::Buy,
            Self::SellOnly => side == OrderSide::Sell,
        }
    }
}

/// Symmetric levels around a center price. Level `i` sits `i * spread_pct`
/// percent away from the center on each quoted side.
#[derive(Debug, Clone)]
pub struct MarketMakeSpec {
    pub symbol: String,
    pub center: Decimal,
    /// Distance between levels, in percent of the center.
    pub spread_pct: Decimal,
    /// Levels per side.
    pub levels: usize,
    /// Amount per level.
    pub amount: Decimal,
    pub sides: QuoteSides,
}

impl MarketMakeSpec {
    /// Side and price of every level, lowest price first.
    pub fn quotes(&self) -> Vec<(OrderSide, Decimal)> {
        let mut quotes = Vec::with_capacity(self.levels * 2);
        for i in 1..=self.levels {
            let offset = self.center * self.spread_pct * Decimal::from(i) / Decimal::ONE_HUNDRED;
            if self.sides.includes(OrderSide::Buy) {
                quotes.push((OrderSide::Buy, self.center - offset));
            }
            if self.sides.includes(OrderSide::Sell) {
                quotes.push((OrderSide::Sell, self.center + offset));
            }
        }
        quotes.sort_by(|a, b| a.1.cmp(&b.1));
        quotes
    }

    /// One independent place command per level.
    pub fn plan(&self) -> Result<BatchPlan, ValidationError> {
        if self.levels == 0 {
            return Err(ValidationError::InvalidPlan("market making needs at least one level".to_string()));
        }
        if self.center <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice(self.center));
        }
        if self.spread_pct <= Decimal::ZERO {
            return Err(ValidationError::InvalidPlan(format!(
                "spread must be positive, got {}%",
                self.spread_pct
            )));
        }
        let quotes = self.quotes();
        if let Some((_, lowest)) = quotes.first().filter(|(_, p)| *p <= Decimal::ZERO) {
            return Err(ValidationError::NonPositivePrice(*lowest));
        }

        let mut plan = BatchPlan::continue_and_report();
        let (mut buys, mut sells) = (0, 0);
        for (side, price) in quotes {
            let level = match side {
                OrderSide::Buy => &mut buys,
                OrderSide::Sell => &mut sells,
            };
            *level += 1;
            let request = OrderRequest::new(self.symbol.clone(), side, self.amount, price);
            plan.push(Command::place(format!("{}-{}", side.as_str(), level), request));
        }
        Ok(plan)
    }
}

/// Post-only orders inside the current spread that tighten it below a target.
#[derive(Debug, Clone)]
pub struct FillSpreadSpec {
    pub symbol: String,
    /// Widest acceptable spread, in percent of mid.
    pub target_spread_pct: Decimal,
    /// Amount per order.
    pub amount: Decimal,
    /// Quote one order per side around this price instead of stepping in
    /// from the current best bid and ask.
    pub center: Option<Decimal>,
    /// Most orders placed on either side.
    pub max_levels: usize,
}

impl FillSpreadSpec {
    /// Side and price of every order, lowest price first.
    pub fn quotes(&self, top: &BookTop) -> Result<Vec<(OrderSide, Decimal)>, ValidationError> {
        if top.is_crossed() {
            return Err(ValidationError::InvalidPlan(format!(
                "book for {} is crossed ({} / {})",
                top.symbol, top.best_bid, top.best_ask
            )));
        }
        if self.target_spread_pct <= Decimal::ZERO {
            return Err(ValidationError::InvalidPlan(format!(
                "target spread must be positive, got {}%",
                self.target_spread_pct
            )));
        }
        let mid = top.mid_price();
        let current_pct = top.spread() / mid * Decimal::ONE_HUNDRED;
        if self.target_spread_pct >= current_pct {
            return Err(ValidationError::InvalidPlan(format!(
                "target spread {}% is not below the current {}%",
                self.target_spread_pct,
                current_pct.round_dp(3)
            )));
        }

        let mut quotes = Vec::new();
        match self.center {
            Some(center) => {
                // Each side only when it improves the book without crossing it
                let half = center * self.target_spread_pct / Decimal::ONE_HUNDRED / Decimal::TWO;
                let inside = |price: Decimal| price > top.best_bid && price < top.best_ask;
                if inside(center - half) {
                    quotes.push((OrderSide::Buy, center - half));
                }
                if inside(center + half) {
                    quotes.push((OrderSide::Sell, center + half));
                }
            }
            None => {
                let spacing = mid * MIN_FILL_SPACING;
                let target = mid * self.target_spread_pct / Decimal::ONE_HUNDRED;
                let tighten = (top.spread() - target) / Decimal::TWO;
                if tighten > spacing {
                    let room = whole(top.spread() / (spacing * Decimal::TWO)).max(1);
                    let levels = whole(tighten / spacing).max(1).min(room).min(self.max_levels.max(1));
                    let step = tighten / Decimal::from(levels);
                    for i in 1..=levels {
                        let offset = step * Decimal::from(i);
                        quotes.push((OrderSide::Buy, top.best_bid + offset));
                        quotes.push((OrderSide::Sell, top.best_ask - offset));
                    }
                }
            }
        }
        if quotes.is_empty() {
            return Err(ValidationError::InvalidPlan(format!(
                "no order would tighten {} toward {}%",
                top.symbol, self.target_spread_pct
            )));
        }
        quotes.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(quotes)
    }

    /// One independent place command per order.
    pub fn plan(&self, top: &BookTop) -> Result<BatchPlan, ValidationError> {
        let mut plan = BatchPlan::continue_and_report();
        for (i, (side, price)) in self.quotes(top)?.into_iter().enumerate() {
            let request = OrderRequest::new(self.symbol.clone(), side, self.amount, price);
            plan.push(Command::place(format!("fill-{}-{}", i, side.as_str()), request));
        }
        Ok(plan)
    }
}

fn whole(value: Decimal) -> usize {
    value.floor().to_usize().unwrap_or(0)
}
