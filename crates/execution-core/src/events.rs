//! Normalized requests, replies and stream events exchanged with the venue.
//!
//! Venue adapters decode whatever shape the exchange sends into these types;
//! nothing past this boundary looks at raw payloads.

use model::BookTop;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::correlation::OperationKind;
use crate::order::{CorrelationToken, OrderSide, OrderStatus};

/// A post-only limit order to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub token: CorrelationToken,
    pub symbol: String,
    pub side: OrderSide,
    /// Unsigned amount.
    pub amount: Decimal,
    pub price: Decimal,
}

impl OrderRequest {
    /// Build a request with a freshly generated correlation token.
    pub fn new(symbol: impl Into<String>, side: OrderSide, amount: Decimal, price: Decimal) -> Self {
        Self {
            token: CorrelationToken::generate(),
            symbol: symbol.into(),
            side,
            amount: amount.abs(),
            price,
        }
    }

    /// Amount with the venue's sign convention (positive = buy).
    pub fn signed_amount(&self) -> Decimal {
        self.amount * self.side.sign()
    }

    pub fn notional(&self) -> Decimal {
        self.amount * self.price
    }
}

/// An order as reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub exchange_id: u64,
    pub token: Option<CorrelationToken>,
    pub symbol: String,
    /// Signed remaining amount.
    pub amount: Decimal,
    /// Signed amount at submission.
    pub original_amount: Decimal,
    pub price: Decimal,
    pub status: OrderStatus,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl OrderSnapshot {
    /// Side from the original amount, falling back to the remaining amount.
    pub fn side(&self) -> OrderSide {
        OrderSide::from_signed_amount(self.original_amount)
            .or_else(|| OrderSide::from_signed_amount(self.amount))
            .unwrap_or(OrderSide::Buy)
    }
}

/// Synchronous reply to a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionResult {
    Accepted(OrderSnapshot),
    Rejected { reason: String },
}

/// Synchronous reply to a cancel request.
#[derive(Debug, Clone, PartialEq)]
pub enum CancellationResult {
    /// The venue accepted the cancel. The snapshot, when present, is the
    /// order state at acknowledgement time; the close may arrive later.
    Accepted(Option<OrderSnapshot>),
    Rejected { reason: String },
    /// The venue does not know the order (already closed or never existed).
    NotFound,
}

/// Synchronous reply to an atomic update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateResult {
    Applied(OrderSnapshot),
    Rejected { reason: String, retryable: bool },
}

/// Requested modification of a resting order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderChanges {
    pub price: Option<Decimal>,
    /// New unsigned remaining amount.
    pub amount: Option<Decimal>,
}

impl OrderChanges {
    pub fn price(price: Decimal) -> Self {
        Self {
            price: Some(price),
            amount: None,
        }
    }

    pub fn amount(amount: Decimal) -> Self {
        Self {
            price: None,
            amount: Some(amount),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.amount.is_none()
    }

    pub fn is_amount_only(&self) -> bool {
        self.price.is_none() && self.amount.is_some()
    }
}

/// Kind of an order stream message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEventKind {
    New,
    Update,
    Closed,
}

/// Decoded event from the streaming channel.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueEvent {
    Order {
        kind: OrderEventKind,
        order: OrderSnapshot,
    },
    /// Full list of open orders, sent right after authentication.
    OrderSnapshot(Vec<OrderSnapshot>),
    Ticker(BookTop),
    /// A request sent over the stream was refused.
    RequestFailed {
        kind: OperationKind,
        token: Option<CorrelationToken>,
        exchange_id: Option<u64>,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_normalizes_amount() {
        let req = OrderRequest::new("tBTCUSD", OrderSide::Sell, dec!(-2), dec!(100));
        assert_eq!(req.amount, dec!(2));
        assert_eq!(req.signed_amount(), dec!(-2));
        assert_eq!(req.notional(), dec!(200));
    }

    #[test]
    fn test_requests_get_distinct_tokens() {
        let a = OrderRequest::new("tBTCUSD", OrderSide::Buy, dec!(1), dec!(1));
        let b = OrderRequest::new("tBTCUSD", OrderSide::Buy, dec!(1), dec!(1));
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_snapshot_side_from_original_amount() {
        let snap = OrderSnapshot {
            exchange_id: 1,
            token: None,
            symbol: "tBTCUSD".into(),
            amount: dec!(0),
            original_amount: dec!(-3),
            price: dec!(10),
            status: OrderStatus::Filled,
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        assert_eq!(snap.side(), OrderSide::Sell);
    }

    #[test]
    fn test_changes_classification() {
        assert!(OrderChanges::default().is_empty());
        assert!(OrderChanges::amount(dec!(1)).is_amount_only());
        assert!(!OrderChanges::price(dec!(1)).is_amount_only());
        let both = OrderChanges {
            price: Some(dec!(1)),
            amount: Some(dec!(2)),
        };
        assert!(!both.is_amount_only());
    }
}
