//! Canonical order model: identities, statuses and the order record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::events::{OrderRequest, OrderSnapshot};

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side implied by a signed amount (positive = buy). Zero has no side.
    pub fn from_signed_amount(amount: Decimal) -> Option<Self> {
        if amount > Decimal::ZERO {
            Some(Self::Buy)
        } else if amount < Decimal::ZERO {
            Some(Self::Sell)
        } else {
            None
        }
    }

    /// `1` for buys, `-1` for sells.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" | "b" | "bid" => Ok(Self::Buy),
            "sell" | "s" | "ask" => Ok(Self::Sell),
            other => Err(format!("invalid side '{}'", other)),
        }
    }
}

/// Locally generated identity used until the venue assigns one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaceholderId(Uuid);

impl PlaceholderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ph_{}", self.0.as_simple())
    }
}

/// Order identity: a placeholder until confirmed by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderId {
    Placeholder(PlaceholderId),
    Confirmed(u64),
}

impl OrderId {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    /// Exchange id, if confirmed.
    pub fn exchange_id(&self) -> Option<u64> {
        match self {
            Self::Confirmed(id) => Some(*id),
            Self::Placeholder(_) => None,
        }
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder(ph) => write!(f, "{}", ph),
            Self::Confirmed(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for OrderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(raw) = s.strip_prefix("ph_") {
            return Uuid::parse_str(raw)
                .map(|uuid| Self::Placeholder(PlaceholderId(uuid)))
                .map_err(|e| format!("invalid placeholder id '{}': {}", s, e));
        }
        s.parse::<u64>()
            .map(Self::Confirmed)
            .map_err(|_| format!("invalid order id '{}'", s))
    }
}

/// Client-generated token carried in a request and echoed by the venue.
///
/// Bitfinex limits client ids to 45 bits, so tokens stay in that range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationToken(u64);

impl CorrelationToken {
    const MASK: u64 = (1 << 45) - 1;

    pub fn generate() -> Self {
        let raw = (Uuid::new_v4().as_u128() as u64) & Self::MASK;
        Self(raw.max(1))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Submitted, no confirmation seen yet.
    PendingSubmit,
    /// Resting on the book.
    Live,
    PartiallyFilled,
    Cancelled,
    Filled,
    Rejected,
    /// Confirmation deadline passed; only a snapshot refresh or a late event resolves it.
    Unknown,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Filled | Self::Rejected)
    }

    /// Resting on the book and eligible for cancel or update.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Live | Self::PartiallyFilled)
    }

    /// Whether a record in this status may move to `next`.
    ///
    /// Terminal statuses only give way to a higher-ranked terminal status:
    /// the venue may report a fill for an order it had acknowledged as
    /// cancelled when the two crossed, and the fill is what happened.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if !self.is_terminal() || *self == next {
            return true;
        }
        next.is_terminal() && next.rank() > self.rank()
    }

    /// Position in the merge order. Terminal statuses outrank everything,
    /// and a fill outranks a cancel reported for the same order.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::PendingSubmit => 0,
            Self::Unknown => 1,
            Self::Live => 2,
            Self::PartiallyFilled => 3,
            Self::Rejected => 4,
            Self::Cancelled => 5,
            Self::Filled => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSubmit => "pending_submit",
            Self::Live => "live",
            Self::PartiallyFilled => "partially_filled",
            Self::Cancelled => "cancelled",
            Self::Filled => "filled",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refused status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("order {id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// What happened when a venue snapshot was folded into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absorbed {
    /// The snapshot advanced the record.
    Applied,
    /// Same state as already recorded.
    Duplicate,
    /// Older than what the record already holds.
    Stale,
}

/// A canonical order record.
///
/// Fields are private so that the maker-only flag and the terminal-status
/// guard cannot be bypassed; only the reconciler mutates records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    id: OrderId,
    placeholder: Option<PlaceholderId>,
    token: Option<CorrelationToken>,
    symbol: String,
    side: OrderSide,
    /// Signed remaining amount (positive = buy).
    amount: Decimal,
    /// Signed amount at submission.
    original_amount: Decimal,
    price: Decimal,
    status: OrderStatus,
    maker_only: bool,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl Order {
    /// New record for a request that has not been answered yet.
    pub fn pending(placeholder: PlaceholderId, request: &OrderRequest, now_ms: i64) -> Self {
        let signed = request.signed_amount();
        Self {
            id: OrderId::Placeholder(placeholder),
            placeholder: Some(placeholder),
            token: Some(request.token),
            symbol: request.symbol.clone(),
            side: request.side,
            amount: signed,
            original_amount: signed,
            price: request.price,
            status: OrderStatus::PendingSubmit,
            maker_only: true,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Record for an order first seen through a venue report.
    pub fn from_snapshot(snapshot: &OrderSnapshot) -> Self {
        Self {
            id: OrderId::Confirmed(snapshot.exchange_id),
            placeholder: None,
            token: snapshot.token,
            symbol: snapshot.symbol.clone(),
            side: snapshot.side(),
            amount: snapshot.amount,
            original_amount: snapshot.original_amount,
            price: snapshot.price,
            status: snapshot.status,
            maker_only: true,
            created_at_ms: snapshot.created_at_ms,
            updated_at_ms: snapshot.updated_at_ms,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    /// The placeholder this order was tracked under before confirmation.
    pub fn placeholder(&self) -> Option<PlaceholderId> {
        self.placeholder
    }

    pub fn token(&self) -> Option<CorrelationToken> {
        self.token
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    /// Signed remaining amount.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Unsigned remaining amount.
    pub fn remaining(&self) -> Decimal {
        self.amount.abs()
    }

    pub fn original_amount(&self) -> Decimal {
        self.original_amount
    }

    /// Unsigned filled amount.
    pub fn filled(&self) -> Decimal {
        (self.original_amount.abs() - self.amount.abs()).max(Decimal::ZERO)
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Always true: no code path produces a taker order.
    pub fn is_maker_only(&self) -> bool {
        self.maker_only
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn updated_at_ms(&self) -> i64 {
        self.updated_at_ms
    }

    /// Refers to this order by either of its identities.
    pub fn answers_to(&self, id: &OrderId) -> bool {
        match id {
            OrderId::Confirmed(_) => self.id == *id,
            OrderId::Placeholder(ph) => self.placeholder == Some(*ph),
        }
    }

    /// Swap the placeholder identity for the venue identity. Happens once.
    pub(crate) fn confirm(&mut self, exchange_id: u64) -> bool {
        match self.id {
            OrderId::Placeholder(_) => {
                self.id = OrderId::Confirmed(exchange_id);
                true
            }
            OrderId::Confirmed(_) => false,
        }
    }

    /// Adopt identities of a record that turned out to be the same order.
    pub(crate) fn adopt(
        &mut self,
        placeholder: Option<PlaceholderId>,
        token: Option<CorrelationToken>,
        created_at_ms: i64,
    ) {
        if self.placeholder.is_none() {
            self.placeholder = placeholder;
        }
        if self.token.is_none() {
            self.token = token;
        }
        self.note_created(created_at_ms);
    }

    /// Keep the earliest known creation time. Zero means not reported.
    fn note_created(&mut self, created_at_ms: i64) {
        if created_at_ms > 0 && (self.created_at_ms <= 0 || created_at_ms < self.created_at_ms) {
            self.created_at_ms = created_at_ms;
        }
    }

    /// Local status change (rejection, expiry). Terminal statuses are final.
    pub(crate) fn transition(&mut self, next: OrderStatus, now_ms: i64) -> Result<bool, TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        if self.status == next {
            return Ok(false);
        }
        self.status = next;
        self.updated_at_ms = self.updated_at_ms.max(now_ms);
        Ok(true)
    }

    fn merge_key(
        status: OrderStatus,
        updated_at_ms: i64,
        amount: Decimal,
        price: Decimal,
    ) -> (u8, i64, Decimal, Decimal) {
        // Less remaining means more progress for equal status and time.
        // Price only breaks otherwise exact ties.
        (status.rank(), updated_at_ms, -amount.abs(), price)
    }

    /// Fold a venue report into this record.
    ///
    /// The record keeps whichever report is greatest under
    /// `(status rank, venue update time, progress, price)`, so applying a
    /// set of reports in any order converges to the same record.
    pub(crate) fn absorb(&mut self, snapshot: &OrderSnapshot) -> Absorbed {
        if let OrderId::Confirmed(id) = self.id {
            if id != snapshot.exchange_id {
                return Absorbed::Stale;
            }
        }

        let current = Self::merge_key(self.status, self.updated_at_ms, self.amount, self.price);
        let incoming = Self::merge_key(snapshot.status, snapshot.updated_at_ms, snapshot.amount, snapshot.price);

        self.confirm(snapshot.exchange_id);
        if self.token.is_none() {
            self.token = snapshot.token;
        }
        self.note_created(snapshot.created_at_ms);

        if incoming < current {
            return Absorbed::Stale;
        }
        if incoming == current {
            return Absorbed::Duplicate;
        }
        debug_assert!(self.status.can_transition_to(snapshot.status));

        // The record carries the winning report's time, even when the venue
        // clock trails the local submission time.
        self.updated_at_ms = snapshot.updated_at_ms;
        self.amount = snapshot.amount;
        if !snapshot.original_amount.is_zero() {
            self.original_amount = snapshot.original_amount;
        }
        self.price = snapshot.price;
        self.status = snapshot.status;
        Absorbed::Applied
    }
}
