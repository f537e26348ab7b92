//! Engine error types.

use execution_core::{OrderId, OrderSide, OrderStatus, ReconcileError, VenueError};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::command::CommandId;

/// Errors surfaced per command. A batch never fails as a whole.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Network trouble; the request may or may not have reached the venue.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Credentials refused. Not retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Refused locally before any network call.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The venue refused the request.
    #[error("venue rejected request: {0}")]
    VenueRejection(String),

    /// The original order was cancelled but its replacement was not placed.
    /// Never retried automatically.
    #[error("naked cancel: order {cancelled} cancelled, replacement failed: {reason}")]
    NakedCancel { cancelled: OrderId, reason: String },

    /// Deadline exceeded. A late reply is still applied.
    #[error("{operation} timed out after {waited_ms}ms")]
    Timeout { operation: &'static str, waited_ms: u64 },

    /// Neither confirmation path settled the order; a snapshot refresh will.
    #[error("order {0} is in an unknown state")]
    UnknownOrderState(OrderId),

    #[error("order {0} not found")]
    NotFound(String),

    /// The order filled while being replaced; no replacement was sent.
    #[error("order {0} filled before it could be replaced")]
    FilledBeforeReplace(OrderId),

    /// The task running the command died.
    #[error("command task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    /// Whether repeating the same command may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::Timeout { .. })
    }

    /// Stable label for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientNetwork(_) => "transient_network",
            Self::Authentication(_) => "authentication",
            Self::Validation(_) => "validation",
            Self::VenueRejection(_) => "venue_rejection",
            Self::NakedCancel { .. } => "naked_cancel",
            Self::Timeout { .. } => "timeout",
            Self::UnknownOrderState(_) => "unknown_order_state",
            Self::NotFound(_) => "not_found",
            Self::FilledBeforeReplace(_) => "filled_before_replace",
            Self::TaskFailed(_) => "task_failed",
        }
    }
}

impl From<VenueError> for EngineError {
    fn from(err: VenueError) -> Self {
        match err {
            VenueError::Transport(msg) => Self::TransientNetwork(msg),
            VenueError::Timeout => Self::Timeout {
                operation: "venue request",
                waited_ms: 0,
            },
            VenueError::Authentication(msg) => Self::Authentication(msg),
            VenueError::Rejected { reason } => Self::VenueRejection(reason),
            VenueError::Unsupported(msg) => Self::VenueRejection(format!("unsupported: {}", msg)),
            VenueError::Decode(msg) => Self::TransientNetwork(format!("undecodable reply: {}", msg)),
        }
    }
}

impl From<ReconcileError> for EngineError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::NotFound(id) => Self::NotFound(id),
            ReconcileError::Timeout { waited_ms, .. } => Self::Timeout {
                operation: "order confirmation",
                waited_ms,
            },
            ReconcileError::Transition(e) => Self::UnknownOrderState(e.id),
            ReconcileError::Closed => Self::TaskFailed("order change feed closed".to_string()),
        }
    }
}

/// Reasons a request is refused before it reaches the venue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    /// The order would take liquidity.
    #[error("{side:?} at {price} would cross the spread (bid {best_bid}, ask {best_ask})")]
    WouldCross {
        side: OrderSide,
        price: Decimal,
        best_bid: Decimal,
        best_ask: Decimal,
    },

    #[error("no quote for {0}")]
    NoQuote(String),

    #[error("quote for {symbol} is {age_ms}ms old")]
    StaleQuote { symbol: String, age_ms: i64 },

    #[error("order notional {notional} below minimum {min}")]
    NotionalTooSmall { notional: Decimal, min: Decimal },

    #[error("order notional {notional} above maximum {max}")]
    NotionalTooLarge { notional: Decimal, max: Decimal },

    #[error("symbol {symbol} is not tradable in {environment}")]
    SymbolNotAllowed { symbol: String, environment: String },

    #[error("update must change price or amount")]
    EmptyUpdate,

    #[error("amount and delta are mutually exclusive")]
    AmountAndDelta,

    #[error("order {0} has no venue identity yet")]
    Unconfirmed(OrderId),

    #[error("order {id} is {status} and cannot be modified")]
    NotModifiable { id: OrderId, status: OrderStatus },

    #[error("duplicate command id {0}")]
    DuplicateCommand(CommandId),

    #[error("command {command} depends on unknown command {dependency}")]
    UnknownDependency {
        command: CommandId,
        dependency: CommandId,
    },

    #[error("dependency cycle involving {0}")]
    DependencyCycle(CommandId),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}
