//! Venue boundary used by the engine.

use async_trait::async_trait;
use thiserror::Error;

use crate::events::{CancellationResult, OrderChanges, OrderRequest, OrderSnapshot, SubmissionResult, UpdateResult};
use crate::order::OrderSide;

/// Which fields the venue can change in place without losing queue position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicCapabilities {
    pub amount: bool,
    pub price: bool,
}

impl Default for AtomicCapabilities {
    fn default() -> Self {
        Self {
            amount: true,
            price: false,
        }
    }
}

impl AtomicCapabilities {
    pub fn none() -> Self {
        Self {
            amount: false,
            price: false,
        }
    }

    /// Whether every field in `changes` can be applied in place.
    pub fn covers(&self, changes: &OrderChanges) -> bool {
        (changes.amount.is_none() || self.amount) && (changes.price.is_none() || self.price)
    }
}

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("venue rejected request: {reason}")]
    Rejected { reason: String },

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("malformed venue response: {0}")]
    Decode(String),
}

impl VenueError {
    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }
}

/// Request/response side of a venue.
///
/// Business refusals come back as `Ok` results carrying the reason; `Err`
/// means the request could not be completed and its effect is unknown.
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn submit(&self, request: &OrderRequest) -> Result<SubmissionResult, VenueError>;

    async fn cancel(&self, exchange_id: u64) -> Result<CancellationResult, VenueError>;

    /// Modify a resting order in place. `side` gives the sign of a new amount.
    async fn update_atomic(
        &self,
        exchange_id: u64,
        side: OrderSide,
        changes: &OrderChanges,
    ) -> Result<UpdateResult, VenueError>;

    async fn snapshot_open_orders(&self) -> Result<Vec<OrderSnapshot>, VenueError>;

    fn capabilities(&self) -> AtomicCapabilities;
}
