//! Canonical order model and reconciliation.
//!
//! - **Order model**: `Order`, `OrderId`, `OrderStatus` and the correlation token
//!   carried by every submission
//! - **Events**: normalized venue replies and stream events
//! - **Reconciler**: merges synchronous replies with stream events into one
//!   record per order
//! - **Venue boundary**: the `VenueClient` trait the engine drives
//!
//! # Order Lifecycle
//!
//! 1. A submission is registered under a placeholder id and a fresh token
//! 2. The request is sent carrying the token
//! 3. The synchronous reply and the stream confirmation race; whichever is
//!    applied first swaps the placeholder for the exchange id
//! 4. Later stream events advance the record until it is terminal
//! 5. Terminal records stay around for a grace window, then are collected

mod correlation;
mod events;
mod filter;
mod order;
mod reconciler;
mod venue;

pub use correlation::{OperationKind, PendingOperation, PendingOperations};
pub use events::{
    CancellationResult, OrderChanges, OrderEventKind, OrderRequest, OrderSnapshot, SubmissionResult,
    UpdateResult, VenueEvent,
};
pub use filter::OrderFilter;
pub use order::{
    CorrelationToken, Order, OrderId, OrderSide, OrderStatus, PlaceholderId, TransitionError,
};
pub use reconciler::{
    create_reconciler, OrderChange, OrderReconciler, OrderRef, ReconcileError, Reconciled,
    ReconcilerConfig, ResyncSummary, SharedReconciler,
};
pub use venue::{AtomicCapabilities, VenueClient, VenueError};
