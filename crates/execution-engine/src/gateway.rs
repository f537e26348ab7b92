//! Venue calls with deadlines, folded into the reconciler.
//!
//! Every request runs in its own task together with the application of its
//! reply. A caller that gives up on the deadline gets `EngineError::Timeout`
//! while the task keeps running, so a late reply still reaches the
//! reconciler exactly once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use execution_core::{
    CancellationResult, Order, OrderChanges, OrderRef, OrderRequest, OrderStatus, ResyncSummary,
    SharedReconciler, SubmissionResult, UpdateResult, VenueClient, VenueError,
};
use metrics::SharedMetrics;
use tracing::{debug, info, warn};

use crate::error::{EngineError, ValidationError};
use crate::validation::SharedValidator;

pub type SharedVenue = Arc<dyn VenueClient>;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Deadline for a single venue request.
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of an in-place modification attempt.
#[derive(Debug, Clone)]
pub enum AtomicUpdate {
    Applied(Order),
    /// The venue cannot apply these changes in place.
    Unsupported(String),
    Rejected { reason: String, retryable: bool },
}

pub struct OrderGateway {
    venue: SharedVenue,
    reconciler: SharedReconciler,
    validator: SharedValidator,
    metrics: SharedMetrics,
    config: GatewayConfig,
}

impl OrderGateway {
    pub fn new(
        venue: SharedVenue,
        reconciler: SharedReconciler,
        validator: SharedValidator,
        metrics: SharedMetrics,
        config: GatewayConfig,
    ) -> Self {
        Self {
            venue,
            reconciler,
            validator,
            metrics,
            config,
        }
    }

    pub fn reconciler(&self) -> &SharedReconciler {
        &self.reconciler
    }

    pub fn validator(&self) -> &SharedValidator {
        &self.validator
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn venue(&self) -> &SharedVenue {
        &self.venue
    }

    async fn call<T, F>(&self, operation: &'static str, request: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        let task = tokio::spawn(request);
        match tokio::time::timeout(self.config.request_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(EngineError::TaskFailed(e.to_string())),
            Err(_) => {
                let waited_ms = self.config.request_timeout.as_millis() as u64;
                warn!(operation, waited_ms, "Venue request timed out; reply will be applied if it arrives");
                Err(EngineError::Timeout { operation, waited_ms })
            }
        }
    }

    /// Validate and submit a post-only order.
    pub async fn place(&self, request: OrderRequest) -> Result<Order, EngineError> {
        self.validator.validate_request(&request)?;
        let placeholder = self.reconciler.register_submission(&request);

        let venue = self.venue.clone();
        let reconciler = self.reconciler.clone();
        let result = self
            .call("submit", async move {
                let result = venue.submit(&request).await?;
                reconciler.apply_submission_result(&placeholder, &result)?;
                Ok::<_, EngineError>(result)
            })
            .await?;

        match result {
            SubmissionResult::Accepted(_) => self
                .reconciler
                .get_order(&placeholder)
                .ok_or_else(|| EngineError::NotFound(placeholder.to_string())),
            SubmissionResult::Rejected { reason } => Err(EngineError::VenueRejection(reason)),
        }
    }

    /// Request cancellation. Returns the record as known after the reply;
    /// the close may still be in flight. Cancelling a cancelled order succeeds.
    pub async fn cancel(&self, target: &OrderRef) -> Result<Order, EngineError> {
        let order = self
            .reconciler
            .resolve(target)
            .ok_or_else(|| EngineError::NotFound(target.to_string()))?;

        match order.status() {
            OrderStatus::Cancelled => {
                debug!(order_id = %order.id(), "Order already cancelled");
                return Ok(order);
            }
            status if status.is_terminal() => {
                return Err(EngineError::VenueRejection(format!(
                    "order {} is already {}",
                    order.id(),
                    status
                )));
            }
            _ => {}
        }

        let id = order.id();
        let exchange_id = id
            .exchange_id()
            .ok_or(EngineError::Validation(ValidationError::Unconfirmed(id)))?;
        let token = self.reconciler.register_cancel(&id)?;

        let venue = self.venue.clone();
        let reconciler = self.reconciler.clone();
        let result = self
            .call("cancel", async move {
                let result = venue.cancel(exchange_id).await?;
                reconciler.apply_cancellation_result(&id, token, &result)?;
                Ok::<_, EngineError>(result)
            })
            .await?;

        match result {
            CancellationResult::Accepted(_) => {
                info!(order_id = %id, "Cancel accepted");
                self.reconciler
                    .get_order(&id)
                    .ok_or_else(|| EngineError::NotFound(id.to_string()))
            }
            CancellationResult::Rejected { reason } => Err(EngineError::VenueRejection(reason)),
            CancellationResult::NotFound => Err(EngineError::UnknownOrderState(id)),
        }
    }

    /// Cancel and wait until the order is terminal.
    pub async fn cancel_and_confirm(&self, target: &OrderRef, timeout: Duration) -> Result<Order, EngineError> {
        let order = self.cancel(target).await?;
        if order.status().is_terminal() {
            return Ok(order);
        }
        Ok(self.reconciler.wait_for_terminal(&order.id(), timeout).await?)
    }

    /// Modify a resting order in place.
    pub async fn update_atomic(&self, order: &Order, changes: OrderChanges) -> Result<AtomicUpdate, EngineError> {
        let id = order.id();
        let exchange_id = id
            .exchange_id()
            .ok_or(EngineError::Validation(ValidationError::Unconfirmed(id)))?;
        if !self.venue.capabilities().covers(&changes) {
            return Ok(AtomicUpdate::Unsupported(format!(
                "venue cannot change {:?} in place",
                changes
            )));
        }
        let token = self.reconciler.register_update(&id)?;

        let venue = self.venue.clone();
        let reconciler = self.reconciler.clone();
        let side = order.side();
        let outcome = self
            .call("update", async move {
                match venue.update_atomic(exchange_id, side, &changes).await {
                    Ok(result) => {
                        reconciler.apply_update_result(&id, token, &result)?;
                        Ok::<_, EngineError>(Ok(result))
                    }
                    Err(VenueError::Unsupported(reason)) => {
                        let result = UpdateResult::Rejected {
                            reason: reason.clone(),
                            retryable: true,
                        };
                        reconciler.apply_update_result(&id, token, &result)?;
                        Ok(Err(reason))
                    }
                    Err(e) => Err(EngineError::from(e)),
                }
            })
            .await?;

        match outcome {
            Ok(UpdateResult::Applied(_)) => self
                .reconciler
                .get_order(&id)
                .map(AtomicUpdate::Applied)
                .ok_or_else(|| EngineError::NotFound(id.to_string())),
            Ok(UpdateResult::Rejected { reason, retryable }) => Ok(AtomicUpdate::Rejected { reason, retryable }),
            Err(reason) => Ok(AtomicUpdate::Unsupported(reason)),
        }
    }

    /// Rebuild the working set from the venue's open orders.
    pub async fn refresh_snapshot(&self) -> Result<ResyncSummary, EngineError> {
        let venue = self.venue.clone();
        let reconciler = self.reconciler.clone();
        let summary = self
            .call("snapshot", async move {
                let orders = venue.snapshot_open_orders().await?;
                Ok::<_, EngineError>(reconciler.apply_snapshot(&orders))
            })
            .await?;
        self.metrics.inc_resyncs();
        self.metrics
            .add_orders_reconciled((summary.applied + summary.created) as u64);
        Ok(summary)
    }
}

impl std::fmt::Debug for OrderGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderGateway")
            .field("config", &self.config)
            .finish()
    }
}

pub type SharedGateway = Arc<OrderGateway>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{buy, fixture, Call, UpdateBehavior};
    use execution_core::{AtomicCapabilities, OrderId, OrderSide};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_place_confirms_placeholder() {
        let f = fixture(AtomicCapabilities::default());
        let request = buy(100, 1);
        let token = request.token;

        let order = f.gateway.place(request).await.unwrap();
        assert_eq!(order.id(), OrderId::Confirmed(1));
        assert_eq!(order.status(), OrderStatus::Live);
        assert!(order.is_maker_only());
        assert_eq!(f.reconciler.resolve(&OrderRef::Token(token)).unwrap().id(), order.id());
    }

    #[tokio::test]
    async fn test_crossing_order_never_reaches_venue() {
        let f = fixture(AtomicCapabilities::default());
        let err = f.gateway.place(buy(110, 1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::WouldCross { .. })));
        assert!(f.venue.calls().is_empty());
        assert!(f.reconciler.list_orders(&execution_core::OrderFilter::all()).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let f = fixture(AtomicCapabilities::default());
        f.venue.reject_price(dec!(100));
        let request = buy(100, 1);
        let token = request.token;

        let err = f.gateway.place(request).await.unwrap_err();
        assert!(matches!(err, EngineError::VenueRejection(_)));
        let order = f.reconciler.resolve(&OrderRef::Token(token)).unwrap();
        assert_eq!(order.status(), OrderStatus::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_still_applies_late_reply() {
        let f = fixture(AtomicCapabilities::default());
        f.venue.delay_submits(Duration::from_secs(30));
        let request = buy(100, 1);
        let token = request.token;

        let err = f.gateway.place(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { operation: "submit", .. }));
        assert_eq!(
            f.reconciler.resolve(&OrderRef::Token(token)).unwrap().status(),
            OrderStatus::PendingSubmit
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        let order = f.reconciler.resolve(&OrderRef::Token(token)).unwrap();
        assert_eq!(order.status(), OrderStatus::Live);
        assert_eq!(order.id(), OrderId::Confirmed(1));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();
        let target = OrderRef::Id(order.id());

        let cancelled = f.gateway.cancel(&target).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        let again = f.gateway.cancel(&target).await.unwrap();
        assert_eq!(again.status(), OrderStatus::Cancelled);
        assert_eq!(f.venue.cancels(), 1);
    }

    #[tokio::test]
    async fn test_cancel_unknown_order() {
        let f = fixture(AtomicCapabilities::default());
        let err = f
            .gateway
            .cancel(&OrderRef::Id(OrderId::Confirmed(42)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_atomic_amount_update() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();

        let outcome = f
            .gateway
            .update_atomic(&order, OrderChanges::amount(dec!(3)))
            .await
            .unwrap();
        let AtomicUpdate::Applied(updated) = outcome else {
            panic!("expected applied update");
        };
        assert_eq!(updated.amount(), dec!(3));
        assert_eq!(updated.side(), OrderSide::Buy);
        assert_eq!(f.reconciler.pending_operations(), 0);
    }

    #[tokio::test]
    async fn test_price_update_unsupported_without_capability() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();

        let outcome = f
            .gateway
            .update_atomic(&order, OrderChanges::price(dec!(101)))
            .await
            .unwrap();
        assert!(matches!(outcome, AtomicUpdate::Unsupported(_)));
        assert!(!f.venue.calls().contains(&Call::Update(1)));
    }

    #[tokio::test]
    async fn test_venue_unsupported_reply_clears_pending() {
        let f = fixture(AtomicCapabilities::default());
        f.venue.set_update(UpdateBehavior::Unsupported);
        let order = f.gateway.place(buy(100, 1)).await.unwrap();

        let outcome = f
            .gateway
            .update_atomic(&order, OrderChanges::amount(dec!(2)))
            .await
            .unwrap();
        assert!(matches!(outcome, AtomicUpdate::Unsupported(_)));
        assert_eq!(f.reconciler.pending_operations(), 0);
    }

    #[tokio::test]
    async fn test_refresh_snapshot_counts_resync() {
        let f = fixture(AtomicCapabilities::default());
        f.gateway.place(buy(100, 1)).await.unwrap();

        let summary = f.gateway.refresh_snapshot().await.unwrap();
        assert_eq!(summary.vanished, 0);
        assert_eq!(f.gateway.metrics().resyncs(), 1);
    }
}
