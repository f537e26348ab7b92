//! Chooses between in-place modification and cancel-then-recreate.
//!
//! In-place updates keep queue priority, so they are preferred whenever the
//! venue can apply every requested change that way. Price changes go through
//! cancel-then-recreate unless the venue's price capability was switched on
//! in configuration. Either way the resulting order is checked against the
//! current quote before anything is sent.

use std::time::Duration;

use execution_core::{Order, OrderChanges, OrderRef, OrderRequest, OrderStatus};
use metrics::SharedMetrics;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{EngineError, ValidationError};
use crate::gateway::{AtomicUpdate, SharedGateway};

/// Requested change to a resting order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub price: Option<Decimal>,
    /// New unsigned amount.
    pub amount: Option<Decimal>,
    /// Signed change to the current remaining amount.
    pub delta: Option<Decimal>,
}

impl UpdateRequest {
    pub fn price(price: Decimal) -> Self {
        Self {
            price: Some(price),
            ..Default::default()
        }
    }

    pub fn amount(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Default::default()
        }
    }

    pub fn delta(delta: Decimal) -> Self {
        Self {
            delta: Some(delta),
            ..Default::default()
        }
    }

    /// Shape checks that need no order state.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount.is_some() && self.delta.is_some() {
            return Err(ValidationError::AmountAndDelta);
        }
        if self.price.is_none() && self.amount.is_none() && self.delta.is_none() {
            return Err(ValidationError::EmptyUpdate);
        }
        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                return Err(ValidationError::NonPositivePrice(price));
            }
        }
        if let Some(amount) = self.amount {
            if amount <= Decimal::ZERO {
                return Err(ValidationError::NonPositiveAmount(amount));
            }
        }
        Ok(())
    }

    /// Effective changes against `order`. Fields equal to the current state
    /// are dropped.
    pub fn changes_for(&self, order: &Order) -> Result<OrderChanges, ValidationError> {
        self.validate()?;

        let amount = match (self.amount, self.delta) {
            (Some(amount), _) => Some(amount),
            (None, Some(delta)) => Some(order.remaining() + delta),
            (None, None) => None,
        };
        if let Some(amount) = amount {
            if amount <= Decimal::ZERO {
                return Err(ValidationError::NonPositiveAmount(amount));
            }
        }

        let changes = OrderChanges {
            price: self.price.filter(|p| *p != order.price()),
            amount: amount.filter(|a| *a != order.remaining()),
        };
        if changes.is_empty() {
            return Err(ValidationError::EmptyUpdate);
        }
        Ok(changes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePath {
    Atomic,
    CancelRecreate,
}

/// Result of a completed update.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub path: UpdatePath,
    /// The order carrying the new parameters.
    pub order: Order,
    /// The cancelled original, when the order was recreated.
    pub replaced: Option<Order>,
}

/// An update checked against current state, before any network call.
#[derive(Debug, Clone)]
pub struct PreparedUpdate {
    pub order: Order,
    pub changes: OrderChanges,
    pub path: UpdatePath,
    /// The order as it would be recreated.
    pub replacement: OrderRequest,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long to wait for the cancel to be confirmed before recreating.
    pub cancel_confirm_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cancel_confirm_timeout: Duration::from_secs(10),
        }
    }
}

pub struct UpdateResolver {
    gateway: SharedGateway,
    metrics: SharedMetrics,
    config: ResolverConfig,
}

impl UpdateResolver {
    pub fn new(gateway: SharedGateway, metrics: SharedMetrics, config: ResolverConfig) -> Self {
        Self {
            gateway,
            metrics,
            config,
        }
    }

    /// Path an update would take for `order`.
    pub fn plan(&self, order: &Order, changes: &OrderChanges) -> UpdatePath {
        if order.status().is_active() && self.gateway.venue().capabilities().covers(changes) {
            UpdatePath::Atomic
        } else {
            UpdatePath::CancelRecreate
        }
    }

    /// Resolve the target and check the update without touching the network.
    pub fn prepare(&self, target: &OrderRef, request: &UpdateRequest) -> Result<PreparedUpdate, EngineError> {
        request.validate()?;
        let order = self
            .gateway
            .reconciler()
            .resolve(target)
            .ok_or_else(|| EngineError::NotFound(target.to_string()))?;

        if order.id().is_placeholder() {
            return Err(ValidationError::Unconfirmed(order.id()).into());
        }
        if !order.status().is_active() {
            return Err(ValidationError::NotModifiable {
                id: order.id(),
                status: order.status(),
            }
            .into());
        }

        let changes = request.changes_for(&order)?;
        let replacement = OrderRequest::new(
            order.symbol(),
            order.side(),
            changes.amount.unwrap_or_else(|| order.remaining()),
            changes.price.unwrap_or_else(|| order.price()),
        );
        self.gateway.validator().validate_request(&replacement)?;

        Ok(PreparedUpdate {
            path: self.plan(&order, &changes),
            order,
            changes,
            replacement,
        })
    }

    /// Apply `request` to the order behind `target`.
    pub async fn update(&self, target: &OrderRef, request: &UpdateRequest) -> Result<UpdateOutcome, EngineError> {
        let prepared = self.prepare(target, request)?;
        let explicit_amount = prepared.changes.amount.is_some();

        if prepared.path == UpdatePath::Atomic {
            match self.gateway.update_atomic(&prepared.order, prepared.changes).await? {
                AtomicUpdate::Applied(order) => {
                    info!(order_id = %order.id(), changes = ?prepared.changes, "Order updated in place");
                    return Ok(UpdateOutcome {
                        path: UpdatePath::Atomic,
                        order,
                        replaced: None,
                    });
                }
                AtomicUpdate::Unsupported(reason) => {
                    info!(order_id = %prepared.order.id(), reason = %reason, "In-place update unsupported, recreating");
                }
                AtomicUpdate::Rejected { reason, retryable: true } => {
                    warn!(order_id = %prepared.order.id(), reason = %reason, "In-place update refused, recreating");
                }
                AtomicUpdate::Rejected { reason, retryable: false } => {
                    return Err(EngineError::VenueRejection(reason));
                }
            }
        }

        self.cancel_recreate(prepared.order, prepared.replacement, explicit_amount)
            .await
    }

    async fn cancel_recreate(
        &self,
        order: Order,
        mut replacement: OrderRequest,
        explicit_amount: bool,
    ) -> Result<UpdateOutcome, EngineError> {
        let id = order.id();
        let cancelled = self
            .gateway
            .cancel_and_confirm(&OrderRef::Id(id), self.config.cancel_confirm_timeout)
            .await?;

        if cancelled.status() != OrderStatus::Cancelled {
            warn!(order_id = %id, status = %cancelled.status(), "Order closed without cancel, not replacing");
            return Err(EngineError::FilledBeforeReplace(id));
        }
        if !explicit_amount {
            // Fills between planning and cancel shrink the replacement
            replacement.amount = cancelled.remaining();
        }
        if replacement.amount <= Decimal::ZERO {
            return Err(EngineError::FilledBeforeReplace(id));
        }

        match self.gateway.place(replacement).await {
            Ok(new_order) => {
                info!(
                    replaced = %id,
                    order_id = %new_order.id(),
                    price = %new_order.price(),
                    amount = %new_order.remaining(),
                    "Order recreated"
                );
                Ok(UpdateOutcome {
                    path: UpdatePath::CancelRecreate,
                    order: new_order,
                    replaced: Some(cancelled),
                })
            }
            Err(e) => {
                self.metrics.inc_naked_cancels();
                error!(order_id = %id, error = %e, "Replacement failed after cancel; order is gone");
                Err(EngineError::NakedCancel {
                    cancelled: id,
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for UpdateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateResolver")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{buy, fixture, Call, Fixture, UpdateBehavior};
    use execution_core::{AtomicCapabilities, OrderId};
    use rust_decimal_macros::dec;

    fn resolver(f: &Fixture) -> UpdateResolver {
        UpdateResolver::new(
            f.gateway.clone(),
            f.gateway.metrics().clone(),
            ResolverConfig::default(),
        )
    }

    #[test]
    fn test_request_shape() {
        assert_eq!(UpdateRequest::default().validate(), Err(ValidationError::EmptyUpdate));
        let both = UpdateRequest {
            amount: Some(dec!(1)),
            delta: Some(dec!(1)),
            ..Default::default()
        };
        assert_eq!(both.validate(), Err(ValidationError::AmountAndDelta));
        assert!(UpdateRequest::price(dec!(0)).validate().is_err());
        assert!(UpdateRequest::delta(dec!(-1)).validate().is_ok());
    }

    #[tokio::test]
    async fn test_amount_update_goes_in_place() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 2)).await.unwrap();

        let outcome = resolver(&f)
            .update(&OrderRef::Id(order.id()), &UpdateRequest::amount(dec!(5)))
            .await
            .unwrap();
        assert_eq!(outcome.path, UpdatePath::Atomic);
        assert_eq!(outcome.order.id(), order.id());
        assert_eq!(outcome.order.remaining(), dec!(5));
        assert_eq!(f.venue.cancels(), 0);
    }

    #[tokio::test]
    async fn test_delta_applies_to_remaining() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 2)).await.unwrap();
        let r = resolver(&f);

        let outcome = r
            .update(&OrderRef::Id(order.id()), &UpdateRequest::delta(dec!(-0.5)))
            .await
            .unwrap();
        assert_eq!(outcome.order.remaining(), dec!(1.5));

        let err = r
            .update(&OrderRef::Id(order.id()), &UpdateRequest::delta(dec!(-2)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::NonPositiveAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_price_update_recreates() {
        let f = fixture(AtomicCapabilities::default());
        let original = f.gateway.place(buy(100, 1)).await.unwrap();
        assert_eq!(original.id(), OrderId::Confirmed(1));

        let outcome = resolver(&f)
            .update(&OrderRef::Id(original.id()), &UpdateRequest::price(dec!(101)))
            .await
            .unwrap();

        assert_eq!(outcome.path, UpdatePath::CancelRecreate);
        assert_eq!(outcome.order.id(), OrderId::Confirmed(2));
        assert_eq!(outcome.order.status(), OrderStatus::Live);
        assert_eq!(outcome.order.price(), dec!(101));
        assert_eq!(outcome.order.remaining(), dec!(1));
        let old = f.reconciler.get_order(&original.id()).unwrap();
        assert_eq!(old.status(), OrderStatus::Cancelled);
        assert_eq!(
            f.venue.calls()[1..],
            [Call::Cancel(1), Call::Submit { price: dec!(101), amount: dec!(1) }]
        );
    }

    #[tokio::test]
    async fn test_price_capability_allows_in_place_price_change() {
        let f = fixture(AtomicCapabilities {
            amount: true,
            price: true,
        });
        let order = f.gateway.place(buy(100, 1)).await.unwrap();

        let outcome = resolver(&f)
            .update(&OrderRef::Id(order.id()), &UpdateRequest::price(dec!(101)))
            .await
            .unwrap();
        assert_eq!(outcome.path, UpdatePath::Atomic);
        assert_eq!(outcome.order.price(), dec!(101));
    }

    #[tokio::test]
    async fn test_failed_cancel_never_recreates() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();
        f.venue.reject_cancels();

        let err = resolver(&f)
            .update(&OrderRef::Id(order.id()), &UpdateRequest::price(dec!(101)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VenueRejection(_)));
        assert_eq!(f.venue.submits(), 1);
    }

    #[tokio::test]
    async fn test_filled_order_not_replaced() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();
        f.venue.fill_on_cancel();

        let err = resolver(&f)
            .update(&OrderRef::Id(order.id()), &UpdateRequest::price(dec!(101)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::FilledBeforeReplace(_)));
        assert_eq!(f.venue.submits(), 1);
    }

    #[tokio::test]
    async fn test_rejected_replacement_is_naked_cancel() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();
        f.venue.reject_price(dec!(101));

        let err = resolver(&f)
            .update(&OrderRef::Id(order.id()), &UpdateRequest::price(dec!(101)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NakedCancel { cancelled, .. } if cancelled == order.id()));
        assert!(!err.is_retryable());
        assert_eq!(f.gateway.metrics().naked_cancels(), 1);
    }

    #[tokio::test]
    async fn test_crossing_replacement_fails_before_network() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();
        let calls_before = f.venue.calls().len();

        let err = resolver(&f)
            .update(&OrderRef::Id(order.id()), &UpdateRequest::price(dec!(115)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::WouldCross { .. })
        ));
        assert_eq!(f.venue.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_atomic_fallbacks() {
        let f = fixture(AtomicCapabilities::default());
        let r = resolver(&f);

        f.venue.set_update(UpdateBehavior::Unsupported);
        let first = f.gateway.place(buy(100, 1)).await.unwrap();
        let outcome = r
            .update(&OrderRef::Id(first.id()), &UpdateRequest::amount(dec!(2)))
            .await
            .unwrap();
        assert_eq!(outcome.path, UpdatePath::CancelRecreate);
        assert_eq!(outcome.order.remaining(), dec!(2));

        f.venue.set_update(UpdateBehavior::Reject { retryable: true });
        let outcome = r
            .update(&OrderRef::Id(outcome.order.id()), &UpdateRequest::amount(dec!(3)))
            .await
            .unwrap();
        assert_eq!(outcome.path, UpdatePath::CancelRecreate);

        f.venue.set_update(UpdateBehavior::Reject { retryable: false });
        let err = r
            .update(&OrderRef::Id(outcome.order.id()), &UpdateRequest::amount(dec!(4)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VenueRejection(_)));
    }

    #[tokio::test]
    async fn test_terminal_order_not_modifiable() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();
        f.gateway.cancel(&OrderRef::Id(order.id())).await.unwrap();

        let err = resolver(&f)
            .update(&OrderRef::Id(order.id()), &UpdateRequest::amount(dec!(2)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::NotModifiable { .. })
        ));
    }
}
