//! Synthetic results for plans run without touching the venue.

use execution_core::{OrderChanges, OrderId, OrderRef, OrderRequest, SharedReconciler};

use crate::command::CommandKind;
use crate::error::EngineError;
use crate::resolver::{UpdatePath, UpdateRequest, UpdateResolver};

/// The request a command would have sent.
#[derive(Debug, Clone, PartialEq)]
pub enum DryRunEffect {
    Submit(OrderRequest),
    /// `order` is `None` when the target does not exist yet, e.g. an order
    /// placed earlier in the same dry run.
    Cancel { target: OrderRef, order: Option<OrderId> },
    Update {
        target: OrderRef,
        update: UpdateRequest,
        changes: Option<OrderChanges>,
        path: Option<UpdatePath>,
    },
    Barrier,
}

/// Builds dry-run effects from current state.
pub struct DryRunPlanner<'a> {
    reconciler: &'a SharedReconciler,
    resolver: &'a UpdateResolver,
}

impl<'a> DryRunPlanner<'a> {
    pub fn new(reconciler: &'a SharedReconciler, resolver: &'a UpdateResolver) -> Self {
        Self { reconciler, resolver }
    }

    pub fn preview(&self, kind: &CommandKind) -> Result<DryRunEffect, EngineError> {
        match kind {
            CommandKind::PlaceOrder(request) => Ok(DryRunEffect::Submit(request.clone())),
            CommandKind::CancelOrder(target) => Ok(DryRunEffect::Cancel {
                target: *target,
                order: self.reconciler.resolve(target).map(|o| o.id()),
            }),
            CommandKind::UpdateOrder { target, update } => match self.resolver.prepare(target, update) {
                Ok(prepared) => Ok(DryRunEffect::Update {
                    target: *target,
                    update: *update,
                    changes: Some(prepared.changes),
                    path: Some(prepared.path),
                }),
                Err(EngineError::NotFound(_)) => Ok(DryRunEffect::Update {
                    target: *target,
                    update: *update,
                    changes: None,
                    path: None,
                }),
                Err(e) => Err(e),
            },
            CommandKind::NoOpBarrier => Ok(DryRunEffect::Barrier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverConfig;
    use crate::testing::{buy, fixture};
    use execution_core::AtomicCapabilities;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_preview_sends_nothing() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();
        let calls = f.venue.calls().len();
        let resolver = UpdateResolver::new(
            f.gateway.clone(),
            f.gateway.metrics().clone(),
            ResolverConfig::default(),
        );
        let planner = DryRunPlanner::new(&f.reconciler, &resolver);

        let effect = planner
            .preview(&CommandKind::UpdateOrder {
                target: OrderRef::Id(order.id()),
                update: UpdateRequest::price(dec!(101)),
            })
            .unwrap();
        assert!(matches!(
            effect,
            DryRunEffect::Update {
                path: Some(UpdatePath::CancelRecreate),
                ..
            }
        ));

        let request = buy(99, 1);
        let token = request.token;
        assert_eq!(
            planner.preview(&CommandKind::PlaceOrder(request.clone())).unwrap(),
            DryRunEffect::Submit(request)
        );
        assert_eq!(
            planner
                .preview(&CommandKind::CancelOrder(OrderRef::Token(token)))
                .unwrap(),
            DryRunEffect::Cancel {
                target: OrderRef::Token(token),
                order: None,
            }
        );
        assert_eq!(f.venue.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_preview_rejects_crossing_update() {
        let f = fixture(AtomicCapabilities::default());
        let order = f.gateway.place(buy(100, 1)).await.unwrap();
        let resolver = UpdateResolver::new(
            f.gateway.clone(),
            f.gateway.metrics().clone(),
            ResolverConfig::default(),
        );
        let planner = DryRunPlanner::new(&f.reconciler, &resolver);

        let err = planner
            .preview(&CommandKind::UpdateOrder {
                target: OrderRef::Id(order.id()),
                update: UpdateRequest::price(dec!(120)),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
