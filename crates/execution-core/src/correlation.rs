//! Pending operation table for correlating requests with their confirmations.
//!
//! Every outbound request is registered here before it is sent:
//! 1. Generate a `CorrelationToken` (submissions carry it to the venue as `cid`)
//! 2. Register a `PendingOperation` with a deadline
//! 3. Send the request
//! 4. The first confirmation (synchronous reply or stream event) resolves it
//! 5. If the deadline passes first, the operation expires and the order is
//!    marked `unknown` until a snapshot or a late event settles it

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::order::{CorrelationToken, OrderId};

/// What a pending operation is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Submit,
    Cancel,
    Update,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submit => write!(f, "submit"),
            Self::Cancel => write!(f, "cancel"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// A request awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub token: CorrelationToken,
    pub kind: OperationKind,
    /// Order the operation acts on, as known when it was issued.
    pub order: OrderId,
    pub issued_at_ms: i64,
    pub deadline_ms: i64,
}

impl PendingOperation {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.deadline_ms
    }
}

/// Thread-safe table of pending operations keyed by correlation token.
#[derive(Debug, Default)]
pub struct PendingOperations {
    pending: DashMap<CorrelationToken, PendingOperation>,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation before its request is sent.
    pub fn register(&self, operation: PendingOperation) {
        if let Some(previous) = self.pending.insert(operation.token, operation) {
            tracing::warn!(
                token = %previous.token,
                kind = %previous.kind,
                "Pending operation replaced by a reused token"
            );
        }
    }

    /// Resolve an operation by token. Returns it at most once.
    pub fn resolve(&self, token: &CorrelationToken) -> Option<PendingOperation> {
        self.pending.remove(token).map(|(_, op)| op)
    }

    /// Resolve every operation of `kind` aimed at an order matched by `matches`.
    pub fn resolve_for(
        &self,
        kind: OperationKind,
        matches: impl Fn(&OrderId) -> bool,
    ) -> Vec<PendingOperation> {
        let tokens: Vec<CorrelationToken> = self
            .pending
            .iter()
            .filter(|entry| entry.kind == kind && matches(&entry.order))
            .map(|entry| *entry.key())
            .collect();

        tokens.iter().filter_map(|token| self.resolve(token)).collect()
    }

    /// Point pending operations at the order's confirmed identity.
    pub fn retarget(&self, from: &OrderId, to: OrderId) {
        for mut entry in self.pending.iter_mut() {
            if entry.order == *from {
                entry.order = to;
            }
        }
    }

    /// Remove and return operations whose deadline has passed.
    pub fn drain_expired(&self, now_ms: i64) -> Vec<PendingOperation> {
        let tokens: Vec<CorrelationToken> = self
            .pending
            .iter()
            .filter(|entry| entry.is_expired(now_ms))
            .map(|entry| *entry.key())
            .collect();

        tokens.iter().filter_map(|token| self.resolve(token)).collect()
    }

    pub fn contains(&self, token: &CorrelationToken) -> bool {
        self.pending.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::PlaceholderId;

    fn op(kind: OperationKind, order: OrderId, deadline_ms: i64) -> PendingOperation {
        PendingOperation {
            token: CorrelationToken::generate(),
            kind,
            order,
            issued_at_ms: 0,
            deadline_ms,
        }
    }

    #[test]
    fn test_resolve_at_most_once() {
        let table = PendingOperations::new();
        let pending = op(OperationKind::Submit, OrderId::Confirmed(1), 100);
        let token = pending.token;
        table.register(pending);

        assert!(table.contains(&token));
        assert!(table.resolve(&token).is_some());
        assert!(table.resolve(&token).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_resolve_for_filters_kind_and_order() {
        let table = PendingOperations::new();
        table.register(op(OperationKind::Cancel, OrderId::Confirmed(1), 100));
        table.register(op(OperationKind::Update, OrderId::Confirmed(1), 100));
        table.register(op(OperationKind::Cancel, OrderId::Confirmed(2), 100));

        let resolved = table.resolve_for(OperationKind::Cancel, |id| *id == OrderId::Confirmed(1));

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].order, OrderId::Confirmed(1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_drain_expired() {
        let table = PendingOperations::new();
        table.register(op(OperationKind::Submit, OrderId::Confirmed(1), 100));
        table.register(op(OperationKind::Submit, OrderId::Confirmed(2), 200));

        assert!(table.drain_expired(50).is_empty());
        let expired = table.drain_expired(150);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].order, OrderId::Confirmed(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_retarget_after_confirmation() {
        let table = PendingOperations::new();
        let placeholder = OrderId::Placeholder(PlaceholderId::generate());
        let pending = op(OperationKind::Submit, placeholder, 100);
        let token = pending.token;
        table.register(pending);

        table.retarget(&placeholder, OrderId::Confirmed(9));

        assert_eq!(table.resolve(&token).unwrap().order, OrderId::Confirmed(9));
    }
}
