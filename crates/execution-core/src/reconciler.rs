//! Single writer of canonical order records.
//!
//! Synchronous replies and stream events race each other. Both are folded
//! into the same record, found by exchange id or by the correlation token
//! the request carried. Whichever arrives first confirms the identity; the
//! other is a confirmation of the same order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::correlation::{OperationKind, PendingOperation, PendingOperations};
use crate::events::{
    CancellationResult, OrderRequest, OrderSnapshot, SubmissionResult, UpdateResult, VenueEvent,
};
use crate::filter::OrderFilter;
use crate::order::{Absorbed, CorrelationToken, Order, OrderId, OrderStatus, PlaceholderId};

/// Reconciler tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How long a request may stay unconfirmed before its order turns `unknown`.
    pub pending_timeout: Duration,
    /// How long terminal orders stay in the working set for late duplicates.
    pub terminal_grace: Duration,
    /// Capacity of the order change broadcast.
    pub change_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_secs(10),
            terminal_grace: Duration::from_secs(60),
            change_capacity: 1024,
        }
    }
}

/// Outcome of applying one reply or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// A record was created from a venue report for an untracked order.
    Created,
    /// A placeholder record received its venue identity.
    Confirmed,
    /// Two records turned out to be the same order and were merged.
    Merged,
    /// An existing record advanced.
    Updated,
    /// Already applied; nothing changed.
    Duplicate,
    /// Older than the recorded state; ignored.
    Stale,
    /// Nothing to apply it to.
    Ignored,
}

/// Published after every change to a record.
#[derive(Debug, Clone)]
pub struct OrderChange {
    pub order: Order,
    pub outcome: Reconciled,
}

/// Summary of a full open-order resync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    pub applied: usize,
    pub created: usize,
    /// Active orders missing from the snapshot, now `unknown`.
    pub vanished: usize,
}

/// Reference to an order by identity or by the token its request carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRef {
    Id(OrderId),
    Token(CorrelationToken),
}

impl From<OrderId> for OrderRef {
    fn from(id: OrderId) -> Self {
        Self::Id(id)
    }
}

impl std::fmt::Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Token(token) => write!(f, "cid:{}", token),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("order {0} not found")]
    NotFound(String),

    #[error("order {id} not settled after {waited_ms}ms")]
    Timeout { id: OrderId, waited_ms: u64 },

    #[error(transparent)]
    Transition(#[from] crate::order::TransitionError),

    #[error("order change feed closed")]
    Closed,
}

type Key = u64;

/// Indexed working set. Only touched under the reconciler mutex.
#[derive(Default)]
struct Book {
    next_key: Key,
    orders: HashMap<Key, Order>,
    by_exchange_id: HashMap<u64, Key>,
    by_placeholder: HashMap<PlaceholderId, Key>,
    by_token: HashMap<CorrelationToken, Key>,
    /// Tokens whose synchronous reply was already applied.
    answered: HashSet<CorrelationToken>,
    /// Local time each record turned terminal.
    terminal_at: HashMap<Key, i64>,
}

impl Book {
    fn key_of(&self, id: &OrderId) -> Option<Key> {
        match id {
            OrderId::Confirmed(x) => self.by_exchange_id.get(x).copied(),
            OrderId::Placeholder(ph) => self.by_placeholder.get(ph).copied(),
        }
    }

    fn key_of_ref(&self, order_ref: &OrderRef) -> Option<Key> {
        match order_ref {
            OrderRef::Id(id) => self.key_of(id),
            OrderRef::Token(token) => self.by_token.get(token).copied(),
        }
    }

    fn locate(&self, snapshot: &OrderSnapshot) -> Option<Key> {
        self.by_exchange_id
            .get(&snapshot.exchange_id)
            .or_else(|| snapshot.token.as_ref().and_then(|t| self.by_token.get(t)))
            .copied()
    }

    fn index(&mut self, key: Key) {
        let Some(order) = self.orders.get(&key) else {
            return;
        };
        if let Some(x) = order.id().exchange_id() {
            self.by_exchange_id.insert(x, key);
        }
        if let Some(ph) = order.placeholder() {
            self.by_placeholder.insert(ph, key);
        }
        if let Some(token) = order.token() {
            self.by_token.insert(token, key);
        }
    }

    fn insert(&mut self, order: Order, now_ms: i64) -> Key {
        self.next_key += 1;
        let key = self.next_key;
        let terminal = order.status().is_terminal();
        self.orders.insert(key, order);
        self.index(key);
        if terminal {
            self.terminal_at.insert(key, now_ms);
        }
        key
    }

    fn get(&self, key: Key) -> Option<Order> {
        self.orders.get(&key).cloned()
    }

    /// Fold a venue report into `key`, keeping the indexes in step.
    fn absorb(&mut self, key: Key, snapshot: &OrderSnapshot, now_ms: i64) -> Reconciled {
        let Some(order) = self.orders.get_mut(&key) else {
            return Reconciled::Ignored;
        };
        let was_placeholder = order.id().is_placeholder();
        let outcome = order.absorb(snapshot);
        let terminal = order.status().is_terminal();
        self.index(key);
        if terminal {
            self.terminal_at.entry(key).or_insert(now_ms);
        }

        match (outcome, was_placeholder) {
            (Absorbed::Applied, true) => Reconciled::Confirmed,
            (Absorbed::Applied, false) => Reconciled::Updated,
            (Absorbed::Duplicate, true) | (Absorbed::Stale, true) => Reconciled::Confirmed,
            (Absorbed::Duplicate, false) => Reconciled::Duplicate,
            (Absorbed::Stale, false) => Reconciled::Stale,
        }
    }

    /// Move the identities of record `from` onto `into` and drop `from`.
    fn merge(&mut self, into: Key, from: Key) {
        let Some(absorbed) = self.orders.remove(&from) else {
            return;
        };
        self.terminal_at.remove(&from);
        if let Some(survivor) = self.orders.get_mut(&into) {
            survivor.adopt(absorbed.placeholder(), absorbed.token(), absorbed.created_at_ms());
        }
        self.index(into);
    }

    fn transition(&mut self, key: Key, status: OrderStatus, now_ms: i64) -> Result<bool, ReconcileError> {
        let Some(order) = self.orders.get_mut(&key) else {
            return Ok(false);
        };
        let changed = order.transition(status, now_ms)?;
        if changed && status.is_terminal() {
            self.terminal_at.insert(key, now_ms);
        }
        Ok(changed)
    }

    fn remove(&mut self, key: Key) {
        if let Some(order) = self.orders.remove(&key) {
            if let Some(x) = order.id().exchange_id() {
                self.by_exchange_id.remove(&x);
            }
            if let Some(ph) = order.placeholder() {
                self.by_placeholder.remove(&ph);
            }
            if let Some(token) = order.token() {
                self.by_token.remove(&token);
                self.answered.remove(&token);
            }
        }
        self.terminal_at.remove(&key);
    }
}

/// Owner of the canonical order set.
pub struct OrderReconciler {
    config: ReconcilerConfig,
    book: Mutex<Book>,
    pending: PendingOperations,
    changes: broadcast::Sender<OrderChange>,
}

impl Default for OrderReconciler {
    fn default() -> Self {
        Self::new(ReconcilerConfig::default())
    }
}

impl OrderReconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        let (changes, _) = broadcast::channel(config.change_capacity.max(1));
        Self {
            config,
            book: Mutex::new(Book::default()),
            pending: PendingOperations::new(),
            changes,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Feed of record changes, in application order.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderChange> {
        self.changes.subscribe()
    }

    fn publish(&self, changes: Vec<OrderChange>) {
        for change in changes {
            // No subscribers is fine
            let _ = self.changes.send(change);
        }
    }

    fn deadline(&self, now_ms: i64) -> i64 {
        now_ms + self.config.pending_timeout.as_millis() as i64
    }

    /// Track a submission before it is sent. Returns its placeholder identity.
    pub fn register_submission(&self, request: &OrderRequest) -> OrderId {
        let now_ms = common::now_ms();
        let placeholder = PlaceholderId::generate();
        let order = Order::pending(placeholder, request, now_ms);
        let id = order.id();

        self.pending.register(PendingOperation {
            token: request.token,
            kind: OperationKind::Submit,
            order: id,
            issued_at_ms: now_ms,
            deadline_ms: self.deadline(now_ms),
        });

        let snapshot = {
            let mut book = self.book.lock();
            let key = book.insert(order, now_ms);
            book.get(key)
        };

        debug!(
            placeholder = %id,
            token = %request.token,
            symbol = %request.symbol,
            side = request.side.as_str(),
            amount = %request.amount,
            price = %request.price,
            "Submission registered"
        );
        if let Some(order) = snapshot {
            self.publish(vec![OrderChange {
                order,
                outcome: Reconciled::Created,
            }]);
        }
        id
    }

    /// Apply the synchronous reply to a submission. Applied at most once per token.
    pub fn apply_submission_result(
        &self,
        placeholder: &OrderId,
        result: &SubmissionResult,
    ) -> Result<Reconciled, ReconcileError> {
        let now_ms = common::now_ms();
        let mut changes = Vec::new();

        let outcome = {
            let mut book = self.book.lock();
            let key = book
                .key_of(placeholder)
                .ok_or_else(|| ReconcileError::NotFound(placeholder.to_string()))?;
            let token = book.orders.get(&key).and_then(|o| o.token());

            if let Some(token) = token {
                if !book.answered.insert(token) {
                    debug!(placeholder = %placeholder, token = %token, "Duplicate submission reply ignored");
                    return Ok(Reconciled::Duplicate);
                }
                self.pending.resolve(&token);
            }

            let outcome = match result {
                SubmissionResult::Accepted(snapshot) => match book.locate(snapshot) {
                    Some(existing) if existing != key => {
                        book.merge(existing, key);
                        book.absorb(existing, snapshot, now_ms);
                        changes.extend(book.get(existing));
                        Reconciled::Merged
                    }
                    _ => {
                        let outcome = book.absorb(key, snapshot, now_ms);
                        changes.extend(book.get(key));
                        outcome
                    }
                },
                SubmissionResult::Rejected { reason } => {
                    warn!(placeholder = %placeholder, reason = %reason, "Submission rejected");
                    if book.transition(key, OrderStatus::Rejected, now_ms)? {
                        changes.extend(book.get(key));
                        Reconciled::Updated
                    } else {
                        Reconciled::Duplicate
                    }
                }
            };
            outcome
        };

        if let Some(order) = changes.first() {
            self.pending.retarget(placeholder, order.id());
            info!(
                placeholder = %placeholder,
                order_id = %order.id(),
                status = %order.status(),
                outcome = ?outcome,
                "Submission reply applied"
            );
        }
        self.publish(
            changes
                .into_iter()
                .map(|order| OrderChange { order, outcome })
                .collect(),
        );
        Ok(outcome)
    }

    /// Track a cancel request for an order.
    pub fn register_cancel(&self, id: &OrderId) -> Result<CorrelationToken, ReconcileError> {
        self.register_operation(id, OperationKind::Cancel)
    }

    /// Track an atomic update request for an order.
    pub fn register_update(&self, id: &OrderId) -> Result<CorrelationToken, ReconcileError> {
        self.register_operation(id, OperationKind::Update)
    }

    fn register_operation(&self, id: &OrderId, kind: OperationKind) -> Result<CorrelationToken, ReconcileError> {
        let order = self
            .get_order(id)
            .ok_or_else(|| ReconcileError::NotFound(id.to_string()))?;
        let now_ms = common::now_ms();
        let token = CorrelationToken::generate();
        self.pending.register(PendingOperation {
            token,
            kind,
            order: order.id(),
            issued_at_ms: now_ms,
            deadline_ms: self.deadline(now_ms),
        });
        Ok(token)
    }

    /// Apply the synchronous reply to a cancel request.
    pub fn apply_cancellation_result(
        &self,
        id: &OrderId,
        token: CorrelationToken,
        result: &CancellationResult,
    ) -> Result<Reconciled, ReconcileError> {
        let now_ms = common::now_ms();
        let mut changes = Vec::new();

        let outcome = {
            let mut book = self.book.lock();
            let key = book
                .key_of(id)
                .ok_or_else(|| ReconcileError::NotFound(id.to_string()))?;

            match result {
                CancellationResult::Accepted(Some(snapshot)) => {
                    let outcome = book.absorb(key, snapshot, now_ms);
                    if snapshot.status.is_terminal() {
                        self.pending.resolve(&token);
                    }
                    if matches!(outcome, Reconciled::Updated | Reconciled::Confirmed) {
                        changes.extend(book.get(key));
                    }
                    outcome
                }
                CancellationResult::Accepted(None) => Reconciled::Ignored,
                CancellationResult::Rejected { reason } => {
                    self.pending.resolve(&token);
                    warn!(order_id = %id, reason = %reason, "Cancel rejected");
                    Reconciled::Ignored
                }
                CancellationResult::NotFound => {
                    self.pending.resolve(&token);
                    // Closed at the venue, but whether by fill or cancel is not known
                    let terminal = book.orders.get(&key).map(|o| o.status().is_terminal());
                    if terminal == Some(false) && book.transition(key, OrderStatus::Unknown, now_ms)? {
                        changes.extend(book.get(key));
                        Reconciled::Updated
                    } else {
                        Reconciled::Ignored
                    }
                }
            }
        };

        self.publish(
            changes
                .into_iter()
                .map(|order| OrderChange { order, outcome })
                .collect(),
        );
        Ok(outcome)
    }

    /// Apply the synchronous reply to an atomic update.
    pub fn apply_update_result(
        &self,
        id: &OrderId,
        token: CorrelationToken,
        result: &UpdateResult,
    ) -> Result<Reconciled, ReconcileError> {
        self.pending.resolve(&token);
        match result {
            UpdateResult::Applied(snapshot) => {
                let now_ms = common::now_ms();
                let (outcome, changed) = {
                    let mut book = self.book.lock();
                    let key = book
                        .key_of(id)
                        .ok_or_else(|| ReconcileError::NotFound(id.to_string()))?;
                    let outcome = book.absorb(key, snapshot, now_ms);
                    (outcome, book.get(key))
                };
                if matches!(outcome, Reconciled::Updated) {
                    self.publish(changed.into_iter().map(|order| OrderChange { order, outcome }).collect());
                }
                Ok(outcome)
            }
            UpdateResult::Rejected { reason, retryable } => {
                warn!(order_id = %id, reason = %reason, retryable, "Atomic update rejected");
                Ok(Reconciled::Ignored)
            }
        }
    }

    /// Apply one decoded stream event.
    pub fn apply_stream_event(&self, event: &VenueEvent) -> Vec<Reconciled> {
        match event {
            VenueEvent::Order { order, .. } => vec![self.apply_order_report(order)],
            VenueEvent::OrderSnapshot(orders) => {
                let summary = self.apply_snapshot(orders);
                vec![Reconciled::Updated; summary.applied + summary.created]
            }
            VenueEvent::RequestFailed {
                kind,
                token,
                exchange_id,
                reason,
            } => vec![self.apply_request_failure(*kind, *token, *exchange_id, reason)],
            VenueEvent::Ticker(_) => Vec::new(),
        }
    }

    fn apply_order_report(&self, snapshot: &OrderSnapshot) -> Reconciled {
        let now_ms = common::now_ms();
        let (outcome, changed) = {
            let mut book = self.book.lock();
            match book.locate(snapshot) {
                Some(key) => {
                    let outcome = book.absorb(key, snapshot, now_ms);
                    (outcome, book.get(key))
                }
                None => {
                    let key = book.insert(Order::from_snapshot(snapshot), now_ms);
                    (Reconciled::Created, book.get(key))
                }
            }
        };

        if let Some(order) = &changed {
            if let Some(token) = order.token() {
                if order.status() != OrderStatus::PendingSubmit && self.pending.resolve(&token).is_some() {
                    debug!(order_id = %order.id(), token = %token, "Submission confirmed by stream");
                }
            }
            if order.status().is_terminal() {
                let id = order.id();
                self.pending
                    .resolve_for(OperationKind::Cancel, |target| *target == id);
            }
        }

        debug!(
            order_id = snapshot.exchange_id,
            status = %snapshot.status,
            outcome = ?outcome,
            "Stream order report applied"
        );

        if matches!(
            outcome,
            Reconciled::Created | Reconciled::Confirmed | Reconciled::Updated
        ) {
            self.publish(changed.into_iter().map(|order| OrderChange { order, outcome }).collect());
        }
        outcome
    }

    fn apply_request_failure(
        &self,
        kind: OperationKind,
        token: Option<CorrelationToken>,
        exchange_id: Option<u64>,
        reason: &str,
    ) -> Reconciled {
        warn!(kind = %kind, token = ?token, order_id = ?exchange_id, reason = %reason, "Venue refused request");

        if kind != OperationKind::Submit {
            if let Some(x) = exchange_id {
                self.pending
                    .resolve_for(kind, |target| *target == OrderId::Confirmed(x));
            }
            return Reconciled::Ignored;
        }

        let Some(token) = token else {
            return Reconciled::Ignored;
        };
        let now_ms = common::now_ms();
        let changed = {
            let mut book = self.book.lock();
            let Some(key) = book.by_token.get(&token).copied() else {
                return Reconciled::Ignored;
            };
            let pending = book
                .orders
                .get(&key)
                .map(|o| matches!(o.status(), OrderStatus::PendingSubmit | OrderStatus::Unknown))
                .unwrap_or(false);
            if !pending {
                return Reconciled::Stale;
            }
            match book.transition(key, OrderStatus::Rejected, now_ms) {
                Ok(true) => book.get(key),
                _ => None,
            }
        };
        self.pending.resolve(&token);

        match changed {
            Some(order) => {
                self.publish(vec![OrderChange {
                    order,
                    outcome: Reconciled::Updated,
                }]);
                Reconciled::Updated
            }
            None => Reconciled::Duplicate,
        }
    }

    /// Rebuild from a full list of open orders.
    ///
    /// Active records absent from the list closed while nobody was watching;
    /// they become `unknown` until a later event says how.
    pub fn apply_snapshot(&self, orders: &[OrderSnapshot]) -> ResyncSummary {
        let now_ms = common::now_ms();
        let mut summary = ResyncSummary::default();
        let mut changes = Vec::new();

        {
            let mut book = self.book.lock();
            let mut seen = HashSet::new();

            for snapshot in orders {
                let (key, outcome) = match book.locate(snapshot) {
                    Some(key) => (key, book.absorb(key, snapshot, now_ms)),
                    None => (book.insert(Order::from_snapshot(snapshot), now_ms), Reconciled::Created),
                };
                seen.insert(key);
                match outcome {
                    Reconciled::Created => summary.created += 1,
                    Reconciled::Confirmed | Reconciled::Updated => summary.applied += 1,
                    _ => continue,
                }
                if let Some(order) = book.get(key) {
                    if let Some(token) = order.token() {
                        self.pending.resolve(&token);
                    }
                    changes.push(OrderChange { order, outcome });
                }
            }

            let vanished: Vec<Key> = book
                .orders
                .iter()
                .filter(|(key, order)| !seen.contains(*key) && order.status().is_active())
                .map(|(key, _)| *key)
                .collect();
            for key in vanished {
                if let Ok(true) = book.transition(key, OrderStatus::Unknown, now_ms) {
                    summary.vanished += 1;
                    if let Some(order) = book.get(key) {
                        changes.push(OrderChange {
                            order,
                            outcome: Reconciled::Updated,
                        });
                    }
                }
            }
        }

        info!(
            open_orders = orders.len(),
            applied = summary.applied,
            created = summary.created,
            vanished = summary.vanished,
            "Order snapshot applied"
        );
        self.publish(changes);
        summary
    }

    /// Expire overdue operations. Returns the orders that became `unknown`.
    pub fn expire_pending(&self, now_ms: i64) -> Vec<OrderId> {
        let expired = self.pending.drain_expired(now_ms);
        if expired.is_empty() {
            return Vec::new();
        }

        let mut marked = Vec::new();
        let mut changes = Vec::new();
        {
            let mut book = self.book.lock();
            for op in &expired {
                let Some(key) = book.key_of(&op.order).or_else(|| book.by_token.get(&op.token).copied()) else {
                    continue;
                };
                let eligible = match book.orders.get(&key) {
                    Some(order) => match op.kind {
                        OperationKind::Submit => order.status() == OrderStatus::PendingSubmit,
                        OperationKind::Cancel | OperationKind::Update => !order.status().is_terminal(),
                    },
                    None => false,
                };
                if eligible {
                    if let Ok(true) = book.transition(key, OrderStatus::Unknown, now_ms) {
                        if let Some(order) = book.get(key) {
                            warn!(
                                order_id = %order.id(),
                                kind = %op.kind,
                                token = %op.token,
                                "Operation expired without confirmation"
                            );
                            marked.push(order.id());
                            changes.push(OrderChange {
                                order,
                                outcome: Reconciled::Updated,
                            });
                        }
                    }
                }
            }
        }
        self.publish(changes);
        marked
    }

    /// Drop terminal records older than the grace window. Returns how many.
    pub fn collect_garbage(&self, now_ms: i64) -> usize {
        let grace_ms = self.config.terminal_grace.as_millis() as i64;
        let mut book = self.book.lock();
        let stale: Vec<Key> = book
            .terminal_at
            .iter()
            .filter(|(_, at)| now_ms - **at >= grace_ms)
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            book.remove(*key);
        }
        if !stale.is_empty() {
            debug!(removed = stale.len(), "Terminal orders collected");
        }
        stale.len()
    }

    pub fn get_order(&self, id: &OrderId) -> Option<Order> {
        let book = self.book.lock();
        book.key_of(id).and_then(|key| book.get(key))
    }

    pub fn resolve(&self, order_ref: &OrderRef) -> Option<Order> {
        let book = self.book.lock();
        book.key_of_ref(order_ref).and_then(|key| book.get(key))
    }

    /// Orders matching `filter`, oldest first.
    pub fn list_orders(&self, filter: &OrderFilter) -> Vec<Order> {
        let book = self.book.lock();
        let mut orders: Vec<Order> = book
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.created_at_ms(), o.id().exchange_id()));
        orders
    }

    pub fn pending_operations(&self) -> usize {
        self.pending.len()
    }

    /// Wait until the order reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: &OrderId, timeout: Duration) -> Result<Order, ReconcileError> {
        let mut changes = self.changes.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let order = self
                .get_order(id)
                .ok_or_else(|| ReconcileError::NotFound(id.to_string()))?;
            if order.status().is_terminal() {
                return Ok(order);
            }

            match tokio::time::timeout_at(deadline, changes.recv()).await {
                Err(_) => {
                    return Err(ReconcileError::Timeout {
                        id: *id,
                        waited_ms: timeout.as_millis() as u64,
                    })
                }
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(ReconcileError::Closed),
            }
        }
    }
}

/// Shared handle to the reconciler.
pub type SharedReconciler = Arc<OrderReconciler>;

pub fn create_reconciler(config: ReconcilerConfig) -> SharedReconciler {
    Arc::new(OrderReconciler::new(config))
}
