//! In-memory venue used by the engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::now_ms;
use execution_core::{
    create_reconciler, AtomicCapabilities, CancellationResult, OrderChanges, OrderRequest, OrderSide,
    OrderSnapshot, OrderStatus, ReconcilerConfig, SharedReconciler, SubmissionResult, UpdateResult,
    VenueClient, VenueError,
};
use metrics::create_metrics;
use model::BookTop;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::gateway::{GatewayConfig, OrderGateway, SharedGateway};
use crate::quotes::create_quote_board;
use crate::validation::{OrderValidator, ValidationConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Submit { price: Decimal, amount: Decimal },
    Cancel(u64),
    Update(u64),
    Snapshot,
}

/// What `update_atomic` answers.
#[derive(Debug, Clone)]
pub enum UpdateBehavior {
    Apply,
    Reject { retryable: bool },
    Unsupported,
}

#[derive(Debug)]
struct FakeState {
    orders: HashMap<u64, OrderSnapshot>,
    calls: Vec<Call>,
    rejected_prices: HashSet<Decimal>,
    reject_cancels: bool,
    fill_on_cancel: bool,
    update: UpdateBehavior,
    submit_delay: Option<Duration>,
}

#[derive(Debug)]
pub struct FakeVenue {
    next_id: AtomicU64,
    capabilities: AtomicCapabilities,
    state: Mutex<FakeState>,
}

impl FakeVenue {
    pub fn new(capabilities: AtomicCapabilities) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            capabilities,
            state: Mutex::new(FakeState {
                orders: HashMap::new(),
                calls: Vec::new(),
                rejected_prices: HashSet::new(),
                reject_cancels: false,
                fill_on_cancel: false,
                update: UpdateBehavior::Apply,
                submit_delay: None,
            }),
        }
    }

    pub fn reject_price(&self, price: Decimal) {
        self.state.lock().rejected_prices.insert(price);
    }

    pub fn reject_cancels(&self) {
        self.state.lock().reject_cancels = true;
    }

    pub fn fill_on_cancel(&self) {
        self.state.lock().fill_on_cancel = true;
    }

    pub fn set_update(&self, behavior: UpdateBehavior) {
        self.state.lock().update = behavior;
    }

    pub fn delay_submits(&self, delay: Duration) {
        self.state.lock().submit_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn submits(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Submit { .. }))
            .count()
    }

    pub fn cancels(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Cancel(_))).count()
    }

    pub fn order(&self, exchange_id: u64) -> Option<OrderSnapshot> {
        self.state.lock().orders.get(&exchange_id).cloned()
    }

    fn touch(snapshot: &mut OrderSnapshot) {
        snapshot.updated_at_ms = now_ms().max(snapshot.updated_at_ms + 1);
    }
}

#[async_trait]
impl VenueClient for FakeVenue {
    async fn submit(&self, request: &OrderRequest) -> Result<SubmissionResult, VenueError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(Call::Submit {
                price: request.price,
                amount: request.amount,
            });
            state.submit_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.rejected_prices.contains(&request.price) {
            return Ok(SubmissionResult::Rejected {
                reason: "POSTONLY CANCELED".to_string(),
            });
        }
        let exchange_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = now_ms();
        let snapshot = OrderSnapshot {
            exchange_id,
            token: Some(request.token),
            symbol: request.symbol.clone(),
            amount: request.signed_amount(),
            original_amount: request.signed_amount(),
            price: request.price,
            status: OrderStatus::Live,
            created_at_ms: now,
            updated_at_ms: now,
        };
        state.orders.insert(exchange_id, snapshot.clone());
        Ok(SubmissionResult::Accepted(snapshot))
    }

    async fn cancel(&self, exchange_id: u64) -> Result<CancellationResult, VenueError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Cancel(exchange_id));
        if state.reject_cancels {
            return Ok(CancellationResult::Rejected {
                reason: "cancel refused".to_string(),
            });
        }
        let fill = state.fill_on_cancel;
        let Some(order) = state.orders.get_mut(&exchange_id) else {
            return Ok(CancellationResult::NotFound);
        };
        if fill {
            order.amount = Decimal::ZERO;
            order.status = OrderStatus::Filled;
        } else {
            order.status = OrderStatus::Cancelled;
        }
        Self::touch(order);
        Ok(CancellationResult::Accepted(Some(order.clone())))
    }

    async fn update_atomic(
        &self,
        exchange_id: u64,
        side: OrderSide,
        changes: &OrderChanges,
    ) -> Result<UpdateResult, VenueError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Update(exchange_id));
        match state.update {
            UpdateBehavior::Unsupported => {
                return Err(VenueError::Unsupported("in-place update".to_string()))
            }
            UpdateBehavior::Reject { retryable } => {
                return Ok(UpdateResult::Rejected {
                    reason: "update refused".to_string(),
                    retryable,
                })
            }
            UpdateBehavior::Apply => {}
        }
        let Some(order) = state.orders.get_mut(&exchange_id) else {
            return Ok(UpdateResult::Rejected {
                reason: "order not found".to_string(),
                retryable: false,
            });
        };
        if let Some(amount) = changes.amount {
            order.amount = amount * side.sign();
        }
        if let Some(price) = changes.price {
            order.price = price;
        }
        Self::touch(order);
        Ok(UpdateResult::Applied(order.clone()))
    }

    async fn snapshot_open_orders(&self) -> Result<Vec<OrderSnapshot>, VenueError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Snapshot);
        Ok(state
            .orders
            .values()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect())
    }

    fn capabilities(&self) -> AtomicCapabilities {
        self.capabilities
    }
}

pub struct Fixture {
    pub venue: Arc<FakeVenue>,
    pub reconciler: SharedReconciler,
    pub gateway: SharedGateway,
}

/// Gateway over a fake venue with a fresh `tBTCUSD` quote of 90 / 110.
pub fn fixture(capabilities: AtomicCapabilities) -> Fixture {
    let venue = Arc::new(FakeVenue::new(capabilities));
    let reconciler = create_reconciler(ReconcilerConfig::default());
    let quotes = create_quote_board();
    quotes.update(BookTop::new("tBTCUSD", Decimal::from(90), Decimal::from(110), now_ms()));
    let validator = Arc::new(OrderValidator::new(ValidationConfig::default(), quotes));
    let gateway = Arc::new(OrderGateway::new(
        venue.clone(),
        reconciler.clone(),
        validator,
        create_metrics(),
        GatewayConfig::default(),
    ));
    Fixture {
        venue,
        reconciler,
        gateway,
    }
}

pub fn buy(price: i64, amount: i64) -> OrderRequest {
    OrderRequest::new("tBTCUSD", OrderSide::Buy, Decimal::from(amount), Decimal::from(price))
}
