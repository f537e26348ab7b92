//! Entry point that wires the engine together.

use std::sync::Arc;

use connector_core::{ConnectionHandle, ConnectionState};
use execution_core::{
    create_reconciler, Order, OrderChange, OrderFilter, OrderId, ReconcilerConfig, ResyncSummary, SharedReconciler,
};
use metrics::SharedMetrics;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::batch::{BatchConfig, BatchEngine, BatchPlan, BatchResult};
use crate::error::EngineError;
use crate::executor::CoreExecutor;
use crate::gateway::{GatewayConfig, OrderGateway, SharedGateway, SharedVenue};
use crate::quotes::{create_quote_board, SharedQuoteBoard};
use crate::resolver::{ResolverConfig, UpdateResolver};
use crate::streaming::StreamingVenue;
use crate::sync::{OrderSync, SyncConfig};
use crate::validation::{OrderValidator, ValidationConfig};

/// Configuration for every engine component.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub reconciler: ReconcilerConfig,
    pub validation: ValidationConfig,
    pub gateway: GatewayConfig,
    pub resolver: ResolverConfig,
    pub batch: BatchConfig,
    pub sync: SyncConfig,
}

/// The order management core.
///
/// Owns the canonical order set and runs batches against the venue. When a
/// streaming connection is attached, its events keep the order set and the
/// quote board current, and in-place updates travel over it.
pub struct TradingCore {
    gateway: SharedGateway,
    engine: BatchEngine,
    connection: Option<ConnectionHandle>,
    config: CoreConfig,
}

impl TradingCore {
    /// Core driven through the request/response client only.
    pub fn new(venue: SharedVenue, metrics: SharedMetrics, config: CoreConfig) -> Self {
        Self::build(venue, None, metrics, config)
    }

    /// Core that also listens to `connection`.
    pub fn with_connection(
        rest: SharedVenue,
        connection: ConnectionHandle,
        metrics: SharedMetrics,
        config: CoreConfig,
    ) -> Self {
        let venue: SharedVenue = Arc::new(StreamingVenue::new(rest, connection.clone()));
        Self::build(venue, Some(connection), metrics, config)
    }

    fn build(
        venue: SharedVenue,
        connection: Option<ConnectionHandle>,
        metrics: SharedMetrics,
        config: CoreConfig,
    ) -> Self {
        let reconciler = create_reconciler(config.reconciler.clone());
        let validator = Arc::new(OrderValidator::new(config.validation.clone(), create_quote_board()));
        let gateway = Arc::new(OrderGateway::new(
            venue,
            reconciler,
            validator,
            metrics.clone(),
            config.gateway.clone(),
        ));
        let resolver = Arc::new(UpdateResolver::new(gateway.clone(), metrics, config.resolver.clone()));
        let executor = Arc::new(CoreExecutor::new(gateway.clone(), resolver));
        let engine = BatchEngine::new(executor, config.batch.clone());

        Self {
            gateway,
            engine,
            connection,
            config,
        }
    }

    /// Start feeding stream events into the order set. No-op without a connection.
    pub fn spawn_sync(&self) -> Option<JoinHandle<()>> {
        let connection = self.connection.as_ref()?;
        info!("Starting order sync");
        Some(OrderSync::new(self.gateway.clone(), self.config.sync.clone()).spawn(connection))
    }

    pub async fn execute_batch(&self, plan: BatchPlan) -> BatchResult {
        self.engine.execute(plan).await
    }

    pub fn get_order(&self, id: &OrderId) -> Result<Order, EngineError> {
        self.gateway
            .reconciler()
            .get_order(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub fn list_orders(&self, filter: &OrderFilter) -> Vec<Order> {
        self.gateway.reconciler().list_orders(filter)
    }

    /// Every change to the order set from now on.
    pub fn subscribe_orders(&self) -> broadcast::Receiver<OrderChange> {
        self.gateway.reconciler().subscribe()
    }

    pub fn subscribe_connection_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.connection.as_ref().map(|c| c.watch_state())
    }

    /// Replace the order set with the venue's open orders.
    pub async fn refresh_snapshot(&self) -> Result<ResyncSummary, EngineError> {
        self.gateway.refresh_snapshot().await
    }

    pub fn quotes(&self) -> &SharedQuoteBoard {
        self.gateway.validator().quotes()
    }

    pub fn reconciler(&self) -> &SharedReconciler {
        self.gateway.reconciler()
    }

    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }
}

impl std::fmt::Debug for TradingCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingCore")
            .field("connected", &self.connection.as_ref().map(|c| c.state()))
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::CommandStatus;
    use crate::command::{Command, CommandId};
    use crate::plans::cancel_all;
    use crate::testing::{buy, FakeVenue};
    use common::now_ms;
    use execution_core::{AtomicCapabilities, OrderStatus};
    use metrics::create_metrics;
    use model::BookTop;
    use rust_decimal_macros::dec;

    fn core() -> (Arc<FakeVenue>, TradingCore) {
        let venue = Arc::new(FakeVenue::new(AtomicCapabilities::default()));
        let core = TradingCore::new(venue.clone(), create_metrics(), CoreConfig::default());
        core.quotes()
            .update(BookTop::new("tBTCUSD", dec!(90), dec!(110), now_ms()));
        (venue, core)
    }

    #[tokio::test]
    async fn test_place_and_clear() {
        let (venue, core) = core();
        let plan = BatchPlan::continue_and_report()
            .with_command(Command::place("a", buy(100, 1)))
            .with_command(Command::place("b", buy(99, 1)));
        assert!(core.execute_batch(plan).await.all_succeeded());

        let active = core.list_orders(&OrderFilter::active().with_symbol("tBTCUSD"));
        assert_eq!(active.len(), 2);
        let result = core.execute_batch(cancel_all(&active)).await;
        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(venue.cancels(), 2);
        assert!(core.list_orders(&OrderFilter::active()).is_empty());
    }

    #[tokio::test]
    async fn test_get_order_not_found() {
        let (_, core) = core();
        assert!(matches!(
            core.get_order(&OrderId::Confirmed(9)),
            Err(EngineError::NotFound(_))
        ));
        assert!(core.subscribe_connection_state().is_none());
        assert!(core.spawn_sync().is_none());
    }

    #[tokio::test]
    async fn test_restart_rebuilds_from_snapshot() {
        let (venue, first) = core();
        let plan = BatchPlan::abort_on_first_failure().with_command(Command::place("a", buy(100, 1)));
        let result = first.execute_batch(plan).await;
        let CommandStatus::Succeeded(_) = &result.get(&CommandId::from("a")).unwrap().status else {
            panic!("placement failed");
        };

        let second = TradingCore::new(venue, create_metrics(), CoreConfig::default());
        let summary = second.refresh_snapshot().await.unwrap();
        assert_eq!(summary.created, 1);
        let order = second.get_order(&OrderId::Confirmed(1)).unwrap();
        assert_eq!(order.status(), OrderStatus::Live);
    }
}
