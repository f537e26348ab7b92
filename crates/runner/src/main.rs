mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use auth::ApiCredentials;
use bitfinex_rest::BitfinexRestClient;
use clap::Parser;
use common::BitfinexEnvironment;
use connector_bitfinex::ConnectionManager;
use connector_core::{ConnectionConfig, ConnectionHandle, ConnectionState, ConnectorError, OutboundRequest};
use execution_core::{AtomicCapabilities, Order, OrderId, OrderRequest, OrderSide};
use execution_engine::{
    cancel_all, update_all, BatchPlan, BatchResult, Command, CommandOutput, CommandStatus, CoreConfig,
    FillSpreadSpec, LadderSpec, MarketMakeSpec, TradingCore, UndoStatus, UpdateRequest, ValidationConfig,
};
use metrics::{create_metrics, SharedMetrics};
use rust_decimal::Decimal;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use cli::{quote_sides, Action, Cli};

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// How long to wait for the first authenticated session.
const CONNECT_WAIT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    common::init_logging();

    let cli = Cli::parse();
    let environment = if cli.paper {
        BitfinexEnvironment::Paper
    } else {
        BitfinexEnvironment::from_env()
    };
    let capabilities = AtomicCapabilities {
        price: cli.atomic_price,
        ..AtomicCapabilities::default()
    };

    info!(%environment, dry_run = cli.dry_run, ?capabilities, "Starting maker-kit");

    let credentials = ApiCredentials::from_env().context("loading API credentials")?;
    let rest = Arc::new(
        BitfinexRestClient::with_environment(credentials.clone(), environment)?.with_capabilities(capabilities),
    );
    let metrics = create_metrics();

    let (manager, connection) =
        ConnectionManager::for_environment(environment, credentials, ConnectionConfig::default(), metrics.clone());
    let mut manager_handle = tokio::spawn(async move {
        let result = manager.run().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Connection manager stopped");
        }
        result
    });

    let config = CoreConfig {
        validation: ValidationConfig {
            environment,
            ..ValidationConfig::default()
        },
        ..CoreConfig::default()
    };
    let core = TradingCore::with_connection(rest.clone(), connection.clone(), metrics.clone(), config);
    let sync_handle = core.spawn_sync();

    if let Err(e) = wait_until_connected(connection.watch_state(), &mut manager_handle).await {
        if let Some(handle) = sync_handle {
            handle.abort();
        }
        return Err(e);
    }
    let summary = core.refresh_snapshot().await.context("loading open orders")?;
    info!(?summary, "Open orders loaded");

    for symbol in cli.command.quoted_symbols() {
        match rest.ticker(&symbol).await {
            Ok(top) => core.quotes().update(top),
            Err(e) => warn!(%symbol, error = %e, "Could not fetch ticker"),
        }
        if let Err(e) = connection.send(OutboundRequest::SubscribeTicker { symbol: symbol.clone() }).await {
            warn!(%symbol, error = %e, "Ticker subscription not sent");
        }
    }

    let outcome = match cli.command {
        Action::Watch { .. } => {
            watch_until_interrupted(&core, &connection, metrics.clone()).await;
            Ok(())
        }
        Action::List { filter, summary } => {
            let orders = core.list_orders(&filter.to_filter());
            if summary {
                print_summary(&orders);
            } else {
                print_orders(&orders);
            }
            Ok(())
        }
        action => match build_plan(&core, action) {
            Ok(plan) => {
                let result = core.execute_batch(plan.with_dry_run(cli.dry_run)).await;
                report(&result);
                batch_outcome(&result)
            }
            Err(e) => Err(e),
        },
    };

    connection.shutdown();
    let _ = manager_handle.await;
    if let Some(handle) = sync_handle {
        let _ = handle.await;
    }

    println!("\n{}", metrics.snapshot());
    info!("Shutdown complete");
    outcome
}

fn build_plan(core: &TradingCore, action: Action) -> anyhow::Result<BatchPlan> {
    let plan = match action {
        Action::Put {
            symbol,
            side,
            amount,
            price,
        } => BatchPlan::abort_on_first_failure()
            .with_command(Command::place("put", OrderRequest::new(symbol, side, amount, price))),
        Action::Cancel { ids, filter } => {
            if !ids.is_empty() {
                ids.into_iter()
                    .fold(BatchPlan::continue_and_report(), |plan, id| {
                        plan.with_command(Command::cancel(format!("cancel-{}", id), OrderId::Confirmed(id)))
                    })
            } else if !filter.is_empty() {
                cancel_all(&core.list_orders(&filter.to_filter()))
            } else {
                bail!("cancel needs --id or at least one filter");
            }
        }
        Action::Update {
            id,
            price,
            amount,
            delta,
            filter,
        } => {
            let update = UpdateRequest { price, amount, delta };
            match id {
                Some(id) => BatchPlan::abort_on_first_failure().with_command(Command::update(
                    "update",
                    OrderId::Confirmed(id),
                    update,
                )),
                None if !filter.is_empty() => update_all(&core.list_orders(&filter.to_filter()), update),
                None => bail!("update needs an order id or at least one --filter-* option"),
            }
        }
        Action::Clear { symbol } => {
            let filter = cli::FilterArgs {
                symbol,
                side: None,
                amount: None,
                below: None,
                above: None,
            };
            cancel_all(&core.list_orders(&filter.to_filter()))
        }
        Action::Ladder {
            symbol,
            side,
            start,
            step,
            levels,
            amount,
        } => LadderSpec {
            symbol,
            side,
            start_price: start,
            step,
            levels,
            amount,
        }
        .plan()?,
        Action::MarketMake {
            symbol,
            center,
            levels,
            spread,
            amount,
            buy_only,
            sell_only,
        } => {
            let center = match center {
                Some(center) => center,
                None => core
                    .quotes()
                    .get(&symbol)
                    .map(|top| top.mid_price())
                    .with_context(|| format!("no quote for {}; pass --center", symbol))?,
            };
            MarketMakeSpec {
                symbol,
                center,
                spread_pct: spread,
                levels,
                amount,
                sides: quote_sides(buy_only, sell_only),
            }
            .plan()?
        }
        Action::FillSpread {
            symbol,
            target_spread,
            amount,
            center,
            max_levels,
        } => {
            let top = core
                .quotes()
                .get(&symbol)
                .with_context(|| format!("no quote for {}", symbol))?;
            FillSpreadSpec {
                symbol,
                target_spread_pct: target_spread,
                amount,
                center,
                max_levels,
            }
            .plan(&top)?
        }
        Action::Watch { .. } | Action::List { .. } => bail!("command does not run a batch"),
    };
    Ok(plan)
}

/// Wait for the first authenticated session. A manager that gives up
/// before then (bad credentials, shutdown) fails the run with its error;
/// a slow one only logs and the run continues over REST.
async fn wait_until_connected(
    mut state: watch::Receiver<ConnectionState>,
    manager: &mut JoinHandle<Result<(), ConnectorError>>,
) -> anyhow::Result<()> {
    let settled = tokio::time::timeout(CONNECT_WAIT, async {
        loop {
            let current = *state.borrow_and_update();
            if current.is_connected() || current.is_closed() {
                return current;
            }
            if state.changed().await.is_err() {
                return ConnectionState::Closed;
            }
        }
    })
    .await;

    match settled {
        Ok(ConnectionState::Connected) => Ok(()),
        Ok(_) => match manager.await {
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("connection manager stopped")),
            Ok(Ok(())) => bail!("connection closed before authenticating"),
            Err(e) => Err(anyhow::Error::new(e).context("connection manager task failed")),
        },
        Err(_) => {
            let current = *state.borrow();
            warn!(state = %current, "No live session yet; continuing over REST");
            Ok(())
        }
    }
}

/// Fails unless every command in the batch succeeded.
fn batch_outcome(result: &BatchResult) -> anyhow::Result<()> {
    if result.all_succeeded() {
        return Ok(());
    }
    let s = result.summary;
    bail!(
        "{} of {} commands did not succeed",
        s.failed + s.skipped + s.aborted,
        result.results.len()
    )
}

fn print_orders(orders: &[Order]) {
    if orders.is_empty() {
        println!("no matching orders");
        return;
    }
    for order in orders {
        println!(
            "{} {} {} {} @ {} ({})",
            order.id(),
            order.symbol(),
            order.side().as_str(),
            order.remaining(),
            order.price(),
            order.status()
        );
    }
}

fn print_summary(orders: &[Order]) {
    println!("{} matching order(s)", orders.len());
    for side in [OrderSide::Buy, OrderSide::Sell] {
        let (count, amount, notional) = orders
            .iter()
            .filter(|o| o.side() == side)
            .fold((0, Decimal::ZERO, Decimal::ZERO), |(n, a, v), o| {
                (n + 1, a + o.remaining(), v + o.remaining() * o.price())
            });
        println!("{}: {} order(s), amount {}, notional {}", side.as_str(), count, amount, notional);
    }
}

fn report(result: &BatchResult) {
    let prefix = if result.dry_run { "[dry-run] " } else { "" };
    for entry in &result.results {
        match &entry.status {
            CommandStatus::Succeeded(output) => println!("{}{}: {}", prefix, entry.id, describe(output)),
            CommandStatus::Failed(e) => println!("{}{}: failed ({}): {}", prefix, entry.id, e.kind(), e),
            CommandStatus::SkippedDependencyFailed { dependency } => {
                println!("{}{}: skipped, {} did not succeed", prefix, entry.id, dependency)
            }
            CommandStatus::Aborted => println!("{}{}: aborted", prefix, entry.id),
        }
        match &entry.undo {
            Some(UndoStatus::Undone(output)) => println!("  undone: {}", describe(output)),
            Some(UndoStatus::Failed(e)) => println!("  undo failed: {}", e),
            Some(UndoStatus::NotReversible) => println!("  not reversible"),
            Some(UndoStatus::NoEffect) | None => {}
        }
    }
    let s = result.summary;
    println!(
        "{}succeeded {} | failed {} | skipped {} | aborted {} | undone {} | undo failed {}",
        prefix, s.succeeded, s.failed, s.skipped, s.aborted, s.undone, s.undo_failed
    );
}

fn describe(output: &CommandOutput) -> String {
    match output {
        CommandOutput::Placed(order) => format!(
            "placed {} {} {} @ {} ({})",
            order.id(),
            order.side().as_str(),
            order.remaining(),
            order.price(),
            order.status()
        ),
        CommandOutput::Cancelled(order) => format!("cancelled {} ({})", order.id(), order.status()),
        CommandOutput::Updated(outcome) => match &outcome.replaced {
            Some(old) => format!(
                "replaced {} with {} {} @ {}",
                old.id(),
                outcome.order.id(),
                outcome.order.remaining(),
                outcome.order.price()
            ),
            None => format!(
                "updated {} to {} @ {}",
                outcome.order.id(),
                outcome.order.remaining(),
                outcome.order.price()
            ),
        },
        CommandOutput::Barrier => "barrier".to_string(),
        CommandOutput::DryRun(effect) => format!("would {:?}", effect),
    }
}

async fn watch_until_interrupted(core: &TradingCore, connection: &ConnectionHandle, metrics: SharedMetrics) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating shutdown");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut transitions = connection.subscribe_state();
    let mut orders = core.subscribe_orders();
    let mut health = tokio::time::interval(HEALTH_LOG_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            transition = transitions.recv() => match transition {
                Ok(t) => println!(
                    "connection: {} -> {}{}",
                    t.from,
                    t.to,
                    t.reason.map(|r| format!(" ({})", r)).unwrap_or_default()
                ),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            change = orders.recv() => match change {
                Ok(change) => println!(
                    "order {:?}: {} {} {} @ {} ({})",
                    change.outcome,
                    change.order.id(),
                    change.order.symbol(),
                    change.order.remaining(),
                    change.order.price(),
                    change.order.status()
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Order listener lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = health.tick() => {
                let snapshot = metrics.snapshot();
                info!(
                    status = %snapshot.health_status(),
                    messages = snapshot.messages_received,
                    errors = snapshot.websocket_errors + snapshot.decode_errors,
                    reconnects = snapshot.reconnect_attempts,
                    resyncs = snapshot.resyncs,
                    naked_cancels = snapshot.naked_cancels,
                    "Health check"
                );
            }
        }
    }
}
