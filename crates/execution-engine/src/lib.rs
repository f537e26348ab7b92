//! Command and batch execution for maker-only orders.
//!
//! - **Gateway**: deadline-bounded venue calls applied to the reconciler
//! - **Validation**: maker-only and notional checks against the quote board
//! - **Resolver**: in-place update or cancel-then-recreate
//! - **Batch engine**: dependency-ordered commands with abort/undo or
//!   continue-and-report policies, and dry runs
//! - **Sync**: stream events into the order set, resync on every new session
//!
//! [`TradingCore`] wires these together.
//!
//! # Example
//!
//! ```rust,ignore
//! let core = TradingCore::with_connection(rest, handle, metrics, CoreConfig::default());
//! core.spawn_sync();
//!
//! let plan = BatchPlan::abort_on_first_failure()
//!     .with_command(Command::place("bid", OrderRequest::new("tBTCUSD", OrderSide::Buy, dec!(0.1), dec!(60000))))
//!     .with_command(Command::update("grow", token, UpdateRequest::amount(dec!(0.2))).after("bid"));
//! let result = core.execute_batch(plan).await;
//! ```

mod batch;
mod command;
mod dry_run;
mod error;
mod executor;
mod gateway;
mod plans;
mod quotes;
mod resolver;
mod service;
mod streaming;
mod sync;
mod validation;

#[cfg(test)]
mod testing;

pub use batch::{
    BatchConfig, BatchEngine, BatchPlan, BatchPolicy, BatchResult, BatchSummary, CommandResult, CommandStatus,
    UndoStatus,
};
pub use command::{Command, CommandExecutor, CommandId, CommandKind, CommandOutput, Undo};
pub use dry_run::{DryRunEffect, DryRunPlanner};
pub use error::{EngineError, ValidationError};
pub use executor::CoreExecutor;
pub use gateway::{AtomicUpdate, GatewayConfig, OrderGateway, SharedGateway, SharedVenue};
pub use plans::{cancel_all, update_all, FillSpreadSpec, LadderSpec, MarketMakeSpec, QuoteSides};
pub use quotes::{create_quote_board, QuoteBoard, SharedQuoteBoard};
pub use resolver::{PreparedUpdate, ResolverConfig, UpdateOutcome, UpdatePath, UpdateRequest, UpdateResolver};
pub use service::{CoreConfig, TradingCore};
pub use streaming::StreamingVenue;
pub use sync::{OrderSync, SyncConfig};
pub use validation::{OrderValidator, SharedValidator, ValidationConfig};
