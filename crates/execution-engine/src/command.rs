//! Trading commands and their compensations.

use std::fmt;

use async_trait::async_trait;
use execution_core::{Order, OrderRef, OrderRequest};

use crate::dry_run::DryRunEffect;
use crate::error::{EngineError, ValidationError};
use crate::resolver::{UpdateOutcome, UpdateRequest};

/// Caller-chosen identifier, unique within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CommandId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CommandId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    PlaceOrder(OrderRequest),
    CancelOrder(OrderRef),
    UpdateOrder { target: OrderRef, update: UpdateRequest },
    /// Orders the plan without doing anything.
    NoOpBarrier,
}

impl CommandKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PlaceOrder(_) => "place",
            Self::CancelOrder(_) => "cancel",
            Self::UpdateOrder { .. } => "update",
            Self::NoOpBarrier => "barrier",
        }
    }
}

/// Compensation fixed when the command is built.
#[derive(Debug, Clone, PartialEq)]
pub enum Undo {
    Inverse(CommandKind),
    NotReversible,
    NoEffect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    id: CommandId,
    kind: CommandKind,
    depends_on: Vec<CommandId>,
    undo: Undo,
}

impl Command {
    /// Place an order. Its undo cancels the order by the request's token.
    pub fn place(id: impl Into<CommandId>, request: OrderRequest) -> Self {
        let undo = Undo::Inverse(CommandKind::CancelOrder(OrderRef::Token(request.token)));
        Self::build(id.into(), CommandKind::PlaceOrder(request), undo)
    }

    pub fn cancel(id: impl Into<CommandId>, target: impl Into<OrderRef>) -> Self {
        Self::build(id.into(), CommandKind::CancelOrder(target.into()), Undo::NotReversible)
    }

    pub fn update(id: impl Into<CommandId>, target: impl Into<OrderRef>, update: UpdateRequest) -> Self {
        let kind = CommandKind::UpdateOrder {
            target: target.into(),
            update,
        };
        Self::build(id.into(), kind, Undo::NotReversible)
    }

    pub fn barrier(id: impl Into<CommandId>) -> Self {
        Self::build(id.into(), CommandKind::NoOpBarrier, Undo::NoEffect)
    }

    fn build(id: CommandId, kind: CommandKind, undo: Undo) -> Self {
        Self {
            id,
            kind,
            depends_on: Vec::new(),
            undo,
        }
    }

    /// Run only after `dependency` succeeded.
    pub fn after(mut self, dependency: impl Into<CommandId>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    pub fn id(&self) -> &CommandId {
        &self.id
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn depends_on(&self) -> &[CommandId] {
        &self.depends_on
    }

    pub fn undo(&self) -> &Undo {
        &self.undo
    }
}

/// What a successful command produced.
#[derive(Debug, Clone)]
pub enum CommandOutput {
    Placed(Order),
    Cancelled(Order),
    Updated(UpdateOutcome),
    Barrier,
    DryRun(DryRunEffect),
}

/// Runs command kinds against the venue.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Local checks, run for the whole plan before anything executes.
    fn validate(&self, kind: &CommandKind) -> Result<(), ValidationError>;

    async fn execute(&self, kind: &CommandKind) -> Result<CommandOutput, EngineError>;

    /// What `execute` would do, without any network call.
    fn preview(&self, kind: &CommandKind) -> Result<DryRunEffect, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution_core::{OrderId, OrderSide};
    use rust_decimal_macros::dec;

    #[test]
    fn test_place_undo_cancels_by_token() {
        let request = OrderRequest::new("tBTCUSD", OrderSide::Buy, dec!(1), dec!(100));
        let token = request.token;
        let command = Command::place("a", request);

        assert_eq!(
            command.undo(),
            &Undo::Inverse(CommandKind::CancelOrder(OrderRef::Token(token)))
        );
    }

    #[test]
    fn test_other_commands_not_reversible() {
        let cancel = Command::cancel("c", OrderId::Confirmed(1));
        assert_eq!(cancel.undo(), &Undo::NotReversible);

        let update = Command::update("u", OrderId::Confirmed(1), UpdateRequest::price(dec!(1)));
        assert_eq!(update.undo(), &Undo::NotReversible);

        assert_eq!(Command::barrier("b").undo(), &Undo::NoEffect);
    }

    #[test]
    fn test_dependencies() {
        let command = Command::barrier("b").after("a").after(CommandId::new("c"));
        assert_eq!(command.depends_on(), &[CommandId::from("a"), CommandId::from("c")]);
        assert_eq!(command.kind().label(), "barrier");
    }
}
