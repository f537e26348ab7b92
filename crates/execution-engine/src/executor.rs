use std::sync::Arc;

use async_trait::async_trait;

use crate::command::{CommandExecutor, CommandKind, CommandOutput};
use crate::dry_run::{DryRunEffect, DryRunPlanner};
use crate::error::{EngineError, ValidationError};
use crate::gateway::SharedGateway;
use crate::resolver::UpdateResolver;

/// Runs commands through the gateway and the update resolver.
pub struct CoreExecutor {
    gateway: SharedGateway,
    resolver: Arc<UpdateResolver>,
}

impl CoreExecutor {
    pub fn new(gateway: SharedGateway, resolver: Arc<UpdateResolver>) -> Self {
        Self { gateway, resolver }
    }
}

#[async_trait]
impl CommandExecutor for CoreExecutor {
    fn validate(&self, kind: &CommandKind) -> Result<(), ValidationError> {
        match kind {
            CommandKind::PlaceOrder(request) => self.gateway.validator().validate_request(request),
            CommandKind::UpdateOrder { update, .. } => update.validate(),
            // Targets may be placed earlier in the same plan
            CommandKind::CancelOrder(_) | CommandKind::NoOpBarrier => Ok(()),
        }
    }

    async fn execute(&self, kind: &CommandKind) -> Result<CommandOutput, EngineError> {
        match kind {
            CommandKind::PlaceOrder(request) => self.gateway.place(request.clone()).await.map(CommandOutput::Placed),
            CommandKind::CancelOrder(target) => self.gateway.cancel(target).await.map(CommandOutput::Cancelled),
            CommandKind::UpdateOrder { target, update } => self
                .resolver
                .update(target, update)
                .await
                .map(CommandOutput::Updated),
            CommandKind::NoOpBarrier => Ok(CommandOutput::Barrier),
        }
    }

    fn preview(&self, kind: &CommandKind) -> Result<DryRunEffect, EngineError> {
        DryRunPlanner::new(self.gateway.reconciler(), &self.resolver).preview(kind)
    }
}

impl std::fmt::Debug for CoreExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreExecutor").finish_non_exhaustive()
    }
}
