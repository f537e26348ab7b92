//! Dependency-ordered batch execution.
//!
//! A plan is checked as a whole before anything runs: duplicate ids, unknown
//! dependencies and cycles fail every command. Commands whose dependencies
//! all succeeded run concurrently up to `max_concurrency`. A command whose
//! dependency did not succeed is skipped.
//!
//! Under `AbortOnFirstFailure` the first failure stops new launches,
//! in-flight commands are awaited, and every succeeded command is undone in
//! reverse dependency order. Commands that never launched are reported as
//! aborted. Under `ContinueAndReport` every runnable branch executes and
//! nothing is undone.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandExecutor, CommandId, CommandOutput, Undo};
use crate::error::{EngineError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    AbortOnFirstFailure,
    ContinueAndReport,
}

#[derive(Debug, Clone)]
pub struct BatchPlan {
    commands: Vec<Command>,
    policy: BatchPolicy,
    dry_run: bool,
}

impl BatchPlan {
    pub fn new(policy: BatchPolicy) -> Self {
        Self {
            commands: Vec::new(),
            policy,
            dry_run: false,
        }
    }

    pub fn abort_on_first_failure() -> Self {
        Self::new(BatchPolicy::AbortOnFirstFailure)
    }

    pub fn continue_and_report() -> Self {
        Self::new(BatchPolicy::ContinueAndReport)
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Commands allowed in flight at once.
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

#[derive(Debug, Clone)]
pub enum CommandStatus {
    Succeeded(CommandOutput),
    Failed(EngineError),
    /// A dependency failed, was skipped, or was aborted.
    SkippedDependencyFailed { dependency: CommandId },
    /// Never launched because the batch aborted.
    Aborted,
}

impl CommandStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
            Self::SkippedDependencyFailed { .. } => "skipped_dependency_failed",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone)]
pub enum UndoStatus {
    Undone(CommandOutput),
    NotReversible,
    NoEffect,
    Failed(EngineError),
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub id: CommandId,
    pub status: CommandStatus,
    /// Set only for succeeded commands of an aborted batch.
    pub undo: Option<UndoStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: usize,
    pub undone: usize,
    pub undo_failed: usize,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    /// One entry per command, in plan order.
    pub results: Vec<CommandResult>,
    pub summary: BatchSummary,
    pub dry_run: bool,
}

impl BatchResult {
    pub fn get(&self, id: &CommandId) -> Option<&CommandResult> {
        self.results.iter().find(|r| &r.id == id)
    }

    pub fn all_succeeded(&self) -> bool {
        self.summary.succeeded == self.results.len()
    }

    fn from_results(results: Vec<CommandResult>, dry_run: bool) -> Self {
        let mut summary = BatchSummary::default();
        for result in &results {
            match result.status {
                CommandStatus::Succeeded(_) => summary.succeeded += 1,
                CommandStatus::Failed(_) => summary.failed += 1,
                CommandStatus::SkippedDependencyFailed { .. } => summary.skipped += 1,
                CommandStatus::Aborted => summary.aborted += 1,
            }
            match result.undo {
                Some(UndoStatus::Undone(_)) => summary.undone += 1,
                Some(UndoStatus::Failed(_)) => summary.undo_failed += 1,
                _ => {}
            }
        }
        Self {
            results,
            summary,
            dry_run,
        }
    }
}

/// Dependency graph of a checked plan.
struct Graph {
    /// Command indexes in topological order.
    order: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    dependency_count: Vec<usize>,
}

impl Graph {
    /// Kahn's algorithm; ties keep plan order.
    fn build(commands: &[Command]) -> Result<Self, ValidationError> {
        let mut index = HashMap::with_capacity(commands.len());
        for (i, command) in commands.iter().enumerate() {
            if index.insert(command.id().clone(), i).is_some() {
                return Err(ValidationError::DuplicateCommand(command.id().clone()));
            }
        }

        let mut dependents = vec![Vec::new(); commands.len()];
        let mut dependency_count = vec![0; commands.len()];
        for (i, command) in commands.iter().enumerate() {
            let mut seen = HashSet::new();
            for dependency in command.depends_on() {
                let &d = index.get(dependency).ok_or_else(|| ValidationError::UnknownDependency {
                    command: command.id().clone(),
                    dependency: dependency.clone(),
                })?;
                if seen.insert(d) {
                    dependents[d].push(i);
                    dependency_count[i] += 1;
                }
            }
        }

        let mut remaining = dependency_count.clone();
        let mut queue: VecDeque<usize> = (0..commands.len()).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(commands.len());
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &d in &dependents[i] {
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    queue.push_back(d);
                }
            }
        }

        if order.len() < commands.len() {
            let stuck = (0..commands.len())
                .find(|i| remaining[*i] > 0)
                .unwrap_or_default();
            return Err(ValidationError::DependencyCycle(commands[stuck].id().clone()));
        }

        Ok(Self {
            order,
            dependents,
            dependency_count,
        })
    }
}

/// Mutable state of one batch run.
struct Schedule<'a> {
    commands: &'a [Command],
    graph: Graph,
    waiting: Vec<usize>,
    statuses: Vec<Option<CommandStatus>>,
    ready: VecDeque<usize>,
}

impl<'a> Schedule<'a> {
    fn new(commands: &'a [Command], graph: Graph) -> Self {
        let waiting = graph.dependency_count.clone();
        Self {
            commands,
            graph,
            waiting,
            statuses: vec![None; commands.len()],
            ready: VecDeque::new(),
        }
    }

    fn seed(&mut self) {
        for &i in &self.graph.order {
            if self.waiting[i] == 0 && self.statuses[i].is_none() {
                self.ready.push_back(i);
            }
        }
    }

    /// Record a final status and release or skip dependents.
    fn finish(&mut self, index: usize, status: CommandStatus) {
        let success = status.is_success();
        self.statuses[index] = Some(status);

        if success {
            for &d in &self.graph.dependents[index] {
                self.waiting[d] -= 1;
                if self.waiting[d] == 0 && self.statuses[d].is_none() {
                    self.ready.push_back(d);
                }
            }
            return;
        }

        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            for &d in &self.graph.dependents[i] {
                if self.statuses[d].is_none() {
                    debug!(command = %self.commands[d].id(), dependency = %self.commands[i].id(), "Skipping command");
                    self.statuses[d] = Some(CommandStatus::SkippedDependencyFailed {
                        dependency: self.commands[i].id().clone(),
                    });
                    stack.push(d);
                }
            }
        }
    }

    fn abort_rest(&mut self) {
        for status in self.statuses.iter_mut().filter(|s| s.is_none()) {
            *status = Some(CommandStatus::Aborted);
        }
    }
}

/// Executes batch plans.
pub struct BatchEngine {
    executor: Arc<dyn CommandExecutor>,
    config: BatchConfig,
}

impl BatchEngine {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: BatchConfig) -> Self {
        Self { executor, config }
    }

    /// Run `plan`. Never fails as a whole; outcomes are per command.
    pub async fn execute(&self, plan: BatchPlan) -> BatchResult {
        let commands = plan.commands();
        info!(
            commands = commands.len(),
            policy = ?plan.policy(),
            dry_run = plan.is_dry_run(),
            "Executing batch"
        );

        let graph = match Graph::build(commands) {
            Ok(graph) => graph,
            Err(e) => {
                warn!(error = %e, "Batch plan rejected");
                let results = commands
                    .iter()
                    .map(|c| CommandResult {
                        id: c.id().clone(),
                        status: CommandStatus::Failed(EngineError::Validation(e.clone())),
                        undo: None,
                    })
                    .collect();
                return BatchResult::from_results(results, plan.is_dry_run());
            }
        };
        let mut schedule = Schedule::new(commands, graph);
        let abort = plan.policy() == BatchPolicy::AbortOnFirstFailure;

        let mut invalid = false;
        for i in schedule.graph.order.clone() {
            if schedule.statuses[i].is_some() {
                continue;
            }
            if let Err(e) = self.executor.validate(commands[i].kind()) {
                warn!(command = %commands[i].id(), error = %e, "Command failed validation");
                invalid = true;
                schedule.finish(i, CommandStatus::Failed(EngineError::Validation(e)));
            }
        }

        let aborted = if abort && invalid {
            true
        } else {
            schedule.seed();
            self.run(&mut schedule, plan.is_dry_run(), abort).await
        };
        if aborted {
            schedule.abort_rest();
        }

        let mut undo: Vec<Option<UndoStatus>> = vec![None; commands.len()];
        if aborted {
            self.undo(&schedule, plan.is_dry_run(), &mut undo).await;
        }

        let results = commands
            .iter()
            .zip(schedule.statuses)
            .zip(undo)
            .map(|((command, status), undo)| CommandResult {
                id: command.id().clone(),
                // Anything unsettled lost its task
                status: status.unwrap_or_else(|| {
                    CommandStatus::Failed(EngineError::TaskFailed("command task lost".to_string()))
                }),
                undo,
            })
            .collect();
        let result = BatchResult::from_results(results, plan.is_dry_run());
        info!(
            succeeded = result.summary.succeeded,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            aborted = result.summary.aborted,
            undone = result.summary.undone,
            "Batch finished"
        );
        result
    }

    /// Launch ready commands until none remain. Returns whether the batch aborted.
    async fn run(&self, schedule: &mut Schedule<'_>, dry_run: bool, abort: bool) -> bool {
        let commands = schedule.commands;
        let max_concurrency = self.config.max_concurrency.max(1);
        let mut tasks = JoinSet::new();
        let mut launched = HashMap::new();
        let mut aborting = false;

        loop {
            while !aborting && tasks.len() < max_concurrency {
                let Some(index) = schedule.ready.pop_front() else {
                    break;
                };
                let command = &commands[index];
                debug!(command = %command.id(), kind = command.kind().label(), "Launching command");
                let executor = self.executor.clone();
                let kind = command.kind().clone();
                let handle = tasks.spawn(async move {
                    let result = if dry_run {
                        executor.preview(&kind).map(CommandOutput::DryRun)
                    } else {
                        match tokio::spawn(async move { executor.execute(&kind).await }).await {
                            Ok(result) => result,
                            Err(e) => Err(EngineError::TaskFailed(e.to_string())),
                        }
                    };
                    (index, result)
                });
                launched.insert(handle.id(), index);
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = %e, "Batch task failed");
                    let Some(index) = launched.remove(&e.id()) else {
                        continue;
                    };
                    (index, Err(EngineError::TaskFailed(e.to_string())))
                }
            };
            let id = commands[index].id();
            match result {
                Ok(output) => {
                    debug!(command = %id, "Command succeeded");
                    schedule.finish(index, CommandStatus::Succeeded(output));
                }
                Err(e) => {
                    warn!(command = %id, kind = e.kind(), error = %e, "Command failed");
                    schedule.finish(index, CommandStatus::Failed(e));
                    if abort && !aborting {
                        info!("Aborting batch after first failure");
                        aborting = true;
                    }
                }
            }
        }
        aborting
    }

    /// Compensate succeeded commands, last first.
    async fn undo(&self, schedule: &Schedule<'_>, dry_run: bool, undo: &mut [Option<UndoStatus>]) {
        for &i in schedule.graph.order.iter().rev() {
            if !matches!(schedule.statuses[i], Some(CommandStatus::Succeeded(_))) {
                continue;
            }
            let command = &schedule.commands[i];
            let status = match command.undo() {
                Undo::NotReversible => UndoStatus::NotReversible,
                Undo::NoEffect => UndoStatus::NoEffect,
                Undo::Inverse(kind) => {
                    let outcome = if dry_run {
                        self.executor.preview(kind).map(CommandOutput::DryRun)
                    } else {
                        self.executor.execute(kind).await
                    };
                    match outcome {
                        Ok(output) => {
                            info!(command = %command.id(), "Command undone");
                            UndoStatus::Undone(output)
                        }
                        Err(e) => {
                            error!(command = %command.id(), error = %e, "Undo failed");
                            UndoStatus::Failed(e)
                        }
                    }
                }
            };
            undo[i] = Some(status);
        }
    }
}

impl std::fmt::Debug for BatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEngine")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::dry_run::DryRunEffect;
    use async_trait::async_trait;
    use execution_core::{Order, OrderRequest, OrderSide, PlaceholderId};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingExecutor {
        failing: HashSet<Decimal>,
        invalid: HashSet<Decimal>,
        panicking: HashSet<Decimal>,
        log: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingExecutor {
        fn failing(prices: &[i64]) -> Self {
            Self {
                failing: prices.iter().map(|p| Decimal::from(*p)).collect(),
                ..Default::default()
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        fn validate(&self, kind: &CommandKind) -> Result<(), ValidationError> {
            match kind {
                CommandKind::PlaceOrder(r) if self.invalid.contains(&r.price) => {
                    Err(ValidationError::NoQuote(r.symbol.clone()))
                }
                _ => Ok(()),
            }
        }

        async fn execute(&self, kind: &CommandKind) -> Result<CommandOutput, EngineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match kind {
                CommandKind::PlaceOrder(request) => {
                    self.log.lock().push(format!("place {}", request.price));
                    if self.failing.contains(&request.price) {
                        return Err(EngineError::VenueRejection("no".to_string()));
                    }
                    Ok(CommandOutput::Placed(Order::pending(PlaceholderId::generate(), request, 0)))
                }
                CommandKind::CancelOrder(target) => {
                    self.log.lock().push(format!("cancel {}", target));
                    Ok(CommandOutput::Barrier)
                }
                _ => Ok(CommandOutput::Barrier),
            }
        }

        fn preview(&self, kind: &CommandKind) -> Result<DryRunEffect, EngineError> {
            match kind {
                CommandKind::PlaceOrder(request) if self.panicking.contains(&request.price) => {
                    panic!("preview blew up at {}", request.price)
                }
                CommandKind::PlaceOrder(request) => Ok(DryRunEffect::Submit(request.clone())),
                CommandKind::CancelOrder(target) => Ok(DryRunEffect::Cancel {
                    target: *target,
                    order: None,
                }),
                _ => Ok(DryRunEffect::Barrier),
            }
        }
    }

    fn place(price: i64) -> OrderRequest {
        OrderRequest::new("tBTCUSD", OrderSide::Buy, Decimal::ONE, Decimal::from(price))
    }

    fn engine(executor: &Arc<RecordingExecutor>, max_concurrency: usize) -> BatchEngine {
        BatchEngine::new(executor.clone(), BatchConfig { max_concurrency })
    }

    fn status<'a>(result: &'a BatchResult, id: &str) -> &'a CommandStatus {
        &result.get(&CommandId::from(id)).unwrap().status
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dependency_skips_dependent() {
        let executor = Arc::new(RecordingExecutor::failing(&[1]));
        let plan = BatchPlan::abort_on_first_failure()
            .with_command(Command::place("a", place(1)))
            .with_command(Command::place("b", place(2)).after("a"));

        let result = engine(&executor, 4).execute(plan).await;

        assert!(matches!(status(&result, "a"), CommandStatus::Failed(_)));
        assert!(matches!(
            status(&result, "b"),
            CommandStatus::SkippedDependencyFailed { dependency } if dependency.as_str() == "a"
        ));
        assert_eq!(executor.log(), vec!["place 1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_undoes_in_reverse_order() {
        let executor = Arc::new(RecordingExecutor::failing(&[2]));
        let first = place(1);
        let fourth = place(4);
        let (first_token, fourth_token) = (first.token, fourth.token);
        let plan = BatchPlan::abort_on_first_failure()
            .with_command(Command::place("p1", first))
            .with_command(Command::place("p2", place(2)).after("p1"))
            .with_command(Command::place("p3", place(3)).after("p2"))
            .with_command(Command::place("p4", fourth).after("p1"));

        let result = engine(&executor, 4).execute(plan).await;

        assert!(matches!(status(&result, "p1"), CommandStatus::Succeeded(_)));
        assert!(matches!(status(&result, "p2"), CommandStatus::Failed(_)));
        assert!(matches!(
            status(&result, "p3"),
            CommandStatus::SkippedDependencyFailed { .. }
        ));
        assert!(matches!(status(&result, "p4"), CommandStatus::Succeeded(_)));
        assert_eq!(result.summary.undone, 2);

        let log = executor.log();
        assert_eq!(log[0], "place 1");
        assert_eq!(
            log[3..],
            [format!("cancel cid:{}", fourth_token), format!("cancel cid:{}", first_token)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlaunched_commands_are_aborted() {
        let executor = Arc::new(RecordingExecutor::failing(&[1]));
        let plan = BatchPlan::abort_on_first_failure()
            .with_command(Command::place("a", place(1)))
            .with_command(Command::place("b", place(2)));

        let result = engine(&executor, 1).execute(plan).await;

        assert!(matches!(status(&result, "b"), CommandStatus::Aborted));
        assert_eq!(result.summary.aborted, 1);
        assert_eq!(executor.log().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_reports_every_branch() {
        let executor = Arc::new(RecordingExecutor::failing(&[1]));
        let plan = BatchPlan::continue_and_report()
            .with_command(Command::place("bad", place(1)))
            .with_command(Command::place("bad-child", place(3)).after("bad"))
            .with_command(Command::place("good", place(2)));

        let result = engine(&executor, 4).execute(plan).await;

        assert!(matches!(status(&result, "bad"), CommandStatus::Failed(_)));
        assert!(matches!(
            status(&result, "bad-child"),
            CommandStatus::SkippedDependencyFailed { .. }
        ));
        let good = result.get(&CommandId::from("good")).unwrap();
        assert!(good.status.is_success());
        assert!(good.undo.is_none());
        assert_eq!(
            result.summary,
            BatchSummary {
                succeeded: 1,
                failed: 1,
                skipped: 1,
                ..Default::default()
            }
        );
        assert!(!executor.log().iter().any(|l| l.starts_with("cancel")));
    }

    #[tokio::test]
    async fn test_plan_errors_fail_everything() {
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(&executor, 4);

        let duplicate = BatchPlan::continue_and_report()
            .with_command(Command::barrier("a"))
            .with_command(Command::barrier("a"));
        let unknown = BatchPlan::continue_and_report().with_command(Command::barrier("a").after("zz"));
        let cycle = BatchPlan::continue_and_report()
            .with_command(Command::barrier("a").after("b"))
            .with_command(Command::barrier("b").after("a"))
            .with_command(Command::barrier("c"));

        for plan in [duplicate, unknown, cycle] {
            let len = plan.len();
            let result = engine.execute(plan).await;
            assert_eq!(result.summary.failed, len);
            assert!(result
                .results
                .iter()
                .all(|r| matches!(r.status, CommandStatus::Failed(EngineError::Validation(_)))));
        }
        assert!(executor.log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_aborts_before_execution() {
        let executor = Arc::new(RecordingExecutor {
            invalid: [Decimal::from(2)].into_iter().collect(),
            ..Default::default()
        });
        let plan = BatchPlan::abort_on_first_failure()
            .with_command(Command::place("a", place(1)))
            .with_command(Command::place("b", place(2)));

        let result = engine(&executor, 4).execute(plan).await;

        assert!(matches!(status(&result, "a"), CommandStatus::Aborted));
        assert!(matches!(
            status(&result, "b"),
            CommandStatus::Failed(EngineError::Validation(_))
        ));
        assert!(executor.log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let executor = Arc::new(RecordingExecutor::default());
        let mut plan = BatchPlan::continue_and_report();
        for i in 0..6 {
            plan.push(Command::place(format!("p{}", i), place(i + 1)));
        }

        let result = engine(&executor, 2).execute(plan).await;

        assert!(result.all_succeeded());
        assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let executor = Arc::new(RecordingExecutor::default());
        let request = place(1);
        let plan = BatchPlan::abort_on_first_failure()
            .with_dry_run(true)
            .with_command(Command::place("a", request.clone()))
            .with_command(Command::barrier("b").after("a"));

        let result = engine(&executor, 4).execute(plan).await;

        assert!(result.dry_run);
        assert!(result.all_succeeded());
        assert!(matches!(
            status(&result, "a"),
            CommandStatus::Succeeded(CommandOutput::DryRun(DryRunEffect::Submit(r))) if *r == request
        ));
        assert!(executor.log().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_fails_its_command() {
        let executor = Arc::new(RecordingExecutor {
            panicking: [Decimal::from(1)].into_iter().collect(),
            ..Default::default()
        });
        let plan = BatchPlan::abort_on_first_failure()
            .with_dry_run(true)
            .with_command(Command::place("a", place(1)))
            .with_command(Command::place("b", place(2)).after("a"));

        let result = engine(&executor, 4).execute(plan).await;

        assert!(matches!(
            status(&result, "a"),
            CommandStatus::Failed(EngineError::TaskFailed(reason)) if reason.contains("panic")
        ));
        assert!(matches!(
            status(&result, "b"),
            CommandStatus::SkippedDependencyFailed { dependency } if dependency.as_str() == "a"
        ));
        assert_eq!(result.summary.failed, 1);
    }
}
