//! Dispatcher - drives a compose run level by level
//!
//! For each ordering group (direction-sorted) the dispatcher pushes one unit
//! of work per job onto the shared queue and blocks until it has collected
//! exactly that many outcomes. The first failing outcome fires the run-wide
//! cancellation signal, opens a grace window in which late outcomes are
//! drained and discarded, and ends the run. Later groups are never
//! dispatched after a failure.

use crate::application::grouper::{ExecutionPlan, OrderGroup};
use crate::application::worker::constants::{
    DEFAULT_GRACE_PERIOD, DEFAULT_PACING_DELAY, DEFAULT_SETTLE_DELAY,
};
use crate::application::worker::{Outcome, StackFailure, UnitOfWork, WorkQueue, Worker};
use crate::cancel::{cancel_channel, CancelSignal};
use crate::domain::{ComposeConfig, OrderKey, RunMode};
use crate::error::{AppError, Result};
use crate::port::id_provider::UuidProvider;
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{BackendSession, IdProvider, SessionProvider, StackBackend, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What happens to still-running workers once the grace period ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InFlightPolicy {
    /// Leave them running; their outcomes are discarded
    #[default]
    Detach,
    /// Abort them, dropping their in-flight backend calls
    Abort,
}

/// Tunable timings and policies for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub pacing_delay: Duration,
    /// Upper bound on the drain after a failure. Unlike a fixed sleep, the
    /// drain ends as soon as every in-flight job has reported, and is
    /// skipped when none is in flight.
    pub grace_period: Duration,
    pub settle_delay: Duration,
    pub in_flight_policy: InFlightPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pacing_delay: DEFAULT_PACING_DELAY,
            grace_period: DEFAULT_GRACE_PERIOD,
            settle_delay: DEFAULT_SETTLE_DELAY,
            in_flight_policy: InFlightPolicy::default(),
        }
    }
}

impl RunOptions {
    /// No pacing, grace or settle waits (tests, local backends)
    pub fn immediate() -> Self {
        Self {
            pacing_delay: Duration::ZERO,
            grace_period: Duration::ZERO,
            settle_delay: Duration::ZERO,
            in_flight_policy: InFlightPolicy::default(),
        }
    }
}

/// Per-run request from the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub mode: RunMode,
    pub dry_run: bool,
}

impl RunRequest {
    pub fn deploy() -> Self {
        Self {
            mode: RunMode::Deploy,
            dry_run: false,
        }
    }

    pub fn destroy() -> Self {
        Self {
            mode: RunMode::Destroy,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Terminal report of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub mode: RunMode,
    pub dry_run: bool,
    pub status: RunStatus,
    pub total_jobs: usize,
    /// Order keys whose groups fully succeeded, in execution sequence
    pub completed_orders: Vec<OrderKey>,
    /// Order key of the group that failed
    pub failed_order: Option<OrderKey>,
    /// The failure that ended the run
    pub failure: Option<StackFailure>,
    /// Outcomes that arrived after the cancel decision
    pub discarded_outcomes: usize,
    /// Units still queued at cancellation, never claimed by a worker
    pub withdrawn_units: usize,
    /// Cancellation broadcasts sent to workers (0 or 1)
    pub cancel_broadcasts: usize,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn duration_ms(&self) -> i64 {
        self.finished_at_ms - self.started_at_ms
    }
}

/// Run state machine, logged at debug level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Idle,
    Dispatching(OrderKey),
    Barrier(OrderKey),
    Cancelling,
    Draining,
    Terminated(RunStatus),
}

struct PhaseTracker(RunPhase);

impl PhaseTracker {
    fn enter(&mut self, next: RunPhase) {
        debug!(from = ?self.0, to = ?next, "Run phase transition");
        self.0 = next;
    }
}

/// Channels and workers for one run
struct Pool {
    work_tx: Option<mpsc::Sender<UnitOfWork>>,
    queue: WorkQueue,
    outcome_rx: mpsc::Receiver<Outcome>,
    signal: CancelSignal,
    workers: JoinSet<()>,
}

impl Pool {
    /// Spawn `size` workers; queues hold `size` items so neither side blocks
    fn spawn(size: usize, pacing_delay: Duration) -> Self {
        let capacity = size.max(1);
        let (work_tx, work_rx) = mpsc::channel(capacity);
        let (outcome_tx, outcome_rx) = mpsc::channel(capacity);
        let queue: WorkQueue = Arc::new(Mutex::new(work_rx));
        let (signal, _) = cancel_channel();

        let mut workers = JoinSet::new();
        for id in 0..size {
            let worker = Worker::new(
                id,
                Arc::clone(&queue),
                outcome_tx.clone(),
                signal.token(),
                pacing_delay,
            );
            workers.spawn(worker.run());
        }

        Self {
            work_tx: Some(work_tx),
            queue,
            outcome_rx,
            signal,
            workers,
        }
    }

    async fn dispatch(&self, unit: UnitOfWork) -> Result<()> {
        let tx = self
            .work_tx
            .as_ref()
            .ok_or_else(|| AppError::Internal("work queue already closed".to_string()))?;
        tx.send(unit)
            .await
            .map_err(|_| AppError::Internal("all workers exited before dispatch".to_string()))
    }

    async fn next_outcome(&mut self) -> Result<Outcome> {
        self.outcome_rx
            .recv()
            .await
            .ok_or_else(|| AppError::Internal("all workers exited with work pending".to_string()))
    }

    fn close_queue(&mut self) {
        self.work_tx = None;
    }

    /// Pull units nobody claimed yet back out of the queue
    async fn withdraw_unclaimed(&self) -> usize {
        let mut rx = self.queue.lock().await;
        let mut withdrawn = 0;
        while let Ok(unit) = rx.try_recv() {
            debug!(job = %unit.job_name(), "Withdrawing unclaimed unit");
            withdrawn += 1;
        }
        withdrawn
    }

    /// Receive up to `pending` late outcomes within `grace`; returns how many arrived
    async fn drain(&mut self, pending: usize, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        let mut discarded = 0;
        while discarded < pending {
            match tokio::time::timeout_at(deadline, self.outcome_rx.recv()).await {
                Ok(Some(outcome)) => {
                    debug!(
                        job = %outcome.job,
                        failed = !outcome.is_success(),
                        "Discarding outcome received after cancellation"
                    );
                    discarded += 1;
                }
                Ok(None) | Err(_) => break,
            }
        }
        discarded
    }

    /// Wait for idle workers to leave after the queue closed
    async fn join(mut self) {
        while self.workers.join_next().await.is_some() {}
    }

    async fn release(mut self, policy: InFlightPolicy) {
        match policy {
            InFlightPolicy::Detach => self.workers.detach_all(),
            InFlightPolicy::Abort => {
                self.workers.abort_all();
                while self.workers.join_next().await.is_some() {}
            }
        }
    }
}

/// Failure decision carried from the barrier to the cancel path
struct GroupFailure {
    order: OrderKey,
    failure: StackFailure,
    pending: usize,
}

/// Compose run orchestrator
pub struct Composer {
    backend: Arc<dyn StackBackend>,
    sessions: Arc<dyn SessionProvider>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    options: RunOptions,
}

impl Composer {
    pub fn new(backend: Arc<dyn StackBackend>, sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            backend,
            sessions,
            time_provider: Arc::new(SystemTimeProvider),
            id_provider: Arc::new(UuidProvider),
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Swap clock and run-id sources (deterministic tests)
    pub fn with_providers(
        mut self,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        self.time_provider = time_provider;
        self.id_provider = id_provider;
        self
    }

    /// Run every group of `config` to a terminal state
    ///
    /// # Errors
    /// - AppError::Domain if the config is invalid
    /// - AppError::Setup if no backend session can be opened (nothing runs)
    ///
    /// A failing stack is not an error here: it ends the run with a
    /// `RunStatus::Failed` report.
    pub async fn run(&self, config: &ComposeConfig, request: RunRequest) -> Result<RunReport> {
        config.validate()?;
        let plan = ExecutionPlan::build(config, request.mode);

        let session = self
            .sessions
            .open(&config.backend_settings())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed while creating backend session");
                AppError::Setup(e)
            })?;

        let run_id = self.id_provider.generate_id();
        let span = info_span!("run", run_id = %run_id, mode = %request.mode, dry_run = request.dry_run);

        self.execute_plan(plan, Arc::new(session), run_id, request)
            .instrument(span)
            .await
    }

    async fn execute_plan(
        &self,
        plan: ExecutionPlan,
        session: Arc<BackendSession>,
        run_id: String,
        request: RunRequest,
    ) -> Result<RunReport> {
        let started_at_ms = self.time_provider.now_millis();
        let total_jobs = plan.job_count();
        let mut phase = PhaseTracker(RunPhase::Idle);
        let mut report = RunReport {
            run_id: run_id.clone(),
            mode: request.mode,
            dry_run: request.dry_run,
            status: RunStatus::Succeeded,
            total_jobs,
            completed_orders: Vec::new(),
            failed_order: None,
            failure: None,
            discarded_outcomes: 0,
            withdrawn_units: 0,
            cancel_broadcasts: 0,
            started_at_ms,
            finished_at_ms: started_at_ms,
        };

        info!(total_jobs, "TOTAL JOB COUNT: {}", total_jobs);

        // One worker per job: dispatching any group can never wait for a free worker
        let mut pool = Pool::spawn(total_jobs, self.options.pacing_delay);
        let run_id: Arc<str> = Arc::from(run_id);

        for group in plan.groups() {
            phase.enter(RunPhase::Dispatching(group.order));
            self.dispatch_group(&pool, group, &run_id, &session, request)
                .await?;
            info!(order = group.order, job_count = group.jobs.len(), "Dispatched order");

            phase.enter(RunPhase::Barrier(group.order));
            if let Some(group_failure) = Self::await_group(&mut pool, group).await? {
                self.cancel_run(pool, group_failure, &mut report, &mut phase)
                    .await;
                report.finished_at_ms = self.time_provider.now_millis();
                return Ok(report);
            }

            info!(order = group.order, "All jobs completed for dispatched order");
            report.completed_orders.push(group.order);
        }

        pool.close_queue();
        pool.join().await;

        if !self.options.settle_delay.is_zero() {
            tokio::time::sleep(self.options.settle_delay).await;
        }

        phase.enter(RunPhase::Terminated(RunStatus::Succeeded));
        report.finished_at_ms = self.time_provider.now_millis();
        info!(
            duration_ms = report.duration_ms(),
            "Compose run successfully completed"
        );
        Ok(report)
    }

    async fn dispatch_group(
        &self,
        pool: &Pool,
        group: &OrderGroup,
        run_id: &Arc<str>,
        session: &Arc<BackendSession>,
        request: RunRequest,
    ) -> Result<()> {
        for job in &group.jobs {
            pool.dispatch(UnitOfWork {
                run_id: Arc::clone(run_id),
                job: job.clone(),
                mode: request.mode,
                dry_run: request.dry_run,
                backend: Arc::clone(&self.backend),
                session: Arc::clone(session),
            })
            .await?;
        }
        Ok(())
    }

    /// Collect one outcome per dispatched job, stopping at the first failure
    async fn await_group(pool: &mut Pool, group: &OrderGroup) -> Result<Option<GroupFailure>> {
        let expected = group.jobs.len();
        for received in 1..=expected {
            let outcome = pool.next_outcome().await?;
            match outcome.failure {
                None => debug!(job = %outcome.job, "Job completed"),
                Some(failure) => {
                    return Ok(Some(GroupFailure {
                        order: group.order,
                        failure,
                        pending: expected - received,
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn cancel_run(
        &self,
        mut pool: Pool,
        group_failure: GroupFailure,
        report: &mut RunReport,
        phase: &mut PhaseTracker,
    ) {
        phase.enter(RunPhase::Cancelling);
        if pool.signal.fire() {
            warn!(order = group_failure.order, "Cancellation broadcast to all workers");
            report.cancel_broadcasts += 1;
        }
        pool.close_queue();
        let withdrawn = pool.withdraw_unclaimed().await;
        let pending = group_failure.pending.saturating_sub(withdrawn);

        phase.enter(RunPhase::Draining);
        info!(pending, grace_period = ?self.options.grace_period, "Graceful wait for cancelled jobs");
        let discarded = pool.drain(pending, self.options.grace_period).await;
        if discarded < pending {
            warn!(
                unreported = pending - discarded,
                policy = ?self.options.in_flight_policy,
                "Grace period ended with jobs still in flight"
            );
        }
        pool.release(self.options.in_flight_policy).await;

        phase.enter(RunPhase::Terminated(RunStatus::Failed));
        error!(error = %group_failure.failure, "Compose run failed");

        report.status = RunStatus::Failed;
        report.failed_order = Some(group_failure.order);
        report.failure = Some(group_failure.failure);
        report.discarded_outcomes = discarded;
        report.withdrawn_units = withdrawn;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, Stack};
    use crate::port::session::mocks::{FailingSessionProvider, StaticSessionProvider};
    use crate::port::stack_backend::mocks::{ScriptedBackend, StackScript};
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::BackendError;

    fn config() -> ComposeConfig {
        ComposeConfig::from_jobs(vec![
            Job::new(
                "A",
                1,
                vec![Stack::new("s1", "s1.yml"), Stack::new("s2", "s2.yml")],
            ),
            Job::new("B", 1, vec![Stack::new("s3", "s3.yml")]),
            Job::new("C", 2, vec![Stack::new("s4", "s4.yml")]),
        ])
    }

    fn composer(backend: Arc<ScriptedBackend>) -> Composer {
        Composer::new(backend, Arc::new(StaticSessionProvider))
            .with_options(RunOptions::immediate())
            .with_providers(
                Arc::new(FixedTimeProvider(42)),
                Arc::new(SequentialIdProvider::new("run")),
            )
    }

    #[tokio::test]
    async fn test_successful_deploy_report() {
        let backend = Arc::new(ScriptedBackend::new());
        let report = composer(backend.clone())
            .run(&config(), RunRequest::deploy())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.run_id, "run-1");
        assert_eq!(report.total_jobs, 3);
        assert_eq!(report.completed_orders, vec![1, 2]);
        assert_eq!(report.failure, None);
        assert_eq!(report.cancel_broadcasts, 0);
        assert_eq!(report.started_at_ms, 42);
        assert_eq!(report.duration_ms(), 0);
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn test_destroy_runs_descending() {
        let backend = Arc::new(ScriptedBackend::new());
        let report = composer(backend.clone())
            .run(&config(), RunRequest::destroy())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.completed_orders, vec![2, 1]);
        assert_eq!(backend.calls()[0].stack, "s4");
        assert_eq!(backend.stacks_called("A"), vec!["s2", "s1"]);
    }

    #[tokio::test]
    async fn test_failure_stops_later_groups() {
        let backend =
            Arc::new(ScriptedBackend::new().script("s1", StackScript::Fail("denied".into())));
        let report = composer(backend.clone())
            .run(&config(), RunRequest::deploy())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.failed_order, Some(1));
        assert!(report.completed_orders.is_empty());
        let failure = report.failure.unwrap();
        assert_eq!((failure.job.as_str(), failure.stack.as_str()), ("A", "s1"));
        assert_eq!(failure.source, BackendError::Operation("denied".into()));
        assert!(backend.stacks_called("C").is_empty());
        assert!(!backend.stacks_called("A").contains(&"s2".to_string()));
    }

    #[tokio::test]
    async fn test_setup_failure_runs_nothing() {
        let backend = Arc::new(ScriptedBackend::new());
        let composer = Composer::new(
            backend.clone(),
            Arc::new(FailingSessionProvider("no credentials".into())),
        )
        .with_options(RunOptions::immediate());

        let result = composer.run(&config(), RunRequest::deploy()).await;
        assert!(matches!(result, Err(AppError::Setup(_))));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let backend = Arc::new(ScriptedBackend::new());
        let result = composer(backend)
            .run(&ComposeConfig::default(), RunRequest::deploy())
            .await;
        assert!(matches!(result, Err(AppError::Domain(_))));
    }

    #[tokio::test]
    async fn test_dry_run_uses_dry_operations() {
        let backend = Arc::new(ScriptedBackend::new());
        let report = composer(backend.clone())
            .run(&config(), RunRequest::deploy().dry_run())
            .await
            .unwrap();

        assert!(report.is_success() && report.dry_run);
        assert!(backend
            .calls()
            .iter()
            .all(|c| c.operation == crate::domain::StackOperation::ApplyDryRun));
    }

    #[test]
    fn test_default_options() {
        let options = RunOptions::default();
        assert_eq!(options.pacing_delay, Duration::from_millis(500));
        assert_eq!(options.grace_period, Duration::from_secs(10));
        assert_eq!(options.settle_delay, Duration::from_secs(2));
        assert_eq!(options.in_flight_policy, InFlightPolicy::Detach);
    }
}
