// Worker - claims units of work and runs a job's stacks

pub mod constants;
mod panic_guard;

pub use panic_guard::guard_backend_call;

use crate::cancel::CancelToken;
use crate::domain::{Job, JobName, OrderKey, RunMode, StackOperation};
use crate::port::{BackendError, BackendSession, StackBackend, StackCall};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, info_span, Instrument};

/// Shared work queue; each worker claims one unit at a time
pub type WorkQueue = Arc<Mutex<mpsc::Receiver<UnitOfWork>>>;

/// One job's pending execution, consumed exactly once by one worker
#[derive(Clone)]
pub struct UnitOfWork {
    pub run_id: Arc<str>,
    pub job: Job,
    pub mode: RunMode,
    pub dry_run: bool,
    pub backend: Arc<dyn StackBackend>,
    pub session: Arc<BackendSession>,
}

impl UnitOfWork {
    pub fn job_name(&self) -> &str {
        &self.job.name
    }

    pub fn operation(&self) -> StackOperation {
        StackOperation::select(self.mode, self.dry_run)
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("run_id", &self.run_id)
            .field("job", &self.job.name)
            .field("mode", &self.mode)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

/// Stack operation failure tagged with job and stack identity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[JOB: {job}] [STACK: {stack}] {operation} failed: {source}")]
pub struct StackFailure {
    pub job: JobName,
    pub stack: String,
    pub operation: StackOperation,
    #[source]
    pub source: BackendError,
}

/// Completion report for one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub job: JobName,
    pub order: OrderKey,
    /// None means success
    pub failure: Option<StackFailure>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Pool worker
pub struct Worker {
    id: usize,
    queue: WorkQueue,
    outcomes: mpsc::Sender<Outcome>,
    cancel: CancelToken,
    pacing_delay: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: WorkQueue,
        outcomes: mpsc::Sender<Outcome>,
        cancel: CancelToken,
        pacing_delay: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            outcomes,
            cancel,
            pacing_delay,
        }
    }

    /// Claim and execute units until cancelled or the queue closes
    ///
    /// Every claimed unit yields exactly one outcome.
    pub async fn run(self) {
        debug!(worker = self.id, "Worker started");
        loop {
            let unit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(worker = self.id, "Cancel signal received");
                    break;
                }
                unit = Self::claim(&self.queue) => match unit {
                    Some(unit) => unit,
                    None => break,
                },
            };

            let outcome = Self::execute(unit, &self.cancel, self.pacing_delay).await;
            if self.outcomes.send(outcome).await.is_err() {
                debug!(worker = self.id, "Outcome receiver dropped");
                break;
            }
        }
        debug!(worker = self.id, "Worker exiting");
    }

    async fn claim(queue: &WorkQueue) -> Option<UnitOfWork> {
        queue.lock().await.recv().await
    }

    /// Run one job's stacks sequentially, stopping at the first failure
    ///
    /// Deploy walks stacks forward, destroy walks them backwards. Stacks not
    /// yet started when cancellation fires are not attempted.
    pub async fn execute(unit: UnitOfWork, cancel: &CancelToken, pacing_delay: Duration) -> Outcome {
        if !pacing_delay.is_zero() {
            tokio::time::sleep(pacing_delay).await;
        }

        let operation = unit.operation();
        let failure = Self::walk_stacks(&unit, operation, cancel).await;

        Outcome {
            job: unit.job.name.clone(),
            order: unit.job.order,
            failure,
        }
    }

    async fn walk_stacks(
        unit: &UnitOfWork,
        operation: StackOperation,
        cancel: &CancelToken,
    ) -> Option<StackFailure> {
        let job = unit.job_name();

        for stack in unit.job.stacks_for(unit.mode) {
            let fail = |source: BackendError| StackFailure {
                job: job.to_string(),
                stack: stack.stack_name.clone(),
                operation,
                source,
            };

            if cancel.is_cancelled() {
                debug!(job = %job, stack = %stack.stack_name, "Skipping stack after cancellation");
                return Some(fail(BackendError::Cancelled));
            }

            let call = StackCall {
                run_id: &unit.run_id,
                job,
                stack,
                session: &unit.session,
            };
            let span = info_span!("stack", job = %job, stack = %stack.stack_name, %operation);

            let result = async {
                match operation {
                    StackOperation::Apply => info!("Applying change..."),
                    StackOperation::Destroy => info!("Destroying stack..."),
                    _ => debug!("Running dry run"),
                }
                guard_backend_call(unit.backend.run(operation, &call, cancel)).await
            }
            .instrument(span)
            .await;

            if let Err(source) = result {
                let failure = fail(source);
                error!(job = %job, stack = %stack.stack_name, error = %failure, "Stack operation failed");
                return Some(failure);
            }
        }

        None
    }
}
