// Stack Backend Port
// Abstraction over the provisioning backend that applies or destroys one stack

use crate::cancel::CancelToken;
use crate::domain::{Stack, StackOperation};
use crate::port::session::BackendSession;
use async_trait::async_trait;
use thiserror::Error;

/// Typed per-call record handed to every backend operation
///
/// Carries the identity that logs and errors need instead of a dynamic
/// key-value bag.
#[derive(Debug, Clone, Copy)]
pub struct StackCall<'a> {
    pub run_id: &'a str,
    pub job: &'a str,
    pub stack: &'a Stack,
    pub session: &'a BackendSession,
}

/// Backend operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Spawn failed: {0}")]
    Spawn(String),

    #[error("{0}")]
    Operation(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Backend panicked: {0}")]
    Panicked(String),
}

/// Stack Backend trait
///
/// Implementations:
/// - CliStackBackend: drives the provisioning CLI as a child process
/// - mocks::ScriptedBackend: scripted outcomes for tests
///
/// Every operation receives the run's cancellation token and should return
/// promptly (usually with `BackendError::Cancelled`) once it fires.
#[async_trait]
pub trait StackBackend: Send + Sync {
    async fn apply(&self, call: &StackCall<'_>, cancel: &CancelToken) -> Result<(), BackendError>;

    /// Preview the change without mutating infrastructure
    async fn apply_dry_run(
        &self,
        call: &StackCall<'_>,
        cancel: &CancelToken,
    ) -> Result<(), BackendError>;

    async fn destroy(&self, call: &StackCall<'_>, cancel: &CancelToken)
        -> Result<(), BackendError>;

    /// Check the stack could be destroyed without touching it
    async fn destroy_dry_run(
        &self,
        call: &StackCall<'_>,
        cancel: &CancelToken,
    ) -> Result<(), BackendError>;

    /// Dispatch to the operation matching `operation`
    async fn run(
        &self,
        operation: StackOperation,
        call: &StackCall<'_>,
        cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        match operation {
            StackOperation::Apply => self.apply(call, cancel).await,
            StackOperation::ApplyDryRun => self.apply_dry_run(call, cancel).await,
            StackOperation::Destroy => self.destroy(call, cancel).await,
            StackOperation::DestroyDryRun => self.destroy_dry_run(call, cancel).await,
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted behavior for one stack
    #[derive(Debug, Clone)]
    pub enum StackScript {
        /// Succeed immediately
        Succeed,
        /// Fail with message
        Fail(String),
        /// Succeed after a delay (returns Cancelled if the token fires first)
        Delay(Duration),
        /// Fail with message after a delay
        DelayThenFail(Duration, String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CallEvent {
        Started,
        Finished,
    }

    /// One entry in the call log
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CallRecord {
        pub job: String,
        pub stack: String,
        pub operation: StackOperation,
        pub event: CallEvent,
    }

    /// Mock backend with per-stack scripts and a global, ordered call log
    pub struct ScriptedBackend {
        scripts: Mutex<HashMap<String, StackScript>>,
        default_script: StackScript,
        log: Mutex<Vec<CallRecord>>,
    }

    impl Default for ScriptedBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ScriptedBackend {
        /// Every stack succeeds immediately unless scripted otherwise
        pub fn new() -> Self {
            Self::with_default(StackScript::Succeed)
        }

        pub fn with_default(default_script: StackScript) -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                default_script,
                log: Mutex::new(Vec::new()),
            }
        }

        pub fn script(self, stack: impl Into<String>, script: StackScript) -> Self {
            self.scripts.lock().unwrap().insert(stack.into(), script);
            self
        }

        /// Full ordered event log (starts and finishes)
        pub fn events(&self) -> Vec<CallRecord> {
            self.log.lock().unwrap().clone()
        }

        /// Started calls only, in start order
        pub fn calls(&self) -> Vec<CallRecord> {
            self.events()
                .into_iter()
                .filter(|r| r.event == CallEvent::Started)
                .collect()
        }

        /// Stack names of started calls for one job, in start order
        pub fn stacks_called(&self, job: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|r| r.job == job)
                .map(|r| r.stack)
                .collect()
        }

        pub fn call_count(&self) -> usize {
            self.calls().len()
        }

        fn record(&self, call: &StackCall<'_>, operation: StackOperation, event: CallEvent) {
            self.log.lock().unwrap().push(CallRecord {
                job: call.job.to_string(),
                stack: call.stack.stack_name.clone(),
                operation,
                event,
            });
        }

        async fn play(
            &self,
            operation: StackOperation,
            call: &StackCall<'_>,
            cancel: &CancelToken,
        ) -> Result<(), BackendError> {
            self.record(call, operation, CallEvent::Started);

            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(&call.stack.stack_name)
                .cloned()
                .unwrap_or_else(|| self.default_script.clone());

            let result = match script {
                StackScript::Succeed => Ok(()),
                StackScript::Fail(msg) => Err(BackendError::Operation(msg)),
                StackScript::Delay(delay) => tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(()),
                    _ = cancel.cancelled() => Err(BackendError::Cancelled),
                },
                StackScript::DelayThenFail(delay, msg) => tokio::select! {
                    _ = tokio::time::sleep(delay) => Err(BackendError::Operation(msg)),
                    _ = cancel.cancelled() => Err(BackendError::Cancelled),
                },
                StackScript::Panic(msg) => panic!("{}", msg),
            };

            self.record(call, operation, CallEvent::Finished);
            result
        }
    }

    #[async_trait]
    impl StackBackend for ScriptedBackend {
        async fn apply(
            &self,
            call: &StackCall<'_>,
            cancel: &CancelToken,
        ) -> Result<(), BackendError> {
            self.play(StackOperation::Apply, call, cancel).await
        }

        async fn apply_dry_run(
            &self,
            call: &StackCall<'_>,
            cancel: &CancelToken,
        ) -> Result<(), BackendError> {
            self.play(StackOperation::ApplyDryRun, call, cancel).await
        }

        async fn destroy(
            &self,
            call: &StackCall<'_>,
            cancel: &CancelToken,
        ) -> Result<(), BackendError> {
            self.play(StackOperation::Destroy, call, cancel).await
        }

        async fn destroy_dry_run(
            &self,
            call: &StackCall<'_>,
            cancel: &CancelToken,
        ) -> Result<(), BackendError> {
            self.play(StackOperation::DestroyDryRun, call, cancel).await
        }
    }
}
