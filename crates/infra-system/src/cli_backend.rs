// Provisioning CLI stack backend
// reason: async-trait, tokio for async process management
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tracing::{debug, info, warn};

use stackcompose_core::application::worker::constants::{GRACEFUL_KILL_TIMEOUT, KILL_POLL_INTERVAL};
use stackcompose_core::cancel::CancelToken;
use stackcompose_core::domain::Stack;
use stackcompose_core::port::{BackendError, StackBackend, StackCall};

use crate::program::CliProgram;

/// Stack backend that shells out to the provisioning CLI
///
/// apply           -> `cloudformation deploy`
/// apply dry run   -> `cloudformation deploy --no-execute-changeset`
/// destroy         -> `cloudformation delete-stack` + `cloudformation wait stack-delete-complete`
/// destroy dry run -> `cloudformation describe-stacks`
///
/// A cancelled call sends SIGTERM to the child, then SIGKILL if it is still
/// alive after the kill timeout.
pub struct CliStackBackend {
    program: CliProgram,
    kill_timeout: Duration,
}

/// Captured output of a finished child
struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CliStackBackend {
    pub fn new(program: CliProgram) -> Self {
        Self {
            program,
            kill_timeout: GRACEFUL_KILL_TIMEOUT,
        }
    }

    pub fn with_kill_timeout(mut self, kill_timeout: Duration) -> Self {
        self.kill_timeout = kill_timeout;
        self
    }

    fn deploy_args(stack: &Stack, execute: bool) -> Vec<String> {
        let mut args = vec![
            "cloudformation".to_string(),
            "deploy".to_string(),
            "--stack-name".to_string(),
            stack.stack_name.clone(),
            "--template-file".to_string(),
            stack.template_file.clone(),
            "--no-fail-on-empty-changeset".to_string(),
        ];
        if !execute {
            args.push("--no-execute-changeset".to_string());
        }
        if !stack.parameters.is_empty() {
            args.push("--parameter-overrides".to_string());
            args.extend(stack.parameters.iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        if !stack.tags.is_empty() {
            args.push("--tags".to_string());
            args.extend(stack.tags.iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        if !stack.capabilities.is_empty() {
            args.push("--capabilities".to_string());
            args.extend(stack.capabilities.iter().cloned());
        }
        args
    }

    fn stack_args(subcommand: &[&str], stack: &Stack) -> Vec<String> {
        let mut args = vec!["cloudformation".to_string()];
        args.extend(subcommand.iter().map(|s| s.to_string()));
        args.push("--stack-name".to_string());
        args.push(stack.stack_name.clone());
        args
    }

    /// Spawn the CLI and wait for it, honoring cancellation
    async fn run_command(
        &self,
        call: &StackCall<'_>,
        args: Vec<String>,
        cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        info!(
            run_id = %call.run_id,
            job = %call.job,
            stack = %call.stack.stack_name,
            args = ?args,
            "Starting provisioning command"
        );

        let mut child = self
            .program
            .command()
            .args(&args)
            .envs(call.session.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::Spawn(format!("{}: {}", self.program.program, e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let output = tokio::select! {
            finished = async {
                let (status, stdout, stderr) =
                    tokio::join!(child.wait(), read_all(stdout), read_all(stderr));
                status.map(|status| CommandOutput { status, stdout, stderr })
            } => finished.map_err(|e| BackendError::Io(e.to_string()))?,
            _ = cancel.cancelled() => {
                warn!(stack = %call.stack.stack_name, "Cancelling provisioning command");
                self.terminate(&mut child).await;
                return Err(BackendError::Cancelled);
            }
        };

        debug!(
            stack = %call.stack.stack_name,
            exit_code = ?output.status.code(),
            stdout = %output.stdout.trim(),
            "Provisioning command completed"
        );

        if output.status.success() {
            Ok(())
        } else {
            let detail = match output.stderr.trim() {
                "" => output.stdout.trim(),
                stderr => stderr,
            };
            Err(BackendError::Operation(format!(
                "{} {} exited with {}: {}",
                self.program.program,
                args.get(1).map(String::as_str).unwrap_or_default(),
                output.status,
                detail
            )))
        }
    }

    /// SIGTERM first, then SIGKILL once the kill timeout passes
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            info!(pid = %pid, "Sending SIGTERM for graceful shutdown");
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                let deadline = tokio::time::Instant::now() + self.kill_timeout;
                while tokio::time::Instant::now() < deadline {
                    match child.try_wait() {
                        Ok(Some(_)) => {
                            info!(pid = %pid, "Process exited gracefully after SIGTERM");
                            return;
                        }
                        Ok(None) => tokio::time::sleep(KILL_POLL_INTERVAL).await,
                        Err(_) => break,
                    }
                }
                warn!(pid = %pid, "Process did not exit after SIGTERM, sending SIGKILL");
            }
        }

        if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to kill provisioning command");
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[async_trait]
impl StackBackend for CliStackBackend {
    async fn apply(&self, call: &StackCall<'_>, cancel: &CancelToken) -> Result<(), BackendError> {
        self.run_command(call, Self::deploy_args(call.stack, true), cancel)
            .await
    }

    async fn apply_dry_run(
        &self,
        call: &StackCall<'_>,
        cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        self.run_command(call, Self::deploy_args(call.stack, false), cancel)
            .await
    }

    async fn destroy(&self, call: &StackCall<'_>, cancel: &CancelToken) -> Result<(), BackendError> {
        self.run_command(call, Self::stack_args(&["delete-stack"], call.stack), cancel)
            .await?;
        self.run_command(
            call,
            Self::stack_args(&["wait", "stack-delete-complete"], call.stack),
            cancel,
        )
        .await
    }

    async fn destroy_dry_run(
        &self,
        call: &StackCall<'_>,
        cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        self.run_command(call, Self::stack_args(&["describe-stacks"], call.stack), cancel)
            .await
    }
}
