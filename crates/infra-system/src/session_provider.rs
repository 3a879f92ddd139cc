// CLI-backed session provider
use async_trait::async_trait;
use std::process::Stdio;
use tracing::{debug, info};

use stackcompose_core::domain::BackendSettings;
use stackcompose_core::port::{BackendSession, SessionError, SessionProvider};

use crate::program::CliProgram;

/// Opens sessions for the provisioning CLI
///
/// Region and profile are carried in the session and handed to every child
/// process explicitly; the parent environment is never modified.
pub struct CliSessionProvider {
    program: CliProgram,
}

impl CliSessionProvider {
    pub fn new(program: CliProgram) -> Self {
        Self { program }
    }

    fn check_settings(settings: &BackendSettings) -> Result<(), SessionError> {
        for (name, value) in [("AWS_REGION", &settings.region), ("AWS_PROFILE", &settings.profile)] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(SessionError::Invalid(format!("{} is set but empty", name)));
            }
        }
        Ok(())
    }

    /// Verify the CLI can be started at all
    async fn probe(&self) -> Result<(), SessionError> {
        let status = self
            .program
            .command()
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| SessionError::Unavailable(format!("{}: {}", self.program.program, e)))?;

        if !status.success() {
            return Err(SessionError::Unavailable(format!(
                "{} --version exited with {}",
                self.program.program, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for CliSessionProvider {
    async fn open(&self, settings: &BackendSettings) -> Result<BackendSession, SessionError> {
        Self::check_settings(settings)?;
        self.probe().await?;

        info!(
            region = settings.region.as_deref().unwrap_or("<default>"),
            profile = settings.profile.as_deref().unwrap_or("<default>"),
            "Backend session ready"
        );
        debug!(program = %self.program.program, "Provisioning CLI reachable");

        Ok(BackendSession {
            region: settings.region.clone(),
            profile: settings.profile.clone(),
        })
    }
}
