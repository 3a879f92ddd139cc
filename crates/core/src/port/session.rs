// Backend Session Port
// Credential/session acquisition for the provisioning backend

use crate::domain::BackendSettings;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Opaque, read-only session handle shared by every worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSession {
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl BackendSession {
    /// Environment a backend process needs to reach the same account/region
    pub fn env(&self) -> BTreeMap<&'static str, String> {
        let mut env = BTreeMap::new();
        if let Some(region) = &self.region {
            env.insert("AWS_REGION", region.clone());
            env.insert("AWS_DEFAULT_REGION", region.clone());
        }
        if let Some(profile) = &self.profile {
            env.insert("AWS_PROFILE", profile.clone());
        }
        env
    }
}

/// Session setup errors (fatal for a run)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Build a reusable session from the compose file's settings
    async fn open(&self, settings: &BackendSettings) -> Result<BackendSession, SessionError>;
}

pub mod mocks {
    use super::*;

    /// Session provider that copies the settings verbatim
    pub struct StaticSessionProvider;

    #[async_trait]
    impl SessionProvider for StaticSessionProvider {
        async fn open(&self, settings: &BackendSettings) -> Result<BackendSession, SessionError> {
            Ok(BackendSession {
                region: settings.region.clone(),
                profile: settings.profile.clone(),
            })
        }
    }

    /// Session provider that always fails
    pub struct FailingSessionProvider(pub String);

    #[async_trait]
    impl SessionProvider for FailingSessionProvider {
        async fn open(&self, _settings: &BackendSettings) -> Result<BackendSession, SessionError> {
            Err(SessionError::Unavailable(self.0.clone()))
        }
    }
}
