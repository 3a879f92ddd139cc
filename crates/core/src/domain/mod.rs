// Domain Layer - Pure entities and validation

pub mod config;
pub mod error;
pub mod job;

// Re-exports
pub use config::{BackendSettings, ComposeConfig, PROFILE_VAR, REGION_VAR};
pub use error::DomainError;
pub use job::{Job, JobName, OrderKey, RunMode, Stack, StackOperation};
