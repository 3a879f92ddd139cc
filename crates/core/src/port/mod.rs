// Port Layer - Interfaces for external collaborators

pub mod id_provider; // For deterministic testing
pub mod session;
pub mod stack_backend;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use session::{BackendSession, SessionError, SessionProvider};
pub use stack_backend::{BackendError, StackBackend, StackCall};
pub use time_provider::TimeProvider;
