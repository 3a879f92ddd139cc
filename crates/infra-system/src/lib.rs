// stack-compose Infrastructure - System Adapters
// Implements: StackBackend, SessionProvider by driving the provisioning CLI

pub mod cli_backend;
pub mod program;
pub mod session_provider;

pub use cli_backend::CliStackBackend;
pub use program::CliProgram;
pub use session_provider::CliSessionProvider;
