// stack-compose Infrastructure - Compose File Adapter
// Loads, resolves and validates compose files (YAML or JSON)

pub mod loader;
pub mod sample;

pub use loader::{ComposeFileLoader, FileFormat, LoadError};
pub use sample::sample_compose;
