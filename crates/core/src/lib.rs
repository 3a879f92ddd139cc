// stack-compose Core - Domain, Ports & Level Scheduler
// NO process or file IO dependencies (ports & adapters)

pub mod application;
pub mod cancel;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
