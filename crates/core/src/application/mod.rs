// Application Layer - Grouping, worker pool and dispatch

pub mod dispatcher;
pub mod grouper;
pub mod worker;

// Re-exports
pub use dispatcher::{Composer, InFlightPolicy, RunOptions, RunReport, RunRequest, RunStatus};
pub use grouper::{ExecutionPlan, OrderGroup};
pub use worker::{Outcome, StackFailure, UnitOfWork, Worker};
