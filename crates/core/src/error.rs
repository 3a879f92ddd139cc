// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Stack failures are not errors at this level; they end a run with a
/// failed `RunReport`. These variants abort a run before or outside the
/// scheduling contract.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid compose configuration: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Failed while creating backend session: {0}")]
    Setup(#[from] crate::port::SessionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
