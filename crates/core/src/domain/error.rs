// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Compose file defines no jobs")]
    NoJobs,

    #[error("Job name must not be empty")]
    EmptyJobName,

    #[error("Job '{0}' has no stacks")]
    EmptyJob(String),

    #[error("Job '{job}' has a stack without a name")]
    EmptyStackName { job: String },

    #[error("Stack '{stack}' in job '{job}' has no template file")]
    MissingTemplate { job: String, stack: String },

    #[error("Stack '{stack}' is listed more than once in job '{job}'")]
    RepeatedStack { job: String, stack: String },

    #[error("Stack '{stack}' is declared by both job '{first}' and job '{second}'")]
    DuplicateStack {
        stack: String,
        first: String,
        second: String,
    },
}

pub type Result<T> = std::result::Result<T, DomainError>;
