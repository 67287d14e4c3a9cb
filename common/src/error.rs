use thiserror::Error;

/// Errors shared across the workspace crates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlagueError {
    #[error("unknown command")]
    UnknownCommand,

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed record line: {0}")]
    MalformedRecord(String),

    #[error("malformed file report: {0}")]
    MalformedReport(String),
}

pub type Result<T> = std::result::Result<T, PlagueError>;
