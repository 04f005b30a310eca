//! Error types for melp.

use thiserror::Error;

/// Errors that can occur in melp operations.
#[derive(Error, Debug)]
pub enum MelpError {
    #[error("Event source error: {0}")]
    Source(String),

    #[error("Event source '{0}' not found in PATH")]
    SourceNotInstalled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for melp operations.
pub type MelpResult<T> = Result<T, MelpError>;
