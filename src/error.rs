//! Error types for tacozip operations.

use thiserror::Error;

/// Result type alias for tacozip operations
pub type Result<T> = std::result::Result<T, TacoError>;

/// Main error type for all archive operations
#[derive(Error, Debug)]
pub enum TacoError {
    /// IO error wrapper (open, read, write, flush, close, seek)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The first entry of an existing archive does not match the required
    /// ghost layout. The message names the check that failed.
    #[error("invalid ghost: {0}")]
    InvalidGhost(&'static str),

    /// Caller contract violation detected before any side effects
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
}

impl TacoError {
    /// Stable numeric status code for embedders that surface return codes
    /// across an FFI or process boundary. Success is `0` by convention.
    pub fn code(&self) -> i32 {
        match self {
            TacoError::Io(_) => -1,
            TacoError::InvalidGhost(_) => -3,
            TacoError::InvalidParam(_) => -4,
        }
    }
}
