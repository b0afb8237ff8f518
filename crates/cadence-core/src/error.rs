//! Core error types
//!
//! `CoreError` is what every public operation returns. `kind()` collapses the
//! variants onto the four categories callers act on.

use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerError;
use crate::storage::StorageError;

/// Error returned by core operations
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Session, item or card does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// Malformed request data
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Explicit rating outside 1-4
    #[error("Invalid rating {0}: must be between 1 and 4")]
    InvalidRating(i64),
    /// Answer index outside the item's options
    #[error("Answer index {index} out of range for {option_count} options")]
    OutOfRange { index: i64, option_count: usize },
    /// Concurrent update race exhausted its retries
    #[error("Conflicting concurrent update: {0}")]
    Conflict(String),
    /// Memory scheduler failure
    #[error("Memory scheduler error: {0}")]
    Upstream(#[from] SchedulerError),
    /// Store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Error category, as seen by callers of the exposed operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Conflict,
    UpstreamFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Conflict => "conflict",
            ErrorKind::UpstreamFailure => "upstream_failure",
        }
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::InvalidInput(_)
            | CoreError::InvalidRating(_)
            | CoreError::OutOfRange { .. } => ErrorKind::InvalidInput,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            CoreError::Upstream(_) | CoreError::Storage(_) => ErrorKind::UpstreamFailure,
        }
    }

    /// Whether the caller caused this error
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::InvalidInput)
    }
}

/// Core result type
pub type Result<T> = std::result::Result<T, CoreError>;
