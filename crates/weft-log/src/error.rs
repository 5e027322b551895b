//! Error types for the log crate.

use thiserror::Error;
use weft_core::{Did, EntryKind, ThreadId, ValidationError};

/// Errors that can occur on log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// The entry failed structural validation.
    #[error("entry validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The entry belongs to a different thread than this log.
    #[error("entry is for thread {actual:?}, log holds {expected:?}")]
    WrongThread {
        /// The thread this log holds.
        expected: ThreadId,
        /// The thread named in the entry.
        actual: ThreadId,
    },

    /// The append guard rejected the entry.
    #[error("append denied for {author} ({kind:?})")]
    AppendDenied {
        /// The entry's author.
        author: Did,
        /// The entry kind that was rejected.
        kind: EntryKind,
    },

    /// Internal storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;
