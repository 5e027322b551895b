//! Error types for the access crate.

use thiserror::Error;

use crate::capability::Capability;

/// Errors that can occur in access control and key distribution.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The caller lacks the capability an operation requires.
    #[error("not authorized to {operation}: requires {required:?}, holder has {actual:?}")]
    AuthorizationDenied {
        /// The operation that was refused.
        operation: String,
        /// The capability it requires.
        required: Capability,
        /// The capability the caller actually holds, if any.
        actual: Option<Capability>,
    },

    /// No key wrap addressed to this identity exists, even after waiting
    /// out the replication window.
    #[error("no thread key available for this identity")]
    NoAccess,

    /// The thread's confidential state has not been initialized.
    #[error("thread key not initialized")]
    NotInitialized,

    /// A peer did not deliver expected entries within the window.
    #[error("replication timed out")]
    ReplicationTimeout,

    /// A grant payload was malformed.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// Log operation failure.
    #[error(transparent)]
    Log(#[from] weft_log::LogError),

    /// Identity operation failure.
    #[error(transparent)]
    Identity(#[from] weft_identity::IdentityError),

    /// Core error.
    #[error(transparent)]
    Core(#[from] weft_core::CoreError),
}

/// Result type for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;
