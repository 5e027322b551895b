//! Error type for the thread facade.

use thiserror::Error;

/// Errors surfaced by [`Thread`](crate::Thread) operations.
#[derive(Debug, Error)]
pub enum ThreadError {
    /// No identity has been attached to this thread session.
    #[error("no identity attached to this thread session")]
    AuthRequired,

    /// An identity is already attached; sessions attach exactly once.
    #[error("an identity is already attached to this thread session")]
    AlreadyAttached,

    /// Access control refused the operation, or key recovery failed.
    #[error(transparent)]
    Access(#[from] weft_access::AccessError),

    /// The underlying log refused or failed the operation.
    #[error(transparent)]
    Log(#[from] weft_log::LogError),

    /// Identity layer failure.
    #[error(transparent)]
    Identity(#[from] weft_identity::IdentityError),

    /// Malformed input, typically an invalid identity reference.
    #[error(transparent)]
    Core(#[from] weft_core::CoreError),
}

/// Result type for thread operations.
pub type Result<T> = std::result::Result<T, ThreadError>;
