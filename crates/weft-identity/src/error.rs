//! Error types for the identity crate.

use thiserror::Error;

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A space keyring was requested before the space was authenticated.
    #[error("authentication required for space: {0}")]
    AuthRequired(String),

    /// A seed was absent, the wrong length, or not valid hex.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// Key derivation produced an unusable scalar.
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// Encryption failed (bad key length, AEAD internal error).
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// The consent provider refused the request.
    #[error("consent denied for space: {0}")]
    ConsentDenied(String),

    /// The consent provider did not answer within the configured window.
    #[error("consent timed out")]
    ConsentTimeout,

    /// A claim was malformed or its signature did not verify.
    #[error("invalid claim: {0}")]
    ClaimInvalid(String),

    /// A claim's expiry has passed.
    #[error("claim expired")]
    ClaimExpired,

    /// Keystore I/O or encoding failure.
    #[error("keystore error: {0}")]
    Keystore(String),

    /// The identity has been logged out; the in-memory object is invalid.
    #[error("identity is logged out")]
    LoggedOut,

    /// The delegated provider failed or refused.
    #[error("delegated provider error: {0}")]
    Provider(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] weft_core::CoreError),
}

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;
