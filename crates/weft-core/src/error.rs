//! Error types for weft-core.

use thiserror::Error;

/// Errors from core primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A seed did not map to a valid signing key scalar.
    #[error("invalid signing seed")]
    InvalidSeed,

    /// Public key bytes were not a valid SEC1 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature bytes were malformed or did not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// An identifier failed syntactic validation.
    #[error("invalid identity reference: {0}")]
    InvalidDid(String),

    /// CBOR decoding failed.
    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Errors from structural entry validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Entry declares an unsupported schema version.
    #[error("unsupported entry version: {0}")]
    UnsupportedVersion(u8),

    /// Payload hash in the header does not match the payload bytes.
    #[error("payload hash mismatch")]
    PayloadHashMismatch,

    /// Author DID does not match the author signing key.
    #[error("author did does not match signing key")]
    AuthorMismatch,

    /// Delete entries must name a target entry.
    #[error("delete entry missing target")]
    DeleteMissingTarget,

    /// Only delete entries may carry a target.
    #[error("unexpected target on non-delete entry")]
    UnexpectedTarget,

    /// Signature verification failed.
    #[error("signature verification failed")]
    SignatureFailed,
}
