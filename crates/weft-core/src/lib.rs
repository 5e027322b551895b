//! # Weft Core
//!
//! Pure primitives for Weft: identifiers, signed log entries, and
//! canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Entry`] - A signed, immutable record in a thread log
//! - [`EntryId`] - Content-addressed identifier (Blake3 hash)
//! - [`ThreadId`] - Identifier for one append-only thread log
//! - [`Did`] - Identity reference derived from a signing key
//!
//! ## Canonicalization
//!
//! All entries are encoded using deterministic CBOR so that every replica
//! computes identical entry identifiers. See [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod did;
pub mod entry;
pub mod error;
pub mod types;
pub mod validation;

pub use canonical::{canonical_bytes, canonical_header_bytes, signed_message};
pub use crypto::{Blake3Hash, SecpPublicKey, Signature, SigningKeypair};
pub use did::Did;
pub use entry::{Entry, EntryBuilder, EntryHeader, EntryKind, PreparedEntry, ENTRY_VERSION};
pub use error::{CoreError, ValidationError};
pub use types::{EntryId, ThreadId};
pub use validation::validate_entry;
