//! # Weft Identity
//!
//! Deterministic key derivation and identity management.
//!
//! ## Overview
//!
//! One root [`Seed`] deterministically derives a [`Keyring`]: a secp256k1
//! signing keypair, a secp256k1 management keypair, an X25519 box keypair,
//! and a 256-bit symmetric key. Recovering the seed recovers the whole
//! identity, and two derivations from the same seed are bit-for-bit
//! identical, which is what keeps an identity consistent across devices.
//!
//! The [`IdentityManager`] owns the root keyring plus one lazily derived
//! keyring per authorized space. Space seeds come from deterministic consent
//! proofs, so a space identity is also recoverable from the root seed alone.
//!
//! ## Key routing
//!
//! Signing and encryption calls are routed to the root or a space keyring.
//! Operations against a space that has not been authenticated fail with
//! [`IdentityError::AuthRequired`].
//!
//! Decryption failure is a `None` result, never an error: trying the wrong
//! key is a normal outcome for log readers.

pub mod claims;
pub mod consent;
pub mod error;
pub mod keyring;
pub mod keystore;
pub mod manager;
pub mod provider;
pub mod seed;

pub use claims::{sign_claim, verify_claim, ClaimOptions, ClaimPayload};
pub use consent::{ConsentProof, ConsentProvider, LocalConsent};
pub use error::{IdentityError, Result};
pub use keyring::{
    BoxPublicKey, DbSalt, EncryptionNonce, EphemeralKeyPair, Keyring, SealedMessage, SharedKey,
    SymmetricKey,
};
pub use keystore::{FileKeystore, IdentityRecord, Keystore, MemoryKeystore};
pub use manager::{DecryptOptions, EncryptOptions, IdentityConfig, IdentityManager};
pub use provider::{DelegatedKeyProvider, ExternalWallet, KeyProvider, LocalKeyProvider, PublicKeys};
pub use seed::Seed;
