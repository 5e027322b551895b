//! Identity references.
//!
//! A [`Did`] is the stable identifier for a root identity or a space
//! sub-identity. It is derived from the compressed signing public key and is
//! the author field on every log entry and the subject of capability grants.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Blake3Hash, SecpPublicKey};
use crate::error::CoreError;

/// Method prefix for all Weft identity references.
pub const DID_PREFIX: &str = "did:weft:";

/// Length of the hex-encoded identifier tail (20 bytes).
const DID_HEX_LEN: usize = 40;

/// Domain separation for DID derivation.
const DID_CONTEXT: &str = "weft/did/v1";

/// An identity reference: `did:weft:<40 lowercase hex>`.
///
/// Derived deterministically from a signing public key, so the same key
/// always maps to the same identifier on every replica.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Derive the identifier for a signing public key.
    pub fn from_signing_key(key: &SecpPublicKey) -> Self {
        let digest = Blake3Hash::derive(DID_CONTEXT, key.as_bytes());
        let tail = hex::encode(&digest.as_bytes()[..DID_HEX_LEN / 2]);
        Self(format!("{DID_PREFIX}{tail}"))
    }

    /// Parse and syntactically validate an identity reference.
    ///
    /// This is the validation gate for grant targets: malformed references
    /// are rejected here before any log append is attempted.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let tail = s
            .strip_prefix(DID_PREFIX)
            .ok_or_else(|| CoreError::InvalidDid(s.to_string()))?;
        if tail.len() != DID_HEX_LEN {
            return Err(CoreError::InvalidDid(s.to_string()));
        }
        if !tail.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(CoreError::InvalidDid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Check whether a string is a syntactically valid identity reference.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// The full reference string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKeypair;

    #[test]
    fn test_did_deterministic() {
        let keypair = SigningKeypair::from_seed(&[0x42; 32]).unwrap();
        let a = Did::from_signing_key(&keypair.public_key());
        let b = Did::from_signing_key(&keypair.public_key());
        assert_eq!(a, b);
    }

    #[test]
    fn test_did_parse_roundtrip() {
        let did = Did::from_signing_key(&SigningKeypair::generate().public_key());
        let parsed = Did::parse(did.as_str()).unwrap();
        assert_eq!(did, parsed);
    }

    #[test]
    fn test_did_rejects_malformed() {
        assert!(Did::parse("did:weft:").is_err());
        assert!(Did::parse("did:other:0011223344556677889900112233445566778899").is_err());
        assert!(Did::parse("not-a-did").is_err());
        // Wrong length.
        assert!(Did::parse("did:weft:00112233").is_err());
        // Non-hex.
        assert!(Did::parse("did:weft:zz11223344556677889900112233445566778899").is_err());
        // Uppercase hex is not canonical.
        assert!(Did::parse("did:weft:AA11223344556677889900112233445566778899").is_err());
    }

    #[test]
    fn test_did_accepts_canonical() {
        assert!(Did::is_valid(
            "did:weft:0011223344556677889900112233445566778899"
        ));
    }

    #[test]
    fn test_distinct_keys_distinct_dids() {
        let a = Did::from_signing_key(&SigningKeypair::generate().public_key());
        let b = Did::from_signing_key(&SigningKeypair::generate().public_key());
        assert_ne!(a, b);
    }
}
