//! Capability grants.
//!
//! A grant is the payload of a `Grant` entry on a thread's capability log.
//! It names a subject, the capability conferred, and, for confidential
//! threads, the thread key wrapped to the subject's box key.

use serde::{Deserialize, Serialize};

use weft_core::{CoreError, Did};

use crate::error::{AccessError, Result};
use crate::keywrap::{EncKeyId, WrappedKey};

/// What a grant confers.
///
/// Capabilities only ever accumulate: there is no revocation entry, and a
/// grant for a capability already held is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// May post to a members-only thread and receive the thread key.
    Member,
    /// May issue grants and delete other participants' posts.
    Moderator,
}

impl Capability {
    /// Whether holding `self` satisfies a requirement of `required`.
    ///
    /// Moderator implies member.
    pub fn satisfies(self, required: Capability) -> bool {
        match required {
            Capability::Member => true,
            Capability::Moderator => self == Capability::Moderator,
        }
    }
}

/// Payload of a `Grant` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantPayload {
    /// The identity receiving the capability.
    pub subject: Did,

    /// The capability conferred.
    pub capability: Capability,

    /// For confidential threads, the thread key wrapped to the subject's
    /// box key. Absent on plaintext threads.
    pub wrapped_key: Option<WrappedKey>,

    /// Identifier of the key generation the wrap carries. Lets a reader
    /// tell which key a wrap contains without decrypting it.
    pub enc_key_id: Option<EncKeyId>,
}

impl GrantPayload {
    /// A plaintext-thread grant.
    pub fn new(subject: Did, capability: Capability) -> Self {
        Self {
            subject,
            capability,
            wrapped_key: None,
            enc_key_id: None,
        }
    }

    /// Parse and validate the subject reference, then build a grant.
    ///
    /// This is the validation gate the public API routes through: a
    /// malformed reference fails here, before anything touches a log.
    pub fn for_subject(subject: &str, capability: Capability) -> std::result::Result<Self, CoreError> {
        Ok(Self::new(Did::parse(subject)?, capability))
    }

    /// Attach a wrapped thread key for a confidential thread.
    ///
    /// `key_id` is the generation identifier, derived once from the
    /// originating wrap and copied onto every later grant of the same key.
    pub fn with_wrapped_key(mut self, wrapped: WrappedKey, key_id: EncKeyId) -> Self {
        self.enc_key_id = Some(key_id);
        self.wrapped_key = Some(wrapped);
        self
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| AccessError::InvalidGrant(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{Did, SigningKeypair};

    fn did(byte: u8) -> Did {
        Did::from_signing_key(&SigningKeypair::from_seed(&[byte; 32]).unwrap().public_key())
    }

    #[test]
    fn test_satisfies() {
        assert!(Capability::Member.satisfies(Capability::Member));
        assert!(Capability::Moderator.satisfies(Capability::Member));
        assert!(Capability::Moderator.satisfies(Capability::Moderator));
        assert!(!Capability::Member.satisfies(Capability::Moderator));
    }

    #[test]
    fn test_grant_roundtrip() {
        let grant = GrantPayload::new(did(0x01), Capability::Member);
        let recovered = GrantPayload::from_bytes(&grant.to_bytes()).unwrap();
        assert_eq!(grant, recovered);
        assert_eq!(recovered.wrapped_key, None);
    }

    #[test]
    fn test_for_subject_validates() {
        let ok = GrantPayload::for_subject(did(0x01).as_str(), Capability::Member).unwrap();
        assert_eq!(ok.subject, did(0x01));

        assert!(GrantPayload::for_subject("did:weft:nope", Capability::Member).is_err());
        assert!(GrantPayload::for_subject("alice", Capability::Moderator).is_err());
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(
            GrantPayload::from_bytes(b"not cbor at all"),
            Err(AccessError::InvalidGrant(_))
        ));
    }
}
