//! Space consent.
//!
//! Opening a space requires the account holder's consent. Consent is a
//! management-key signature over a canonical message naming the account and
//! the space. Because signing is deterministic, the same account and space
//! always yield the same proof, and the space seed derived from the proof is
//! recoverable from the root seed alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use weft_core::{Did, SecpPublicKey, Signature};

use crate::error::{IdentityError, Result};
use crate::keyring::Keyring;
use crate::seed::Seed;

/// Derivation context for turning a consent proof into a space seed.
const SPACE_SEED_CONTEXT: &str = "weft/space-seed/v1";

/// Canonical message a consent proof signs.
fn consent_message(account: &Did, space: &str) -> String {
    format!("weft consent v1: account={account} space={space}")
}

/// A management-key signature authorizing one space for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentProof {
    /// The consenting account.
    pub account: Did,
    /// The space name this proof authorizes.
    pub space: String,
    /// Management-key signature over the canonical consent message.
    pub signature: Signature,
}

impl ConsentProof {
    /// Check this proof against the account's management key.
    pub fn verify(&self, management_key: &SecpPublicKey) -> Result<()> {
        let message = consent_message(&self.account, &self.space);
        management_key
            .verify(message.as_bytes(), &self.signature)
            .map_err(|_| {
                IdentityError::ConsentDenied(format!("invalid proof for space {}", self.space))
            })
    }

    /// Derive the space seed from this proof.
    ///
    /// Deterministic signing makes this a pure function of account key and
    /// space name, so space identities survive seed recovery.
    pub fn space_seed(&self) -> Seed {
        Seed::from_bytes(blake3::derive_key(
            SPACE_SEED_CONTEXT,
            self.signature.as_bytes(),
        ))
    }
}

/// Source of consent decisions.
///
/// The local implementation signs silently with the root management key; an
/// interactive implementation would prompt the user or call out to a wallet.
#[async_trait]
pub trait ConsentProvider: Send + Sync {
    /// Request consent to open `space` for `account`.
    async fn request_consent(&self, account: &Did, space: &str) -> Result<ConsentProof>;
}

/// Consent backed by a locally held management key. Always approves.
pub struct LocalConsent {
    keyring: Keyring,
}

impl LocalConsent {
    /// Build from the root seed.
    pub fn for_seed(seed: &Seed) -> Result<Self> {
        Ok(Self {
            keyring: Keyring::derive(seed)?,
        })
    }

    /// Build from an already derived root keyring.
    pub fn new(keyring: Keyring) -> Self {
        Self { keyring }
    }
}

#[async_trait]
impl ConsentProvider for LocalConsent {
    async fn request_consent(&self, account: &Did, space: &str) -> Result<ConsentProof> {
        if account != self.keyring.did() {
            return Err(IdentityError::ConsentDenied(format!(
                "key does not control account {account}"
            )));
        }
        let message = consent_message(account, space);
        Ok(ConsentProof {
            account: account.clone(),
            space: space.to_string(),
            signature: self.keyring.sign_management(message.as_bytes()),
        })
    }
}
