//! Thread key wrapping.
//!
//! A confidential thread has one symmetric [`ThreadKey`] that every post is
//! sealed under. The key itself travels inside grants: the grantor wraps it
//! to each member's X25519 box key via an ephemeral key agreement, so only
//! the addressed member can recover it, and the wrap replicates with the
//! grant rather than through any side channel.

use serde::{Deserialize, Serialize};
use std::fmt;

use weft_core::ThreadId;
use weft_identity::{
    BoxPublicKey, EncryptionNonce, EphemeralKeyPair, KeyProvider, Keyring, SealedMessage,
    SymmetricKey,
};

use crate::error::Result;

/// Derivation context for key generation identifiers.
const ENC_KEY_ID_CONTEXT: &str = "weft/enc-key-id/v1";

/// The symmetric key a confidential thread's posts are sealed under.
#[derive(Clone, PartialEq, Eq)]
pub struct ThreadKey(SymmetricKey);

impl ThreadKey {
    /// Generate a fresh random thread key.
    pub fn generate() -> Self {
        Self(SymmetricKey::generate())
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(SymmetricKey::from_bytes(bytes))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Seal a post body under this key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SealedMessage> {
        Ok(self.0.encrypt(plaintext)?)
    }

    /// Open a post body. `None` means this key does not open it, which is
    /// what a reader without access sees on every post.
    pub fn decrypt(&self, sealed: &SealedMessage) -> Option<Vec<u8>> {
        self.0.decrypt(sealed)
    }
}

impl fmt::Debug for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadKey(..)")
    }
}

/// A thread key wrapped to one recipient's box key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// The grantor's ephemeral X25519 public key for this wrap.
    pub ephemeral_public: BoxPublicKey,

    /// Nonce for the wrap ciphertext.
    pub nonce: EncryptionNonce,

    /// The thread key, sealed under the agreed wrap key.
    pub ciphertext: Vec<u8>,
}

impl WrappedKey {
    /// Wrap a thread key to a recipient.
    ///
    /// The thread id is the derivation context, so a wrap is bound to its
    /// thread and cannot be replayed into another.
    pub fn create(
        thread_key: &ThreadKey,
        recipient: &BoxPublicKey,
        thread_id: &ThreadId,
    ) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();

        let shared = ephemeral.diffie_hellman(recipient);
        let wrap_key = shared.derive_encryption_key(thread_id.as_bytes());

        let sealed = wrap_key.encrypt(thread_key.as_bytes())?;
        Ok(Self {
            ephemeral_public,
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
        })
    }

    /// Try to unwrap with a locally held keyring.
    ///
    /// `None` means this wrap is not addressed to the keyring's box key.
    pub fn unwrap_with_keyring(
        &self,
        keyring: &Keyring,
        thread_id: &ThreadId,
    ) -> Option<ThreadKey> {
        let shared = keyring.shared_key(&self.ephemeral_public);
        self.open(shared.derive_encryption_key(thread_id.as_bytes()))
    }

    /// Try to unwrap through a key provider (local or delegated).
    pub async fn unwrap_with(
        &self,
        provider: &dyn KeyProvider,
        thread_id: &ThreadId,
    ) -> Result<Option<ThreadKey>> {
        let shared = provider.shared_key(&self.ephemeral_public).await?;
        Ok(self.open(shared.derive_encryption_key(thread_id.as_bytes())))
    }

    fn open(&self, wrap_key: SymmetricKey) -> Option<ThreadKey> {
        let sealed = SealedMessage {
            nonce: self.nonce,
            ciphertext: self.ciphertext.clone(),
        };
        let bytes = wrap_key.decrypt(&sealed)?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(ThreadKey::from_bytes(arr))
    }
}

/// Identifier for one key generation of a confidential thread.
///
/// Derived from the ciphertext of the originating wrap, so every replica
/// that sees the grant computes the same identifier without being able to
/// open the wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncKeyId(pub [u8; 32]);

impl EncKeyId {
    /// Derive the identifier from a wrap.
    pub fn derive(wrapped: &WrappedKey) -> Self {
        Self(blake3::derive_key(ENC_KEY_ID_CONTEXT, &wrapped.ciphertext))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}
