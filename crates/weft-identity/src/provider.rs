//! Key providers.
//!
//! A [`KeyProvider`] is how the rest of the system reaches an identity's
//! keys without holding key material itself. The local provider wraps a
//! derived [`Keyring`]; the delegated provider forwards to an
//! [`ExternalWallet`] that keeps the keys elsewhere (a hardware signer, a
//! browser wallet bridge). Log and access code only ever sees the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use weft_core::{Did, SecpPublicKey, Signature};

use crate::error::{IdentityError, Result};
use crate::keyring::{BoxPublicKey, Keyring, SealedMessage, SharedKey, BOX_CONTEXT};

/// Hex-encoded public components of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeys {
    /// Signing key, SEC1 hex (compressed or uncompressed per request).
    pub signing: String,
    /// X25519 box key, hex.
    pub encryption: String,
    /// Management key, SEC1 hex. Absent for delegated identities that
    /// never expose it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management: Option<String>,
}

/// Access to one identity's keys.
///
/// Signing and key agreement are async because a delegated implementation
/// may round-trip to an external signer.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// The identity this provider signs as.
    fn did(&self) -> &Did;

    /// The signing public key (compressed).
    fn signing_key(&self) -> SecpPublicKey;

    /// The box public key, for key wraps addressed to this identity.
    fn box_public(&self) -> BoxPublicKey;

    /// Sign a message as this identity.
    async fn sign(&self, message: &[u8]) -> Result<Signature>;

    /// X25519 key agreement between this identity's box key and a peer's.
    async fn shared_key(&self, peer: &BoxPublicKey) -> Result<SharedKey>;

    /// The public components, hex encoded.
    fn public_keys(&self, uncompressed: bool) -> Result<PublicKeys>;

    /// Open a message sealed to this identity by `sender`.
    ///
    /// `None` means the message was not for this identity.
    async fn asym_decrypt(
        &self,
        sealed: &SealedMessage,
        sender: &BoxPublicKey,
    ) -> Result<Option<Vec<u8>>>;
}

/// Provider backed by a locally derived keyring.
pub struct LocalKeyProvider {
    keyring: Arc<Keyring>,
}

impl LocalKeyProvider {
    /// Wrap a keyring.
    pub fn new(keyring: Keyring) -> Self {
        Self {
            keyring: Arc::new(keyring),
        }
    }

    /// Wrap an already shared keyring.
    pub fn from_arc(keyring: Arc<Keyring>) -> Self {
        Self { keyring }
    }

    /// The underlying keyring.
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }
}

#[async_trait]
impl KeyProvider for LocalKeyProvider {
    fn did(&self) -> &Did {
        self.keyring.did()
    }

    fn signing_key(&self) -> SecpPublicKey {
        self.keyring.signing_key()
    }

    fn box_public(&self) -> BoxPublicKey {
        self.keyring.box_public()
    }

    async fn sign(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.keyring.sign(message))
    }

    async fn shared_key(&self, peer: &BoxPublicKey) -> Result<SharedKey> {
        Ok(self.keyring.shared_key(peer))
    }

    fn public_keys(&self, uncompressed: bool) -> Result<PublicKeys> {
        self.keyring.public_keys(uncompressed)
    }

    async fn asym_decrypt(
        &self,
        sealed: &SealedMessage,
        sender: &BoxPublicKey,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.keyring.asym_decrypt(sealed, sender))
    }
}

/// An external signer holding keys this process never sees.
#[async_trait]
pub trait ExternalWallet: Send + Sync {
    /// The account the wallet controls.
    fn account(&self) -> Did;

    /// The wallet's signing public key (compressed).
    fn signing_key(&self) -> SecpPublicKey;

    /// The wallet's box public key.
    fn box_public(&self) -> BoxPublicKey;

    /// Sign a message with the wallet's signing key.
    async fn sign(&self, message: &[u8]) -> Result<Signature>;

    /// X25519 key agreement with the wallet's box secret.
    async fn shared_key(&self, peer: &BoxPublicKey) -> Result<SharedKey>;
}

/// Provider that forwards every private-key operation to an external wallet.
pub struct DelegatedKeyProvider {
    wallet: Arc<dyn ExternalWallet>,
    did: Did,
}

impl DelegatedKeyProvider {
    /// Wrap a wallet. The identity is fixed at construction from the
    /// wallet's signing key.
    pub fn new(wallet: Arc<dyn ExternalWallet>) -> Result<Self> {
        let did = wallet.account();
        let derived = Did::from_signing_key(&wallet.signing_key());
        if did != derived {
            return Err(IdentityError::Provider(format!(
                "wallet account {did} does not match its signing key"
            )));
        }
        Ok(Self { wallet, did })
    }
}

#[async_trait]
impl KeyProvider for DelegatedKeyProvider {
    fn did(&self) -> &Did {
        &self.did
    }

    fn signing_key(&self) -> SecpPublicKey {
        self.wallet.signing_key()
    }

    fn box_public(&self) -> BoxPublicKey {
        self.wallet.box_public()
    }

    async fn sign(&self, message: &[u8]) -> Result<Signature> {
        self.wallet.sign(message).await
    }

    async fn shared_key(&self, peer: &BoxPublicKey) -> Result<SharedKey> {
        self.wallet.shared_key(peer).await
    }

    fn public_keys(&self, uncompressed: bool) -> Result<PublicKeys> {
        let signing = if uncompressed {
            hex::encode(self.wallet.signing_key().to_uncompressed()?)
        } else {
            self.wallet.signing_key().to_hex()
        };
        Ok(PublicKeys {
            signing,
            encryption: self.wallet.box_public().to_hex(),
            management: None,
        })
    }

    async fn asym_decrypt(
        &self,
        sealed: &SealedMessage,
        sender: &BoxPublicKey,
    ) -> Result<Option<Vec<u8>>> {
        let key = self
            .wallet
            .shared_key(sender)
            .await?
            .derive_encryption_key(BOX_CONTEXT);
        Ok(key.decrypt(sealed))
    }
}
