//! The keyring: every key for one identity, derived from one seed.
//!
//! Derivation uses fixed, versioned Blake3 derive-key contexts so the same
//! seed always yields the same keys. All key material is derived once at
//! construction and never mutated; a keyring may be freely shared read-only
//! across concurrent operations.
//!
//! Asymmetric encryption is X25519 key agreement plus ChaCha20-Poly1305;
//! symmetric encryption is ChaCha20-Poly1305 under the derived 256-bit key.
//! Both decrypt paths return `None` on authentication failure.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use weft_core::{Did, SecpPublicKey, Signature, SigningKeypair};

use crate::error::{IdentityError, Result};
use crate::provider::PublicKeys;
use crate::seed::Seed;

/// Versioned derivation contexts. Changing any of these is a breaking
/// identity change: existing seeds would derive different keys.
mod paths {
    pub const SIGNING: &str = "weft/keyring/v1/signing";
    pub const MANAGEMENT: &str = "weft/keyring/v1/management";
    pub const ENCRYPTION: &str = "weft/keyring/v1/encryption";
    pub const SYMMETRIC: &str = "weft/keyring/v1/symmetric";
    pub const DB_SALT: &str = "weft/keyring/v1/db-salt";
}

/// Context for the static-static box key derivation.
pub(crate) const BOX_CONTEXT: &[u8] = b"weft/box/v1";

/// An X25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxPublicKey(pub [u8; 32]);

impl BoxPublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for BoxPublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// A shared secret from X25519 key agreement.
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive an encryption key from this shared secret.
    ///
    /// Blake3 derive-key gives domain separation per context.
    pub fn derive_encryption_key(&self, context: &[u8]) -> SymmetricKey {
        let mut hasher = blake3::Hasher::new_derive_key("weft/shared-key/v1");
        hasher.update(&self.0);
        hasher.update(context);
        SymmetricKey(*hasher.finalize().as_bytes())
    }
}

/// A 256-bit symmetric key for ChaCha20-Poly1305.
#[derive(Clone)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt with a random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SealedMessage> {
        self.encrypt_with_nonce(plaintext, EncryptionNonce::generate())
    }

    /// Encrypt with a caller-supplied nonce (test determinism).
    pub fn encrypt_with_nonce(
        &self,
        plaintext: &[u8],
        nonce: EncryptionNonce,
    ) -> Result<SealedMessage> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| IdentityError::EncryptionError(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| IdentityError::EncryptionError(e.to_string()))?;
        Ok(SealedMessage { nonce, ciphertext })
    }

    /// Decrypt. `None` means authentication failure (wrong key or tamper),
    /// a normal outcome for callers trying a key.
    pub fn decrypt(&self, sealed: &SealedMessage) -> Option<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0).ok()?;
        cipher
            .decrypt(Nonce::from_slice(&sealed.nonce.0), sealed.ciphertext.as_slice())
            .ok()
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey(..)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 12];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// An authenticated ciphertext plus the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMessage {
    /// Nonce used for encryption (unique per encryption).
    pub nonce: EncryptionNonce,
    /// The encrypted data (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

/// Ephemeral X25519 key pair for one-time key agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: BoxPublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = BoxPublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> BoxPublicKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret (can only be used once).
    pub fn diffie_hellman(self, peer_public: &BoxPublicKey) -> SharedKey {
        let shared = self.secret.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

/// Deterministic, derivation-based salt for pseudonymizing storage keys.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DbSalt(pub [u8; 32]);

impl DbSalt {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for DbSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DbSalt({})", &self.to_hex()[..16])
    }
}

/// All key material for one identity or space, derived from one seed.
pub struct Keyring {
    signing: SigningKeypair,
    management: SigningKeypair,
    box_secret: StaticSecret,
    box_public: BoxPublicKey,
    sym_key: SymmetricKey,
    db_salt: DbSalt,
    did: Did,
}

impl Keyring {
    /// Derive all keys from a seed.
    ///
    /// Pure and deterministic: the same seed always yields the same keys,
    /// public identifiers, and salt.
    pub fn derive(seed: &Seed) -> Result<Self> {
        let signing_seed = blake3::derive_key(paths::SIGNING, seed.as_bytes());
        let signing = SigningKeypair::from_seed(&signing_seed)
            .map_err(|e| IdentityError::KeyDerivation(e.to_string()))?;

        let management_seed = blake3::derive_key(paths::MANAGEMENT, seed.as_bytes());
        let management = SigningKeypair::from_seed(&management_seed)
            .map_err(|e| IdentityError::KeyDerivation(e.to_string()))?;

        let box_seed = blake3::derive_key(paths::ENCRYPTION, seed.as_bytes());
        let box_secret = StaticSecret::from(box_seed);
        let box_public = BoxPublicKey::from(PublicKey::from(&box_secret));

        let sym_key = SymmetricKey(blake3::derive_key(paths::SYMMETRIC, seed.as_bytes()));
        let db_salt = DbSalt(blake3::derive_key(paths::DB_SALT, seed.as_bytes()));

        let did = Did::from_signing_key(&signing.public_key());

        Ok(Self {
            signing,
            management,
            box_secret,
            box_public,
            sym_key,
            db_salt,
            did,
        })
    }

    /// The identity reference for this keyring.
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// The signing public key (compressed).
    pub fn signing_key(&self) -> SecpPublicKey {
        self.signing.public_key()
    }

    /// The box (asymmetric encryption) public key.
    pub fn box_public(&self) -> BoxPublicKey {
        self.box_public
    }

    /// Sign a payload (RFC 6979 deterministic ECDSA).
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    /// Sign with the management key. Used for consent proofs, which must
    /// come from the account key rather than a space key.
    pub fn sign_management(&self, message: &[u8]) -> Signature {
        self.management.sign(message)
    }

    /// The management public key (compressed).
    pub fn management_key(&self) -> SecpPublicKey {
        self.management.public_key()
    }

    /// Static-static key agreement with a peer's box public key.
    ///
    /// Both sides derive the same shared key, so this also opens wraps
    /// created against this keyring's public key.
    pub fn shared_key(&self, peer: &BoxPublicKey) -> SharedKey {
        let shared = self.box_secret.diffie_hellman(&peer.to_dalek());
        SharedKey(*shared.as_bytes())
    }

    /// Authenticated public-key encryption to a recipient.
    ///
    /// The nonce is random unless the caller supplies one.
    pub fn asym_encrypt(
        &self,
        plaintext: &[u8],
        recipient: &BoxPublicKey,
        nonce: Option<EncryptionNonce>,
    ) -> Result<SealedMessage> {
        let key = self.shared_key(recipient).derive_encryption_key(BOX_CONTEXT);
        key.encrypt_with_nonce(plaintext, nonce.unwrap_or_else(EncryptionNonce::generate))
    }

    /// Open a message sealed to this keyring by `sender`.
    ///
    /// `None` on authentication failure, never an error.
    pub fn asym_decrypt(&self, sealed: &SealedMessage, sender: &BoxPublicKey) -> Option<Vec<u8>> {
        let key = self.shared_key(sender).derive_encryption_key(BOX_CONTEXT);
        key.decrypt(sealed)
    }

    /// Symmetric encryption under this keyring's derived key.
    pub fn sym_encrypt(&self, plaintext: &[u8]) -> Result<SealedMessage> {
        self.sym_key.encrypt(plaintext)
    }

    /// Symmetric decryption; `None` on authentication failure.
    pub fn sym_decrypt(&self, sealed: &SealedMessage) -> Option<Vec<u8>> {
        self.sym_key.decrypt(sealed)
    }

    /// Deterministic salt for pseudonymizing storage keys.
    ///
    /// Stable across process restarts for the same seed.
    pub fn db_salt(&self) -> &DbSalt {
        &self.db_salt
    }

    /// The public components of this keyring.
    pub fn public_keys(&self, uncompressed: bool) -> Result<PublicKeys> {
        let (signing, management) = if uncompressed {
            (
                hex::encode(self.signing.public_key().to_uncompressed()?),
                hex::encode(self.management.public_key().to_uncompressed()?),
            )
        } else {
            (
                self.signing.public_key().to_hex(),
                self.management.public_key().to_hex(),
            )
        };
        Ok(PublicKeys {
            signing,
            encryption: self.box_public.to_hex(),
            management: Some(management),
        })
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keyring({})", self.did)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyring(seed_byte: u8) -> Keyring {
        Keyring::derive(&Seed::from_bytes([seed_byte; 32])).unwrap()
    }

    #[test]
    fn test_derivation_deterministic() {
        let a = keyring(0x42);
        let b = keyring(0x42);
        assert_eq!(a.did(), b.did());
        assert_eq!(a.signing_key(), b.signing_key());
        assert_eq!(a.box_public(), b.box_public());
        assert_eq!(a.db_salt(), b.db_salt());
        assert_eq!(
            a.public_keys(false).unwrap().signing,
            b.public_keys(false).unwrap().signing
        );
    }

    #[test]
    fn test_distinct_seeds_distinct_keys() {
        let a = keyring(0x42);
        let b = keyring(0x43);
        assert_ne!(a.did(), b.did());
        assert_ne!(a.box_public(), b.box_public());
        assert_ne!(a.db_salt(), b.db_salt());
    }

    #[test]
    fn test_asym_roundtrip() {
        let alice = keyring(0x01);
        let bob = keyring(0x02);

        let sealed = alice
            .asym_encrypt(b"for bob only", &bob.box_public(), None)
            .unwrap();
        let opened = bob.asym_decrypt(&sealed, &alice.box_public());
        assert_eq!(opened.as_deref(), Some(b"for bob only".as_slice()));
    }

    #[test]
    fn test_asym_wrong_key_returns_none() {
        let alice = keyring(0x01);
        let bob = keyring(0x02);
        let eve = keyring(0x03);

        let sealed = alice
            .asym_encrypt(b"for bob only", &bob.box_public(), None)
            .unwrap();
        assert_eq!(eve.asym_decrypt(&sealed, &alice.box_public()), None);
        // Wrong claimed sender also fails authentication.
        assert_eq!(bob.asym_decrypt(&sealed, &eve.box_public()), None);
    }

    #[test]
    fn test_asym_caller_supplied_nonce() {
        let alice = keyring(0x01);
        let bob = keyring(0x02);
        let nonce = EncryptionNonce::from_bytes([7; 12]);

        let a = alice
            .asym_encrypt(b"msg", &bob.box_public(), Some(nonce))
            .unwrap();
        let b = alice
            .asym_encrypt(b"msg", &bob.box_public(), Some(nonce))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sym_roundtrip_and_failure() {
        let alice = keyring(0x01);
        let bob = keyring(0x02);

        let sealed = alice.sym_encrypt(b"note to self").unwrap();
        assert_eq!(
            alice.sym_decrypt(&sealed).as_deref(),
            Some(b"note to self".as_slice())
        );
        assert_eq!(bob.sym_decrypt(&sealed), None);
    }

    #[test]
    fn test_shared_key_symmetric() {
        let alice = keyring(0x01);
        let bob = keyring(0x02);
        assert_eq!(
            alice.shared_key(&bob.box_public()).as_bytes(),
            bob.shared_key(&alice.box_public()).as_bytes()
        );
    }

    #[test]
    fn test_ephemeral_agreement() {
        let bob = keyring(0x02);
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();

        let sender_side = ephemeral.diffie_hellman(&bob.box_public());
        let receiver_side = bob.shared_key(&ephemeral_public);
        assert_eq!(sender_side.as_bytes(), receiver_side.as_bytes());
    }

    #[test]
    fn test_public_keys_encodings() {
        let alice = keyring(0x01);
        let compressed = alice.public_keys(false).unwrap();
        let uncompressed = alice.public_keys(true).unwrap();
        assert_eq!(compressed.signing.len(), 66);
        assert_eq!(uncompressed.signing.len(), 130);
        assert!(uncompressed.signing.starts_with("04"));
        assert_eq!(compressed.encryption, uncompressed.encryption);
    }

    #[test]
    fn test_sign_verifies() {
        let alice = keyring(0x01);
        let sig = alice.sign(b"claim body");
        assert!(alice.signing_key().verify(b"claim body", &sig).is_ok());
    }
}
