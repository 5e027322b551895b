//! The identity manager: root identity plus per-space sub-identities.
//!
//! One manager owns the root keyring and a lazily grown map of space
//! keyrings. Space keyrings come from deterministic consent proofs, so any
//! space ever authenticated can be re-derived from the root seed alone; the
//! keystore record is a cache, not the source of truth.
//!
//! All signing and encryption routes through [`IdentityManager`] so callers
//! name a space rather than hold keys.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use weft_core::{Did, Signature};

use crate::claims::{sign_claim, ClaimOptions};
use crate::consent::ConsentProvider;
use crate::error::{IdentityError, Result};
use crate::keyring::{BoxPublicKey, Keyring, SealedMessage};
use crate::keystore::{IdentityRecord, Keystore};
use crate::provider::{KeyProvider, LocalKeyProvider, PublicKeys};
use crate::seed::Seed;

/// Tunables for an identity manager.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// How long to wait for a consent decision before giving up.
    pub consent_timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            consent_timeout: Duration::from_secs(30),
        }
    }
}

/// Where an encrypt or sign call routes: the root identity or one space.
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    /// Space whose keys to use; `None` means the root identity.
    pub space: Option<String>,
    /// Seal asymmetrically to this recipient instead of using the
    /// identity's own symmetric key.
    pub to: Option<BoxPublicKey>,
}

/// Routing for a decrypt call.
#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    /// Space whose keys to use; `None` means the root identity.
    pub space: Option<String>,
    /// Sender's box key for asymmetrically sealed messages.
    pub from: Option<BoxPublicKey>,
}

/// Root identity plus authenticated space sub-identities.
pub struct IdentityManager {
    account: Did,
    root: Arc<Keyring>,
    spaces: RwLock<HashMap<String, Arc<Keyring>>>,
    keystore: Arc<dyn Keystore>,
    consent: Arc<dyn ConsentProvider>,
    config: IdentityConfig,
    logged_out: AtomicBool,
}

impl IdentityManager {
    /// Open an identity from a seed, creating or adopting its keystore
    /// record. Previously authenticated spaces are rehydrated.
    pub fn open(
        seed: Seed,
        keystore: Arc<dyn Keystore>,
        consent: Arc<dyn ConsentProvider>,
        config: IdentityConfig,
    ) -> Result<Self> {
        let root = Keyring::derive(&seed)?;
        let account = root.did().clone();

        let record = match keystore.load(&account)? {
            Some(record) => record,
            None => {
                let record = IdentityRecord::new(account.clone(), &seed);
                keystore.save(&record)?;
                record
            }
        };

        let mut spaces = HashMap::new();
        for name in record.spaces.keys() {
            if let Some(space_seed) = record.space_seed(name)? {
                spaces.insert(name.clone(), Arc::new(Keyring::derive(&space_seed)?));
            }
        }
        info!(account = %account, spaces = spaces.len(), "identity opened");

        Ok(Self {
            account,
            root: Arc::new(root),
            spaces: RwLock::new(spaces),
            keystore,
            consent,
            config,
            logged_out: AtomicBool::new(false),
        })
    }

    /// Reopen a persisted identity by account reference.
    pub fn load(
        account: &Did,
        keystore: Arc<dyn Keystore>,
        consent: Arc<dyn ConsentProvider>,
        config: IdentityConfig,
    ) -> Result<Self> {
        let record = keystore.load(account)?.ok_or_else(|| {
            IdentityError::Keystore(format!("no record for account {account}"))
        })?;
        Self::open(record.seed()?, keystore, consent, config)
    }

    fn check_live(&self) -> Result<()> {
        if self.logged_out.load(Ordering::SeqCst) {
            return Err(IdentityError::LoggedOut);
        }
        Ok(())
    }

    fn lock_err() -> IdentityError {
        IdentityError::Keystore("space map lock poisoned".to_string())
    }

    fn keyring_for(&self, space: Option<&str>) -> Result<Arc<Keyring>> {
        self.check_live()?;
        match space {
            None => Ok(self.root.clone()),
            Some(name) => {
                let spaces = self.spaces.read().map_err(|_| Self::lock_err())?;
                spaces
                    .get(name)
                    .cloned()
                    .ok_or_else(|| IdentityError::AuthRequired(name.to_string()))
            }
        }
    }

    /// The root account reference.
    pub fn account(&self) -> &Did {
        &self.account
    }

    /// The identity reference for one space. Errors until the space is
    /// authenticated.
    pub fn space_did(&self, space: &str) -> Result<Did> {
        Ok(self.keyring_for(Some(space))?.did().clone())
    }

    /// Whether every named space has been authenticated.
    pub fn is_authenticated(&self, spaces: &[&str]) -> bool {
        if self.logged_out.load(Ordering::SeqCst) {
            return false;
        }
        match self.spaces.read() {
            Ok(map) => spaces.iter().all(|s| map.contains_key(*s)),
            Err(_) => false,
        }
    }

    /// Authenticate spaces, requesting consent for any not yet authorized.
    ///
    /// Consent requests are bounded by the configured timeout. Already
    /// authenticated spaces are skipped, so repeated calls are cheap and
    /// never prompt twice.
    pub async fn authenticate(&self, spaces: &[&str]) -> Result<()> {
        self.check_live()?;
        for name in spaces {
            if self.is_authenticated(&[name]) {
                continue;
            }
            let seed = match self.stored_space_seed(name)? {
                Some(seed) => seed,
                None => {
                    debug!(space = %name, "requesting consent");
                    let proof = timeout(
                        self.config.consent_timeout,
                        self.consent.request_consent(&self.account, name),
                    )
                    .await
                    .map_err(|_| IdentityError::ConsentTimeout)??;
                    let seed = proof.space_seed();
                    self.persist_space_seed(name, &seed)?;
                    seed
                }
            };
            let keyring = Arc::new(Keyring::derive(&seed)?);
            info!(space = %name, did = %keyring.did(), "space authenticated");
            self.spaces
                .write()
                .map_err(|_| Self::lock_err())?
                .insert(name.to_string(), keyring);
        }
        Ok(())
    }

    fn stored_space_seed(&self, space: &str) -> Result<Option<Seed>> {
        match self.keystore.load(&self.account)? {
            Some(record) => record.space_seed(space),
            None => Ok(None),
        }
    }

    fn persist_space_seed(&self, space: &str, seed: &Seed) -> Result<()> {
        let mut record = self.keystore.load(&self.account)?.ok_or_else(|| {
            IdentityError::Keystore(format!("record vanished for {}", self.account))
        })?;
        record.insert_space(space, seed);
        self.keystore.save(&record)
    }

    /// Issue a signed claim as the root identity or a space.
    pub fn sign_claim(
        &self,
        space: Option<&str>,
        data: Value,
        options: &ClaimOptions,
    ) -> Result<String> {
        let keyring = self.keyring_for(space)?;
        sign_claim(&keyring, data, options)
    }

    /// Sign raw bytes as the root identity or a space.
    pub fn sign(&self, space: Option<&str>, message: &[u8]) -> Result<Signature> {
        Ok(self.keyring_for(space)?.sign(message))
    }

    /// Encrypt a message. With a recipient it is sealed asymmetrically;
    /// without one it uses the routed identity's own symmetric key.
    pub fn encrypt(&self, plaintext: &[u8], options: &EncryptOptions) -> Result<SealedMessage> {
        let keyring = self.keyring_for(options.space.as_deref())?;
        match &options.to {
            Some(recipient) => keyring.asym_encrypt(plaintext, recipient, None),
            None => keyring.sym_encrypt(plaintext),
        }
    }

    /// Decrypt a message. `Ok(None)` means the routed identity does not
    /// hold the right key, which is a normal outcome, not an error.
    pub fn decrypt(
        &self,
        sealed: &SealedMessage,
        options: &DecryptOptions,
    ) -> Result<Option<Vec<u8>>> {
        let keyring = self.keyring_for(options.space.as_deref())?;
        Ok(match &options.from {
            Some(sender) => keyring.asym_decrypt(sealed, sender),
            None => keyring.sym_decrypt(sealed),
        })
    }

    /// Public key components for the root identity or a space.
    pub fn public_keys(&self, space: Option<&str>, uncompressed: bool) -> Result<PublicKeys> {
        self.keyring_for(space)?.public_keys(uncompressed)
    }

    /// A key provider for the root identity or a space, for handing to the
    /// log and access layers.
    pub fn provider(&self, space: Option<&str>) -> Result<Arc<dyn KeyProvider>> {
        let keyring = self.keyring_for(space)?;
        Ok(Arc::new(LocalKeyProvider::from_arc(keyring)))
    }

    /// Log out: erase the persisted record and drop all key material.
    ///
    /// Irreversible for this instance. The identity itself survives and can
    /// be reopened from the seed.
    pub fn logout(&self) -> Result<()> {
        self.check_live()?;
        self.keystore.erase(&self.account)?;
        self.spaces.write().map_err(|_| Self::lock_err())?.clear();
        self.logged_out.store(true, Ordering::SeqCst);
        info!(account = %self.account, "logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::verify_claim;
    use crate::consent::{ConsentProof, LocalConsent};
    use crate::keystore::MemoryKeystore;
    use async_trait::async_trait;
    use serde_json::json;

    fn manager_for_seed(byte: u8, keystore: Arc<dyn Keystore>) -> IdentityManager {
        let seed = Seed::from_bytes([byte; 32]);
        let consent = Arc::new(LocalConsent::for_seed(&seed).unwrap());
        IdentityManager::open(seed, keystore, consent, IdentityConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_derives_space_identity() {
        let manager = manager_for_seed(0x01, Arc::new(MemoryKeystore::new()));

        assert!(!manager.is_authenticated(&["notes"]));
        assert!(matches!(
            manager.space_did("notes"),
            Err(IdentityError::AuthRequired(_))
        ));

        manager.authenticate(&["notes"]).await.unwrap();
        assert!(manager.is_authenticated(&["notes"]));

        let space_did = manager.space_did("notes").unwrap();
        assert_ne!(&space_did, manager.account());
    }

    #[tokio::test]
    async fn test_space_identity_recoverable_from_seed() {
        let a = manager_for_seed(0x01, Arc::new(MemoryKeystore::new()));
        a.authenticate(&["notes"]).await.unwrap();

        // Fresh keystore simulates a new device restored from the seed.
        let b = manager_for_seed(0x01, Arc::new(MemoryKeystore::new()));
        b.authenticate(&["notes"]).await.unwrap();

        assert_eq!(a.space_did("notes").unwrap(), b.space_did("notes").unwrap());
        assert_eq!(
            a.public_keys(Some("notes"), false).unwrap(),
            b.public_keys(Some("notes"), false).unwrap()
        );
    }

    #[tokio::test]
    async fn test_spaces_rehydrate_from_keystore() {
        let keystore: Arc<dyn Keystore> = Arc::new(MemoryKeystore::new());
        let first = manager_for_seed(0x01, keystore.clone());
        first.authenticate(&["notes", "photos"]).await.unwrap();
        let account = first.account().clone();
        drop(first);

        let seed = Seed::from_bytes([0x01; 32]);
        let consent = Arc::new(LocalConsent::for_seed(&seed).unwrap());
        let second =
            IdentityManager::load(&account, keystore, consent, IdentityConfig::default()).unwrap();
        assert!(second.is_authenticated(&["notes", "photos"]));
    }

    #[tokio::test]
    async fn test_claims_route_to_space_keys() {
        let manager = manager_for_seed(0x01, Arc::new(MemoryKeystore::new()));
        manager.authenticate(&["notes"]).await.unwrap();

        let root_claim = manager
            .sign_claim(None, json!({"v": 1}), &ClaimOptions::default())
            .unwrap();
        let space_claim = manager
            .sign_claim(Some("notes"), json!({"v": 1}), &ClaimOptions::default())
            .unwrap();

        let root_key = manager.provider(None).unwrap().signing_key();
        let space_key = manager.provider(Some("notes")).unwrap().signing_key();

        assert_eq!(
            &verify_claim(&root_claim, &root_key).unwrap().iss,
            manager.account()
        );
        assert_eq!(
            verify_claim(&space_claim, &space_key).unwrap().iss,
            manager.space_did("notes").unwrap()
        );
        assert!(verify_claim(&space_claim, &root_key).is_err());
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_routing() {
        let manager = manager_for_seed(0x01, Arc::new(MemoryKeystore::new()));
        manager.authenticate(&["notes"]).await.unwrap();

        let sealed = manager
            .encrypt(
                b"space secret",
                &EncryptOptions {
                    space: Some("notes".to_string()),
                    to: None,
                },
            )
            .unwrap();

        // The right space opens it.
        let opened = manager
            .decrypt(
                &sealed,
                &DecryptOptions {
                    space: Some("notes".to_string()),
                    from: None,
                },
            )
            .unwrap();
        assert_eq!(opened.as_deref(), Some(b"space secret".as_slice()));

        // The root identity holds a different key: None, not an error.
        let miss = manager.decrypt(&sealed, &DecryptOptions::default()).unwrap();
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn test_asym_encrypt_between_accounts() {
        let alice = manager_for_seed(0x01, Arc::new(MemoryKeystore::new()));
        let bob = manager_for_seed(0x02, Arc::new(MemoryKeystore::new()));

        let bob_box = bob.provider(None).unwrap().box_public();
        let alice_box = alice.provider(None).unwrap().box_public();

        let sealed = alice
            .encrypt(
                b"for bob",
                &EncryptOptions {
                    space: None,
                    to: Some(bob_box),
                },
            )
            .unwrap();
        let opened = bob
            .decrypt(
                &sealed,
                &DecryptOptions {
                    space: None,
                    from: Some(alice_box),
                },
            )
            .unwrap();
        assert_eq!(opened.as_deref(), Some(b"for bob".as_slice()));
    }

    #[tokio::test]
    async fn test_logout_erases_and_invalidates() {
        let keystore: Arc<dyn Keystore> = Arc::new(MemoryKeystore::new());
        let manager = manager_for_seed(0x01, keystore.clone());
        manager.authenticate(&["notes"]).await.unwrap();
        let account = manager.account().clone();

        manager.logout().unwrap();

        assert!(keystore.load(&account).unwrap().is_none());
        assert!(!manager.is_authenticated(&["notes"]));
        assert!(matches!(
            manager.sign(None, b"m"),
            Err(IdentityError::LoggedOut)
        ));
        assert!(matches!(
            manager.authenticate(&["notes"]).await,
            Err(IdentityError::LoggedOut)
        ));
    }

    /// Consent that never answers, for exercising the timeout path.
    struct StalledConsent;

    #[async_trait]
    impl ConsentProvider for StalledConsent {
        async fn request_consent(&self, _account: &Did, _space: &str) -> Result<ConsentProof> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consent_timeout() {
        let seed = Seed::from_bytes([0x01; 32]);
        let manager = IdentityManager::open(
            seed,
            Arc::new(MemoryKeystore::new()),
            Arc::new(StalledConsent),
            IdentityConfig {
                consent_timeout: Duration::from_secs(5),
            },
        )
        .unwrap();

        assert!(matches!(
            manager.authenticate(&["notes"]).await,
            Err(IdentityError::ConsentTimeout)
        ));
        assert!(!manager.is_authenticated(&["notes"]));
    }

    /// Consent that refuses everything.
    struct RefusingConsent;

    #[async_trait]
    impl ConsentProvider for RefusingConsent {
        async fn request_consent(&self, _account: &Did, space: &str) -> Result<ConsentProof> {
            Err(IdentityError::ConsentDenied(space.to_string()))
        }
    }

    #[tokio::test]
    async fn test_consent_denied_propagates() {
        let seed = Seed::from_bytes([0x01; 32]);
        let manager = IdentityManager::open(
            seed,
            Arc::new(MemoryKeystore::new()),
            Arc::new(RefusingConsent),
            IdentityConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            manager.authenticate(&["notes"]).await,
            Err(IdentityError::ConsentDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticated_space_skips_consent() {
        // After the first authenticate, the seed is cached in the keystore,
        // so even a refusing consent provider cannot block reopening.
        let keystore: Arc<dyn Keystore> = Arc::new(MemoryKeystore::new());
        let first = manager_for_seed(0x01, keystore.clone());
        first.authenticate(&["notes"]).await.unwrap();
        let account = first.account().clone();
        drop(first);

        let second = IdentityManager::load(
            &account,
            keystore,
            Arc::new(RefusingConsent),
            IdentityConfig::default(),
        )
        .unwrap();
        second.authenticate(&["notes"]).await.unwrap();
        assert!(second.is_authenticated(&["notes"]));
    }
}
