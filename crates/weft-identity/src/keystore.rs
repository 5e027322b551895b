//! Persisted identity records.
//!
//! A record holds everything needed to reopen an identity: the root seed and
//! the seed of every space already consented to. Records are JSON; unknown
//! fields are ignored on load so older builds can read newer records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use weft_core::Did;

use crate::error::{IdentityError, Result};
use crate::seed::Seed;

/// One identity's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// The account this record belongs to.
    pub account: Did,
    /// Root seed, hex encoded.
    pub root_seed: String,
    /// Space name to space seed (hex). BTreeMap keeps the file diffable.
    #[serde(default)]
    pub spaces: BTreeMap<String, String>,
}

impl IdentityRecord {
    /// Start a record for a fresh identity.
    pub fn new(account: Did, root_seed: &Seed) -> Self {
        Self {
            account,
            root_seed: root_seed.to_hex(),
            spaces: BTreeMap::new(),
        }
    }

    /// Decode the root seed.
    pub fn seed(&self) -> Result<Seed> {
        Seed::from_hex(&self.root_seed)
    }

    /// Decode the seed for one space, if recorded.
    pub fn space_seed(&self, space: &str) -> Result<Option<Seed>> {
        match self.spaces.get(space) {
            Some(hex) => Seed::from_hex(hex).map(Some),
            None => Ok(None),
        }
    }

    /// Record a space seed.
    pub fn insert_space(&mut self, space: &str, seed: &Seed) {
        self.spaces.insert(space.to_string(), seed.to_hex());
    }
}

/// Storage for identity records, keyed by account.
pub trait Keystore: Send + Sync {
    /// Load the record for an account, if present.
    fn load(&self, account: &Did) -> Result<Option<IdentityRecord>>;

    /// Persist a record, replacing any existing one.
    fn save(&self, record: &IdentityRecord) -> Result<()>;

    /// Remove the record for an account. Removing a missing record is fine.
    fn erase(&self, account: &Did) -> Result<()>;
}

/// In-memory keystore for tests and ephemeral identities.
#[derive(Default)]
pub struct MemoryKeystore {
    records: Mutex<HashMap<Did, IdentityRecord>>,
}

impl MemoryKeystore {
    /// Create an empty keystore.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Keystore for MemoryKeystore {
    fn load(&self, account: &Did) -> Result<Option<IdentityRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| IdentityError::Keystore("lock poisoned".to_string()))?;
        Ok(records.get(account).cloned())
    }

    fn save(&self, record: &IdentityRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| IdentityError::Keystore("lock poisoned".to_string()))?;
        records.insert(record.account.clone(), record.clone());
        Ok(())
    }

    fn erase(&self, account: &Did) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| IdentityError::Keystore("lock poisoned".to_string()))?;
        records.remove(account);
        Ok(())
    }
}

/// File-backed keystore, one JSON file per account under a directory.
pub struct FileKeystore {
    dir: PathBuf,
}

impl FileKeystore {
    /// Open a keystore rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| IdentityError::Keystore(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path_for(&self, account: &Did) -> PathBuf {
        // The hex tail of the did is already filesystem-safe.
        let name = account.as_str().rsplit(':').next().unwrap_or("account");
        self.dir.join(format!("{name}.json"))
    }
}

impl Keystore for FileKeystore {
    fn load(&self, account: &Did) -> Result<Option<IdentityRecord>> {
        let path = self.path_for(account);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IdentityError::Keystore(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };
        let record: IdentityRecord = serde_json::from_slice(&data)
            .map_err(|e| IdentityError::Keystore(format!("decode {}: {e}", path.display())))?;
        Ok(Some(record))
    }

    fn save(&self, record: &IdentityRecord) -> Result<()> {
        let path = self.path_for(&record.account);
        let data = serde_json::to_vec_pretty(record)
            .map_err(|e| IdentityError::Keystore(e.to_string()))?;
        // Write then rename so a crash never leaves a truncated record.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data)
            .map_err(|e| IdentityError::Keystore(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| IdentityError::Keystore(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    fn erase(&self, account: &Did) -> Result<()> {
        let path = self.path_for(account);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IdentityError::Keystore(format!(
                "remove {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::Keyring;

    fn record(byte: u8) -> IdentityRecord {
        let seed = Seed::from_bytes([byte; 32]);
        let keyring = Keyring::derive(&seed).unwrap();
        IdentityRecord::new(keyring.did().clone(), &seed)
    }

    #[test]
    fn test_memory_roundtrip() {
        let store = MemoryKeystore::new();
        let mut rec = record(0x01);
        rec.insert_space("notes", &Seed::from_bytes([0x09; 32]));

        store.save(&rec).unwrap();
        let loaded = store.load(&rec.account).unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert_eq!(
            loaded.space_seed("notes").unwrap(),
            Some(Seed::from_bytes([0x09; 32]))
        );
        assert_eq!(loaded.space_seed("photos").unwrap(), None);

        store.erase(&rec.account).unwrap();
        assert!(store.load(&rec.account).unwrap().is_none());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeystore::open(dir.path()).unwrap();
        let rec = record(0x02);

        assert!(store.load(&rec.account).unwrap().is_none());
        store.save(&rec).unwrap();
        assert_eq!(store.load(&rec.account).unwrap(), Some(rec.clone()));

        // Reopening reads the same file.
        let reopened = FileKeystore::open(dir.path()).unwrap();
        assert_eq!(reopened.load(&rec.account).unwrap(), Some(rec.clone()));

        store.erase(&rec.account).unwrap();
        store.erase(&rec.account).unwrap();
        assert!(store.load(&rec.account).unwrap().is_none());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let rec = record(0x03);
        let mut value = serde_json::to_value(&rec).unwrap();
        value["future_field"] = serde_json::json!({"x": 1});
        let decoded: IdentityRecord = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn test_corrupt_record_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeystore::open(dir.path()).unwrap();
        let rec = record(0x04);

        let path = dir.path().join(format!(
            "{}.json",
            rec.account.as_str().rsplit(':').next().unwrap()
        ));
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            store.load(&rec.account),
            Err(IdentityError::Keystore(_))
        ));
    }
}
