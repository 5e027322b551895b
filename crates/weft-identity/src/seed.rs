//! The root of all deterministic derivation for one identity.

use rand::RngCore;
use std::fmt;

use crate::error::{IdentityError, Result};

/// A 32-byte seed. Immutable; owned exclusively by one keyring derivation.
///
/// Mnemonic handling happens outside this core: by the time a seed reaches
/// Weft it is raw bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed([u8; 32]);

impl Seed {
    /// Generate a fresh random seed.
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

    /// Parse from a hex string. Fails fast on an unrecognized format.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|_| IdentityError::InvalidSeed("not hex".to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidSeed("expected 32 bytes".to_string()))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string (for the persisted identity record).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print seed material.
        write!(f, "Seed(..)")
    }
}
