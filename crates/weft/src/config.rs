//! Configuration.
//!
//! Everything is an explicit struct handed to constructors; there are no
//! process-wide settings.

use std::time::Duration;

/// Per-thread behavior.
#[derive(Debug, Clone)]
pub struct ThreadConfig {
    /// Whether posting requires the member capability. An open thread
    /// accepts posts from any valid signer.
    pub members_only: bool,

    /// Whether post payloads are sealed under a shared thread key.
    pub confidential: bool,

    /// How long to wait for expected entries (key wraps, awaited posts) to
    /// arrive over replication before giving up.
    pub replication_timeout: Duration,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            members_only: false,
            confidential: false,
            replication_timeout: Duration::from_secs(10),
        }
    }
}

impl ThreadConfig {
    /// An open plaintext thread.
    pub fn open() -> Self {
        Self::default()
    }

    /// A members-only plaintext thread.
    pub fn members_only() -> Self {
        Self {
            members_only: true,
            ..Self::default()
        }
    }

    /// A members-only confidential thread.
    pub fn confidential() -> Self {
        Self {
            members_only: true,
            confidential: true,
            ..Self::default()
        }
    }
}
