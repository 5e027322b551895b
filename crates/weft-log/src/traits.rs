//! Log traits: the append gate and the abstract log interface.

use async_trait::async_trait;
use tokio::sync::broadcast;

use weft_core::{Entry, EntryId, ThreadId};

use crate::error::Result;

/// Decides whether an entry may be appended, given the log's current
/// contents.
///
/// Guards are pure: the same candidate against the same snapshot always
/// gives the same answer, so every replica that has converged on the same
/// entries accepts and rejects identically.
pub trait AppendGuard: Send + Sync {
    /// May `candidate` be appended to a log currently holding `existing`?
    fn can_append(&self, candidate: &Entry, existing: &[Entry]) -> bool;
}

/// A guard that admits every structurally valid entry.
pub struct OpenGuard;

impl AppendGuard for OpenGuard {
    fn can_append(&self, _candidate: &Entry, _existing: &[Entry]) -> bool {
        true
    }
}

/// Result of an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was new and is now in the log.
    Appended(EntryId),
    /// The exact entry was already present (idempotent, not an error).
    AlreadyExists(EntryId),
}

impl AppendOutcome {
    /// The id of the entry, whether new or already present.
    pub fn entry_id(&self) -> &EntryId {
        match self {
            Self::Appended(id) | Self::AlreadyExists(id) => id,
        }
    }
}

/// Notification of a change to a log.
#[derive(Debug, Clone)]
pub enum LogEvent {
    /// An entry was appended.
    Appended {
        /// The new entry's id.
        id: EntryId,
        /// The entry itself.
        entry: Entry,
    },
    /// A replication pass completed.
    Replicated {
        /// How many entries the pass brought in.
        appended: usize,
    },
}

/// The abstract interface for one thread's append-only log.
///
/// Methods are async to admit both in-memory and remote-backed
/// implementations behind the same trait.
#[async_trait]
pub trait EntryLog: Send + Sync {
    /// The thread this log holds.
    fn thread_id(&self) -> &ThreadId;

    /// Validate, guard-check, and append an entry.
    ///
    /// Re-appending an entry already present succeeds with
    /// [`AppendOutcome::AlreadyExists`].
    async fn append(&self, entry: Entry) -> Result<AppendOutcome>;

    /// All entries in arrival order.
    async fn entries(&self) -> Result<Vec<Entry>>;

    /// Look up one entry by id.
    async fn get(&self, id: &EntryId) -> Result<Option<Entry>>;

    /// Number of entries in the log.
    async fn len(&self) -> Result<usize>;

    /// Whether the log is empty.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Subscribe to append notifications.
    fn subscribe(&self) -> broadcast::Receiver<LogEvent>;
}
