//! In-memory log implementation.
//!
//! The reference implementation and the test workhorse. Thread-safe via
//! RwLock; append notifications go out on a tokio broadcast channel.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use weft_core::{validate_entry, Entry, EntryId, ThreadId};

use crate::error::{LogError, Result};
use crate::traits::{AppendGuard, AppendOutcome, EntryLog, LogEvent};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// An in-memory append-only log for one thread.
pub struct MemoryLog {
    thread_id: ThreadId,
    guard: Arc<dyn AppendGuard>,
    inner: RwLock<Inner>,
    events: broadcast::Sender<LogEvent>,
}

struct Inner {
    /// Entries in arrival order.
    entries: Vec<Entry>,
    /// Id to position in `entries`.
    index: HashMap<EntryId, usize>,
}

impl MemoryLog {
    /// Create an empty log for a thread, gated by `guard`.
    pub fn new(thread_id: ThreadId, guard: Arc<dyn AppendGuard>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            thread_id,
            guard,
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                index: HashMap::new(),
            }),
            events,
        }
    }

    fn lock_err() -> LogError {
        LogError::Storage("log lock poisoned".to_string())
    }

    /// Pull entries this log is missing from another replica of the same
    /// thread, in the peer's arrival order.
    ///
    /// Each pulled entry goes through the full append path, so a replica
    /// never accepts what it would have rejected locally. Entries the guard
    /// rejects are skipped rather than aborting the sync; they may become
    /// acceptable after a later sync of the capability log. Returns the
    /// number of entries actually appended.
    pub async fn replicate(&self, peer: &MemoryLog) -> Result<usize> {
        let peer_entries = peer.entries().await?;
        let mut appended = 0;
        for entry in peer_entries {
            match self.append(entry).await {
                Ok(AppendOutcome::Appended(_)) => appended += 1,
                Ok(AppendOutcome::AlreadyExists(_)) => {}
                Err(LogError::AppendDenied { author, kind }) => {
                    debug!(%author, ?kind, "skipping entry rejected during replication");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(thread = ?self.thread_id, appended, "replicated from peer");
        let _ = self.events.send(LogEvent::Replicated { appended });
        Ok(appended)
    }
}

#[async_trait]
impl EntryLog for MemoryLog {
    fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    async fn append(&self, entry: Entry) -> Result<AppendOutcome> {
        if entry.thread_id() != &self.thread_id {
            return Err(LogError::WrongThread {
                expected: self.thread_id,
                actual: *entry.thread_id(),
            });
        }
        validate_entry(&entry)?;

        let id = entry.compute_id();
        {
            // Guard and insert under one write lock so the snapshot the
            // guard saw is the log the entry lands on.
            let mut inner = self.inner.write().map_err(|_| Self::lock_err())?;
            if inner.index.contains_key(&id) {
                return Ok(AppendOutcome::AlreadyExists(id));
            }
            if !self.guard.can_append(&entry, &inner.entries) {
                return Err(LogError::AppendDenied {
                    author: entry.author().clone(),
                    kind: entry.kind(),
                });
            }
            let pos = inner.entries.len();
            inner.entries.push(entry.clone());
            inner.index.insert(id, pos);
        }

        // Nobody listening is fine.
        let _ = self.events.send(LogEvent::Appended { id, entry });
        Ok(AppendOutcome::Appended(id))
    }

    async fn entries(&self) -> Result<Vec<Entry>> {
        let inner = self.inner.read().map_err(|_| Self::lock_err())?;
        Ok(inner.entries.clone())
    }

    async fn get(&self, id: &EntryId) -> Result<Option<Entry>> {
        let inner = self.inner.read().map_err(|_| Self::lock_err())?;
        Ok(inner.index.get(id).map(|&pos| inner.entries[pos].clone()))
    }

    async fn len(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| Self::lock_err())?;
        Ok(inner.entries.len())
    }

    fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::OpenGuard;
    use weft_core::{Did, EntryBuilder, EntryKind, SigningKeypair};

    fn thread() -> (SigningKeypair, ThreadId) {
        let keypair = SigningKeypair::from_seed(&[0x42; 32]).unwrap();
        let did = Did::from_signing_key(&keypair.public_key());
        let thread_id = ThreadId::derive(&did, "test");
        (keypair, thread_id)
    }

    fn post(keypair: &SigningKeypair, thread_id: ThreadId, body: &str) -> Entry {
        EntryBuilder::new(thread_id)
            .timestamp(1_700_000_000_000)
            .payload(body.as_bytes().to_vec())
            .sign(keypair)
    }

    fn open_log(thread_id: ThreadId) -> MemoryLog {
        MemoryLog::new(thread_id, Arc::new(OpenGuard))
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let (keypair, thread_id) = thread();
        let log = open_log(thread_id);

        let entry = post(&keypair, thread_id, "hello");
        let id = entry.compute_id();

        assert_eq!(log.append(entry.clone()).await.unwrap(), AppendOutcome::Appended(id));
        assert_eq!(log.len().await.unwrap(), 1);
        assert_eq!(log.get(&id).await.unwrap(), Some(entry.clone()));
        assert_eq!(log.entries().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_append_idempotent() {
        let (keypair, thread_id) = thread();
        let log = open_log(thread_id);
        let entry = post(&keypair, thread_id, "hello");
        let id = entry.compute_id();

        log.append(entry.clone()).await.unwrap();
        assert_eq!(
            log.append(entry).await.unwrap(),
            AppendOutcome::AlreadyExists(id)
        );
        assert_eq!(log.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_wrong_thread() {
        let (keypair, thread_id) = thread();
        let did = Did::from_signing_key(&keypair.public_key());
        let other_thread = ThreadId::derive(&did, "other");
        let log = open_log(thread_id);

        let entry = post(&keypair, other_thread, "lost");
        assert!(matches!(
            log.append(entry).await,
            Err(LogError::WrongThread { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_invalid_signature() {
        let (keypair, thread_id) = thread();
        let log = open_log(thread_id);

        let mut entry = post(&keypair, thread_id, "hello");
        entry.payload = bytes::Bytes::from_static(b"tampered");
        assert!(matches!(
            log.append(entry).await,
            Err(LogError::Validation(_))
        ));
        assert_eq!(log.len().await.unwrap(), 0);
    }

    /// Guard that blocks a fixed author.
    struct BlockAuthor(Did);

    impl AppendGuard for BlockAuthor {
        fn can_append(&self, candidate: &Entry, _existing: &[Entry]) -> bool {
            candidate.author() != &self.0
        }
    }

    #[tokio::test]
    async fn test_guard_denies_append() {
        let (keypair, thread_id) = thread();
        let did = Did::from_signing_key(&keypair.public_key());
        let log = MemoryLog::new(thread_id, Arc::new(BlockAuthor(did.clone())));

        let err = log.append(post(&keypair, thread_id, "no")).await.unwrap_err();
        match err {
            LogError::AppendDenied { author, kind } => {
                assert_eq!(author, did);
                assert_eq!(kind, EntryKind::Post);
            }
            other => panic!("expected AppendDenied, got {other:?}"),
        }
        assert!(log.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribe_sees_appends() {
        let (keypair, thread_id) = thread();
        let log = open_log(thread_id);
        let mut events = log.subscribe();

        let entry = post(&keypair, thread_id, "hello");
        let id = entry.compute_id();
        log.append(entry).await.unwrap();

        match events.recv().await.unwrap() {
            LogEvent::Appended { id: seen, .. } => assert_eq!(seen, id),
            other => panic!("expected Appended, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replicate_from_peer() {
        let (keypair, thread_id) = thread();
        let a = open_log(thread_id);
        let b = open_log(thread_id);

        a.append(post(&keypair, thread_id, "one")).await.unwrap();
        a.append(post(&keypair, thread_id, "two")).await.unwrap();
        b.append(post(&keypair, thread_id, "two")).await.unwrap();

        let pulled = b.replicate(&a).await.unwrap();
        assert_eq!(pulled, 1);
        assert_eq!(b.len().await.unwrap(), 2);

        // Already converged: nothing more moves.
        assert_eq!(b.replicate(&a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replicate_emits_event() {
        let (keypair, thread_id) = thread();
        let a = open_log(thread_id);
        let b = open_log(thread_id);
        a.append(post(&keypair, thread_id, "one")).await.unwrap();

        let mut events = b.subscribe();
        b.replicate(&a).await.unwrap();

        // One Appended for the entry, then the Replicated marker.
        assert!(matches!(
            events.recv().await.unwrap(),
            LogEvent::Appended { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            LogEvent::Replicated { appended: 1 }
        ));
    }
}
