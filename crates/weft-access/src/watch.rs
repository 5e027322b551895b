//! Live capability views.
//!
//! A [`CapabilityWatch`] keeps a [`CapabilityCache`] in step with its
//! capability log: a background task refreshes the fold on every append and
//! publishes snapshots on a watch channel. The cache half feeds guards; the
//! channel half lets callers wait for a capability to arrive, which is how
//! "I was just granted access on another replica" resolves.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::debug;

use weft_core::Did;
use weft_log::EntryLog;

use crate::error::{AccessError, Result};
use crate::fold::{CapabilityCache, CapabilitySet};

/// A capability fold kept current against its log.
pub struct CapabilityWatch {
    cache: Arc<CapabilityCache>,
    rx: watch::Receiver<CapabilitySet>,
}

impl CapabilityWatch {
    /// Start watching a capability log.
    ///
    /// The background task lives until the log's event channel closes or
    /// every clone of this watch is dropped.
    pub async fn spawn(log: Arc<dyn EntryLog>, root: Did) -> Result<Self> {
        let cache = Arc::new(CapabilityCache::new(root));
        let mut events = log.subscribe();
        let initial = cache.refresh(&log.entries().await?);
        let (tx, rx) = watch::channel(initial);

        let task_cache = cache.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        let entries = match log.entries().await {
                            Ok(entries) => entries,
                            Err(e) => {
                                debug!(error = %e, "capability refresh failed");
                                continue;
                            }
                        };
                        let set = task_cache.refresh(&entries);
                        if tx.send(set).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Self { cache, rx })
    }

    /// The shared cache, for wiring into a [`ThreadGuard`].
    ///
    /// [`ThreadGuard`]: crate::guard::ThreadGuard
    pub fn cache(&self) -> Arc<CapabilityCache> {
        self.cache.clone()
    }

    /// The current capability snapshot.
    pub fn current(&self) -> CapabilitySet {
        self.rx.borrow().clone()
    }

    /// Wait until the fold satisfies `predicate`, up to `wait`.
    ///
    /// Checks the current snapshot first, so an already satisfied predicate
    /// returns immediately. Times out to [`AccessError::ReplicationTimeout`].
    pub async fn wait_until<F>(&mut self, wait: Duration, predicate: F) -> Result<CapabilitySet>
    where
        F: Fn(&CapabilitySet) -> bool,
    {
        {
            let current = self.rx.borrow();
            if predicate(&current) {
                return Ok(current.clone());
            }
        }
        tokio::time::timeout(wait, async {
            loop {
                if self.rx.changed().await.is_err() {
                    return Err(AccessError::ReplicationTimeout);
                }
                let current = self.rx.borrow_and_update();
                if predicate(&current) {
                    return Ok(current.clone());
                }
            }
        })
        .await
        .map_err(|_| AccessError::ReplicationTimeout)?
    }

    /// Wait until `did` is a member.
    pub async fn wait_for_member(&mut self, did: &Did, wait: Duration) -> Result<CapabilitySet> {
        self.wait_until(wait, |set| set.is_member(did)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, GrantPayload};
    use crate::guard::ModeratorGuard;
    use weft_core::{EntryBuilder, EntryKind, SigningKeypair, ThreadId};
    use weft_log::MemoryLog;

    fn actor(byte: u8) -> (SigningKeypair, Did) {
        let kp = SigningKeypair::from_seed(&[byte; 32]).unwrap();
        let did = Did::from_signing_key(&kp.public_key());
        (kp, did)
    }

    fn grant(author: &SigningKeypair, tid: ThreadId, subject: &Did) -> weft_core::Entry {
        EntryBuilder::new(tid)
            .timestamp(1_700_000_000_000)
            .kind(EntryKind::Grant)
            .payload(GrantPayload::new(subject.clone(), Capability::Member).to_bytes())
            .sign(author)
    }

    #[tokio::test]
    async fn test_watch_tracks_appends() {
        let (root_kp, root) = actor(0x01);
        let (_, alice) = actor(0x02);
        let tid = ThreadId::derive(&root, "caps");
        let log: Arc<dyn EntryLog> = Arc::new(MemoryLog::new(
            tid,
            Arc::new(ModeratorGuard::new(root.clone())),
        ));

        let mut watch = CapabilityWatch::spawn(log.clone(), root.clone()).await.unwrap();
        assert!(!watch.current().is_member(&alice));

        log.append(grant(&root_kp, tid, &alice)).await.unwrap();

        let set = watch
            .wait_for_member(&alice, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(set.is_member(&alice));
        assert!(watch.cache().is_member(&alice));
    }

    #[tokio::test]
    async fn test_watch_seeded_from_existing_entries() {
        let (root_kp, root) = actor(0x01);
        let (_, alice) = actor(0x02);
        let tid = ThreadId::derive(&root, "caps");
        let log: Arc<dyn EntryLog> = Arc::new(MemoryLog::new(
            tid,
            Arc::new(ModeratorGuard::new(root.clone())),
        ));
        log.append(grant(&root_kp, tid, &alice)).await.unwrap();

        let watch = CapabilityWatch::spawn(log, root).await.unwrap();
        assert!(watch.current().is_member(&alice));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let (_, root) = actor(0x01);
        let (_, alice) = actor(0x02);
        let tid = ThreadId::derive(&root, "caps");
        let log: Arc<dyn EntryLog> = Arc::new(MemoryLog::new(
            tid,
            Arc::new(ModeratorGuard::new(root.clone())),
        ));

        let mut watch = CapabilityWatch::spawn(log, root).await.unwrap();
        let outcome = watch.wait_for_member(&alice, Duration::from_secs(10)).await;
        assert!(matches!(outcome, Err(AccessError::ReplicationTimeout)));
    }
}
