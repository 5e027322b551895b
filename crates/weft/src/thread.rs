//! The thread session object.
//!
//! A [`Thread`] wires together one content log, its companion capability
//! log, the capability fold shared with both guards, and (for confidential
//! threads) the recovered thread key. One `Thread` value is one replica's
//! session: it starts with no identity, an identity is attached exactly
//! once, and every write routes through the attached [`KeyProvider`].
//!
//! Replication between replicas is simulated by [`Thread::replicate_from`],
//! which moves entries log-to-log and refreshes the capability fold in
//! between, in that order, so a replica never judges content against a
//! staler capability view than the peer that sent it.

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use weft_core::{
    Did, Entry, EntryBuilder, EntryId, EntryKind, ThreadId,
};
use weft_access::{
    await_own_key, find_wrapped_key, AccessError, Capability, CapabilityCache, CapabilityWatch,
    EncKeyId, GrantPayload, ModeratorGuard, ThreadGuard, ThreadKey, WrappedKey,
};
use weft_identity::{BoxPublicKey, KeyProvider, SealedMessage};
use weft_log::{EntryLog, LogError, LogEvent, MemoryLog};

use crate::config::ThreadConfig;
use crate::error::{Result, ThreadError};

/// A decrypted, not-deleted thread message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The entry this message came from.
    pub id: EntryId,
    /// Who posted it.
    pub author: Did,
    /// Author-claimed timestamp (Unix milliseconds).
    pub timestamp: i64,
    /// The plaintext body.
    pub body: Bytes,
}

/// One replica's session on one thread.
pub struct Thread {
    name: String,
    config: ThreadConfig,
    root: Did,
    thread_id: ThreadId,
    content_log: Arc<MemoryLog>,
    cap_log: Arc<MemoryLog>,
    cache: Arc<CapabilityCache>,
    provider: RwLock<Option<Arc<dyn KeyProvider>>>,
    thread_key: RwLock<Option<(ThreadKey, EncKeyId)>>,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl Thread {
    fn assemble(name: &str, config: ThreadConfig, root: Did) -> Self {
        let thread_id = ThreadId::derive(&root, name);
        let cap_thread_id = ThreadId::derive(&root, &format!("{name}#caps"));

        let cache = Arc::new(CapabilityCache::new(root.clone()));
        let cap_log = Arc::new(MemoryLog::new(
            cap_thread_id,
            Arc::new(ModeratorGuard::new(root.clone())),
        ));
        let content_log = Arc::new(MemoryLog::new(
            thread_id,
            Arc::new(ThreadGuard::new(cache.clone(), config.members_only)),
        ));

        Self {
            name: name.to_string(),
            config,
            root,
            thread_id,
            content_log,
            cap_log,
            cache,
            provider: RwLock::new(None),
            thread_key: RwLock::new(None),
        }
    }

    /// Create a thread. The creator's identity becomes the root moderator
    /// and is attached to the session.
    ///
    /// For a confidential thread this also generates the thread key and
    /// records the originating self-grant carrying the creator's own wrap,
    /// so late joiners recover the key from the capability log alone.
    pub async fn create(
        name: &str,
        config: ThreadConfig,
        provider: Arc<dyn KeyProvider>,
    ) -> Result<Self> {
        let root = provider.did().clone();
        let thread = Self::assemble(name, config, root);
        *thread.provider.write().await = Some(provider.clone());

        if thread.config.confidential {
            let key = ThreadKey::generate();
            let wrapped = WrappedKey::create(&key, &provider.box_public(), &thread.thread_id)?;
            let key_id = EncKeyId::derive(&wrapped);

            let payload = GrantPayload::new(thread.root.clone(), Capability::Moderator)
                .with_wrapped_key(wrapped, key_id);
            let entry = thread
                .sign_entry(
                    EntryBuilder::new(*thread.cap_log.thread_id())
                        .timestamp(now_millis())
                        .kind(EntryKind::Grant)
                        .payload(payload.to_bytes()),
                )
                .await?;
            thread.cap_log.append(entry).await?;
            thread.refresh_capabilities().await?;
            *thread.thread_key.write().await = Some((key, key_id));
        }

        info!(
            thread = %thread.thread_id.to_hex(),
            root = %thread.root,
            confidential = thread.config.confidential,
            "thread created"
        );
        Ok(thread)
    }

    /// Open a fresh, empty replica of an existing thread.
    ///
    /// The session starts with no identity; call [`Self::attach`], then
    /// [`Self::init_confidential`] for a confidential thread, then
    /// replicate from a peer.
    pub fn join(name: &str, config: ThreadConfig, root: Did) -> Self {
        Self::assemble(name, config, root)
    }

    /// Attach an identity to this session.
    ///
    /// A session attaches exactly once; attaching again is an error, even
    /// with the same identity.
    pub async fn attach(&self, provider: Arc<dyn KeyProvider>) -> Result<()> {
        let mut slot = self.provider.write().await;
        if slot.is_some() {
            return Err(ThreadError::AlreadyAttached);
        }
        debug!(did = %provider.did(), "identity attached");
        *slot = Some(provider);
        Ok(())
    }

    async fn attached(&self) -> Result<Arc<dyn KeyProvider>> {
        self.provider
            .read()
            .await
            .clone()
            .ok_or(ThreadError::AuthRequired)
    }

    /// Recover the thread key from the capability log.
    ///
    /// Waits up to the configured replication window for a wrap addressed
    /// to the attached identity; an identity that was never granted access
    /// comes out of that wait with [`AccessError::NoAccess`]. Idempotent
    /// once the key is held.
    pub async fn init_confidential(&self) -> Result<()> {
        let provider = self.attached().await?;
        if self.thread_key.read().await.is_some() {
            return Ok(());
        }

        let key = await_own_key(
            self.cap_log.as_ref(),
            &self.thread_id,
            provider.as_ref(),
            self.config.replication_timeout,
        )
        .await?;

        let entries = self.cap_log.entries().await?;
        let key_id = find_wrapped_key(&entries, provider.did())
            .map(|(_, key_id)| key_id)
            .ok_or(AccessError::NoAccess)?;

        *self.thread_key.write().await = Some((key, key_id));
        Ok(())
    }

    async fn sign_entry(&self, builder: EntryBuilder) -> Result<Entry> {
        let provider = self.attached().await?;
        let prepared = builder.prepare(provider.signing_key());
        let signature = provider.sign(&prepared.signing_message()).await?;
        Ok(prepared.into_entry(signature))
    }

    /// Translate a guard rejection into the capability it was missing.
    async fn denied(&self, operation: &str, required: Capability, err: LogError) -> ThreadError {
        match err {
            LogError::AppendDenied { author, .. } => {
                let actual = self.cache.snapshot().capability_of(&author);
                AccessError::AuthorizationDenied {
                    operation: operation.to_string(),
                    required,
                    actual,
                }
                .into()
            }
            other => other.into(),
        }
    }

    /// Post a message. Confidential threads seal the body under the
    /// thread key first.
    pub async fn post(&self, body: &[u8]) -> Result<EntryId> {
        let payload = if self.config.confidential {
            let guard = self.thread_key.read().await;
            let (key, _) = guard.as_ref().ok_or(AccessError::NotInitialized)?;
            let sealed = key.encrypt(body)?;
            let mut buf = Vec::new();
            ciborium::into_writer(&sealed, &mut buf)
                .expect("CBOR serialization failed");
            buf
        } else {
            body.to_vec()
        };

        let entry = self
            .sign_entry(
                EntryBuilder::new(self.thread_id)
                    .timestamp(now_millis())
                    .payload(payload),
            )
            .await?;

        match self.content_log.append(entry).await {
            Ok(outcome) => Ok(*outcome.entry_id()),
            Err(e) => Err(self.denied("post", Capability::Member, e).await),
        }
    }

    /// Delete an entry by appending a `Delete` on top of it.
    ///
    /// Allowed for one's own entries always, and for non-moderators'
    /// entries if the caller is a moderator. Returns the delete entry's id.
    pub async fn delete(&self, target: EntryId) -> Result<EntryId> {
        let entry = self
            .sign_entry(
                EntryBuilder::new(self.thread_id)
                    .timestamp(now_millis())
                    .kind(EntryKind::Delete)
                    .target(target),
            )
            .await?;

        match self.content_log.append(entry).await {
            Ok(outcome) => Ok(*outcome.entry_id()),
            Err(e) => Err(self.denied("delete", Capability::Moderator, e).await),
        }
    }

    /// Grant a capability to an identity, by reference string.
    ///
    /// The reference is validated before anything touches a log. On a
    /// confidential thread the grant carries the thread key wrapped to
    /// `recipient_box`, which is therefore required there.
    pub async fn grant(
        &self,
        subject: &str,
        capability: Capability,
        recipient_box: Option<&BoxPublicKey>,
    ) -> Result<EntryId> {
        let subject = Did::parse(subject)?;
        self.attached().await?;

        let mut payload = GrantPayload::new(subject, capability);
        if self.config.confidential {
            let guard = self.thread_key.read().await;
            let (key, key_id) = guard.as_ref().ok_or(AccessError::NotInitialized)?;
            let recipient = recipient_box.ok_or_else(|| {
                AccessError::InvalidGrant(
                    "confidential grant requires the recipient's box key".to_string(),
                )
            })?;
            let wrapped = WrappedKey::create(key, recipient, &self.thread_id)?;
            payload = payload.with_wrapped_key(wrapped, *key_id);
        }

        let entry = self
            .sign_entry(
                EntryBuilder::new(*self.cap_log.thread_id())
                    .timestamp(now_millis())
                    .kind(EntryKind::Grant)
                    .payload(payload.to_bytes()),
            )
            .await?;

        let outcome = match self.cap_log.append(entry).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.denied("grant", Capability::Moderator, e).await),
        };
        self.refresh_capabilities().await?;
        Ok(*outcome.entry_id())
    }

    /// Current moderators, root first, then in first-grant order.
    pub async fn moderators(&self) -> Result<Vec<Did>> {
        Ok(self.refresh_capabilities().await?.moderators().to_vec())
    }

    /// Explicitly granted members in first-grant order.
    pub async fn members(&self) -> Result<Vec<Did>> {
        Ok(self.refresh_capabilities().await?.members().to_vec())
    }

    async fn refresh_capabilities(&self) -> Result<weft_access::CapabilitySet> {
        let entries = self.cap_log.entries().await?;
        Ok(self.cache.refresh(&entries))
    }

    /// Read the thread: all posts that are not deleted, in log order,
    /// decrypted on a confidential thread.
    ///
    /// A sealed post the held key does not open is skipped; a key from a
    /// different generation is the reader's lag, not corruption.
    pub async fn messages(&self) -> Result<Vec<Message>> {
        let entries = self.content_log.entries().await?;

        let deleted: HashSet<EntryId> = entries
            .iter()
            .filter_map(|e| e.deleted_target().copied())
            .collect();

        let key = if self.config.confidential {
            let guard = self.thread_key.read().await;
            Some(
                guard
                    .as_ref()
                    .map(|(key, _)| key.clone())
                    .ok_or(AccessError::NotInitialized)?,
            )
        } else {
            None
        };

        let mut messages = Vec::new();
        for entry in &entries {
            if entry.kind() != EntryKind::Post {
                continue;
            }
            let id = entry.compute_id();
            if deleted.contains(&id) {
                continue;
            }
            let body = match &key {
                Some(key) => {
                    let sealed: SealedMessage =
                        match ciborium::from_reader(entry.payload.as_ref()) {
                            Ok(sealed) => sealed,
                            Err(e) => {
                                warn!(id = %id, error = %e, "skipping undecodable post");
                                continue;
                            }
                        };
                    match key.decrypt(&sealed) {
                        Some(plain) => Bytes::from(plain),
                        None => {
                            debug!(id = %id, "held key does not open this post");
                            continue;
                        }
                    }
                }
                None => entry.payload.clone(),
            };
            messages.push(Message {
                id,
                author: entry.author().clone(),
                timestamp: entry.header.timestamp,
                body,
            });
        }
        Ok(messages)
    }

    /// A live capability view over this thread's capability log.
    pub async fn capability_watch(&self) -> Result<CapabilityWatch> {
        let log: Arc<dyn EntryLog> = self.cap_log.clone();
        Ok(CapabilityWatch::spawn(log, self.root.clone()).await?)
    }

    /// Pull this replica up to date from a peer replica.
    ///
    /// Capability entries move first and the fold is refreshed before
    /// content moves, so incoming posts are judged against the capability
    /// state that authorized them.
    pub async fn replicate_from(&self, peer: &Thread) -> Result<()> {
        self.cap_log.replicate(&peer.cap_log).await?;
        self.refresh_capabilities().await?;
        self.content_log.replicate(&peer.content_log).await?;
        Ok(())
    }

    /// Wait for a specific entry to arrive on the content log.
    ///
    /// Distinguishes "not here yet" from denial: the outcome of the wait
    /// window closing is [`AccessError::ReplicationTimeout`].
    pub async fn await_entry(&self, id: EntryId, wait: Duration) -> Result<Entry> {
        let mut events = self.content_log.subscribe();
        if let Some(entry) = self.content_log.get(&id).await? {
            return Ok(entry);
        }

        let waited = tokio::time::timeout(wait, async {
            loop {
                match events.recv().await {
                    Ok(LogEvent::Appended { id: seen, entry }) if seen == id => {
                        return Ok(entry);
                    }
                    Ok(_) => {
                        if let Some(entry) = self.content_log.get(&id).await? {
                            return Ok(entry);
                        }
                    }
                    Err(RecvError::Lagged(_)) => {
                        if let Some(entry) = self.content_log.get(&id).await? {
                            return Ok(entry);
                        }
                    }
                    Err(RecvError::Closed) => {
                        return Err(ThreadError::from(AccessError::ReplicationTimeout))
                    }
                }
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_elapsed) => Err(AccessError::ReplicationTimeout.into()),
        }
    }

    /// The thread identifier.
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// The thread's human name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The root moderator.
    pub fn root(&self) -> &Did {
        &self.root
    }

    /// Whether an identity has been attached to this session.
    pub async fn is_attached(&self) -> bool {
        self.provider.read().await.is_some()
    }

    /// The attached identity's reference.
    pub async fn did(&self) -> Result<Did> {
        Ok(self.attached().await?.did().clone())
    }
}
