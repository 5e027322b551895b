//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use weft::{Thread, ThreadConfig};
use weft_access::{Capability, GrantPayload};
use weft_core::{Did, Entry, EntryBuilder, EntryId, EntryKind, SecpPublicKey, ThreadId};
use weft_identity::{BoxPublicKey, KeyProvider, Keyring, LocalKeyProvider, Seed};

/// A test participant: one derived keyring and its local key provider.
pub struct Participant {
    keyring: Arc<Keyring>,
    provider: Arc<LocalKeyProvider>,
}

impl Participant {
    /// Create a participant from a fresh random seed.
    pub fn new() -> Self {
        Self::from_seed(Seed::generate())
    }

    /// Create with a deterministic seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::from_seed(Seed::from_bytes(seed))
    }

    /// Create from an explicit seed.
    pub fn from_seed(seed: Seed) -> Self {
        let keyring = Arc::new(Keyring::derive(&seed).expect("keyring derivation failed"));
        let provider = Arc::new(LocalKeyProvider::from_arc(keyring.clone()));
        Self { keyring, provider }
    }

    /// The participant's identity reference.
    pub fn did(&self) -> &Did {
        self.keyring.did()
    }

    /// The participant's signing key.
    pub fn signing_key(&self) -> SecpPublicKey {
        self.keyring.signing_key()
    }

    /// The participant's X25519 box key, for confidential grants.
    pub fn box_public(&self) -> BoxPublicKey {
        self.keyring.box_public()
    }

    /// The participant's keyring.
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// A key provider for attaching this participant to a thread session.
    pub fn provider(&self) -> Arc<dyn KeyProvider> {
        self.provider.clone()
    }

    /// Build and sign a post entry directly, bypassing the thread facade.
    pub fn make_post(&self, thread_id: ThreadId, timestamp: i64, payload: &[u8]) -> Entry {
        self.sign(
            EntryBuilder::new(thread_id)
                .timestamp(timestamp)
                .payload(payload.to_vec()),
        )
    }

    /// Build and sign a delete entry naming `target`.
    pub fn make_delete(&self, thread_id: ThreadId, timestamp: i64, target: EntryId) -> Entry {
        self.sign(
            EntryBuilder::new(thread_id)
                .timestamp(timestamp)
                .kind(EntryKind::Delete)
                .target(target),
        )
    }

    /// Build and sign a grant entry for a capability log.
    pub fn make_grant(
        &self,
        cap_thread_id: ThreadId,
        timestamp: i64,
        payload: &GrantPayload,
    ) -> Entry {
        self.sign(
            EntryBuilder::new(cap_thread_id)
                .timestamp(timestamp)
                .kind(EntryKind::Grant)
                .payload(payload.to_bytes()),
        )
    }

    fn sign(&self, builder: EntryBuilder) -> Entry {
        let prepared = builder.prepare(self.keyring.signing_key());
        let signature = self.keyring.sign(&prepared.signing_message());
        prepared.into_entry(signature)
    }
}

impl Default for Participant {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple participants with distinct deterministic seeds.
pub fn participants(count: usize) -> Vec<Participant> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[1] = 0x77;
            Participant::with_seed(seed)
        })
        .collect()
}

/// Create a thread with `creator` as root moderator and each of `members`
/// granted the member capability.
///
/// Works for confidential threads too: each grant carries the thread key
/// wrapped to the member's box key.
pub async fn thread_with_members(
    name: &str,
    config: ThreadConfig,
    creator: &Participant,
    members: &[&Participant],
) -> Thread {
    let thread = Thread::create(name, config, creator.provider())
        .await
        .expect("thread creation failed");
    for member in members {
        let recipient = member.box_public();
        thread
            .grant(member.did().as_str(), Capability::Member, Some(&recipient))
            .await
            .expect("grant failed");
    }
    thread
}

/// Open a second replica of `thread`, attach `member`, and pull it up to
/// date from the original.
pub async fn replica_of(thread: &Thread, config: ThreadConfig, member: &Participant) -> Thread {
    let replica = Thread::join(thread.name(), config, thread.root().clone());
    replica
        .attach(member.provider())
        .await
        .expect("attach failed");
    replica
        .replicate_from(thread)
        .await
        .expect("replication failed");
    replica
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participants_distinct() {
        let people = participants(3);
        assert_ne!(people[0].did(), people[1].did());
        assert_ne!(people[1].did(), people[2].did());
        assert_ne!(people[0].did(), people[2].did());
    }

    #[test]
    fn test_with_seed_deterministic() {
        let a = Participant::with_seed([7; 32]);
        let b = Participant::with_seed([7; 32]);
        assert_eq!(a.did(), b.did());
    }

    #[test]
    fn test_made_entries_validate() {
        let p = Participant::with_seed([1; 32]);
        let thread_id = ThreadId::derive(p.did(), "fixtures");

        let post = p.make_post(thread_id, 1000, b"hello");
        assert!(weft_core::validate_entry(&post).is_ok());

        let delete = p.make_delete(thread_id, 2000, post.compute_id());
        assert!(weft_core::validate_entry(&delete).is_ok());
    }

    #[tokio::test]
    async fn test_thread_with_members() {
        let people = participants(3);
        let thread = thread_with_members(
            "standup",
            ThreadConfig::members_only(),
            &people[0],
            &[&people[1], &people[2]],
        )
        .await;

        let members = thread.members().await.unwrap();
        assert!(members.contains(people[1].did()));
        assert!(members.contains(people[2].did()));
    }

    #[tokio::test]
    async fn test_replica_of_carries_posts() {
        let people = participants(2);
        let thread =
            thread_with_members("log", ThreadConfig::open(), &people[0], &[&people[1]]).await;
        thread.post(b"first").await.unwrap();

        let replica = replica_of(&thread, ThreadConfig::open(), &people[1]).await;
        let messages = replica.messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body.as_ref(), b"first");
    }
}
