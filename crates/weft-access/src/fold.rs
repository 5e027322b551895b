//! Capability state computation.
//!
//! The member and moderator sets of a thread are not stored anywhere; they
//! are computed by folding the capability log from the beginning. The fold
//! applies each grant only if its author was a moderator at that point, so
//! a grant smuggled past a misbehaving replica still confers nothing.

use std::sync::RwLock;

use tracing::warn;

use weft_core::{Did, Entry, EntryKind};

use crate::capability::{Capability, GrantPayload};

/// The outcome of folding a capability log: who holds what.
///
/// Order within each set is first-grant order, which is the same on every
/// replica that has the same entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    root: Did,
    moderators: Vec<Did>,
    members: Vec<Did>,
}

impl CapabilitySet {
    /// The state of a thread with no grants yet: the root moderator alone.
    pub fn genesis(root: Did) -> Self {
        Self {
            moderators: vec![root.clone()],
            members: Vec::new(),
            root,
        }
    }

    /// Fold a capability log into its capability sets.
    ///
    /// Deterministic and total: non-grant entries, unparseable payloads,
    /// and grants from non-moderators are skipped, never fatal. Capabilities
    /// only accumulate; there is no path from this fold that shrinks a set.
    pub fn fold(root: Did, entries: &[Entry]) -> Self {
        let mut set = Self::genesis(root);
        for entry in entries {
            set.apply(entry);
        }
        set
    }

    /// Apply one entry to the fold.
    pub fn apply(&mut self, entry: &Entry) {
        if entry.kind() != EntryKind::Grant {
            return;
        }
        if !self.is_moderator(entry.author()) {
            // The guard refuses these at append time; a replayed log from
            // an untrusted replica gets the same treatment here.
            warn!(author = %entry.author(), "skipping grant from non-moderator");
            return;
        }
        let payload = match GrantPayload::from_bytes(&entry.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(author = %entry.author(), error = %e, "skipping malformed grant");
                return;
            }
        };
        match payload.capability {
            Capability::Member => self.add_member(payload.subject),
            Capability::Moderator => self.add_moderator(payload.subject),
        }
    }

    fn add_member(&mut self, did: Did) {
        if !self.members.contains(&did) {
            self.members.push(did);
        }
    }

    fn add_moderator(&mut self, did: Did) {
        if !self.moderators.contains(&did) {
            self.moderators.push(did);
        }
    }

    /// The root moderator the thread was created under.
    pub fn root(&self) -> &Did {
        &self.root
    }

    /// Moderators in first-grant order, root first.
    pub fn moderators(&self) -> &[Did] {
        &self.moderators
    }

    /// Explicitly granted members in first-grant order.
    ///
    /// Moderators are not repeated here; [`Self::is_member`] covers both.
    pub fn members(&self) -> &[Did] {
        &self.members
    }

    /// Whether an identity holds the moderator capability.
    pub fn is_moderator(&self, did: &Did) -> bool {
        self.moderators.contains(did)
    }

    /// Whether an identity may act as a member. Moderators qualify.
    pub fn is_member(&self, did: &Did) -> bool {
        self.members.contains(did) || self.is_moderator(did)
    }

    /// The strongest capability an identity holds, if any.
    pub fn capability_of(&self, did: &Did) -> Option<Capability> {
        if self.is_moderator(did) {
            Some(Capability::Moderator)
        } else if self.members.contains(did) {
            Some(Capability::Member)
        } else {
            None
        }
    }
}

/// A cached fold over a capability log, refreshed as entries arrive.
///
/// Readers get a consistent snapshot; a refresh replaces the whole set
/// rather than mutating in place.
pub struct CapabilityCache {
    root: Did,
    inner: RwLock<CapabilitySet>,
}

impl CapabilityCache {
    /// Start from genesis.
    pub fn new(root: Did) -> Self {
        Self {
            inner: RwLock::new(CapabilitySet::genesis(root.clone())),
            root,
        }
    }

    /// Recompute the fold from a full log snapshot.
    pub fn refresh(&self, entries: &[Entry]) -> CapabilitySet {
        let set = CapabilitySet::fold(self.root.clone(), entries);
        if let Ok(mut inner) = self.inner.write() {
            *inner = set.clone();
        }
        set
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> CapabilitySet {
        match self.inner.read() {
            Ok(inner) => inner.clone(),
            // A poisoned lock yields the conservative genesis view.
            Err(_) => CapabilitySet::genesis(self.root.clone()),
        }
    }

    /// Whether an identity is currently a moderator.
    pub fn is_moderator(&self, did: &Did) -> bool {
        self.snapshot().is_moderator(did)
    }

    /// Whether an identity may currently act as a member.
    pub fn is_member(&self, did: &Did) -> bool {
        self.snapshot().is_member(did)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{EntryBuilder, SigningKeypair, ThreadId};

    fn actor(byte: u8) -> (SigningKeypair, Did) {
        let keypair = SigningKeypair::from_seed(&[byte; 32]).unwrap();
        let did = Did::from_signing_key(&keypair.public_key());
        (keypair, did)
    }

    fn grant(
        author: &SigningKeypair,
        thread_id: ThreadId,
        subject: &Did,
        capability: Capability,
    ) -> Entry {
        EntryBuilder::new(thread_id)
            .timestamp(1_700_000_000_000)
            .kind(EntryKind::Grant)
            .payload(GrantPayload::new(subject.clone(), capability).to_bytes())
            .sign(author)
    }

    #[test]
    fn test_genesis_has_root_only() {
        let (_, root) = actor(0x01);
        let set = CapabilitySet::genesis(root.clone());
        assert!(set.is_moderator(&root));
        assert!(set.is_member(&root));
        assert_eq!(set.moderators(), &[root]);
        assert!(set.members().is_empty());
    }

    #[test]
    fn test_fold_applies_root_grants() {
        let (root_kp, root) = actor(0x01);
        let (_, alice) = actor(0x02);
        let (_, bob) = actor(0x03);
        let tid = ThreadId::derive(&root, "test");

        let entries = vec![
            grant(&root_kp, tid, &alice, Capability::Member),
            grant(&root_kp, tid, &bob, Capability::Moderator),
        ];
        let set = CapabilitySet::fold(root.clone(), &entries);

        assert!(set.is_member(&alice));
        assert!(!set.is_moderator(&alice));
        assert!(set.is_moderator(&bob));
        assert_eq!(set.capability_of(&alice), Some(Capability::Member));
        assert_eq!(set.capability_of(&bob), Some(Capability::Moderator));
        assert_eq!(set.capability_of(&actor(0x04).1), None);
    }

    #[test]
    fn test_granted_moderator_can_grant() {
        let (root_kp, root) = actor(0x01);
        let (bob_kp, bob) = actor(0x03);
        let (_, carol) = actor(0x04);
        let tid = ThreadId::derive(&root, "test");

        let entries = vec![
            grant(&root_kp, tid, &bob, Capability::Moderator),
            grant(&bob_kp, tid, &carol, Capability::Member),
        ];
        let set = CapabilitySet::fold(root, &entries);
        assert!(set.is_member(&carol));
    }

    #[test]
    fn test_grant_from_non_moderator_ignored() {
        let (root_kp, root) = actor(0x01);
        let (alice_kp, alice) = actor(0x02);
        let (_, mallory) = actor(0x05);
        let tid = ThreadId::derive(&root, "test");

        // Alice is only a member; her grant must not count.
        let entries = vec![
            grant(&root_kp, tid, &alice, Capability::Member),
            grant(&alice_kp, tid, &mallory, Capability::Moderator),
        ];
        let set = CapabilitySet::fold(root, &entries);
        assert_eq!(set.capability_of(&mallory), None);
    }

    #[test]
    fn test_order_matters_for_authorization() {
        let (root_kp, root) = actor(0x01);
        let (bob_kp, bob) = actor(0x03);
        let (_, carol) = actor(0x04);
        let tid = ThreadId::derive(&root, "test");

        // Bob grants before being a moderator: ignored.
        let early = vec![
            grant(&bob_kp, tid, &carol, Capability::Member),
            grant(&root_kp, tid, &bob, Capability::Moderator),
        ];
        let set = CapabilitySet::fold(root.clone(), &early);
        assert!(!set.is_member(&carol));
        assert!(set.is_moderator(&bob));
    }

    #[test]
    fn test_duplicate_grants_idempotent() {
        let (root_kp, root) = actor(0x01);
        let (_, alice) = actor(0x02);
        let tid = ThreadId::derive(&root, "test");

        let entries = vec![
            grant(&root_kp, tid, &alice, Capability::Member),
            grant(&root_kp, tid, &alice, Capability::Member),
        ];
        let set = CapabilitySet::fold(root, &entries);
        assert_eq!(set.members(), &[alice]);
    }

    #[test]
    fn test_fold_deterministic_across_replicas() {
        let (root_kp, root) = actor(0x01);
        let (_, alice) = actor(0x02);
        let (_, bob) = actor(0x03);
        let tid = ThreadId::derive(&root, "test");

        let entries = vec![
            grant(&root_kp, tid, &alice, Capability::Member),
            grant(&root_kp, tid, &bob, Capability::Moderator),
        ];
        let a = CapabilitySet::fold(root.clone(), &entries);
        let b = CapabilitySet::fold(root, &entries);
        assert_eq!(a, b);
    }

    #[test]
    fn test_malformed_payload_skipped() {
        let (root_kp, root) = actor(0x01);
        let tid = ThreadId::derive(&root, "test");

        let bogus = EntryBuilder::new(tid)
            .timestamp(1_700_000_000_000)
            .kind(EntryKind::Grant)
            .payload(b"garbage".to_vec())
            .sign(&root_kp);

        let set = CapabilitySet::fold(root.clone(), &[bogus]);
        assert_eq!(set, CapabilitySet::genesis(root));
    }

    #[test]
    fn test_cache_refresh_and_snapshot() {
        let (root_kp, root) = actor(0x01);
        let (_, alice) = actor(0x02);
        let tid = ThreadId::derive(&root, "test");
        let cache = CapabilityCache::new(root.clone());

        assert!(!cache.is_member(&alice));
        cache.refresh(&[grant(&root_kp, tid, &alice, Capability::Member)]);
        assert!(cache.is_member(&alice));
        assert!(cache.is_moderator(&root));
    }
}
