//! Proptest generators for property-based testing.

use proptest::prelude::*;

use weft_access::{Capability, GrantPayload};
use weft_core::{Did, Entry, EntryBuilder, EntryId, EntryKind, SigningKeypair, ThreadId};

/// Generate a random signing keypair.
pub fn keypair() -> impl Strategy<Value = SigningKeypair> {
    any::<[u8; 32]>().prop_filter_map("seed must derive a valid scalar", |seed| {
        SigningKeypair::from_seed(&seed).ok()
    })
}

/// Generate a random identity reference.
pub fn did() -> impl Strategy<Value = Did> {
    keypair().prop_map(|kp| Did::from_signing_key(&kp.public_key()))
}

/// Generate a random EntryId.
pub fn entry_id() -> impl Strategy<Value = EntryId> {
    any::<[u8; 32]>().prop_map(EntryId::from_bytes)
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}

/// Generate a capability.
pub fn capability() -> impl Strategy<Value = Capability> {
    prop_oneof![Just(Capability::Member), Just(Capability::Moderator)]
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a thread name.
pub fn thread_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,31}".prop_map(String::from)
}

/// One scripted grant, as indices into a keypair pool.
///
/// Scripts stay index-based so the same script can be realized against any
/// pool; index 0 is always the root moderator.
#[derive(Debug, Clone)]
pub struct GrantScript {
    pub author: usize,
    pub subject: usize,
    pub capability: Capability,
}

/// Generate one grant script over a pool of `pool` identities.
pub fn grant_script(pool: usize) -> impl Strategy<Value = GrantScript> {
    (0..pool, 0..pool, capability()).prop_map(|(author, subject, capability)| GrantScript {
        author,
        subject,
        capability,
    })
}

impl Arbitrary for GrantScript {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        grant_script(4).boxed()
    }
}

/// A deterministic keypair pool; index 0 is the root moderator.
pub fn keypair_pool(count: usize) -> Vec<SigningKeypair> {
    (0..count)
        .map(|i| {
            let mut seed = [0x5e; 32];
            seed[0] = i as u8;
            SigningKeypair::from_seed(&seed).expect("pool seed derives a valid scalar")
        })
        .collect()
}

/// Realize a grant script as signed capability-log entries.
pub fn grant_entries(
    pool: &[SigningKeypair],
    script: &[GrantScript],
    cap_thread_id: ThreadId,
) -> Vec<Entry> {
    script
        .iter()
        .enumerate()
        .map(|(i, grant)| {
            let subject = Did::from_signing_key(&pool[grant.subject].public_key());
            let payload = GrantPayload::new(subject, grant.capability);
            EntryBuilder::new(cap_thread_id)
                .timestamp(i as i64)
                .kind(EntryKind::Grant)
                .payload(payload.to_bytes())
                .sign(&pool[grant.author])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_access::CapabilitySet;

    fn pool_and_root() -> (Vec<SigningKeypair>, Did, ThreadId) {
        let pool = keypair_pool(4);
        let root = Did::from_signing_key(&pool[0].public_key());
        let cap_thread_id = ThreadId::derive(&root, "prop#caps");
        (pool, root, cap_thread_id)
    }

    proptest! {
        #[test]
        fn prop_fold_is_deterministic(
            script in prop::collection::vec(grant_script(4), 0..16)
        ) {
            let (pool, root, cap_thread_id) = pool_and_root();
            let entries = grant_entries(&pool, &script, cap_thread_id);

            let a = CapabilitySet::fold(root.clone(), &entries);
            let b = CapabilitySet::fold(root, &entries);
            prop_assert_eq!(a.moderators(), b.moderators());
            prop_assert_eq!(a.members(), b.members());
        }

        #[test]
        fn prop_fold_only_grows(
            script in prop::collection::vec(grant_script(4), 0..16)
        ) {
            let (pool, root, cap_thread_id) = pool_and_root();
            let entries = grant_entries(&pool, &script, cap_thread_id);

            let mut set = CapabilitySet::genesis(root);
            for entry in &entries {
                let moderators_before = set.moderators().to_vec();
                let members_before = set.members().to_vec();
                set.apply(entry);
                for did in &moderators_before {
                    prop_assert!(set.is_moderator(did));
                }
                for did in &members_before {
                    prop_assert!(set.is_member(did));
                }
            }
        }

        #[test]
        fn prop_root_is_always_moderator(
            script in prop::collection::vec(grant_script(4), 0..16)
        ) {
            let (pool, root, cap_thread_id) = pool_and_root();
            let entries = grant_entries(&pool, &script, cap_thread_id);

            let set = CapabilitySet::fold(root.clone(), &entries);
            prop_assert!(set.is_moderator(&root));
        }

        #[test]
        fn prop_moderators_are_members(
            script in prop::collection::vec(grant_script(4), 0..16)
        ) {
            let (pool, root, cap_thread_id) = pool_and_root();
            let entries = grant_entries(&pool, &script, cap_thread_id);

            let set = CapabilitySet::fold(root, &entries);
            for moderator in set.moderators() {
                prop_assert!(set.is_member(moderator));
            }
        }

        #[test]
        fn prop_generated_grants_validate(
            script in prop::collection::vec(grant_script(4), 1..8)
        ) {
            let (pool, _root, cap_thread_id) = pool_and_root();
            for entry in grant_entries(&pool, &script, cap_thread_id) {
                prop_assert!(weft_core::validate_entry(&entry).is_ok());
                prop_assert!(GrantPayload::from_bytes(&entry.payload).is_ok());
            }
        }
    }
}
