//! Append guards: capability enforcement at the log boundary.
//!
//! [`ModeratorGuard`] gates the capability log, [`ThreadGuard`] gates the
//! content log. Both are pure functions of the candidate entry and the
//! log snapshot (plus, for the content log, the capability fold), so every
//! converged replica makes the same admission decisions.

use std::sync::Arc;

use weft_core::{Did, Entry, EntryKind};
use weft_log::AppendGuard;

use crate::capability::GrantPayload;
use crate::fold::{CapabilityCache, CapabilitySet};

/// Whether `deleter` may delete an entry authored by `target_author`.
///
/// The rules, in order:
/// 1. Anyone may delete their own entry.
/// 2. A moderator's entries cannot be deleted by anyone else, moderators
///    included.
/// 3. A moderator may delete a non-moderator's entry.
pub fn can_delete(deleter: &Did, target_author: &Did, caps: &CapabilitySet) -> bool {
    if deleter == target_author {
        return true;
    }
    if caps.is_moderator(target_author) {
        return false;
    }
    caps.is_moderator(deleter)
}

/// Guard for a capability log.
///
/// Admits only `Grant` entries, and only from identities that are already
/// moderators in the fold of the log so far. The root moderator is a
/// moderator from genesis, which is what bootstraps the first grant.
pub struct ModeratorGuard {
    root: Did,
}

impl ModeratorGuard {
    /// Guard a capability log rooted at `root`.
    pub fn new(root: Did) -> Self {
        Self { root }
    }
}

impl AppendGuard for ModeratorGuard {
    fn can_append(&self, candidate: &Entry, existing: &[Entry]) -> bool {
        if candidate.kind() != EntryKind::Grant {
            return false;
        }
        if GrantPayload::from_bytes(&candidate.payload).is_err() {
            return false;
        }
        let caps = CapabilitySet::fold(self.root.clone(), existing);
        caps.is_moderator(candidate.author())
    }
}

/// Guard for a content log.
///
/// Consults the capability fold of the companion capability log through a
/// shared [`CapabilityCache`]. An open thread admits posts from anyone; a
/// members-only thread requires the member capability. Deletes follow
/// [`can_delete`] against the target resolved in the snapshot.
pub struct ThreadGuard {
    cache: Arc<CapabilityCache>,
    members_only: bool,
}

impl ThreadGuard {
    /// Guard a content log against a shared capability view.
    pub fn new(cache: Arc<CapabilityCache>, members_only: bool) -> Self {
        Self {
            cache,
            members_only,
        }
    }
}

impl AppendGuard for ThreadGuard {
    fn can_append(&self, candidate: &Entry, existing: &[Entry]) -> bool {
        match candidate.kind() {
            EntryKind::Post => {
                !self.members_only || self.cache.is_member(candidate.author())
            }
            EntryKind::Delete => {
                // An unknown target cannot be authorized.
                let Some(target_id) = candidate.deleted_target() else {
                    return false;
                };
                let Some(target) = existing
                    .iter()
                    .find(|e| &e.compute_id() == target_id)
                else {
                    return false;
                };
                can_delete(
                    candidate.author(),
                    target.author(),
                    &self.cache.snapshot(),
                )
            }
            // Grants belong on the capability log.
            EntryKind::Grant => false,
        }
    }
}
