//! # Weft Access
//!
//! Capability-based access control over thread logs, plus confidential
//! thread key distribution.
//!
//! ## Model
//!
//! Every thread has a companion capability log holding only `Grant`
//! entries. The thread's member and moderator sets are a deterministic fold
//! over that log (see [`CapabilitySet::fold`]): the root moderator is a
//! moderator from birth, grants add and never remove, and only moderators'
//! grants count. Because the fold is pure, every replica that has the same
//! grants computes the same sets.
//!
//! Two [`AppendGuard`](weft_log::AppendGuard) implementations enforce the
//! model at append time: [`ModeratorGuard`] on the capability log and
//! [`ThreadGuard`] on the content log.
//!
//! ## Confidential threads
//!
//! A confidential thread has one symmetric [`ThreadKey`]. Each grant to a
//! member carries the key wrapped to that member's box key
//! ([`WrappedKey`]), so the key rides the same replication channel as the
//! grant itself. A member who cannot find their wrap yet is experiencing
//! replication lag, not denial; [`await_own_key`] encodes that distinction.

pub mod capability;
pub mod error;
pub mod fold;
pub mod guard;
pub mod keywrap;
pub mod recovery;
pub mod watch;

pub use capability::{Capability, GrantPayload};
pub use error::{AccessError, Result};
pub use fold::{CapabilityCache, CapabilitySet};
pub use guard::{can_delete, ModeratorGuard, ThreadGuard};
pub use keywrap::{EncKeyId, ThreadKey, WrappedKey};
pub use recovery::{await_own_key, find_wrapped_key};
pub use watch::CapabilityWatch;
