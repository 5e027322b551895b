//! # Weft Testkit
//!
//! Testing utilities for the Weft workspace.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Participants and pre-wired thread replicas for
//!   integration tests
//! - **Generators**: Proptest strategies for property-based testing of
//!   entries and the capability fold
//!
//! ## Test Fixtures
//!
//! Quickly set up multi-party scenarios:
//!
//! ```rust,ignore
//! use weft::ThreadConfig;
//! use weft_testkit::fixtures::{participants, thread_with_members};
//!
//! let people = participants(3);
//! let thread =
//!     thread_with_members("standup", ThreadConfig::members_only(), &people[0], &[&people[1]])
//!         .await;
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use weft_access::CapabilitySet;
//! use weft_core::{Did, ThreadId};
//! use weft_testkit::generators::{grant_entries, grant_script, keypair_pool};
//!
//! proptest! {
//!     #[test]
//!     fn fold_is_deterministic(script in proptest::collection::vec(grant_script(4), 0..16)) {
//!         let pool = keypair_pool(4);
//!         let root = Did::from_signing_key(&pool[0].public_key());
//!         let entries = grant_entries(&pool, &script, ThreadId::derive(&root, "t#caps"));
//!         let a = CapabilitySet::fold(root.clone(), &entries);
//!         let b = CapabilitySet::fold(root, &entries);
//!         prop_assert_eq!(a.moderators(), b.moderators());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{participants, replica_of, thread_with_members, Participant};
pub use generators::{grant_entries, keypair_pool, GrantScript};
