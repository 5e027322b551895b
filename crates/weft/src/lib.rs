//! # Weft
//!
//! One root cryptographic identity, per-space sub-identities, and
//! capability-gated collaborative thread logs.
//!
//! ## The pieces
//!
//! - [`weft_identity::IdentityManager`] derives every key an identity will
//!   ever use from one 32-byte seed, including per-space sub-identities
//!   gated by consent.
//! - [`Thread`] is a session on one append-only thread log plus its
//!   companion capability log. Who may post, delete, and grant is a
//!   deterministic fold over the capability log, enforced at append time
//!   on every replica.
//! - Confidential threads seal posts under a shared symmetric key that
//!   travels wrapped inside the grants themselves.
//!
//! ## A round trip
//!
//! ```no_run
//! use std::sync::Arc;
//! use weft::{Capability, Thread, ThreadConfig};
//! use weft_identity::{Keyring, LocalKeyProvider, Seed};
//!
//! # async fn demo() -> Result<(), weft::ThreadError> {
//! let alice = Keyring::derive(&Seed::generate())?;
//! let provider = Arc::new(LocalKeyProvider::new(alice));
//!
//! let thread = Thread::create("general", ThreadConfig::open(), provider).await?;
//! let id = thread.post(b"hello").await?;
//! thread.delete(id).await?;
//! assert!(thread.messages().await?.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod thread;

pub use config::ThreadConfig;
pub use error::{Result, ThreadError};
pub use thread::{Message, Thread};

pub use weft_access::{AccessError, Capability, CapabilitySet, CapabilityWatch};
pub use weft_core::{Did, Entry, EntryId, ThreadId};
pub use weft_identity::{IdentityConfig, IdentityError, IdentityManager};
