//! # Weft Log
//!
//! Append-only thread logs.
//!
//! A log holds the entries of exactly one thread, in arrival order. Appends
//! pass through two gates: structural validation (signature, hashes, author
//! consistency) and an [`AppendGuard`] that decides whether this author may
//! write this kind of entry given the log's current contents. The guard is
//! injected, so the log itself knows nothing about capabilities.
//!
//! Nothing is ever removed. Deletion is a `Delete` entry appended on top,
//! interpreted by readers.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{LogError, Result};
pub use memory::MemoryLog;
pub use traits::{AppendGuard, AppendOutcome, EntryLog, LogEvent, OpenGuard};
