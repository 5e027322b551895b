//! Entry: the atomic unit of a thread log.
//!
//! An entry is an immutable, signed record. Once created it cannot be
//! edited; deletion is expressed as a new entry of kind [`EntryKind::Delete`]
//! that names its target.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_bytes, signed_message_from_parts};
use crate::crypto::{Blake3Hash, SecpPublicKey, Signature, SigningKeypair};
use crate::did::Did;
use crate::types::{EntryId, ThreadId};

/// The current entry schema version.
pub const ENTRY_VERSION: u8 = 0;

/// The kind of entry, determining how the payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// A thread message (payload may be an encrypted envelope).
    Post = 1,
    /// Marks a previous entry as deleted; carries the target entry id.
    Delete = 2,
    /// A capability grant on the access-control log.
    Grant = 3,
}

impl EntryKind {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Post),
            2 => Some(Self::Delete),
            3 => Some(Self::Grant),
            _ => None,
        }
    }
}

/// The header of an entry, containing all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    /// Schema version (currently 0).
    pub version: u8,

    /// The author's identity reference.
    pub author: Did,

    /// The author's signing key; must derive to `author`.
    pub author_key: SecpPublicKey,

    /// The thread this entry belongs to.
    pub thread_id: ThreadId,

    /// Author-claimed timestamp (Unix milliseconds). Untrusted.
    pub timestamp: i64,

    /// The kind of entry.
    pub kind: EntryKind,

    /// Target entry for Delete entries; None otherwise.
    pub target: Option<EntryId>,

    /// Blake3 hash of the payload bytes.
    pub payload_hash: Blake3Hash,
}

/// A complete entry: header + payload + signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The entry header.
    pub header: EntryHeader,

    /// The payload bytes (may be an encrypted envelope).
    pub payload: Bytes,

    /// ECDSA signature over (canonical_header || payload).
    pub signature: Signature,
}

impl Entry {
    /// Compute the entry ID (Blake3 hash of canonical bytes).
    pub fn compute_id(&self) -> EntryId {
        let bytes = canonical_bytes(self);
        EntryId(Blake3Hash::hash(&bytes).0)
    }

    /// Get the author's identity reference.
    pub fn author(&self) -> &Did {
        &self.header.author
    }

    /// Get the thread ID.
    pub fn thread_id(&self) -> &ThreadId {
        &self.header.thread_id
    }

    /// Get the entry kind.
    pub fn kind(&self) -> EntryKind {
        self.header.kind
    }

    /// Check if this is a delete entry.
    pub fn is_delete(&self) -> bool {
        self.header.kind == EntryKind::Delete
    }

    /// Get the deleted entry ID (if this is a delete).
    pub fn deleted_target(&self) -> Option<&EntryId> {
        if self.is_delete() {
            self.header.target.as_ref()
        } else {
            None
        }
    }
}

/// Builder for creating signed entries.
pub struct EntryBuilder {
    thread_id: ThreadId,
    timestamp: i64,
    kind: EntryKind,
    target: Option<EntryId>,
    payload: Bytes,
}

impl EntryBuilder {
    /// Start building an entry for a thread.
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            timestamp: 0,
            kind: EntryKind::Post,
            target: None,
            payload: Bytes::new(),
        }
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the kind.
    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the delete target.
    pub fn target(mut self, target: EntryId) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the payload.
    pub fn payload(mut self, p: impl Into<Bytes>) -> Self {
        self.payload = p.into();
        self
    }

    /// Build and sign the entry. The author DID is derived from the keypair.
    pub fn sign(self, keypair: &SigningKeypair) -> Entry {
        let prepared = self.prepare(keypair.public_key());
        let signature = keypair.sign(&prepared.signing_message());
        prepared.into_entry(signature)
    }

    /// Fix the header for an author key without signing yet.
    ///
    /// Used when the signature comes from elsewhere (a delegated signer).
    /// The caller signs [`PreparedEntry::signing_message`] and finishes with
    /// [`PreparedEntry::into_entry`].
    pub fn prepare(self, author_key: SecpPublicKey) -> PreparedEntry {
        let author = Did::from_signing_key(&author_key);
        let payload_hash = Blake3Hash::hash(&self.payload);

        let header = EntryHeader {
            version: ENTRY_VERSION,
            author,
            author_key,
            thread_id: self.thread_id,
            timestamp: self.timestamp,
            kind: self.kind,
            target: self.target,
            payload_hash,
        };

        PreparedEntry {
            header,
            payload: self.payload,
        }
    }
}

/// An entry with its header fixed, awaiting an external signature.
pub struct PreparedEntry {
    header: EntryHeader,
    payload: Bytes,
}

impl PreparedEntry {
    /// The exact bytes the signature must cover.
    pub fn signing_message(&self) -> Vec<u8> {
        signed_message_from_parts(&self.header, &self.payload)
    }

    /// Attach the signature. The result only validates if the signature
    /// covers [`Self::signing_message`] under the prepared author key.
    pub fn into_entry(self, signature: Signature) -> Entry {
        Entry {
            header: self.header,
            payload: self.payload,
            signature,
        }
    }
}
