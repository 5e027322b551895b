//! Entry validation: signature verification and structural checks.

use crate::canonical::signed_message;
use crate::crypto::Blake3Hash;
use crate::did::Did;
use crate::entry::{Entry, EntryKind, ENTRY_VERSION};
use crate::error::ValidationError;

/// Validate an entry's structure and signature.
///
/// This performs:
/// - Version check
/// - Payload hash verification
/// - Author DID / signing key consistency
/// - Delete-target structural rules
/// - Signature verification
///
/// It does not check log context (ordering, authorization); that is the
/// append guard's job.
pub fn validate_entry(entry: &Entry) -> Result<(), ValidationError> {
    if entry.header.version != ENTRY_VERSION {
        return Err(ValidationError::UnsupportedVersion(entry.header.version));
    }

    let computed_hash = Blake3Hash::hash(&entry.payload);
    if computed_hash != entry.header.payload_hash {
        return Err(ValidationError::PayloadHashMismatch);
    }

    // The author field must be the DID of the signing key, otherwise an
    // entry could impersonate another identity with a valid signature.
    if Did::from_signing_key(&entry.header.author_key) != entry.header.author {
        return Err(ValidationError::AuthorMismatch);
    }

    match entry.header.kind {
        EntryKind::Delete => {
            if entry.header.target.is_none() {
                return Err(ValidationError::DeleteMissingTarget);
            }
        }
        _ => {
            if entry.header.target.is_some() {
                return Err(ValidationError::UnexpectedTarget);
            }
        }
    }

    let message = signed_message(entry);
    entry
        .header
        .author_key
        .verify(&message, &entry.signature)
        .map_err(|_| ValidationError::SignatureFailed)?;

    Ok(())
}
