//! Thread key recovery from the capability log.
//!
//! A member recovers the thread key by finding a grant addressed to them
//! that carries a wrap, and unwrapping it with their own box key. The wrap
//! may not have replicated yet when the member first looks; that is lag,
//! not denial, so [`await_own_key`] watches the log for a bounded window
//! before concluding [`AccessError::NoAccess`].

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use weft_core::{Did, Entry, EntryKind, ThreadId};
use weft_identity::KeyProvider;
use weft_log::{EntryLog, LogEvent};

use crate::capability::GrantPayload;
use crate::error::{AccessError, Result};
use crate::keywrap::{EncKeyId, ThreadKey, WrappedKey};

/// Find the latest key wrap addressed to `subject` in a capability log
/// snapshot.
///
/// Later wraps supersede earlier ones, so a re-grant with a fresh wrap is
/// picked up naturally.
pub fn find_wrapped_key(entries: &[Entry], subject: &Did) -> Option<(WrappedKey, EncKeyId)> {
    entries
        .iter()
        .filter(|e| e.kind() == EntryKind::Grant)
        .filter_map(|e| GrantPayload::from_bytes(&e.payload).ok())
        .filter(|p| &p.subject == subject)
        .filter_map(|p| {
            let wrapped = p.wrapped_key?;
            let key_id = p.enc_key_id.unwrap_or_else(|| EncKeyId::derive(&wrapped));
            Some((wrapped, key_id))
        })
        .last()
}

async fn try_recover(
    cap_log: &dyn EntryLog,
    content_thread: &ThreadId,
    provider: &dyn KeyProvider,
) -> Result<Option<ThreadKey>> {
    let entries = cap_log.entries().await?;
    match find_wrapped_key(&entries, provider.did()) {
        Some((wrapped, key_id)) => {
            debug!(key_id = %key_id.to_hex(), "found key wrap, unwrapping");
            wrapped.unwrap_with(provider, content_thread).await
        }
        None => Ok(None),
    }
}

/// Recover the thread key for `provider`'s identity, waiting up to `wait`
/// for the wrap to arrive over replication.
///
/// Checks the log immediately, then watches for new grants. Only after the
/// window closes without a usable wrap is the caller told
/// [`AccessError::NoAccess`]; a reader who was never granted anything ends
/// up here too, which is exactly the indistinguishability the model wants.
pub async fn await_own_key(
    cap_log: &dyn EntryLog,
    content_thread: &ThreadId,
    provider: &dyn KeyProvider,
    wait: Duration,
) -> Result<ThreadKey> {
    // Subscribe before the first scan so an append between the two is not
    // missed.
    let mut events = cap_log.subscribe();

    if let Some(key) = try_recover(cap_log, content_thread, provider).await? {
        return Ok(key);
    }

    let watched = tokio::time::timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(LogEvent::Appended { entry, .. }) => {
                    if entry.kind() != EntryKind::Grant {
                        continue;
                    }
                    if let Some(key) = try_recover(cap_log, content_thread, provider).await? {
                        return Ok(key);
                    }
                }
                Ok(LogEvent::Replicated { .. }) => {
                    if let Some(key) = try_recover(cap_log, content_thread, provider).await? {
                        return Ok(key);
                    }
                }
                Err(RecvError::Lagged(_)) => {
                    if let Some(key) = try_recover(cap_log, content_thread, provider).await? {
                        return Ok(key);
                    }
                }
                Err(RecvError::Closed) => return Err(AccessError::NoAccess),
            }
        }
    })
    .await;

    match watched {
        Ok(result) => result,
        Err(_elapsed) => Err(AccessError::NoAccess),
    }
}
