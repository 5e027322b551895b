//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! The canonical encoding is critical: it ensures that the same entry
//! produces identical bytes (and thus identical entry ids) across all
//! replicas, which the capability fold depends on.

use ciborium::value::Value;

use crate::entry::{Entry, EntryHeader};

/// Header field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const AUTHOR: u64 = 1;
    pub const AUTHOR_KEY: u64 = 2;
    pub const THREAD_ID: u64 = 3;
    pub const TIMESTAMP: u64 = 4;
    pub const KIND: u64 = 5;
    pub const TARGET: u64 = 6;
    pub const PAYLOAD_HASH: u64 = 7;
}

/// Encode an entry header to canonical CBOR bytes.
pub fn canonical_header_bytes(header: &EntryHeader) -> Vec<u8> {
    let value = header_to_cbor_value(header);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value);
    buf
}

/// Encode an entire entry to canonical bytes.
///
/// Format: canonical_header || payload || signature
pub fn canonical_bytes(entry: &Entry) -> Vec<u8> {
    let mut buf = canonical_header_bytes(&entry.header);
    buf.extend_from_slice(&entry.payload);
    buf.extend_from_slice(&entry.signature.0);
    buf
}

/// Construct the signed message (header || payload).
pub fn signed_message(entry: &Entry) -> Vec<u8> {
    signed_message_from_parts(&entry.header, &entry.payload)
}

/// Construct the signed message from header and payload.
pub fn signed_message_from_parts(header: &EntryHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = canonical_header_bytes(header);
    buf.extend_from_slice(payload);
    buf
}

/// Convert a header to a CBOR Value (map with integer keys).
fn header_to_cbor_value(header: &EntryHeader) -> Value {
    let mut entries = Vec::with_capacity(8);

    entries.push((
        Value::Integer(keys::VERSION.into()),
        Value::Integer(header.version.into()),
    ));
    entries.push((
        Value::Integer(keys::AUTHOR.into()),
        Value::Text(header.author.as_str().to_string()),
    ));
    entries.push((
        Value::Integer(keys::AUTHOR_KEY.into()),
        Value::Bytes(header.author_key.0.to_vec()),
    ));
    entries.push((
        Value::Integer(keys::THREAD_ID.into()),
        Value::Bytes(header.thread_id.0.to_vec()),
    ));
    entries.push((
        Value::Integer(keys::TIMESTAMP.into()),
        Value::Integer(header.timestamp.into()),
    ));
    entries.push((
        Value::Integer(keys::KIND.into()),
        Value::Integer(header.kind.to_u8().into()),
    ));
    let target_value = match &header.target {
        Some(id) => Value::Bytes(id.0.to_vec()),
        None => Value::Null,
    };
    entries.push((Value::Integer(keys::TARGET.into()), target_value));
    entries.push((
        Value::Integer(keys::PAYLOAD_HASH.into()),
        Value::Bytes(header.payload_hash.0.to_vec()),
    ));

    Value::Map(entries)
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => panic!("floats not supported in canonical encoding"),
        _ => panic!("unsupported CBOR value type"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKeypair;
    use crate::did::Did;
    use crate::entry::{EntryBuilder, EntryKind};
    use crate::types::{EntryId, ThreadId};

    fn test_entry(seed: u8, payload: &[u8]) -> Entry {
        let keypair = SigningKeypair::from_seed(&[seed; 32]).unwrap();
        let did = Did::from_signing_key(&keypair.public_key());
        EntryBuilder::new(ThreadId::derive(&did, "canonical-test"))
            .timestamp(1736870400000)
            .payload(payload.to_vec())
            .sign(&keypair)
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let a = canonical_bytes(&test_entry(0x42, b"hello"));
        let b = canonical_bytes(&test_entry(0x42, b"hello"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_bytes_payload_sensitive() {
        let a = canonical_bytes(&test_entry(0x42, b"hello"));
        let b = canonical_bytes(&test_entry(0x42, b"world"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_header_is_cbor_map() {
        let entry = test_entry(0x42, b"hello");
        let bytes = canonical_header_bytes(&entry.header);
        // Map with 8 entries: 0xa8.
        assert_eq!(bytes[0], 0xa8);
    }

    #[test]
    fn test_null_target_encodes() {
        let keypair = SigningKeypair::from_seed(&[0x07; 32]).unwrap();
        let did = Did::from_signing_key(&keypair.public_key());
        let with_target = EntryBuilder::new(ThreadId::derive(&did, "t"))
            .kind(EntryKind::Delete)
            .target(EntryId::from_bytes([0xaa; 32]))
            .sign(&keypair);
        let without = EntryBuilder::new(ThreadId::derive(&did, "t")).sign(&keypair);

        assert_ne!(
            canonical_header_bytes(&with_target.header),
            canonical_header_bytes(&without.header)
        );
    }

    #[test]
    fn test_uint_smallest_encoding() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);
    }
}
