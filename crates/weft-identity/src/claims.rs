//! Compact signed claims.
//!
//! A claim is three base64url segments joined by dots, in the style of a
//! compact JWS: `b64(header).b64(payload).b64(signature)`. The header is
//! fixed (`{"alg":"ES256K","typ":"JWT"}`), the payload is JSON, and the
//! signature covers the first two segments exactly as transmitted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use weft_core::{Did, SecpPublicKey, Signature};

use crate::error::{IdentityError, Result};
use crate::keyring::Keyring;

const HEADER_JSON: &str = r#"{"alg":"ES256K","typ":"JWT"}"#;

/// The signed body of a claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimPayload {
    /// Issuer identity reference.
    pub iss: Did,
    /// Issued-at, seconds since the epoch.
    pub iat: u64,
    /// Optional expiry, seconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Application data, carried verbatim.
    #[serde(flatten)]
    pub data: Value,
}

/// Options for issuing a claim.
#[derive(Debug, Clone, Default)]
pub struct ClaimOptions {
    /// Lifetime in seconds; `None` means the claim never expires.
    pub expires_in: Option<u64>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Issue a claim over `data`, signed by `keyring`.
pub fn sign_claim(keyring: &Keyring, data: Value, options: &ClaimOptions) -> Result<String> {
    let iat = unix_now();
    let payload = ClaimPayload {
        iss: keyring.did().clone(),
        iat,
        exp: options.expires_in.map(|s| iat + s),
        data,
    };
    let payload_json = serde_json::to_vec(&payload)
        .map_err(|e| IdentityError::ClaimInvalid(e.to_string()))?;

    let header_b64 = URL_SAFE_NO_PAD.encode(HEADER_JSON.as_bytes());
    let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);
    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature = keyring.sign(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature.as_bytes());

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify a claim against the issuer's signing key.
///
/// Checks the signature over the exact transmitted segments, that the key
/// matches the payload's `iss`, and that any expiry has not passed.
pub fn verify_claim(claim: &str, signer: &SecpPublicKey) -> Result<ClaimPayload> {
    let mut parts = claim.split('.');
    let (header_b64, payload_b64, signature_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => {
                return Err(IdentityError::ClaimInvalid(
                    "expected three dot-separated segments".to_string(),
                ))
            }
        };

    let header = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| IdentityError::ClaimInvalid("header not base64url".to_string()))?;
    let header: Value = serde_json::from_slice(&header)
        .map_err(|_| IdentityError::ClaimInvalid("header not JSON".to_string()))?;
    if header.get("alg").and_then(Value::as_str) != Some("ES256K") {
        return Err(IdentityError::ClaimInvalid("unsupported alg".to_string()));
    }

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| IdentityError::ClaimInvalid("signature not base64url".to_string()))?;
    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| IdentityError::ClaimInvalid("signature must be 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(signature_bytes);

    let signing_input = format!("{header_b64}.{payload_b64}");
    signer
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| IdentityError::ClaimInvalid("signature verification failed".to_string()))?;

    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| IdentityError::ClaimInvalid("payload not base64url".to_string()))?;
    let payload: ClaimPayload = serde_json::from_slice(&payload_json)
        .map_err(|e| IdentityError::ClaimInvalid(format!("payload: {e}")))?;

    if payload.iss != Did::from_signing_key(signer) {
        return Err(IdentityError::ClaimInvalid(
            "issuer does not match signing key".to_string(),
        ));
    }
    if let Some(exp) = payload.exp {
        if unix_now() >= exp {
            return Err(IdentityError::ClaimExpired);
        }
    }

    Ok(payload)
}
