//! Cache key fingerprinting: query kind + normalized parameters + user trust
//! level, hashed. Also the key-segment sanitizer used for the
//! `forge:capsule:{id}` / `forge:lineage:{id}:{depth}` /
//! `forge:search:{query_hash}` key patterns.

use forge_primitives::to_canonical_json;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash `query_type:trust:canonical(params)` to a hex fingerprint.
pub fn fingerprint(query_type: &str, params: &Value, user_trust: u8) -> String {
    let canonical = to_canonical_json(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(query_type.as_bytes());
    hasher.update(b":trust:");
    hasher.update(user_trust.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 128
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// Any key segment not matching `[A-Za-z0-9._-]{1,128}` is replaced with
/// `sanitized_<sha256 first 32 chars>`.
pub fn sanitize_key_segment(segment: &str) -> String {
    if is_valid_segment(segment) {
        segment.to_string()
    } else {
        let digest = Sha256::digest(segment.as_bytes());
        format!("sanitized_{}", &hex::encode(digest)[..32])
    }
}

/// Build a cache key from pre-sanitized segments joined with `:`, prefixed
/// `forge:<kind>:`.
pub fn cache_key(kind: &str, segments: &[&str]) -> String {
    let mut key = format!("forge:{kind}");
    for segment in segments {
        key.push(':');
        key.push_str(&sanitize_key_segment(segment));
    }
    key
}
