//! Integrity Service (spec §4.1): content hashing, Ed25519 sign/verify, and
//! Merkle-root computation/verification for capsule lineage.
//!
//! Signing the hash rather than the raw content keeps signatures
//! size-independent of content length and lets verification happen without
//! transferring full content. All comparisons of hashes/signatures run in
//! constant time to avoid timing oracles on peer-supplied bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use forge_primitives::{Capsule, IntegrityError};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 of UTF-8 content bytes, returned as a lowercase hex string.
pub fn hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)
}

/// Ed25519-sign the hex-encoded content hash's UTF-8 bytes, base64-encoded.
pub fn sign(content_hash: &str, signing_key: &SigningKey) -> String {
    let signature: Signature = signing_key.sign(content_hash.as_bytes());
    BASE64.encode(signature.to_bytes())
}

/// Constant-time verification of a base64 signature over `content_hash`.
pub fn verify(content_hash: &str, signature_b64: &str, public_key: &VerifyingKey) -> bool {
    let Ok(sig_bytes) = BASE64.decode(signature_b64) else {
        return false;
    };
    let Ok(sig_bytes): Result<[u8; 64], _> = sig_bytes.try_into() else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    public_key.verify(content_hash.as_bytes(), &signature).is_ok()
}

/// Root capsules return their own `content_hash`; children return
/// `sha256(content_hash + ":" + parent_merkle_root)`.
pub fn merkle_root(content_hash: &str, parent_merkle_root: Option<&str>) -> String {
    match parent_merkle_root {
        None => content_hash.to_string(),
        Some(parent_root) => {
            let mut hasher = Sha256::new();
            hasher.update(content_hash.as_bytes());
            hasher.update(b":");
            hasher.update(parent_root.as_bytes());
            hex::encode(hasher.finalize())
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Walk an ordered `[root, c1, .., leaf]` chain, recomputing content hash
/// (if a capsule's stored hash looks stale) and the expected Merkle root
/// from the predecessor's stored root, comparing in constant time.
///
/// Returns `(true, None)` if the whole chain verifies, or `(false,
/// Some(first_bad_id))` naming the first capsule whose hash or Merkle root
/// does not match what it should be.
pub fn verify_chain(capsules: &[Capsule]) -> (bool, Option<uuid::Uuid>) {
    let mut expected_parent_root: Option<String> = None;

    for capsule in capsules {
        let recomputed_hash = hash(&capsule.content);
        if !constant_time_eq(&recomputed_hash, &capsule.content_hash) {
            return (false, Some(capsule.id));
        }

        let expected_root = merkle_root(&capsule.content_hash, expected_parent_root.as_deref());
        let stored_root = capsule.merkle_root.as_deref().unwrap_or(&capsule.content_hash);
        if !constant_time_eq(&expected_root, stored_root) {
            return (false, Some(capsule.id));
        }

        expected_parent_root = Some(expected_root);
    }

    (true, None)
}

/// Typed wrapper returning the taxonomy error kinds from spec §4.1/§7
/// instead of bare booleans, for callers that want `?`-propagation.
pub fn verify_chain_checked(capsules: &[Capsule]) -> Result<(), IntegrityError> {
    let (ok, bad_id) = verify_chain(capsules);
    if ok {
        Ok(())
    } else {
        Err(IntegrityError::MerkleChainBroken {
            at: bad_id.map(|id| id.to_string()).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_primitives::CapsuleType;
    use rand::rngs::OsRng;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn make_capsule(content: &str, parent_merkle_root: Option<&str>) -> Capsule {
        let content_hash = hash(content);
        let root = merkle_root(&content_hash, parent_merkle_root);
        Capsule {
            id: Uuid::new_v4(),
            content_hash,
            signature: None,
            merkle_root: Some(root),
            title: "t".into(),
            content: content.into(),
            content_type: "text/plain".into(),
            capsule_type: CapsuleType::Fact,
            tags: BTreeSet::new(),
            trust_level: 50,
            parent_ids: Vec::new(),
            parent_merkle_root: parent_merkle_root.map(str::to_string),
            embedding: None,
            created_by: "tester".into(),
            created_at: Utc::now(),
            updated_at: None,
            version: 1,
        }
    }

    #[test]
    fn integrity_round_trip() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let content_hash = hash("hello forge");
        let signature = sign(&content_hash, &signing_key);
        assert!(verify(&content_hash, &signature, &verifying_key));
    }

    #[test]
    fn tampering_with_signature_fails_verification() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let other_key = SigningKey::generate(&mut OsRng);
        let content_hash = hash("hello forge");
        let signature = sign(&content_hash, &signing_key);
        assert!(!verify(&content_hash, &signature, &other_key.verifying_key()));
    }

    #[test]
    fn merkle_chain_verifies_when_untampered() {
        let root = make_capsule("root content", None);
        let root_merkle = root.merkle_root.clone().unwrap();
        let child = make_capsule("child content", Some(&root_merkle));
        let child_merkle = child.merkle_root.clone().unwrap();
        let grandchild = make_capsule("grandchild content", Some(&child_merkle));

        let (ok, bad) = verify_chain(&[root, child, grandchild]);
        assert!(ok);
        assert_eq!(bad, None);
    }

    /// Scenario S3: mutating `child.content` post-creation is detected at
    /// exactly the mutated capsule.
    #[test]
    fn merkle_chain_tamper_detected_at_mutated_capsule() {
        let root = make_capsule("root content", None);
        let root_merkle = root.merkle_root.clone().unwrap();
        let mut child = make_capsule("child content", Some(&root_merkle));
        let child_merkle = child.merkle_root.clone().unwrap();
        let grandchild = make_capsule("grandchild content", Some(&child_merkle));

        child.content = "tampered content".into();
        let child_id = child.id;

        let (ok, bad) = verify_chain(&[root, child, grandchild]);
        assert!(!ok);
        assert_eq!(bad, Some(child_id));
    }
}
