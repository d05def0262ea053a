//! Signed peer handshake: each side proves control of its instance key and
//! rejects a handshake whose timestamp has drifted too far from local time.

use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use forge_primitives::FederationError;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const API_VERSION: &str = "1.0";

/// Accept handshakes whose timestamp is no more than 5 minutes in the past
/// or 30 seconds in the future, bounding tolerable clock skew.
const MAX_PAST_SKEW: i64 = 300;
const MAX_FUTURE_SKEW: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub instance_id: String,
    pub instance_name: String,
    pub api_version: String,
    pub public_key: String,
    pub timestamp: DateTime<Utc>,
    pub supports_push: bool,
    pub supports_pull: bool,
    pub supports_streaming: bool,
    pub suggested_interval_minutes: u32,
    pub max_capsules_per_sync: u32,
    pub signature: String,
}

fn signed_fields(
    instance_id: &str,
    instance_name: &str,
    api_version: &str,
    public_key: &str,
    timestamp: DateTime<Utc>,
) -> serde_json::Value {
    json!({
        "instance_id": instance_id,
        "instance_name": instance_name,
        "api_version": api_version,
        "public_key": public_key,
        "timestamp": timestamp.to_rfc3339(),
    })
}

fn sign_fields(value: &serde_json::Value, signing_key: &SigningKey) -> String {
    let canonical = forge_primitives::to_canonical_json(value).unwrap_or_default();
    let message = String::from_utf8_lossy(&canonical).into_owned();
    forge_crypto::sign(&message, signing_key)
}

pub fn build_handshake(
    instance_id: &str,
    instance_name: &str,
    public_key_b64: &str,
    signing_key: &SigningKey,
) -> Handshake {
    let timestamp = Utc::now();
    let fields = signed_fields(instance_id, instance_name, API_VERSION, public_key_b64, timestamp);
    let signature = sign_fields(&fields, signing_key);

    Handshake {
        instance_id: instance_id.to_string(),
        instance_name: instance_name.to_string(),
        api_version: API_VERSION.to_string(),
        public_key: public_key_b64.to_string(),
        timestamp,
        supports_push: true,
        supports_pull: true,
        supports_streaming: false,
        suggested_interval_minutes: 60,
        max_capsules_per_sync: 1000,
        signature,
    }
}

/// Verifies timestamp freshness and the signature over the reconstructed
/// canonical JSON, using the public key the handshake itself carries.
pub fn verify_handshake(handshake: &Handshake) -> Result<(), FederationError> {
    let now = Utc::now();
    let age = now.signed_duration_since(handshake.timestamp);

    if age > Duration::seconds(MAX_PAST_SKEW) {
        return Err(FederationError::StaleTimestamp("timestamp too old".to_string()));
    }
    if age < Duration::seconds(-MAX_FUTURE_SKEW) {
        return Err(FederationError::StaleTimestamp(
            "timestamp too far in the future".to_string(),
        ));
    }

    let fields = signed_fields(
        &handshake.instance_id,
        &handshake.instance_name,
        &handshake.api_version,
        &handshake.public_key,
        handshake.timestamp,
    );
    let canonical = forge_primitives::to_canonical_json(&fields).unwrap_or_default();
    let message = String::from_utf8_lossy(&canonical).into_owned();

    let public_key_bytes = base64::engine::general_purpose::STANDARD
        .decode(&handshake.public_key)
        .map_err(|e| FederationError::Signature(e.to_string()))?;
    let public_key_bytes: [u8; 32] = public_key_bytes
        .try_into()
        .map_err(|_| FederationError::Signature("public key is not 32 bytes".to_string()))?;
    let public_key = VerifyingKey::from_bytes(&public_key_bytes)
        .map_err(|e| FederationError::Signature(e.to_string()))?;

    if forge_crypto::verify(&message, &handshake.signature, &public_key) {
        Ok(())
    } else {
        Err(FederationError::Signature(
            "handshake signature does not match".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn keypair() -> (SigningKey, String) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key_b64 = BASE64.encode(signing_key.verifying_key().to_bytes());
        (signing_key, public_key_b64)
    }

    #[test]
    fn a_freshly_built_handshake_verifies() {
        let (signing_key, public_key) = keypair();
        let handshake = build_handshake("peer-a", "Peer A", &public_key, &signing_key);
        assert!(verify_handshake(&handshake).is_ok());
    }

    #[test]
    fn tampering_with_the_instance_name_breaks_verification() {
        let (signing_key, public_key) = keypair();
        let mut handshake = build_handshake("peer-a", "Peer A", &public_key, &signing_key);
        handshake.instance_name = "Peer Mallory".to_string();
        assert!(verify_handshake(&handshake).is_err());
    }

    /// Scenario S6 shape: stale timestamps are rejected.
    #[test]
    fn a_stale_timestamp_is_rejected() {
        let (signing_key, public_key) = keypair();
        let mut handshake = build_handshake("peer-a", "Peer A", &public_key, &signing_key);
        handshake.timestamp = Utc::now() - Duration::minutes(10);
        // re-sign so only the freshness check can fail
        let fields = signed_fields(
            &handshake.instance_id,
            &handshake.instance_name,
            &handshake.api_version,
            &handshake.public_key,
            handshake.timestamp,
        );
        handshake.signature = sign_fields(&fields, &signing_key);

        let err = verify_handshake(&handshake).unwrap_err();
        assert_eq!(err.kind(), "StaleTimestamp");
    }

    #[test]
    fn a_timestamp_too_far_in_the_future_is_rejected() {
        let (signing_key, public_key) = keypair();
        let mut handshake = build_handshake("peer-a", "Peer A", &public_key, &signing_key);
        handshake.timestamp = Utc::now() + Duration::minutes(5);
        let fields = signed_fields(
            &handshake.instance_id,
            &handshake.instance_name,
            &handshake.api_version,
            &handshake.public_key,
            handshake.timestamp,
        );
        handshake.signature = sign_fields(&fields, &signing_key);

        let err = verify_handshake(&handshake).unwrap_err();
        assert_eq!(err.kind(), "StaleTimestamp");
    }
}
