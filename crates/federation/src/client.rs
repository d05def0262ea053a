//! Federation transport seam + the protocol orchestration that drives it:
//! handshake exchange, paginated pull, push, health probing.

use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::{SigningKey, VerifyingKey};
use forge_primitives::{Capsule, Deletion, FederationError, Peer, PeerStatus, SemanticEdge, SyncPayload};
use serde::{Deserialize, Serialize};

use crate::handshake::{self, Handshake};
use crate::health::{classify_health, ProbeOutcome};
use crate::sync;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChangesRequest {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub capsule_types: Option<Vec<String>>,
    pub limit: usize,
    pub cursor: Option<String>,
}

/// The network seam: a real implementation wraps `reqwest` calls to a
/// peer's `/api/v1/federation/*` routes. Kept as a trait so the protocol
/// logic above can be exercised against a stub in tests.
#[async_trait]
pub trait FederationTransport: Send + Sync {
    async fn post_handshake(&self, peer_url: &str, handshake: &Handshake) -> Result<Handshake, String>;
    async fn get_health(&self, peer_url: &str) -> Result<ProbeOutcome, String>;
    async fn get_changes(&self, peer_url: &str, request: &ChangesRequest) -> Result<SyncPayload, String>;
    async fn push_sync(&self, peer_url: &str, payload: &SyncPayload) -> Result<(), String>;
}

/// Real HTTP transport over `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FederationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FederationError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FederationTransport for HttpTransport {
    async fn post_handshake(&self, peer_url: &str, handshake: &Handshake) -> Result<Handshake, String> {
        let response = self
            .client
            .post(format!("{peer_url}/api/v1/federation/handshake"))
            .json(handshake)
            .timeout(HANDSHAKE_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json::<Handshake>()
            .await
            .map_err(|e| e.to_string())
    }

    async fn get_health(&self, peer_url: &str) -> Result<ProbeOutcome, String> {
        match self
            .client
            .get(format!("{peer_url}/api/v1/federation/health"))
            .send()
            .await
        {
            Ok(response) => Ok(ProbeOutcome::Status(response.status().as_u16())),
            Err(e) if e.is_timeout() => Ok(ProbeOutcome::Timeout),
            Err(_) => Ok(ProbeOutcome::ConnectError),
        }
    }

    async fn get_changes(&self, peer_url: &str, request: &ChangesRequest) -> Result<SyncPayload, String> {
        let response = self
            .client
            .get(format!("{peer_url}/api/v1/federation/changes"))
            .query(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json::<SyncPayload>()
            .await
            .map_err(|e| e.to_string())
    }

    async fn push_sync(&self, peer_url: &str, payload: &SyncPayload) -> Result<(), String> {
        self.client
            .post(format!("{peer_url}/api/v1/federation/incoming/capsules"))
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Drives the federation protocol for this instance: builds/verifies
/// handshakes, signs/verifies sync payloads, and classifies peer health.
pub struct FederationClient<T: FederationTransport> {
    instance_id: String,
    instance_name: String,
    signing_key: SigningKey,
    public_key_b64: String,
    transport: T,
}

impl<T: FederationTransport> FederationClient<T> {
    pub fn new(instance_id: String, instance_name: String, signing_key: SigningKey, transport: T) -> Self {
        use base64::Engine as _;
        let public_key_b64 =
            base64::engine::general_purpose::STANDARD.encode(signing_key.verifying_key().to_bytes());
        Self {
            instance_id,
            instance_name,
            signing_key,
            public_key_b64,
            transport,
        }
    }

    fn our_handshake(&self) -> Handshake {
        handshake::build_handshake(
            &self.instance_id,
            &self.instance_name,
            &self.public_key_b64,
            &self.signing_key,
        )
    }

    /// Sends our handshake and verifies the peer's in return, mirroring
    /// the original's `initiate_handshake`.
    pub async fn initiate_handshake(&self, peer_url: &str) -> Result<Handshake, FederationError> {
        let ours = self.our_handshake();
        let theirs = self
            .transport
            .post_handshake(peer_url, &ours)
            .await
            .map_err(FederationError::Handshake)?;
        handshake::verify_handshake(&theirs)?;
        Ok(theirs)
    }

    pub async fn check_peer_health(&self, peer_url: &str) -> PeerStatus {
        match self.transport.get_health(peer_url).await {
            Ok(outcome) => classify_health(outcome),
            Err(_) => PeerStatus::Offline,
        }
    }

    /// Pulls one page of changes and verifies the signed payload against
    /// the peer's known public key.
    pub async fn pull_changes(
        &self,
        peer: &Peer,
        request: &ChangesRequest,
    ) -> Result<SyncPayload, FederationError> {
        let payload = self
            .transport
            .get_changes(&peer.url, request)
            .await
            .map_err(FederationError::Handshake)?;
        let public_key = decode_public_key(&peer.public_key)?;
        if !sync::verify_sync_payload(&payload, &public_key) {
            return Err(FederationError::Signature(
                "sync payload signature or content hash mismatch".to_string(),
            ));
        }
        Ok(payload)
    }

    /// Follows `has_more`/`next_cursor` until the peer reports no more
    /// pages, accumulating every verified payload (supplemented behavior:
    /// the original protocol exposes a single page per call).
    pub async fn pull_all_changes(
        &self,
        peer: &Peer,
        mut request: ChangesRequest,
    ) -> Result<Vec<SyncPayload>, FederationError> {
        let mut pages = Vec::new();
        loop {
            let payload = self.pull_changes(peer, &request).await?;
            let has_more = payload.has_more;
            let next_cursor = payload.next_cursor.clone();
            pages.push(payload);
            if !has_more {
                break;
            }
            request.cursor = next_cursor;
        }
        Ok(pages)
    }

    pub async fn push_sync(
        &self,
        peer_url: &str,
        capsules: Vec<Capsule>,
        edges: Vec<SemanticEdge>,
        deletions: Vec<Deletion>,
    ) -> Result<(), FederationError> {
        let payload = sync::create_sync_payload(
            &self.instance_id,
            capsules,
            edges,
            deletions,
            false,
            None,
            &self.signing_key,
        );
        self.transport
            .push_sync(peer_url, &payload)
            .await
            .map_err(FederationError::Handshake)
    }
}

fn decode_public_key(b64: &str) -> Result<VerifyingKey, FederationError> {
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| FederationError::Signature(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| FederationError::Signature("public key is not 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| FederationError::Signature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_primitives::PeerCapabilities;
    use rand::rngs::OsRng;
    use std::sync::Mutex;

    struct StubTransport {
        peer_signing_key: SigningKey,
        pages: Mutex<Vec<SyncPayload>>,
        health: ProbeOutcome,
    }

    #[async_trait]
    impl FederationTransport for StubTransport {
        async fn post_handshake(&self, _peer_url: &str, _handshake: &Handshake) -> Result<Handshake, String> {
            use base64::Engine as _;
            let public_key =
                base64::engine::general_purpose::STANDARD.encode(self.peer_signing_key.verifying_key().to_bytes());
            Ok(handshake::build_handshake("peer-b", "Peer B", &public_key, &self.peer_signing_key))
        }

        async fn get_health(&self, _peer_url: &str) -> Result<ProbeOutcome, String> {
            Ok(self.health)
        }

        async fn get_changes(&self, _peer_url: &str, _request: &ChangesRequest) -> Result<SyncPayload, String> {
            let mut pages = self.pages.lock().unwrap();
            pages.pop().ok_or_else(|| "no more pages".to_string())
        }

        async fn push_sync(&self, _peer_url: &str, _payload: &SyncPayload) -> Result<(), String> {
            Ok(())
        }
    }

    fn peer_with_key(signing_key: &SigningKey) -> Peer {
        use base64::Engine as _;
        Peer {
            instance_id: "peer-b".to_string(),
            instance_name: "Peer B".to_string(),
            url: "https://peer-b.example".to_string(),
            public_key: base64::engine::general_purpose::STANDARD.encode(signing_key.verifying_key().to_bytes()),
            api_version: "1.0".to_string(),
            capabilities: PeerCapabilities { supports_push: true, supports_pull: true },
            status: PeerStatus::Active,
            rate_limit_per_minute: None,
        }
    }

    #[tokio::test]
    async fn initiate_handshake_verifies_the_peers_response() {
        let our_key = SigningKey::generate(&mut OsRng);
        let peer_key = SigningKey::generate(&mut OsRng);
        let transport = StubTransport { peer_signing_key: peer_key, pages: Mutex::new(Vec::new()), health: ProbeOutcome::Status(200) };
        let client = FederationClient::new("peer-a".to_string(), "Peer A".to_string(), our_key, transport);

        let theirs = client.initiate_handshake("https://peer-b.example").await.unwrap();
        assert_eq!(theirs.instance_id, "peer-b");
    }

    #[tokio::test]
    async fn check_peer_health_classifies_the_probe_outcome() {
        let our_key = SigningKey::generate(&mut OsRng);
        let peer_key = SigningKey::generate(&mut OsRng);
        let transport = StubTransport { peer_signing_key: peer_key, pages: Mutex::new(Vec::new()), health: ProbeOutcome::Timeout };
        let client = FederationClient::new("peer-a".to_string(), "Peer A".to_string(), our_key, transport);

        assert_eq!(client.check_peer_health("https://peer-b.example").await, PeerStatus::Offline);
    }

    #[tokio::test]
    async fn pull_all_changes_follows_pagination_until_has_more_is_false() {
        let our_key = SigningKey::generate(&mut OsRng);
        let peer_key = SigningKey::generate(&mut OsRng);

        let page_two = sync::create_sync_payload("peer-b", Vec::new(), Vec::new(), Vec::new(), false, None, &peer_key);
        let page_one = sync::create_sync_payload("peer-b", Vec::new(), Vec::new(), Vec::new(), true, Some("cursor-1".to_string()), &peer_key);

        let transport = StubTransport {
            peer_signing_key: SigningKey::generate(&mut OsRng),
            pages: Mutex::new(vec![page_two, page_one]),
            health: ProbeOutcome::Status(200),
        };
        let client = FederationClient::new("peer-a".to_string(), "Peer A".to_string(), our_key, transport);
        let peer = peer_with_key(&peer_key);

        let pages = client.pull_all_changes(&peer, ChangesRequest::default()).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert!(!pages[1].has_more);
    }
}
