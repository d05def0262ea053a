use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    Active,
    Degraded,
    Offline,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PeerCapabilities {
    pub supports_push: bool,
    pub supports_pull: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub instance_id: String,
    pub instance_name: String,
    pub url: String,
    pub public_key: String,
    pub api_version: String,
    pub capabilities: PeerCapabilities,
    pub status: PeerStatus,
    pub rate_limit_per_minute: Option<u32>,
}
