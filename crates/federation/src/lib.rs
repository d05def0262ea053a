//! Federation Protocol (spec §4.10): signed handshakes between instances,
//! signed sync payloads with a content-hash idempotency key, and peer
//! health classification.

mod client;
mod handshake;
mod health;
mod sync;

pub use client::{ChangesRequest, FederationClient, FederationTransport, HttpTransport};
pub use handshake::{build_handshake, verify_handshake, Handshake, API_VERSION};
pub use health::{classify_health, ProbeOutcome};
pub use sync::{compute_content_hash, create_sync_payload, verify_sync_payload};
