//! The Forge error taxonomy.
//!
//! Every component-level error enum converts into [`ForgeError`] at its
//! crate boundary. Each variant keeps a stable, machine-readable `kind`
//! independent of its `Display` message so host surfaces can map kinds to
//! status codes without string matching.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error(transparent)]
    Cascade(#[from] CascadeError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Federation(#[from] FederationError),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ForgeError {
    /// Stable machine-readable kind, independent of the `Display` message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integrity(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Overlay(_) => "Overlay",
            Self::Cascade(e) => e.kind(),
            Self::Cache(e) => e.kind(),
            Self::Partition(e) => e.kind(),
            Self::Federation(e) => e.kind(),
            Self::Config(_) => "Config",
        }
    }
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("content hash mismatch: expected {expected}, got {actual}")]
    ContentHashMismatch { expected: String, actual: String },
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    #[error("merkle chain broken at capsule {at}")]
    MerkleChainBroken { at: String },
}

impl IntegrityError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContentHashMismatch { .. } => "ContentHashMismatch",
            Self::SignatureVerificationFailed => "SignatureVerificationFailed",
            Self::MerkleChainBroken { .. } => "MerkleChainBroken",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transient store failure: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::Conflict(_) => "Conflict",
            Self::Transient(_) => "Transient",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Isolated inside the cascade pipeline; never propagates out of it (§7).
#[derive(Debug, Error)]
#[error("overlay {overlay_id} failed: {message}")]
pub struct OverlayError {
    pub overlay_id: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("hop budget exceeded: {hop_count} > {max_hops}")]
    HopBudgetExceeded { hop_count: u32, max_hops: u32 },
    #[error("cycle detected: overlay {overlay_id} already visited")]
    CycleDetected { overlay_id: String },
}

impl CascadeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HopBudgetExceeded { .. } => "HopBudgetExceeded",
            Self::CycleDetected { .. } => "CycleDetected",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cached value too large: {bytes} bytes")]
    TooLarge { bytes: usize },
    #[error("cache backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl CacheError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "TooLarge",
            Self::BackendUnavailable(_) => "BackendUnavailable",
        }
    }
}

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("partition {0} is full")]
    Full(String),
    #[error("partition {0} is rebalancing")]
    Rebalancing(String),
    #[error("partition {0} not found")]
    NotFound(String),
}

impl PartitionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Full(_) => "Full",
            Self::Rebalancing(_) => "Rebalancing",
            Self::NotFound(_) => "NotFound",
        }
    }
}

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("signature error: {0}")]
    Signature(String),
    #[error("handshake timestamp outside tolerated clock skew: {0}")]
    StaleTimestamp(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by peer")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
}

impl FederationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "Handshake",
            Self::Signature(_) => "Signature",
            Self::StaleTimestamp(_) => "StaleTimestamp",
            Self::Timeout => "Timeout",
            Self::RateLimited => "RateLimited",
            Self::Transport(_) => "Transport",
        }
    }
}
