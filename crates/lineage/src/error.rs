use thiserror::Error;

/// Lineage-local error family. Spec §7's taxonomy doesn't name a Lineage
/// family, so this stays local to the crate rather than growing a new
/// `ForgeError` variant; a host surface that needs a uniform kind can
/// fold it into `StoreError::Conflict`/`Transient` at its boundary.
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("base hash mismatch: expected {expected}, got {actual}")]
    BaseHashMismatch { expected: String, actual: String },
    #[error("entry {0} not found")]
    NotFound(String),
    #[error("compression error: {0}")]
    Compression(String),
}
