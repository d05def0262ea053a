//! Overlay Registry + Lifecycle (C4) and Cascade Pipeline (C5).

pub mod cascade;
pub mod overlay;

pub use cascade::{
    CascadeMetrics, CascadePipeline, ChainPersister, NullPersister, OriginatingInsight,
    PersistError,
};
pub use overlay::{
    DerivativeInsight, Overlay, OverlayDecision, OverlayKind, OverlayRegistry, OverlayState,
};
