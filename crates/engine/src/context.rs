//! Request-scoped `Context`: a `Tracer` capability carried explicitly
//! through call sites instead of a package-level global (spec §9,
//! "global singletons" / "async context managers for scoped spans").

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

/// A capability for acquiring scoped spans. Implementations decide where
/// start/end events go; the default forwards to `tracing`.
pub trait Tracer: Send + Sync {
    fn start_span(&self, name: &'static str) -> Box<dyn SpanHandle>;
}

/// A single span's lifetime. `Drop` emits the end event on every exit path,
/// including an early `return` or unwinding through a panic, replacing the
/// source's async-context-manager pattern with an ordinary RAII guard.
pub trait SpanHandle: Send {
    fn name(&self) -> &'static str;
}

/// Forwards spans to `tracing::info_span!`, entered for the guard's
/// lifetime and exited (with elapsed time logged) on drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn start_span(&self, name: &'static str) -> Box<dyn SpanHandle> {
        let span = tracing::info_span!("forge_span", name = name);
        span.in_scope(|| tracing::trace!("span start"));
        Box::new(TracingSpanHandle {
            name,
            started_at: Instant::now(),
            span,
        })
    }
}

struct TracingSpanHandle {
    name: &'static str,
    started_at: Instant,
    span: tracing::Span,
}

impl SpanHandle for TracingSpanHandle {
    fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for TracingSpanHandle {
    fn drop(&mut self) {
        let elapsed_us = self.started_at.elapsed().as_micros() as u64;
        self.span.in_scope(|| tracing::trace!(elapsed_us, "span end"));
    }
}

/// Per-request context threaded through call sites that need tracing or a
/// correlation id; never stored in a global.
#[derive(Clone)]
pub struct Context {
    pub correlation_id: Uuid,
    tracer: Arc<dyn Tracer>,
}

impl Context {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self { correlation_id: Uuid::new_v4(), tracer }
    }

    pub fn with_correlation_id(tracer: Arc<dyn Tracer>, correlation_id: Uuid) -> Self {
        Self { correlation_id, tracer }
    }

    /// Acquires a span scoped to the returned guard's lifetime.
    pub fn span(&self, name: &'static str) -> Box<dyn SpanHandle> {
        self.tracer.start_span(name)
    }
}
