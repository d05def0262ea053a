use std::time::Duration;

/// Invalidation strategy.
#[derive(Debug, Clone, Copy)]
pub enum InvalidationStrategy {
    /// Invalidate synchronously, as soon as the triggering event arrives.
    Immediate,
    /// Merge bursts of invalidations within `window` and process once.
    /// The cache only collects which fingerprints to drop; a caller (the
    /// engine's background loop) drives `QueryCache::flush_debounced` on a
    /// timer so the merge window is driven by the same cancellable-task
    /// model as every other background loop.
    Debounced { window: Duration },
    /// Mark stale immediately; the entry is only actually dropped on the
    /// next read attempt.
    Lazy,
}
