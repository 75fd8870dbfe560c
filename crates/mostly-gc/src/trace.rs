//! Collection tracing support.
//!
//! When the `tracing` feature is enabled, this module provides a span per
//! collection and debug events for each phase.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    use crate::metrics::GcMetrics;

    /// Stable identifier correlating all events within one collection.
    ///
    /// A monotonically increasing process-wide counter starting at 1;
    /// wrapping is effectively unreachable at practical GC frequencies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(pub u64);

    static NEXT_GC_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique collection id.
    pub fn next_gc_id() -> GcId {
        GcId(NEXT_GC_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create the span covering an entire collection.
    pub fn collection_span(gc_id: GcId) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_collect", gc_id = gc_id.0).entered()
    }

    /// Log the end of the conservative phase.
    pub fn promoted_pages(pages: usize) {
        tracing::debug!(pages, "conservative_promotion");
    }

    /// Log the end of the exact global phase.
    pub fn globals_moved(cells: usize) {
        tracing::debug!(cells, "global_roots_moved");
    }

    /// Log the collection outcome.
    pub fn finished(metrics: &GcMetrics) {
        tracing::debug!(
            pages_promoted = metrics.pages_promoted,
            pages_allocated = metrics.pages_allocated,
            objects_copied = metrics.objects_copied,
            pages_freed = metrics.pages_freed,
            "collection_done"
        );
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(#[allow(dead_code)] pub u64);

    /// Stub function when tracing is disabled.
    #[must_use]
    pub fn next_gc_id() -> GcId {
        GcId(0)
    }
}
