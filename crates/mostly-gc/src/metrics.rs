//! Collection metrics and statistics.

use std::time::Duration;

/// Statistics from the most recent collection of a heap.
#[derive(Debug, Clone, Copy)]
pub struct GcMetrics {
    /// Duration of the collection pause.
    pub duration: Duration,
    /// Pages pinned in place by conservative hints.
    pub pages_promoted: usize,
    /// Fresh destination pages claimed for copied objects.
    pub pages_allocated: usize,
    /// Objects copied into the forming space.
    pub objects_copied: usize,
    /// Words copied, headers included.
    pub words_copied: usize,
    /// Pages returned to the free pool at commit.
    pub pages_freed: usize,
    /// Collections run by this heap since construction.
    pub total_collections: usize,
}

impl GcMetrics {
    /// Creates a `GcMetrics` with all fields zeroed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            duration: Duration::from_secs(0),
            pages_promoted: 0,
            pages_allocated: 0,
            objects_copied: 0,
            words_copied: 0,
            pages_freed: 0,
            total_collections: 0,
        }
    }
}

impl Default for GcMetrics {
    fn default() -> Self {
        Self::new()
    }
}
