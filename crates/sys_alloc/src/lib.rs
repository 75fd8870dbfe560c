//! Thin wrappers over the operating system's anonymous memory mapping
//! primitives.
//!
//! A garbage-collected heap wants one contiguous, page-aligned, read-write
//! region whose lifetime it controls exactly. `std::alloc` gives no alignment
//! guarantee beyond the layout's and no way to return a region wholesale, so
//! this crate goes straight to `mmap`/`VirtualAlloc`.

use std::io;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

pub use os::page_size;

/// An owned anonymous memory mapping.
///
/// The region is aligned to the system page size, zero-filled by the OS, and
/// unmapped when this handle is dropped. Pointers derived from [`Mmap::ptr`]
/// must not outlive the handle.
pub struct Mmap {
    inner: os::MmapInner,
}

impl Mmap {
    /// Returns a pointer to the start of the mapping.
    #[must_use]
    pub fn ptr(&self) -> *mut u8 {
        self.inner.ptr()
    }

    /// Returns the length of the mapping in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the mapping has zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

// The mapping itself is plain memory; whoever holds the handle decides how
// access is synchronized.
unsafe impl Send for Mmap {}
unsafe impl Sync for Mmap {}

/// Configuration for creating an anonymous mapping.
#[derive(Debug, Clone)]
pub struct MmapOptions {
    len: usize,
    populate: bool,
}

impl MmapOptions {
    /// Creates a new `MmapOptions` with default settings (length 0).
    /// A length must be set before mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            len: 0,
            populate: false,
        }
    }

    /// Sets the length of the mapping in bytes.
    #[must_use]
    pub const fn len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Sets whether to pre-populate (prefault) the page tables.
    ///
    /// On Linux this adds `MAP_POPULATE`; elsewhere it is ignored.
    #[must_use]
    pub const fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    /// Creates an anonymous read-write mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is zero or the OS refuses the mapping.
    pub fn map_anon(&self) -> io::Result<Mmap> {
        if self.len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "length must be greater than 0",
            ));
        }

        // SAFETY: length is non-zero and the returned region is owned by the
        // Mmap handle, which unmaps it on drop.
        let inner = unsafe { os::MmapInner::map_anon(self.len, self.populate)? };
        Ok(Mmap { inner })
    }
}

impl Default for MmapOptions {
    fn default() -> Self {
        Self::new()
    }
}
