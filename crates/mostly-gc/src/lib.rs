//! A Bartlett-style **mostly-copying** garbage collector for unmanaged
//! hosts.
//!
//! The heap is a contiguous arena of fixed 512-byte pages. Objects declare
//! their size and leading pointer count at allocation; collections are
//! synchronous stop-the-world events triggered on allocation pressure.
//! Exact roots (registered global cells) are relocated precisely, while
//! the machine stack and registers are scanned *conservatively*: any word
//! that looks like a heap address pins its page in place, and everything
//! else reachable is copied into pages of a fresh space, leaving
//! forwarding words behind.
//!
//! # Features
//!
//! - **Page-level pinning**: uncertain roots never move objects they might
//!   reference, so the host needs no read or write barriers
//! - **Exact forwarding everywhere else**: global cells and pointer slots
//!   are rewritten to each referent's new address
//! - **Instance heaps**: all state lives in a [`Heap`] value; several
//!   heaps coexist in one process
//! - **Cycles collected naturally**: forwarding words make copying
//!   terminate on cyclic graphs without special casing
//!
//! # Quick start
//!
//! ```
//! use mostly_gc::{Heap, HeapConfig, PAGE_BYTES};
//!
//! let mut heap = Heap::new(HeapConfig::new(64 * PAGE_BYTES)).expect("map heap");
//!
//! // 24 bytes, of which the first word is a managed pointer slot.
//! let p = heap.allocate(24, 1);
//! unsafe {
//!     // Non-pointer words are ours to initialize.
//!     p.as_ptr().add(1).write(7);
//! }
//! ```
//!
//! # Surviving a collection
//!
//! A pointer held only in host data the collector cannot see will dangle
//! after a collection. Either register the cell holding it as an exact
//! global root, configure a stack base so the conservative scanner covers
//! the host stack, or register the region around it for conservative
//! scanning:
//!
//! ```
//! use mostly_gc::{Heap, HeapConfig, PAGE_BYTES};
//! use std::ptr;
//!
//! let mut heap = Heap::new(HeapConfig::new(64 * PAGE_BYTES)).expect("map heap");
//!
//! let mut cell: *mut usize = ptr::null_mut();
//! unsafe { heap.register_global_root(&raw mut cell) };
//!
//! cell = heap.allocate(16, 0).as_ptr();
//! heap.collect();
//! // `cell` now holds the object's post-collection address.
//! assert!(heap.contains(cell as usize));
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

mod collect;
mod directory;
mod heap;
mod metrics;
mod object;
mod scan;
mod stack;
mod trace;

pub use directory::{PageType, SpaceTag};
pub use heap::{Heap, HeapConfig, PAGE_BYTES, PAGE_WORDS};
pub use metrics::GcMetrics;
pub use object::{HeaderWord, ObjectHeader, MAX_OBJECT_WORDS, WORD_BYTES};
pub use stack::{get_stack_bounds, StackBounds};
