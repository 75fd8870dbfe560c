//! The paged heap: arena, bump allocator, and page acquisition.
//!
//! The heap is one contiguous page-aligned arena carved into fixed 512-byte
//! pages. Allocation bumps a free pointer through the current page; when a
//! request does not fit, the page is sealed with a filler header and a fresh
//! run of pages is claimed from the directory. Crossing the half-heap
//! watermark hands control to the collector before any object bytes are
//! written, so the mutator never observes a partially initialized object.

use std::io;
use std::ptr::{self, NonNull};

use sys_alloc::{Mmap, MmapOptions};

use crate::directory::{PageDirectory, PageType, SpaceTag};
use crate::metrics::GcMetrics;
use crate::object::{ObjectHeader, MAX_OBJECT_WORDS, WORD_BYTES};

/// Size of one heap page in bytes.
pub const PAGE_BYTES: usize = 512;

/// Size of one heap page in words.
pub const PAGE_WORDS: usize = PAGE_BYTES / WORD_BYTES;

/// Construction-time configuration for a [`Heap`].
#[derive(Debug, Clone)]
pub struct HeapConfig {
    heap_bytes: usize,
    stack_base: Option<usize>,
    populate: bool,
}

impl HeapConfig {
    /// Creates a configuration for a heap of (at least one page of)
    /// `heap_bytes` bytes. The size is rounded down to a whole number of
    /// pages.
    #[must_use]
    pub const fn new(heap_bytes: usize) -> Self {
        Self {
            heap_bytes,
            stack_base: None,
            populate: false,
        }
    }

    /// Sets the address of the deepest host stack word the conservative
    /// scanner should examine. Without one, collections scan only
    /// registered root regions and global cells.
    #[must_use]
    pub const fn stack_base(mut self, base: usize) -> Self {
        self.stack_base = Some(base);
        self
    }

    /// Sets whether the arena's page tables are prefaulted at mapping time.
    #[must_use]
    pub const fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }
}

/// Outcome of a page-acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    /// A run was assigned and the bump state points at it.
    Assigned,
    /// The watermark fired and a collection ran instead; retry.
    Collected,
}

/// A mostly-copying collected heap.
///
/// All state is owned by the instance; several heaps can coexist in one
/// process. The heap is single-threaded: the collector runs synchronously
/// inside [`Heap::allocate`] when allocation pressure demands it.
pub struct Heap {
    /// Keeps the arena mapped for the lifetime of the heap.
    #[allow(dead_code)]
    pub(crate) region: Mmap,
    /// Arena base address; always `PAGE_BYTES`-aligned.
    pub(crate) base: usize,
    pub(crate) page_count: usize,
    pub(crate) directory: PageDirectory,
    pub(crate) current_space: SpaceTag,
    pub(crate) next_space: SpaceTag,
    /// Next free word of the current allocation run; dangling while
    /// `free_words == 0`.
    pub(crate) free_ptr: *mut usize,
    pub(crate) free_words: usize,
    pub(crate) allocated_pages: usize,
    /// First-fit search resumes after the most recent assignment.
    pub(crate) cursor: usize,
    pub(crate) stack_base: Option<usize>,
    pub(crate) globals: Vec<*mut *mut usize>,
    /// Conservatively scanned host regions, as (start, byte length).
    pub(crate) root_regions: Vec<(usize, usize)>,
    pub(crate) copied_objects: usize,
    pub(crate) copied_words: usize,
    pub(crate) collections: usize,
    pub(crate) metrics: GcMetrics,
}

impl Heap {
    /// Maps the arena and builds the page directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses the arena mapping.
    ///
    /// # Panics
    ///
    /// Panics if the configured size is smaller than two pages.
    pub fn new(config: HeapConfig) -> io::Result<Self> {
        let page_count = config.heap_bytes / PAGE_BYTES;
        assert!(
            page_count >= 2,
            "heap of {} bytes is smaller than two {PAGE_BYTES}-byte pages",
            config.heap_bytes
        );

        let region = MmapOptions::new()
            .len(page_count * PAGE_BYTES)
            .populate(config.populate)
            .map_anon()?;
        let base = region.ptr() as usize;
        debug_assert_eq!(base % PAGE_BYTES, 0, "arena base not page-aligned");

        Ok(Self {
            region,
            base,
            page_count,
            directory: PageDirectory::new(page_count),
            current_space: SpaceTag::first(),
            next_space: SpaceTag::first(),
            free_ptr: ptr::null_mut(),
            free_words: 0,
            allocated_pages: 0,
            cursor: 0,
            stack_base: config.stack_base,
            globals: Vec::new(),
            root_regions: Vec::new(),
            copied_objects: 0,
            copied_words: 0,
            collections: 0,
            metrics: GcMetrics::new(),
        })
    }

    /// Registers the address of a host cell holding an exact managed
    /// pointer. The cell is nulled now and rewritten to the forwarded
    /// address of its referent at every collection.
    ///
    /// # Safety
    ///
    /// `cell` must stay valid and writable for the lifetime of the heap,
    /// and must only ever hold null or a pointer returned by
    /// [`Heap::allocate`] (as updated by collections).
    pub unsafe fn register_global_root(&mut self, cell: *mut *mut usize) {
        unsafe { cell.write(ptr::null_mut()) };
        self.globals.push(cell);
    }

    /// Registers a host memory region to be scanned conservatively at
    /// every collection, exactly like the machine stack: any aligned word
    /// that looks like a heap address pins its page.
    ///
    /// # Safety
    ///
    /// The region must stay valid for reads of `len` bytes for the
    /// lifetime of the heap.
    pub unsafe fn register_root_region(&mut self, start: *const u8, len: usize) {
        self.root_regions.push((start as usize, len));
    }

    /// Allocates an object of `bytes` user bytes whose first `ptr_count`
    /// words hold managed pointers, returning the address of the first
    /// user word. The header sits one word below the returned address.
    ///
    /// Pointer words are nulled; the remaining user words are
    /// uninitialized. The returned pointer is word-aligned and never at a
    /// page start.
    ///
    /// # Panics
    ///
    /// Panics if `ptr_count` exceeds the object's word count, if the
    /// request exceeds the heap's capacity, or if no contiguous free run
    /// can hold the object even after a collection.
    pub fn allocate(&mut self, bytes: usize, ptr_count: usize) -> NonNull<usize> {
        let user_words = bytes.div_ceil(WORD_BYTES).max(1);
        assert!(
            ptr_count <= user_words,
            "pointer count {ptr_count} exceeds the {user_words} user words of a {bytes}-byte object"
        );
        let words = user_words + 1;

        let header = self.alloc_words(words);
        unsafe {
            header.as_ptr().write(ObjectHeader::new(words, ptr_count).encode());
            let user = header.as_ptr().add(1);
            for slot in 0..ptr_count {
                user.add(slot).write(0);
            }
            NonNull::new_unchecked(user)
        }
    }

    /// Carves `words` contiguous words out of the heap and returns the
    /// address of the first (the header slot). The caller writes the
    /// header; nothing is initialized here.
    pub(crate) fn alloc_words(&mut self, words: usize) -> NonNull<usize> {
        assert!(
            words <= MAX_OBJECT_WORDS && words.div_ceil(PAGE_WORDS) <= self.page_count,
            "object of {words} words exceeds the capacity of a {}-page heap",
            self.page_count
        );
        let pages_needed = words.div_ceil(PAGE_WORDS);

        let mut collected = false;
        loop {
            if words <= self.free_words {
                let slot = self.free_ptr;
                if words < PAGE_WORDS {
                    self.free_ptr = unsafe { slot.add(words) };
                    self.free_words -= words;
                } else {
                    // Whole-page objects own their run; the tail words are
                    // dead until the run is freed.
                    self.free_words = 0;
                }
                return unsafe { NonNull::new_unchecked(slot) };
            }

            self.seal_allocation_page();
            if self.acquire_pages(pages_needed, !collected) == Acquire::Collected {
                collected = true;
            }
        }
    }

    /// Seals the current allocation page by covering its remaining words
    /// with a filler header, so page sweeps can walk object-to-object to
    /// the page boundary.
    pub(crate) fn seal_allocation_page(&mut self) {
        if self.free_words > 0 {
            debug_assert!(self.free_words < PAGE_WORDS);
            unsafe {
                self.free_ptr.write(ObjectHeader::filler(self.free_words).encode());
            }
            self.free_words = 0;
        }
    }

    /// Points the bump state at a run of `pages` free pages.
    ///
    /// When the heap is past the half-full watermark this runs the
    /// collector instead and reports [`Acquire::Collected`]; the caller's
    /// retry loop re-enters with the watermark check disarmed so that a
    /// heap whose live data exceeds half the pages can still allocate
    /// from the free remainder.
    ///
    /// # Panics
    ///
    /// Panics if the watermark fires while a collection is already
    /// running (the heap cannot hold the survivors), or if no contiguous
    /// run of `pages` free pages exists.
    pub(crate) fn acquire_pages(&mut self, pages: usize, may_collect: bool) -> Acquire {
        if may_collect && self.allocated_pages + pages >= self.page_count / 2 {
            assert!(
                !self.is_collecting(),
                "out of space during collect: {pages} page(s) requested with {} of {} in use",
                self.allocated_pages,
                self.page_count
            );
            self.collect();
            return Acquire::Collected;
        }

        let mut run = 0usize;
        let mut probe = self.cursor;
        let mut examined = 0usize;
        while examined < self.page_count {
            if probe == self.page_count {
                // Runs may not straddle the wraparound.
                probe = 0;
                run = 0;
            }
            if self.page_is_free(probe) {
                run += 1;
            } else {
                run = 0;
            }
            probe += 1;
            examined += 1;
            if run == pages {
                self.assign_run(probe - pages, pages);
                return Acquire::Assigned;
            }
        }

        panic!(
            "heap exhausted: no run of {pages} contiguous free page(s) in a heap of {} pages",
            self.page_count
        );
    }

    /// Tags and types a freshly claimed run and resets the bump state to
    /// its base. During a collection the run belongs to the forming space
    /// and its base joins the sweep queue.
    fn assign_run(&mut self, head: usize, pages: usize) {
        self.directory.set_ptype(head, PageType::Object);
        self.directory.set_space(head, self.next_space);
        for page in head + 1..head + pages {
            self.directory.set_ptype(page, PageType::Continued);
            self.directory.set_space(page, self.next_space);
        }

        self.allocated_pages += pages;
        self.free_ptr = self.page_addr(head) as *mut usize;
        self.free_words = pages * PAGE_WORDS;
        self.cursor = (head + pages) % self.page_count;

        if self.is_collecting() {
            self.directory.enqueue(head);
        }
    }

    /// True while a collection is migrating pages between spaces.
    pub(crate) fn is_collecting(&self) -> bool {
        self.current_space != self.next_space
    }

    /// Address of a page's first word.
    pub(crate) fn page_addr(&self, page: usize) -> usize {
        self.base + page * PAGE_BYTES
    }

    /// True if `addr` falls inside the arena.
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.base + self.page_count * PAGE_BYTES
    }

    /// Heap-relative index of the page containing `addr`, if any.
    #[must_use]
    pub fn page_index_of(&self, addr: usize) -> Option<usize> {
        self.contains(addr).then(|| (addr - self.base) / PAGE_BYTES)
    }

    /// Number of pages in the heap.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Number of pages owned by the current collection epoch (or, during
    /// a collection, already migrated to the forming one).
    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        self.allocated_pages
    }

    /// True if the page at `page` is owned by the current epoch.
    ///
    /// # Panics
    ///
    /// Panics if `page` is out of range.
    #[must_use]
    pub fn page_is_live(&self, page: usize) -> bool {
        self.directory.space(page) == self.current_space
    }

    /// True if the page at `page` belongs to neither the current epoch nor
    /// the one being formed, making it claimable.
    ///
    /// # Panics
    ///
    /// Panics if `page` is out of range.
    #[must_use]
    pub fn page_is_free(&self, page: usize) -> bool {
        let tag = self.directory.space(page);
        tag != self.current_space && tag != self.next_space
    }

    /// Whether the page at `page` starts an object or continues one.
    ///
    /// Only meaningful for live pages; a free page keeps the type it last
    /// carried.
    ///
    /// # Panics
    ///
    /// Panics if `page` is out of range.
    #[must_use]
    pub fn page_type(&self, page: usize) -> PageType {
        self.directory.ptype(page)
    }

    /// Statistics from the most recent collection.
    #[must_use]
    pub fn last_gc_metrics(&self) -> GcMetrics {
        self.metrics
    }
}
