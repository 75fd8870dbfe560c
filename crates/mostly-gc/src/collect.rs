//! The collection cycle: space flip, conservative promotion, exact root
//! forwarding, and the transitive sweep.
//!
//! A collection advances the heap to a fresh space tag, pins every page a
//! stack or region word hints at, then copies everything else reachable
//! through the pinned pages and the exact global cells into fresh pages of
//! the forming space. Pages left carrying the old tag at commit are free.

use std::ptr;
use std::time::Instant;

use crate::directory::PageType;
use crate::heap::Heap;
use crate::metrics::GcMetrics;
use crate::object::HeaderWord;
use crate::{scan, stack, trace};

impl Heap {
    /// Runs one full stop-the-world collection.
    ///
    /// Collections normally trigger themselves on allocation pressure;
    /// calling this directly is mainly useful in tests and hosts that want
    /// to collect at a quiescent point of their own choosing.
    ///
    /// # Panics
    ///
    /// Panics if forwarding needs more destination pages than the heap can
    /// supply, or if a registered global cell holds a non-null value that
    /// is not a managed pointer.
    pub fn collect(&mut self) {
        assert!(!self.is_collecting(), "collector re-entered");
        let started = Instant::now();
        let _gc_id = trace::internal::next_gc_id();
        #[cfg(feature = "tracing")]
        let _span = trace::internal::collection_span(_gc_id);

        self.seal_allocation_page();
        self.next_space = self.current_space.advance();
        self.allocated_pages = 0;
        self.copied_objects = 0;
        self.copied_words = 0;
        debug_assert!(self.directory.queue_is_empty());

        // Conservative phase: registered regions, then the machine stack.
        // Each word is only a hint; a hit pins the page where it stands.
        for index in 0..self.root_regions.len() {
            let (start, len) = self.root_regions[index];
            unsafe { scan::each_aligned_word(start, len, |word| self.promote_hint(word)) };
        }
        if let Some(base) = self.stack_base {
            unsafe { stack::spill_registers_and_scan(base, |word| self.promote_hint(word)) };
        }
        let promoted = self.allocated_pages;
        #[cfg(feature = "tracing")]
        trace::internal::promoted_pages(promoted);

        // Exact phase: every global cell is rewritten to its referent's
        // forwarded address.
        for index in 0..self.globals.len() {
            let cell = self.globals[index];
            unsafe {
                let value = cell.read();
                cell.write(self.forward(value));
            }
        }
        #[cfg(feature = "tracing")]
        trace::internal::globals_moved(self.globals.len());

        // Sweep: drain the queue of promoted and destination pages,
        // forwarding every pointer slot. Forwarding allocates, which may
        // enqueue further destination pages behind the current head.
        while let Some(page) = self.directory.dequeue_head() {
            self.sweep_page(page);
        }

        let freed = (0..self.page_count)
            .filter(|&page| self.directory.space(page) == self.current_space)
            .count();
        self.current_space = self.next_space;
        self.collections += 1;
        self.metrics = GcMetrics {
            duration: started.elapsed(),
            pages_promoted: promoted,
            pages_allocated: self.allocated_pages - promoted,
            objects_copied: self.copied_objects,
            words_copied: self.copied_words,
            pages_freed: freed,
            total_collections: self.collections,
        };
        #[cfg(feature = "tracing")]
        trace::internal::finished(&self.metrics);
    }

    /// Treats `word` as a potential heap address. A hit on a page of the
    /// old space pins the whole run of pages holding the hinted object.
    fn promote_hint(&mut self, word: usize) {
        let Some(page) = self.page_index_of(word) else {
            return;
        };
        if self.directory.space(page) != self.current_space {
            // Free, or already promoted by an earlier hint.
            return;
        }

        let mut head = page;
        while self.directory.ptype(head) == PageType::Continued {
            debug_assert!(head > 0, "continued page with no owning object page");
            head -= 1;
            debug_assert_eq!(self.directory.space(head), self.current_space);
        }
        self.promote_run(head);
    }

    /// Retags the run starting at the object page `head` into the forming
    /// space and queues `head` for the sweep. Pinned pages keep their
    /// addresses; only their pointer slots will be rewritten.
    fn promote_run(&mut self, head: usize) {
        self.directory.set_space(head, self.next_space);
        self.allocated_pages += 1;
        self.directory.enqueue(head);

        let mut page = head + 1;
        while page < self.page_count
            && self.directory.ptype(page) == PageType::Continued
            && self.directory.space(page) == self.current_space
        {
            self.directory.set_space(page, self.next_space);
            self.allocated_pages += 1;
            page += 1;
        }
    }

    /// Forwards one managed pointer: returns the address the object will
    /// occupy after this collection, copying it into the forming space the
    /// first time it is reached.
    ///
    /// Null passes through. Pointers onto pages already in the forming
    /// space (pinned pages and already-copied objects' homes) pass through
    /// unchanged.
    pub(crate) unsafe fn forward(&mut self, obj: *mut usize) -> *mut usize {
        if obj.is_null() {
            return obj;
        }
        let addr = obj as usize;
        let page = self
            .page_index_of(addr)
            .unwrap_or_else(|| panic!("exact root {addr:#x} is outside the heap"));

        if self.directory.space(page) == self.next_space {
            return obj;
        }
        assert_eq!(
            self.directory.space(page),
            self.current_space,
            "exact root {addr:#x} refers to a free page"
        );
        assert_eq!(
            self.directory.ptype(page),
            PageType::Object,
            "exact root {addr:#x} points into a continued page"
        );

        let header_ptr = unsafe { obj.sub(1) };
        match HeaderWord::decode(unsafe { header_ptr.read() }) {
            HeaderWord::Forward(dest) => dest,
            HeaderWord::Live(header) => {
                let dest_header = self.alloc_words(header.words).as_ptr();
                unsafe {
                    ptr::copy_nonoverlapping(header_ptr, dest_header, header.words);
                    let dest = dest_header.add(1);
                    header_ptr.write(dest as usize);
                    self.copied_objects += 1;
                    self.copied_words += header.words;
                    dest
                }
            }
        }
    }

    /// Walks the objects of one queued page, forwarding each one's leading
    /// pointer words. The walk stops at the page boundary, or at the bump
    /// frontier when the page is the one currently being allocated into.
    fn sweep_page(&mut self, page: usize) {
        let mut cursor = self.page_addr(page) as *mut usize;
        loop {
            if self.page_index_of(cursor as usize) != Some(page) {
                break;
            }
            if self.free_words > 0 && ptr::eq(cursor, self.free_ptr) {
                break;
            }

            let header = match HeaderWord::decode(unsafe { cursor.read() }) {
                HeaderWord::Live(header) => header,
                HeaderWord::Forward(_) => {
                    unreachable!("forwarding word while sweeping page {page}")
                }
            };
            for slot in 1..=header.ptrs {
                unsafe {
                    let slot_ptr = cursor.add(slot);
                    let value = slot_ptr.read() as *mut usize;
                    slot_ptr.write(self.forward(value) as usize);
                }
            }
            cursor = unsafe { cursor.add(header.words) };
        }
    }
}
