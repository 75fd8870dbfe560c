//! Allocation-path tests: header layout, pointer-slot nulling, page
//! sealing and alignment.

use mostly_gc::{
    HeaderWord, Heap, HeapConfig, ObjectHeader, PAGE_BYTES, PAGE_WORDS, WORD_BYTES,
};

fn heap(pages: usize) -> Heap {
    Heap::new(HeapConfig::new(pages * PAGE_BYTES)).expect("map heap")
}

#[test]
fn single_object_header_and_null_slots() {
    let mut heap = heap(10);
    let p = heap.allocate(50, 2);
    let addr = p.as_ptr() as usize;

    // Word-aligned, and at least one word past the page start (the header
    // occupies the word below).
    assert_eq!(addr % WORD_BYTES, 0);
    assert!(addr % PAGE_BYTES >= WORD_BYTES);

    let expected_words = 50usize.div_ceil(WORD_BYTES) + 1;
    let raw = unsafe { p.as_ptr().sub(1).read() };
    assert_eq!(raw & 1, 1, "live header must carry the live bit");
    match HeaderWord::decode(raw) {
        HeaderWord::Live(h) => assert_eq!(h, ObjectHeader::new(expected_words, 2)),
        HeaderWord::Forward(_) => panic!("fresh object decoded as forwarded"),
    }

    unsafe {
        assert_eq!(p.as_ptr().read(), 0);
        assert_eq!(p.as_ptr().add(1).read(), 0);
    }
}

#[test]
fn zero_byte_request_still_gets_a_user_word() {
    let mut heap = heap(10);
    let p = heap.allocate(0, 0);
    let raw = unsafe { p.as_ptr().sub(1).read() };
    match HeaderWord::decode(raw) {
        HeaderWord::Live(h) => {
            assert_eq!(h.words, 2);
            assert_eq!(h.ptrs, 0);
        }
        HeaderWord::Forward(_) => panic!("fresh object decoded as forwarded"),
    }
}

#[test]
fn all_pointer_slots_are_nulled() {
    let mut heap = heap(10);
    let p = heap.allocate(64, 8);
    for slot in 0..8 {
        assert_eq!(unsafe { p.as_ptr().add(slot).read() }, 0);
    }
}

#[test]
fn same_page_allocations_are_densely_packed() {
    let mut heap = heap(10);
    let first = heap.allocate(30, 0);
    let second = heap.allocate(30, 0);
    let words = 30usize.div_ceil(WORD_BYTES) + 1;
    assert_eq!(
        second.as_ptr() as usize - first.as_ptr() as usize,
        words * WORD_BYTES
    );
}

#[test]
fn filling_a_page_seals_it_with_a_filler() {
    let mut heap = heap(10);
    let words = 30usize.div_ceil(WORD_BYTES) + 1;
    let per_page = PAGE_WORDS / words;
    let leftover = PAGE_WORDS % words;
    assert!(leftover > 0, "pick a size that leaves a page tail");

    let first = heap.allocate(30, 0);
    let first_page = heap.page_index_of(first.as_ptr() as usize).unwrap();
    for _ in 1..per_page {
        let p = heap.allocate(30, 0);
        assert_eq!(heap.page_index_of(p.as_ptr() as usize), Some(first_page));
    }

    // This one no longer fits: the page is sealed and a fresh one claimed.
    let overflow = heap.allocate(30, 0);
    let overflow_page = heap.page_index_of(overflow.as_ptr() as usize).unwrap();
    assert_ne!(overflow_page, first_page);

    let page_base = (first.as_ptr() as usize - WORD_BYTES) as *const usize;
    let filler = unsafe { page_base.add(per_page * words).read() };
    match HeaderWord::decode(filler) {
        HeaderWord::Live(h) => {
            assert_eq!(h.words, leftover);
            assert_eq!(h.ptrs, 0);
        }
        HeaderWord::Forward(_) => panic!("filler decoded as forwarded"),
    }
}

#[test]
fn allocation_claims_pages_lazily() {
    let mut heap = heap(10);
    assert_eq!(heap.allocated_pages(), 0);
    let _ = heap.allocate(16, 0);
    assert_eq!(heap.allocated_pages(), 1);
    let _ = heap.allocate(16, 0);
    assert_eq!(heap.allocated_pages(), 1);
}

#[test]
#[should_panic(expected = "pointer count")]
fn pointer_count_beyond_user_words_is_rejected() {
    let mut heap = heap(10);
    let _ = heap.allocate(WORD_BYTES, 3);
}
