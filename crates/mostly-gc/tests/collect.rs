//! Collection tests: exact root forwarding, transitive edge rewriting,
//! the allocation watermark, and collection metrics.

use std::ptr;

use mostly_gc::{HeaderWord, Heap, HeapConfig, PAGE_BYTES, WORD_BYTES};

fn heap(pages: usize) -> Heap {
    Heap::new(HeapConfig::new(pages * PAGE_BYTES)).expect("map heap")
}

#[test]
fn global_root_survives_with_identical_payload() {
    let mut heap = heap(32);
    let mut cell: *mut usize = ptr::null_mut();
    unsafe { heap.register_global_root(&raw mut cell) };
    assert!(cell.is_null(), "registration must null the cell");

    let obj = heap.allocate(48, 0);
    for i in 0..6 {
        unsafe { obj.as_ptr().add(i).write(0xA000 + i) };
    }
    cell = obj.as_ptr();
    let old = cell as usize;

    heap.collect();

    // Nothing pinned it, so the object was copied and the cell rewritten.
    assert_ne!(cell as usize, old);
    assert!(heap.contains(cell as usize));
    for i in 0..6 {
        assert_eq!(unsafe { cell.add(i).read() }, 0xA000 + i);
    }

    // The old header now forwards to the new location.
    let old_header = unsafe { (old as *const usize).sub(1).read() };
    match HeaderWord::decode(old_header) {
        HeaderWord::Forward(dest) => assert_eq!(dest as usize, cell as usize),
        HeaderWord::Live(_) => panic!("source header was not overwritten"),
    }
}

#[test]
fn null_global_cell_stays_null() {
    let mut heap = heap(16);
    let mut cell: *mut usize = ptr::null_mut();
    unsafe { heap.register_global_root(&raw mut cell) };
    let _ = heap.allocate(32, 0);
    heap.collect();
    assert!(cell.is_null());
}

#[test]
fn edges_are_rewritten_transitively() {
    let mut heap = heap(32);
    let mut cell: *mut usize = ptr::null_mut();
    unsafe { heap.register_global_root(&raw mut cell) };

    // a -> b -> c, anchored only through a.
    let a = heap.allocate(2 * WORD_BYTES, 1);
    let b = heap.allocate(2 * WORD_BYTES, 1);
    let c = heap.allocate(2 * WORD_BYTES, 0);
    unsafe {
        c.as_ptr().write(777);
        b.as_ptr().write(c.as_ptr() as usize);
        b.as_ptr().add(1).write(333);
        a.as_ptr().write(b.as_ptr() as usize);
        a.as_ptr().add(1).write(111);
    }
    cell = a.as_ptr();
    let (old_a, old_b, old_c) = (
        a.as_ptr() as usize,
        b.as_ptr() as usize,
        c.as_ptr() as usize,
    );

    heap.collect();

    let new_a = cell;
    assert_ne!(new_a as usize, old_a);
    let new_b = unsafe { new_a.read() } as *mut usize;
    assert_ne!(new_b as usize, old_b);
    assert!(heap.contains(new_b as usize));
    let new_c = unsafe { new_b.read() } as *mut usize;
    assert_ne!(new_c as usize, old_c);
    assert!(heap.contains(new_c as usize));

    unsafe {
        assert_eq!(new_a.add(1).read(), 111);
        assert_eq!(new_b.add(1).read(), 333);
        assert_eq!(new_c.read(), 777);
    }
}

#[test]
fn shared_target_is_copied_once() {
    let mut heap = heap(32);
    let mut left: *mut usize = ptr::null_mut();
    let mut right: *mut usize = ptr::null_mut();
    unsafe {
        heap.register_global_root(&raw mut left);
        heap.register_global_root(&raw mut right);
    }

    let shared = heap.allocate(16, 0);
    unsafe { shared.as_ptr().write(555) };
    left = shared.as_ptr();
    right = shared.as_ptr();

    heap.collect();

    // Both cells chase the same forwarding word to one copy.
    assert_eq!(left, right);
    assert_eq!(unsafe { left.read() }, 555);
    assert_eq!(heap.last_gc_metrics().objects_copied, 1);
}

#[test]
fn repeated_collections_keep_roots_alive() {
    let mut heap = heap(32);
    let mut cell: *mut usize = ptr::null_mut();
    unsafe { heap.register_global_root(&raw mut cell) };

    let obj = heap.allocate(16, 0);
    unsafe { obj.as_ptr().write(31337) };
    cell = obj.as_ptr();

    for round in 1..=5 {
        heap.collect();
        assert_eq!(unsafe { cell.read() }, 31337, "payload lost in round {round}");
        assert_eq!(heap.last_gc_metrics().total_collections, round);
    }
}

#[test]
fn collecting_an_empty_heap_is_harmless() {
    let mut heap = heap(16);
    heap.collect();
    heap.collect();
    assert_eq!(heap.allocated_pages(), 0);
    let p = heap.allocate(16, 0);
    assert!(heap.contains(p.as_ptr() as usize));
}

#[test]
fn watermark_triggers_collection_and_reclaims_garbage() {
    let mut heap = heap(16);
    assert_eq!(heap.last_gc_metrics().total_collections, 0);

    // Page-sized unreachable objects; crossing half the heap must run the
    // collector, and with no roots every page is reclaimed.
    for _ in 0..32 {
        let _ = heap.allocate(PAGE_BYTES - WORD_BYTES, 0);
    }

    let metrics = heap.last_gc_metrics();
    assert!(metrics.total_collections >= 1);
    assert!(metrics.pages_freed >= 1);
    assert!(heap.allocated_pages() < heap.page_count() / 2);
}

#[test]
fn metrics_report_the_last_collection() {
    let mut heap = heap(32);
    let mut cell: *mut usize = ptr::null_mut();
    unsafe { heap.register_global_root(&raw mut cell) };
    cell = heap.allocate(16, 0).as_ptr();

    heap.collect();

    let metrics = heap.last_gc_metrics();
    assert_eq!(metrics.total_collections, 1);
    assert_eq!(metrics.objects_copied, 1);
    assert_eq!(metrics.words_copied, 3);
    assert_eq!(metrics.pages_promoted, 0);
    assert_eq!(metrics.pages_allocated, 1);
    assert_eq!(metrics.pages_freed, 1);
}
