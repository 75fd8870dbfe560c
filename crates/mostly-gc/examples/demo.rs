//! A thin host: map a heap, register a root, build a list, collect.
//!
//! Run with `cargo run --example demo`.

use std::ptr;

use mostly_gc::{get_stack_bounds, Heap, HeapConfig, PAGE_BYTES};

fn main() -> std::io::Result<()> {
    let bounds = get_stack_bounds();
    let mut heap =
        Heap::new(HeapConfig::new(1024 * PAGE_BYTES).stack_base(bounds.deepest_word()))?;

    let mut list: *mut usize = ptr::null_mut();
    unsafe { heap.register_global_root(&raw mut list) };

    // A list of 1000 nodes: one pointer slot, one payload word each.
    for value in 0..1000usize {
        let node = heap.allocate(16, 1);
        unsafe {
            node.as_ptr().write(list as usize);
            node.as_ptr().add(1).write(value);
        }
        list = node.as_ptr();
    }

    heap.collect();
    let metrics = heap.last_gc_metrics();
    println!(
        "collected in {:?}: {} object(s) copied, {} page(s) promoted, {} page(s) freed",
        metrics.duration, metrics.objects_copied, metrics.pages_promoted, metrics.pages_freed
    );

    // The cell now names the list's post-collection address; walk it.
    let mut sum = 0usize;
    let mut node = list;
    while !node.is_null() {
        unsafe {
            sum += node.add(1).read();
            node = node.read() as *mut usize;
        }
    }
    println!("list intact: 1000 nodes, payload sum {sum}");
    Ok(())
}
