//! Conservative machine-stack access.
//!
//! This module supplies the two capabilities the collector needs from the
//! platform: discovering the current thread's stack bounds (so a host can
//! configure a correct stack base) and spilling CPU registers onto the
//! stack before a scan, so callee-saved registers are covered by the walk.

use crate::object::WORD_BYTES;

/// Bounds of a thread's stack.
#[derive(Debug, Clone, Copy)]
pub struct StackBounds {
    /// The bottom of the stack (highest address, exclusive).
    pub bottom: usize,
    /// The top of the stack (lowest address).
    pub top: usize,
}

impl StackBounds {
    /// Address of the deepest word of the stack, suitable for
    /// `HeapConfig::stack_base`.
    #[must_use]
    pub const fn deepest_word(&self) -> usize {
        self.bottom - WORD_BYTES
    }
}

/// Retrieve the stack bounds for the current thread.
#[cfg(miri)]
#[must_use]
pub fn get_stack_bounds() -> StackBounds {
    // Miri does not support stack scanning; return a range that results in
    // no scanning.
    StackBounds { bottom: 0, top: 0 }
}

/// Retrieve the stack bounds for the current thread.
#[cfg(all(target_os = "linux", not(miri)))]
#[must_use]
pub fn get_stack_bounds() -> StackBounds {
    use libc::{
        pthread_attr_destroy, pthread_attr_getstack, pthread_attr_t, pthread_getattr_np,
        pthread_self,
    };

    unsafe {
        let mut attr: pthread_attr_t = std::mem::zeroed();
        let ret = pthread_getattr_np(pthread_self(), &raw mut attr);
        assert!(ret == 0, "pthread_getattr_np failed");

        let mut stackaddr: *mut libc::c_void = std::ptr::null_mut();
        let mut stacksize: libc::size_t = 0;
        let ret = pthread_attr_getstack(&raw const attr, &raw mut stackaddr, &raw mut stacksize);
        if ret != 0 {
            pthread_attr_destroy(&raw mut attr);
            panic!("pthread_attr_getstack failed");
        }
        pthread_attr_destroy(&raw mut attr);

        StackBounds {
            bottom: (stackaddr as usize) + stacksize,
            top: stackaddr as usize,
        }
    }
}

/// Retrieve the stack bounds for the current thread (stub for non-Linux).
#[cfg(all(not(target_os = "linux"), not(miri)))]
#[must_use]
pub fn get_stack_bounds() -> StackBounds {
    unimplemented!("stack bounds retrieval only implemented for Linux")
}

/// Spill CPU registers onto the stack, then walk every aligned stack word
/// from the current frame up to and including `base`, handing each word's
/// value to `scan_fn`.
///
/// The spill is the barrier the conservative scan relies on: pointers held
/// only in callee-saved registers are flushed into this frame before the
/// top of the scan range is captured.
///
/// # Safety
///
/// `base` must lie within the current thread's stack, at or below (in
/// growth direction) the caller's frame.
#[inline(never)]
pub(crate) unsafe fn spill_registers_and_scan<F>(base: usize, mut scan_fn: F)
where
    F: FnMut(usize),
{
    // On x86_64 the callee-saved registers are spilled to an array in this
    // frame. Miri does not support inline assembly, so it is skipped there.
    #[cfg(all(target_arch = "x86_64", not(miri)))]
    let mut regs = [0usize; 6];
    #[cfg(all(target_arch = "x86_64", not(miri)))]
    unsafe {
        std::arch::asm!(
            "mov {0}, rbx",
            "mov {1}, rbp",
            "mov {2}, r12",
            "mov {3}, r13",
            "mov {4}, r14",
            "mov {5}, r15",
            out(reg) regs[0],
            out(reg) regs[1],
            out(reg) regs[2],
            out(reg) regs[3],
            out(reg) regs[4],
            out(reg) regs[5],
        );
    }
    #[cfg(all(target_arch = "x86_64", not(miri)))]
    std::hint::black_box(&regs);

    // Elsewhere a dummy spill array plus black_box keeps the compiler from
    // caching pointers in registers across the capture.
    #[cfg(any(not(target_arch = "x86_64"), miri))]
    let regs = [0usize; 32];
    #[cfg(any(not(target_arch = "x86_64"), miri))]
    std::hint::black_box(&regs);

    // The address of a local approximates the stack pointer; the scan
    // covers everything between it and the recorded base, inclusive.
    let sp = std::ptr::addr_of!(scan_fn) as usize;
    let mut current = sp & !(WORD_BYTES - 1);

    while current <= base {
        // SAFETY: the range is within the current thread's stack.
        let word = unsafe { std::ptr::read_volatile(current as *const usize) };
        scan_fn(word);
        current += WORD_BYTES;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn bounds_contain_a_local() {
        let bounds = get_stack_bounds();
        let local = 0u8;
        let addr = std::ptr::addr_of!(local) as usize;
        assert!(bounds.top <= addr && addr < bounds.bottom);
        assert!(bounds.deepest_word() < bounds.bottom);
    }

    #[test]
    fn scan_sees_a_word_planted_between_sp_and_base() {
        let sentinel: usize = 0x5afe_c0de;
        let base = std::ptr::addr_of!(sentinel) as usize;
        let mut found = false;
        unsafe {
            spill_registers_and_scan(base, |word| {
                if word == sentinel {
                    found = true;
                }
            });
        }
        assert!(found, "sentinel at the scan base was not reported");
    }
}
