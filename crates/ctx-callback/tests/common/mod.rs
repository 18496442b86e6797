//! Allocation-tracking global allocator shared by the lifecycle tests
//!
//! Counts are kept per thread, so tests running in parallel do not see each
//! other's allocations.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ffi::c_void;
use std::ptr;

pub struct TrackingAllocator;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
    static DEALLOCATIONS: Cell<usize> = const { Cell::new(0) };
    static FAIL_NEXT: Cell<bool> = const { Cell::new(false) };
    static WATCHED: Cell<usize> = const { Cell::new(0) };
    static WATCHED_FREED: Cell<bool> = const { Cell::new(false) };
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if FAIL_NEXT.try_with(|fail| fail.replace(false)).unwrap_or(false) {
            return ptr::null_mut();
        }
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _ = DEALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        let _ = WATCHED.try_with(|watched| {
            if watched.get() == ptr as usize {
                // Unwatch so a later block at the same address is ignored.
                watched.set(0);
                WATCHED_FREED.with(|freed| freed.set(true));
            }
        });
        unsafe { System.dealloc(ptr, layout) }
    }
}

/// Allocation and deallocation totals for the current thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub allocations: usize,
    pub deallocations: usize,
}

impl Counts {
    pub fn now() -> Self {
        Self {
            allocations: ALLOCATIONS.with(Cell::get),
            deallocations: DEALLOCATIONS.with(Cell::get),
        }
    }

    /// Activity on this thread since `self` was taken
    pub fn since(self) -> Self {
        let now = Self::now();
        Self {
            allocations: now.allocations - self.allocations,
            deallocations: now.deallocations - self.deallocations,
        }
    }

    pub fn of(allocations: usize, deallocations: usize) -> Self {
        Self {
            allocations,
            deallocations,
        }
    }
}

/// Make the next allocation on this thread return null.
pub fn fail_next_allocation() {
    FAIL_NEXT.with(|fail| fail.set(true));
}

/// Watch one block on this thread, e.g. a holder, for its deallocation.
///
/// Panicking allocates and frees on its own, so totals from [`Counts`] are
/// not exact across an unwind; this tracks a single address instead.
pub fn watch_deallocation(ptr: *mut c_void) {
    WATCHED.with(|watched| watched.set(ptr as usize));
    WATCHED_FREED.with(|freed| freed.set(false));
}

/// Whether the watched block has been freed since [`watch_deallocation`]
pub fn watched_was_freed() -> bool {
    WATCHED_FREED.with(Cell::get)
}
