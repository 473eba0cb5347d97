//! Tracking Allocator
//!
//! Wraps the system allocator and keeps process-wide counters so a benchmark
//! can snapshot heap activity before and after a capture session.
//!
//! Install it in the binary:
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: loopbench_core::TrackingAllocator = loopbench_core::TrackingAllocator;
//! ```

use serde::{Deserialize, Serialize};
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOCATION_COUNT: AtomicU64 = AtomicU64::new(0);
static FREED_BYTES: AtomicU64 = AtomicU64::new(0);
static FREE_COUNT: AtomicU64 = AtomicU64::new(0);
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Global allocator that counts every allocation and deallocation
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        FREED_BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
        FREE_COUNT.fetch_add(1, Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            // Counted as a free of the old block plus a fresh allocation
            FREED_BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
            FREE_COUNT.fetch_add(1, Ordering::Relaxed);
            record_alloc(new_size);
        }
        new_ptr
    }
}

#[inline]
fn record_alloc(size: usize) {
    INSTALLED.store(true, Ordering::Relaxed);
    ALLOCATED_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    ALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Whether `TrackingAllocator` has seen any allocation in this process.
///
/// When false the counters are all zero and snapshots carry no information.
pub fn is_tracking() -> bool {
    INSTALLED.load(Ordering::Relaxed)
}

/// Point-in-time view of process heap counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Cumulative bytes allocated since process start
    pub total_alloc_bytes: u64,
    /// Cumulative number of allocations
    pub total_allocs: u64,
    /// Bytes currently live on the heap
    pub live_bytes: u64,
    /// Allocations currently live
    pub live_allocs: u64,
    /// Garbage collections run (always 0, no collector)
    pub collections: u64,
    /// Total collector pause time in nanoseconds (always 0)
    pub collection_pause_ns: u64,
}

impl MemorySnapshot {
    /// Difference between this snapshot and an earlier one
    pub fn delta_since(&self, before: &MemorySnapshot) -> MemoryDelta {
        MemoryDelta {
            alloc_bytes: self.total_alloc_bytes.saturating_sub(before.total_alloc_bytes),
            allocs: self.total_allocs.saturating_sub(before.total_allocs),
            collections: self.collections.saturating_sub(before.collections),
        }
    }
}

/// Heap activity between two snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDelta {
    /// Bytes allocated in the interval
    pub alloc_bytes: u64,
    /// Allocations made in the interval
    pub allocs: u64,
    /// Collections in the interval
    pub collections: u64,
}

/// Read the current process-wide counters
pub fn memory_snapshot() -> MemorySnapshot {
    let allocated = ALLOCATED_BYTES.load(Ordering::Relaxed);
    let allocs = ALLOCATION_COUNT.load(Ordering::Relaxed);
    let freed = FREED_BYTES.load(Ordering::Relaxed);
    let frees = FREE_COUNT.load(Ordering::Relaxed);
    MemorySnapshot {
        total_alloc_bytes: allocated,
        total_allocs: allocs,
        live_bytes: allocated.saturating_sub(freed),
        live_allocs: allocs.saturating_sub(frees),
        collections: 0,
        collection_pause_ns: 0,
    }
}
