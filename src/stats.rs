//! Allocation counters.

use core::sync::atomic::{AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use serde::Serialize;

/// Per-heap counters, updated with relaxed atomics so the hot path
/// stays a couple of uncontended increments.
#[derive(Debug, Default)]
pub struct HeapMetrics {
    block_allocations: CachePadded<AtomicUsize>,
    raw_allocations: CachePadded<AtomicUsize>,
    frees: CachePadded<AtomicUsize>,
    failed_allocations: CachePadded<AtomicUsize>,
    allocated_bytes: CachePadded<AtomicUsize>,
    quarantine_pushes: CachePadded<AtomicUsize>,
    quarantine_pops: CachePadded<AtomicUsize>,
}

impl HeapMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub(crate) fn on_block_alloc(&self, size: usize) {
        self.block_allocations.fetch_add(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_add(size, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn on_raw_alloc(&self, size: usize) {
        self.raw_allocations.fetch_add(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_add(size, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn on_free(&self) {
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn on_failed_alloc(&self) {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn on_push(&self) {
        self.quarantine_pushes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn on_pop(&self) {
        self.quarantine_pops.fetch_add(1, Ordering::Relaxed);
    }

    /// A coherent-enough copy of the counters (each read individually,
    /// relaxed).
    pub fn snapshot(&self) -> HeapStats {
        HeapStats {
            block_allocations: self.block_allocations.load(Ordering::Relaxed),
            raw_allocations: self.raw_allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            quarantine_pushes: self.quarantine_pushes.load(Ordering::Relaxed),
            quarantine_pops: self.quarantine_pops.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`HeapMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeapStats {
    /// Successful block-path allocations.
    pub block_allocations: usize,
    /// Successful raw-path allocations.
    pub raw_allocations: usize,
    /// Successful direct frees (quarantine pops are counted separately).
    pub frees: usize,
    /// Allocations rejected for size or capacity.
    pub failed_allocations: usize,
    /// Total body bytes handed out over the heap's lifetime.
    pub allocated_bytes: usize,
    /// Accepted quarantine pushes.
    pub quarantine_pushes: usize,
    /// Quarantine pops, including those from a drain.
    pub quarantine_pops: usize,
}
