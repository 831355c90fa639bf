//! Process-wide size constants for the slab geometry.

/// The system page size (4KB). Checked against the OS in debug builds
/// when a heap is constructed.
pub const PAGE_SIZE: usize = 4096;

/// A slab is a writable page followed by a guard page.
pub const SLAB_SIZE: usize = 2 * PAGE_SIZE;

/// Alignment every body pointer must satisfy so a companion shadow
/// structure can describe it. Must be a power of two.
pub const SHADOW_RATIO: usize = 8;

/// Largest request the raw [`allocate`](crate::ZebraBlockHeap::allocate)
/// path accepts.
pub const MAX_RAW_ALLOCATION_SIZE: usize = PAGE_SIZE;

/// Fraction of the reservation the quarantine may hold by default.
pub const DEFAULT_QUARANTINE_RATIO: f32 = 0.25;
