//! # `zebra-heap` — guard-page slab heap
//!
//! A specialized allocator for catching memory bugs: every allocation
//! lives at the tail of a writable page that sits directly against an
//! inaccessible guard page, so most right-side buffer overflows fault
//! on the spot instead of corrupting neighbours. Freed blocks can pass
//! through a bounded FIFO quarantine that delays reuse, so use-after-
//! free accesses keep hitting memory the heap still controls.
//!
//! ## Key properties
//!
//! - **Fault on overflow**: the first byte past an allocation's body is
//!   (at most a few alignment-slack bytes before) the start of a
//!   `NoAccess` page.
//! - **Slab-indexed**: the reservation is one contiguous region split
//!   into two-page slabs addressed by index; all metadata lives in one
//!   table outside the reservation.
//! - **Bounded quarantine**: a byte-ratio cap with a synchronous trim
//!   protocol — every accepted push obliges one pop in the same
//!   operation.
//!
//! ## Example
//!
//! ```
//! use zebra_heap::{ZebraBlockHeap, PAGE_SIZE, SLAB_SIZE};
//!
//! let heap = ZebraBlockHeap::new(8 * SLAB_SIZE).unwrap();
//!
//! // An aligned 96-byte body with 8-byte redzones on both sides.
//! let (body, layout) = heap.allocate_block(96, 8, 8).unwrap();
//! assert_eq!(body.as_ptr() as usize % 8, 0);
//! assert_eq!(layout.body_size, 96);
//!
//! // The body ends exactly where the guard page begins.
//! let slab = heap.slab_address(0).unwrap();
//! assert_eq!(body.as_ptr() as usize + 96, slab.as_ptr() as usize + PAGE_SIZE);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod block;
pub mod constants;
pub mod error;
mod heap;
pub mod interface;
pub mod layout;
pub mod notifier;
pub mod quarantine;
pub mod stats;
pub mod syscall;

pub use block::{BlockHeader, BlockInfo, BLOCK_HEADER_MAGIC};
pub use constants::{
    DEFAULT_QUARANTINE_RATIO, MAX_RAW_ALLOCATION_SIZE, PAGE_SIZE, SHADOW_RATIO, SLAB_SIZE,
};
pub use error::HeapError;
pub use heap::ZebraBlockHeap;
pub use interface::{BlockHeapOps, BlockQuarantineOps, HeapOps};
pub use layout::{plan_block_layout, BlockLayout};
pub use notifier::{MemoryNotifier, NullMemoryNotifier};
pub use quarantine::{PushResult, TrimColor};
pub use stats::{HeapMetrics, HeapStats};

// Compile-time checks on the slab geometry.
const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(SHADOW_RATIO.is_power_of_two());
    assert!(SLAB_SIZE == 2 * PAGE_SIZE);

    // The minimal body offset must be expressible: a header always fits
    // in front of a shadow-aligned body.
    assert!(block::BLOCK_HEADER_SIZE % SHADOW_RATIO == 0);
    assert!(block::BLOCK_HEADER_SIZE == core::mem::size_of::<BlockHeader>());
    assert!(block::BLOCK_TRAILER_SIZE <= PAGE_SIZE);

    // Descriptors stay small; they are copied around freely.
    assert!(core::mem::size_of::<BlockInfo>() <= 4 * core::mem::size_of::<usize>());
};
