//! The three facets of the heap.
//!
//! Callers that only need one face of [`ZebraBlockHeap`] — plain
//! allocation, guarded blocks, or the quarantine — can take the
//! matching trait instead of the concrete type. All three are thin
//! facades over the same inner state, so calling across facets never
//! re-enters a lock.

use crate::block::BlockInfo;
use crate::error::HeapError;
use crate::heap::ZebraBlockHeap;
use crate::layout::BlockLayout;
use crate::notifier::MemoryNotifier;
use crate::quarantine::{PushResult, TrimColor};
use core::ptr::NonNull;

/// Raw allocation: buffers placed flush against the guard page.
pub trait HeapOps {
    /// Allocates `bytes` ending exactly at the guard page, or `None`.
    fn allocate(&self, bytes: usize) -> Option<NonNull<u8>>;

    /// Frees an allocation by its exact returned pointer.
    fn free(&self, ptr: NonNull<u8>) -> bool;

    /// True iff `ptr` is the exact header address of an allocated slab.
    fn is_allocated(&self, ptr: NonNull<u8>) -> bool;

    /// Recorded body size for the allocation at exactly `ptr`.
    fn allocation_size(&self, ptr: NonNull<u8>) -> Option<u32>;
}

/// Guarded-block allocation with redzone and alignment constraints.
pub trait BlockHeapOps {
    /// Allocates an aligned body at the tail of the even page.
    ///
    /// # Errors
    /// [`HeapError::TooLarge`] or [`HeapError::OutOfCapacity`].
    fn allocate_block(
        &self,
        body_size: u32,
        min_left_redzone: u32,
        min_right_redzone: u32,
    ) -> Result<(NonNull<u8>, BlockLayout), HeapError>;

    /// Frees a block by its exact descriptor.
    fn free_block(&self, info: &BlockInfo) -> bool;
}

/// The quarantine face: bounded FIFO with synchronous trimming.
pub trait BlockQuarantineOps {
    /// Quarantines an allocated block. A [`PushResult::SyncTrimRequired`]
    /// obliges the caller to [`pop`](Self::pop) once in the same
    /// operation.
    fn push(&self, info: &BlockInfo) -> PushResult;

    /// Evicts the oldest quarantined block, or `None` when empty.
    fn pop(&self) -> Option<(BlockInfo, TrimColor)>;

    /// Drains the quarantine in FIFO order.
    fn empty(&self) -> Vec<BlockInfo>;

    /// Updates the byte-ratio bound (clamped to `[0, 1]`).
    fn set_quarantine_ratio(&self, ratio: f32);

    /// The current byte-ratio bound.
    fn quarantine_ratio(&self) -> f32;

    /// Shard id for `info`; always 0 on an unsharded heap.
    fn lock_id(&self, info: &BlockInfo) -> usize;

    /// Locks the shard `id`; a no-op on an unsharded heap.
    fn lock_shard(&self, id: usize);

    /// Unlocks the shard `id`; a no-op on an unsharded heap.
    fn unlock_shard(&self, id: usize);
}

impl<N: MemoryNotifier> HeapOps for ZebraBlockHeap<N> {
    fn allocate(&self, bytes: usize) -> Option<NonNull<u8>> {
        ZebraBlockHeap::allocate(self, bytes)
    }

    fn free(&self, ptr: NonNull<u8>) -> bool {
        ZebraBlockHeap::free(self, ptr)
    }

    fn is_allocated(&self, ptr: NonNull<u8>) -> bool {
        ZebraBlockHeap::is_allocated(self, ptr)
    }

    fn allocation_size(&self, ptr: NonNull<u8>) -> Option<u32> {
        ZebraBlockHeap::allocation_size(self, ptr)
    }
}

impl<N: MemoryNotifier> BlockHeapOps for ZebraBlockHeap<N> {
    fn allocate_block(
        &self,
        body_size: u32,
        min_left_redzone: u32,
        min_right_redzone: u32,
    ) -> Result<(NonNull<u8>, BlockLayout), HeapError> {
        ZebraBlockHeap::allocate_block(self, body_size, min_left_redzone, min_right_redzone)
    }

    fn free_block(&self, info: &BlockInfo) -> bool {
        ZebraBlockHeap::free_block(self, info)
    }
}

impl<N: MemoryNotifier> BlockQuarantineOps for ZebraBlockHeap<N> {
    fn push(&self, info: &BlockInfo) -> PushResult {
        ZebraBlockHeap::push(self, info)
    }

    fn pop(&self) -> Option<(BlockInfo, TrimColor)> {
        ZebraBlockHeap::pop(self)
    }

    fn empty(&self) -> Vec<BlockInfo> {
        ZebraBlockHeap::empty(self)
    }

    fn set_quarantine_ratio(&self, ratio: f32) {
        ZebraBlockHeap::set_quarantine_ratio(self, ratio);
    }

    fn quarantine_ratio(&self) -> f32 {
        ZebraBlockHeap::quarantine_ratio(self)
    }

    fn lock_id(&self, info: &BlockInfo) -> usize {
        ZebraBlockHeap::lock_id(self, info)
    }

    fn lock_shard(&self, id: usize) {
        ZebraBlockHeap::lock_shard(self, id);
    }

    fn unlock_shard(&self, id: usize) {
        ZebraBlockHeap::unlock_shard(self, id);
    }
}
