//! The zebra block heap.
//!
//! One contiguous reservation is carved into two-page slabs: a writable
//! even page followed by a guard page that stays `NoAccess` for the
//! heap's whole lifetime. Allocations are placed at the tail of the
//! even page so the first byte past the body is already inside the
//! guard, and freed blocks can sit in a FIFO quarantine so stale
//! pointers keep pointing at memory the heap still controls.

use crate::block::{BlockHeader, BlockInfo, BLOCK_HEADER_MAGIC, BLOCK_HEADER_SIZE};
use crate::constants::{
    DEFAULT_QUARANTINE_RATIO, MAX_RAW_ALLOCATION_SIZE, PAGE_SIZE, SHADOW_RATIO, SLAB_SIZE,
};
use crate::error::HeapError;
use crate::layout::{align_up, plan_block_layout, BlockLayout};
use crate::notifier::{MemoryNotifier, NullMemoryNotifier};
use crate::quarantine::{PushResult, Quarantine, TrimColor};
use crate::stats::HeapMetrics;
use crate::syscall::{protect_region, release_region, reserve_region, PageProtection};
use core::ptr::NonNull;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Lifecycle state of one slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlabState {
    Free,
    Allocated,
    Quarantined,
}

/// One row of the slab table. The table is the single source of truth;
/// the free and quarantine queues only order the indices.
#[derive(Debug, Clone, Copy)]
struct SlabRecord {
    state: SlabState,
    info: Option<BlockInfo>,
}

impl SlabRecord {
    const FREE: Self = Self {
        state: SlabState::Free,
        info: None,
    };
}

/// Everything mutable, behind one lock.
#[derive(Debug)]
struct HeapState {
    slabs: Vec<SlabRecord>,
    free: VecDeque<usize>,
    quarantine: Quarantine,
}

/// A guard-page slab heap.
///
/// Construction reserves the whole region and protects every odd page;
/// no protection syscalls happen afterwards. All public operations take
/// `&self` and serialize on an internal lock, so a heap can be shared
/// freely between threads.
///
/// ```
/// use zebra_heap::ZebraBlockHeap;
///
/// let heap = ZebraBlockHeap::new(8 * zebra_heap::SLAB_SIZE).unwrap();
/// let ptr = heap.allocate(128).unwrap();
/// unsafe { ptr.as_ptr().write(42) };
/// assert!(heap.free(ptr));
/// ```
#[derive(Debug)]
pub struct ZebraBlockHeap<N: MemoryNotifier = NullMemoryNotifier> {
    base: NonNull<u8>,
    heap_size: usize,
    slab_count: usize,
    state: Mutex<HeapState>,
    metrics: HeapMetrics,
    notifier: N,
}

// The heap owns its reservation outright and every mutation goes
// through the internal mutex; the raw base pointer is what blocks the
// auto impls.
unsafe impl<N: MemoryNotifier + Send> Send for ZebraBlockHeap<N> {}
unsafe impl<N: MemoryNotifier + Sync> Sync for ZebraBlockHeap<N> {}

impl ZebraBlockHeap<NullMemoryNotifier> {
    /// Creates a heap over `heap_size` bytes (rounded down to a whole
    /// number of slabs) with no telemetry.
    ///
    /// # Errors
    /// [`HeapError::Reservation`] when the rounded size is zero or the
    /// OS refuses the mapping or the guard protections.
    pub fn new(heap_size: usize) -> Result<Self, HeapError> {
        Self::with_notifier(heap_size, NullMemoryNotifier)
    }
}

impl<N: MemoryNotifier> ZebraBlockHeap<N> {
    /// Creates a heap that reports reservation events to `notifier`.
    ///
    /// # Errors
    /// [`HeapError::Reservation`] when the rounded size is zero or the
    /// OS refuses the mapping or the guard protections.
    pub fn with_notifier(heap_size: usize, notifier: N) -> Result<Self, HeapError> {
        debug_assert_eq!(
            crate::syscall::system_page_size(),
            PAGE_SIZE,
            "slab geometry assumes 4KB pages"
        );

        let heap_size = heap_size - heap_size % SLAB_SIZE;
        if heap_size == 0 {
            return Err(HeapError::Reservation);
        }
        let slab_count = heap_size / SLAB_SIZE;

        let base = reserve_region(heap_size).ok_or(HeapError::Reservation)?;
        notifier.notify_reservation(base.as_ptr(), heap_size);

        // Guard every odd page now; the one-time O(slab_count) syscall
        // cost keeps protections off the allocation path entirely.
        for index in 0..slab_count {
            let odd = unsafe {
                NonNull::new_unchecked(base.as_ptr().add(index * SLAB_SIZE + PAGE_SIZE))
            };
            let protected =
                unsafe { protect_region(odd, PAGE_SIZE, PageProtection::NoAccess) };
            if !protected {
                unsafe { release_region(base, heap_size) };
                return Err(HeapError::Reservation);
            }
            notifier.notify_internal_use(odd.as_ptr(), PAGE_SIZE);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            base = ?base.as_ptr(),
            heap_size,
            slab_count,
            "reserved guard-page heap"
        );

        Ok(Self {
            base,
            heap_size,
            slab_count,
            state: Mutex::new(HeapState {
                slabs: vec![SlabRecord::FREE; slab_count],
                free: (0..slab_count).collect(),
                quarantine: Quarantine::new(heap_size, DEFAULT_QUARANTINE_RATIO),
            }),
            metrics: HeapMetrics::new(),
            notifier,
        })
    }

    /// Base address of the reservation.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Size of the reservation in bytes; a multiple of the slab size.
    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    /// Number of slabs in the reservation.
    pub fn slab_count(&self) -> usize {
        self.slab_count
    }

    /// Address of slab `index`, or `None` past the end.
    pub fn slab_address(&self, index: usize) -> Option<NonNull<u8>> {
        if index >= self.slab_count {
            return None;
        }
        Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(index * SLAB_SIZE)) })
    }

    /// Largest body the block path accepts.
    pub fn max_block_allocation_size(&self) -> usize {
        PAGE_SIZE - BLOCK_HEADER_SIZE
    }

    /// Largest request the raw path accepts.
    pub fn max_raw_allocation_size(&self) -> usize {
        MAX_RAW_ALLOCATION_SIZE
    }

    /// The heap's counters.
    pub fn metrics(&self) -> &HeapMetrics {
        &self.metrics
    }

    /// Slabs currently free.
    pub fn free_slabs(&self) -> usize {
        self.lock().free.len()
    }

    /// Slabs currently quarantined.
    pub fn quarantined_slabs(&self) -> usize {
        self.lock().quarantine.len()
    }

    /// Slabs currently allocated.
    pub fn allocated_slabs(&self) -> usize {
        let state = self.lock();
        self.slab_count - state.free.len() - state.quarantine.len()
    }

    /// Allocates `bytes` so the last byte of the buffer abuts the guard
    /// page exactly. The pointer carries no alignment promise; callers
    /// that need aligned bodies use [`allocate_block`](Self::allocate_block).
    ///
    /// Returns `None` for zero or oversize requests and when no slab is
    /// free.
    pub fn allocate(&self, bytes: usize) -> Option<NonNull<u8>> {
        if bytes == 0 || bytes > MAX_RAW_ALLOCATION_SIZE {
            self.metrics.on_failed_alloc();
            return None;
        }

        let mut state = self.lock();
        let index = match state.free.pop_front() {
            Some(index) => index,
            None => {
                self.metrics.on_failed_alloc();
                return None;
            }
        };

        let offset = PAGE_SIZE - bytes;
        let ptr = unsafe {
            NonNull::new_unchecked(self.base.as_ptr().add(index * SLAB_SIZE + offset))
        };
        state.slabs[index] = SlabRecord {
            state: SlabState::Allocated,
            info: Some(BlockInfo {
                header: ptr,
                body: ptr,
                body_size: bytes as u32,
                block_size: (bytes + PAGE_SIZE) as u32,
            }),
        };
        self.metrics.on_raw_alloc(bytes);
        self.check_invariants(&state);
        Some(ptr)
    }

    /// Allocates a guarded block: the body is `SHADOW_RATIO`-aligned
    /// and placed at the highest such offset, so its end sits at most
    /// `SHADOW_RATIO - 1` bytes below the guard page (exactly flush for
    /// aligned sizes). At least `min_left_redzone` bytes of header and
    /// padding precede the body; the trailer region, sized to at least
    /// `min_right_redzone`, lies behind the guard and is unreadable.
    ///
    /// # Errors
    /// [`HeapError::TooLarge`] when the body or a redzone cannot fit
    /// the even page; [`HeapError::OutOfCapacity`] when no slab is free.
    pub fn allocate_block(
        &self,
        body_size: u32,
        min_left_redzone: u32,
        min_right_redzone: u32,
    ) -> Result<(NonNull<u8>, BlockLayout), HeapError> {
        if body_size == 0 || body_size as usize > self.max_block_allocation_size() {
            self.metrics.on_failed_alloc();
            return Err(HeapError::TooLarge);
        }
        if min_right_redzone as usize > PAGE_SIZE {
            self.metrics.on_failed_alloc();
            return Err(HeapError::TooLarge);
        }

        let body_offset = PAGE_SIZE - align_up(body_size as usize, SHADOW_RATIO);
        if body_offset < BLOCK_HEADER_SIZE || (min_left_redzone as usize) > body_offset {
            self.metrics.on_failed_alloc();
            return Err(HeapError::TooLarge);
        }
        let trailing_pad = PAGE_SIZE - body_offset - body_size as usize;

        let layout = plan_block_layout(
            body_size,
            body_offset as u32,
            min_right_redzone,
            SHADOW_RATIO as u32,
            trailing_pad as u32,
        )
        .ok_or(HeapError::TooLarge)?;
        debug_assert_eq!(layout.body_offset as usize, body_offset);
        debug_assert_eq!(layout.total_size as usize, SLAB_SIZE);

        let mut state = self.lock();
        let index = match state.free.pop_front() {
            Some(index) => index,
            None => {
                self.metrics.on_failed_alloc();
                return Err(HeapError::OutOfCapacity);
            }
        };

        let header = unsafe {
            NonNull::new_unchecked(self.base.as_ptr().add(index * SLAB_SIZE))
        };
        unsafe {
            header.as_ptr().cast::<BlockHeader>().write(BlockHeader {
                magic: BLOCK_HEADER_MAGIC,
                body_size,
            });
        }
        let body = unsafe { NonNull::new_unchecked(header.as_ptr().add(body_offset)) };

        state.slabs[index] = SlabRecord {
            state: SlabState::Allocated,
            info: Some(BlockInfo {
                header,
                body,
                body_size,
                block_size: SLAB_SIZE as u32,
            }),
        };
        self.metrics.on_block_alloc(body_size as usize);
        self.check_invariants(&state);
        Ok((body, layout))
    }

    /// Frees a raw allocation. `ptr` must be exactly the pointer
    /// [`allocate`](Self::allocate) returned; interior pointers,
    /// foreign addresses, and slabs in any other state return false
    /// with nothing changed.
    pub fn free(&self, ptr: NonNull<u8>) -> bool {
        let mut state = self.lock();
        let index = match self.checked_header_index(&state, ptr.as_ptr()) {
            Some(index) => index,
            None => return false,
        };
        state.slabs[index] = SlabRecord::FREE;
        state.free.push_back(index);
        self.metrics.on_free();
        self.check_invariants(&state);
        true
    }

    /// Frees a block allocation. The descriptor must match the slab's
    /// recorded descriptor exactly; mismatches return false with
    /// nothing changed.
    pub fn free_block(&self, info: &BlockInfo) -> bool {
        let mut state = self.lock();
        let index = match self.checked_descriptor_index(&state, info) {
            Some(index) => index,
            None => return false,
        };
        state.slabs[index] = SlabRecord::FREE;
        state.free.push_back(index);
        self.metrics.on_free();
        self.check_invariants(&state);
        true
    }

    /// True iff `ptr` is the exact header address of a slab currently
    /// allocated. Interior pointers and quarantined slabs answer false.
    pub fn is_allocated(&self, ptr: NonNull<u8>) -> bool {
        let state = self.lock();
        self.checked_header_index(&state, ptr.as_ptr()).is_some()
    }

    /// Body size recorded for the allocation whose header is exactly
    /// `ptr`, or `None` under the same rules as
    /// [`is_allocated`](Self::is_allocated).
    pub fn allocation_size(&self, ptr: NonNull<u8>) -> Option<u32> {
        let state = self.lock();
        let index = self.checked_header_index(&state, ptr.as_ptr())?;
        state.slabs[index].info.map(|info| info.body_size)
    }

    /// Moves an allocated block into the quarantine.
    ///
    /// On success the result is [`PushResult::SyncTrimRequired`]: the
    /// caller must invoke [`pop`](Self::pop) once before finishing the
    /// operation, which is what keeps the ratio bound an invariant.
    /// A descriptor that does not name an allocated slab is rejected
    /// without mutation.
    pub fn push(&self, info: &BlockInfo) -> PushResult {
        let mut state = self.lock();
        let index = match self.checked_descriptor_index(&state, info) {
            Some(index) => index,
            None => {
                #[cfg(feature = "tracing")]
                tracing::trace!(header = ?info.header.as_ptr(), "quarantine push rejected");
                return PushResult::Rejected;
            }
        };
        state.slabs[index].state = SlabState::Quarantined;
        state.quarantine.enqueue(index);
        self.metrics.on_push();
        self.check_invariants(&state);
        PushResult::SyncTrimRequired
    }

    /// Removes the oldest quarantined block, returning its descriptor
    /// and the (always [`TrimColor::Green`]) trim color, or `None` when
    /// the quarantine is empty. The slab becomes free for reuse.
    pub fn pop(&self) -> Option<(BlockInfo, TrimColor)> {
        let mut state = self.lock();
        let index = state.quarantine.dequeue()?;
        debug_assert_eq!(state.slabs[index].state, SlabState::Quarantined);
        let info = state.slabs[index].info;
        state.slabs[index] = SlabRecord::FREE;
        state.free.push_back(index);
        self.metrics.on_pop();
        self.check_invariants(&state);
        info.map(|info| (info, TrimColor::Green))
    }

    /// Drains the whole quarantine in FIFO order, freeing every slab,
    /// and returns the descriptors so the caller can inspect or destroy
    /// contents.
    pub fn empty(&self) -> Vec<BlockInfo> {
        let mut state = self.lock();
        let indices: Vec<usize> = state.quarantine.drain().collect();
        let mut drained = Vec::with_capacity(indices.len());
        for index in indices {
            debug_assert_eq!(state.slabs[index].state, SlabState::Quarantined);
            if let Some(info) = state.slabs[index].info {
                drained.push(info);
            }
            state.slabs[index] = SlabRecord::FREE;
            state.free.push_back(index);
            self.metrics.on_pop();
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(count = drained.len(), "quarantine drained");
        self.check_invariants(&state);
        drained
    }

    /// Updates the quarantine ratio. Non-finite values are ignored and
    /// finite values are clamped to `[0, 1]`. No trimming happens here;
    /// the bound is re-established by the next push/pop pair.
    pub fn set_quarantine_ratio(&self, ratio: f32) {
        self.lock().quarantine.set_ratio(ratio);
    }

    /// The current quarantine ratio.
    pub fn quarantine_ratio(&self) -> f32 {
        self.lock().quarantine.ratio()
    }

    /// Slab-count form of the quarantine's byte-ratio bound.
    pub fn max_quarantined_slabs(&self) -> usize {
        self.lock().quarantine.max_slabs()
    }

    /// Shard id for a descriptor. This heap is unsharded, so the id is
    /// always 0 and [`lock_shard`](Self::lock_shard) /
    /// [`unlock_shard`](Self::unlock_shard) are no-ops; the heap's own
    /// lock already guards every push and pop.
    pub fn lock_id(&self, info: &BlockInfo) -> usize {
        let _ = info;
        0
    }

    /// No-op; see [`lock_id`](Self::lock_id).
    pub fn lock_shard(&self, id: usize) {
        debug_assert_eq!(id, 0);
    }

    /// No-op; see [`lock_id`](Self::lock_id).
    pub fn unlock_shard(&self, id: usize) {
        debug_assert_eq!(id, 0);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeapState> {
        self.state.lock().unwrap()
    }

    /// Slab index for `addr`, or `None` outside the reservation.
    fn index_of(&self, addr: *const u8) -> Option<usize> {
        let base = self.base.as_ptr() as usize;
        let addr = addr as usize;
        if addr < base || addr >= base + self.heap_size {
            return None;
        }
        Some((addr - base) / SLAB_SIZE)
    }

    /// Index of the allocated slab whose recorded header is exactly
    /// `addr`.
    fn checked_header_index(&self, state: &HeapState, addr: *const u8) -> Option<usize> {
        let index = self.index_of(addr)?;
        let record = &state.slabs[index];
        if record.state != SlabState::Allocated {
            return None;
        }
        match record.info {
            Some(info) if core::ptr::eq(info.header.as_ptr(), addr.cast_mut()) => Some(index),
            _ => None,
        }
    }

    /// Index of the allocated slab whose recorded descriptor equals
    /// `info`.
    fn checked_descriptor_index(&self, state: &HeapState, info: &BlockInfo) -> Option<usize> {
        let index = self.index_of(info.header.as_ptr())?;
        let record = &state.slabs[index];
        if record.state != SlabState::Allocated {
            return None;
        }
        match record.info {
            Some(recorded) if recorded == *info => Some(index),
            _ => None,
        }
    }

    /// Debug-build sweep: the queues and the table must describe the
    /// same partition, and every descriptor must stay inside its slab's
    /// even page.
    #[cfg(debug_assertions)]
    fn check_invariants(&self, state: &HeapState) {
        let mut queued = vec![None::<SlabState>; self.slab_count];
        for &index in &state.free {
            assert!(queued[index].is_none(), "slab {index} queued twice");
            queued[index] = Some(SlabState::Free);
        }
        for index in state.quarantine.iter() {
            assert!(queued[index].is_none(), "slab {index} queued twice");
            queued[index] = Some(SlabState::Quarantined);
        }

        for (index, record) in state.slabs.iter().enumerate() {
            match record.state {
                SlabState::Allocated => assert!(queued[index].is_none()),
                other => assert_eq!(queued[index], Some(other)),
            }
            match record.state {
                SlabState::Free => assert!(record.info.is_none()),
                _ => {
                    let info = record.info.expect("live slab without descriptor");
                    let slab_base = self.base.as_ptr() as usize + index * SLAB_SIZE;
                    let even_end = slab_base + PAGE_SIZE;
                    assert!(info.header.as_ptr() as usize >= slab_base);
                    assert!(info.body.as_ptr() as usize >= info.header.as_ptr() as usize);
                    assert!(info.body_end() as usize <= even_end);
                }
            }
        }
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self, _state: &HeapState) {}
}

impl<N: MemoryNotifier> Drop for ZebraBlockHeap<N> {
    fn drop(&mut self) {
        self.notifier
            .notify_returned_to_os(self.base.as_ptr(), self.heap_size);
        unsafe { release_region(self.base, self.heap_size) };
    }
}
