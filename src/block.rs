//! Block descriptors and the in-memory block header.

use core::ptr::NonNull;

/// Magic value written at the start of every block-path slab.
pub const BLOCK_HEADER_MAGIC: u32 = 0x5A42_4845;

/// A header embedded at the start of the even page of every block
/// allocation. The body follows at the planned offset; everything in
/// between is left redzone.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Always [`BLOCK_HEADER_MAGIC`] while the block is live.
    pub magic: u32,
    /// The caller-requested body size.
    pub body_size: u32,
}

/// Size of [`BlockHeader`]. Must stay a multiple of the shadow ratio so
/// the minimal body offset is representable.
pub const BLOCK_HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();

/// Bytes reserved for trailer metadata at the very end of a block.
///
/// For guarded blocks the trailer sits behind the guard page, so the
/// heap never reads or writes it; the constant only shapes the layout.
pub const BLOCK_TRAILER_SIZE: usize = 16;

/// Compact descriptor of a live (allocated or quarantined) block.
///
/// Descriptors are plain values: they do not own the memory they point
/// at, and every operation that takes one revalidates it against the
/// slab table before mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Start of the block (the slab base for block allocations, the
    /// returned pointer for raw allocations).
    pub header: NonNull<u8>,
    /// Start of the caller-usable body.
    pub body: NonNull<u8>,
    /// Caller-requested body size in bytes.
    pub body_size: u32,
    /// Total block size from header to the end of the trailer.
    pub block_size: u32,
}

// A descriptor is an inert pair of addresses plus sizes; it is never
// dereferenced without revalidation against the slab table, which the
// heap lock guards.
unsafe impl Send for BlockInfo {}
unsafe impl Sync for BlockInfo {}

impl BlockInfo {
    /// Address one past the last body byte.
    pub fn body_end(&self) -> *const u8 {
        unsafe { self.body.as_ptr().add(self.body_size as usize) }
    }
}
