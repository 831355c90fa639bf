//! Block layout planning.
//!
//! A block is header, header padding, body, trailer padding, trailer —
//! contiguous, in that order. The planner only does offset arithmetic;
//! deciding *where* the body must land (for this heap: flush against
//! the guard page) is the caller's job, expressed through the
//! `min_left_redzone` and `body_trailing_pad` arguments.

use crate::block::{BLOCK_HEADER_SIZE, BLOCK_TRAILER_SIZE};
use crate::constants::PAGE_SIZE;

/// Rounds `value` up to the next multiple of `alignment` (a power of two).
#[inline]
pub(crate) const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Rounds `value` down to a multiple of `alignment` (a power of two).
#[inline]
pub(crate) const fn align_down(value: usize, alignment: usize) -> usize {
    value & !(alignment - 1)
}

/// The planned shape of a block. All offsets are relative to the block
/// start and all fields are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Size of the block header.
    pub header_size: u32,
    /// Padding between the header and the body.
    pub header_padding_size: u32,
    /// Offset of the body: `header_size + header_padding_size`.
    pub body_offset: u32,
    /// Caller-requested body size.
    pub body_size: u32,
    /// Padding between the body and the trailer.
    pub trailer_padding_size: u32,
    /// Size of the trailer, including the right redzone.
    pub trailer_size: u32,
    /// Total block size; a whole number of pages.
    pub total_size: u32,
}

/// Plans a block layout.
///
/// The body is placed at `align_up(max(header_size, min_left_redzone),
/// body_alignment)` and followed by `body_trailing_pad` bytes before
/// the trailer region begins. The trailer is sized to at least
/// `min_right_redzone` and the total is rounded up to a whole number of
/// pages, with trailer padding absorbing the slack.
///
/// Returns `None` when `body_alignment` is not a power of two or the
/// arithmetic overflows `u32`.
pub fn plan_block_layout(
    body_size: u32,
    min_left_redzone: u32,
    min_right_redzone: u32,
    body_alignment: u32,
    body_trailing_pad: u32,
) -> Option<BlockLayout> {
    if body_alignment == 0 || !body_alignment.is_power_of_two() {
        return None;
    }

    let header_size = BLOCK_HEADER_SIZE as u64;
    let alignment = body_alignment as u64;
    let left = header_size.max(u64::from(min_left_redzone));
    let body_offset = (left + alignment - 1) & !(alignment - 1);
    let trailer_size = (BLOCK_TRAILER_SIZE as u64).max(u64::from(min_right_redzone));

    let end = body_offset + u64::from(body_size) + u64::from(body_trailing_pad) + trailer_size;
    let page = PAGE_SIZE as u64;
    let total = (end + page - 1) & !(page - 1);
    if total > u64::from(u32::MAX) {
        return None;
    }

    Some(BlockLayout {
        header_size: header_size as u32,
        header_padding_size: (body_offset - header_size) as u32,
        body_offset: body_offset as u32,
        body_size,
        trailer_padding_size: (total - body_offset - u64::from(body_size) - trailer_size) as u32,
        trailer_size: trailer_size as u32,
        total_size: total as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{SHADOW_RATIO, SLAB_SIZE};

    #[test]
    fn align_helpers() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_down(4095, 4096), 0);
        assert_eq!(align_down(4096, 4096), 4096);
    }

    #[test]
    fn minimal_block() {
        let layout = plan_block_layout(64, 0, 0, SHADOW_RATIO as u32, 0).unwrap();
        assert_eq!(layout.body_offset, BLOCK_HEADER_SIZE as u32);
        assert_eq!(layout.header_padding_size, 0);
        assert_eq!(layout.total_size as usize % PAGE_SIZE, 0);
        // The whole pre-trailer region plus the trailer fits one page here.
        assert_eq!(layout.total_size as usize, PAGE_SIZE);
    }

    #[test]
    fn guard_flush_shape() {
        // The zebra call shape: body pinned at the page tail via
        // min_left_redzone, trailing pad carrying the alignment slack.
        let body = 100u32;
        let body_offset = PAGE_SIZE - align_up(body as usize, SHADOW_RATIO);
        let trailing = PAGE_SIZE - body_offset - body as usize;
        let layout = plan_block_layout(
            body,
            body_offset as u32,
            8,
            SHADOW_RATIO as u32,
            trailing as u32,
        )
        .unwrap();
        assert_eq!(layout.body_offset as usize, body_offset);
        assert_eq!(layout.total_size as usize, SLAB_SIZE);
        // Trailer region lives entirely past the first page.
        let trailer_start =
            layout.body_offset + layout.body_size + layout.trailer_padding_size;
        assert!(trailer_start as usize >= PAGE_SIZE);
        assert_eq!(trailer_start + layout.trailer_size, layout.total_size);
    }

    #[test]
    fn left_redzone_honored() {
        let layout = plan_block_layout(32, 512, 0, 8, 0).unwrap();
        assert!(layout.body_offset >= 512);
        assert_eq!(layout.body_offset % 8, 0);
        assert_eq!(
            layout.header_size + layout.header_padding_size,
            layout.body_offset
        );
    }

    #[test]
    fn rejects_bad_alignment() {
        assert!(plan_block_layout(16, 0, 0, 0, 0).is_none());
        assert!(plan_block_layout(16, 0, 0, 12, 0).is_none());
    }
}
