#![cfg(unix)]

use super::PageProtection;
use core::ptr::NonNull;
use libc::{
    c_void, mmap, mprotect, munmap, sysconf, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_NONE,
    PROT_READ, PROT_WRITE, _SC_PAGESIZE,
};
use std::ptr;

/// Reserves `size` bytes of page-aligned, readable and writable memory.
/// Returns `None` if the mapping failed.
pub fn reserve_region(size: usize) -> Option<NonNull<u8>> {
    let ptr = unsafe {
        mmap(
            ptr::null_mut(),
            size,
            PROT_READ | PROT_WRITE,
            MAP_PRIVATE | MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == MAP_FAILED {
        None
    } else {
        NonNull::new(ptr.cast::<u8>())
    }
}

/// Returns a region obtained from [`reserve_region`] to the OS.
///
/// # Safety
/// `ptr`/`size` must denote exactly one region previously returned by
/// [`reserve_region`], and no live references into it may remain.
pub unsafe fn release_region(ptr: NonNull<u8>, size: usize) {
    munmap(ptr.as_ptr().cast::<c_void>(), size);
}

/// Changes the protection of `size` bytes at `ptr`. Both must be
/// page-aligned. Returns false when the kernel refused.
///
/// # Safety
/// The range must lie within a region returned by [`reserve_region`].
pub unsafe fn protect_region(ptr: NonNull<u8>, size: usize, protection: PageProtection) -> bool {
    let prot = match protection {
        PageProtection::NoAccess => PROT_NONE,
        PageProtection::ReadWrite => PROT_READ | PROT_WRITE,
    };
    mprotect(ptr.as_ptr().cast::<c_void>(), size, prot) == 0
}

/// The page size the kernel actually uses.
pub fn system_page_size() -> usize {
    // sysconf cannot fail for _SC_PAGESIZE on any supported platform.
    unsafe { sysconf(_SC_PAGESIZE) as usize }
}
