#![cfg(windows)]

use super::PageProtection;
use core::ptr::NonNull;
use std::ptr;
use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
    PAGE_NOACCESS, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

/// Reserves `size` bytes of page-aligned, readable and writable memory.
/// Returns `None` if the allocation failed.
pub fn reserve_region(size: usize) -> Option<NonNull<u8>> {
    let ptr = unsafe {
        VirtualAlloc(
            ptr::null_mut(),
            size,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        )
    };
    NonNull::new(ptr.cast::<u8>())
}

/// Returns a region obtained from [`reserve_region`] to the OS.
///
/// # Safety
/// `ptr` must denote exactly one region previously returned by
/// [`reserve_region`], and no live references into it may remain.
pub unsafe fn release_region(ptr: NonNull<u8>, _size: usize) {
    // MEM_RELEASE frees the entire region reserved by VirtualAlloc. Size must be 0.
    VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE);
}

/// Changes the protection of `size` bytes at `ptr`. Both must be
/// page-aligned. Returns false when the call failed.
///
/// # Safety
/// The range must lie within a region returned by [`reserve_region`].
pub unsafe fn protect_region(ptr: NonNull<u8>, size: usize, protection: PageProtection) -> bool {
    let prot = match protection {
        PageProtection::NoAccess => PAGE_NOACCESS,
        PageProtection::ReadWrite => PAGE_READWRITE,
    };
    let mut old_prot = 0;
    VirtualProtect(ptr.as_ptr().cast(), size, prot, &mut old_prot) != 0
}

/// The page size the kernel actually uses.
pub fn system_page_size() -> usize {
    let mut info: SYSTEM_INFO = unsafe { core::mem::zeroed() };
    unsafe { GetSystemInfo(&mut info) };
    info.dwPageSize as usize
}
