//! Low-level platform layer.
//!
//! Everything the allocator needs from the operating system goes through
//! here: requesting and returning anonymous memory regions, querying the
//! page size, and raw (unbuffered) standard output for `dump_state`. The
//! rest of the crate has nothing to do with the concrete APIs offered by
//! each kernel.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Cached page size; queried from the OS on first use.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Abstraction over the platform's memory syscalls.
trait PlatformMemory {
    /// Request an anonymous, private, read-write memory region of `len`
    /// bytes. Returns the page-aligned base, or `None` if the underlying
    /// call fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Return the region of `len` bytes starting at `addr` to the kernel.
    /// `false` means the call failed; the caller decides how loudly to
    /// complain.
    unsafe fn return_memory(addr: *mut u8, len: usize) -> bool;

    /// Virtual memory page size of the machine in bytes.
    fn page_size() -> usize;

    /// Raw write to standard output.
    fn write_stdout(bytes: &[u8]);
}

/// Marker type carrying the per-platform [`PlatformMemory`] impl.
struct Kernel;

/// The machine's page size, queried once and cached.
#[inline]
pub(crate) fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = Kernel::page_size();
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

/// Wrapper for [`PlatformMemory::request_memory`].
#[inline]
pub(crate) unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
    unsafe { Kernel::request_memory(len) }
}

/// Wrapper for [`PlatformMemory::return_memory`].
#[inline]
pub(crate) unsafe fn return_memory(addr: *mut u8, len: usize) -> bool {
    unsafe { Kernel::return_memory(addr, len) }
}

/// Wrapper for [`PlatformMemory::write_stdout`]. Unbuffered so it can run
/// under the allocator lock without allocating.
#[inline]
pub(crate) fn write_stdout(bytes: &[u8]) {
    Kernel::write_stdout(bytes);
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use core::ptr::NonNull;
    use std::os::raw::{c_int, c_void};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => Some(NonNull::new_unchecked(addr).cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) -> bool {
            unsafe { munmap(addr as *mut c_void, len as size_t) == 0 }
        }

        fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }

        fn write_stdout(bytes: &[u8]) {
            unsafe {
                libc::write(libc::STDOUT_FILENO, bytes.as_ptr().cast(), bytes.len() as size_t);
            }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{Kernel, PlatformMemory};

    use core::mem::MaybeUninit;
    use core::ptr::NonNull;
    use std::os::raw::c_void;

    use windows::Win32::System::Console::{GetStdHandle, WriteConsoleA, STD_OUTPUT_HANDLE};
    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) -> bool {
            unsafe { Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE).is_ok() }
        }

        fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }

        fn write_stdout(bytes: &[u8]) {
            unsafe {
                if let Ok(handle) = GetStdHandle(STD_OUTPUT_HANDLE) {
                    let _ = WriteConsoleA(handle, bytes, None, None);
                }
            }
        }
    }
}
