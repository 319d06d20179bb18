//! The public allocator type.
//!
//! [`MemAlloc`] wraps the engine in a global mutex and snapshots the
//! environment configuration once per call, which makes it safe to share
//! between threads, store in a `static`, and register with
//! `#[global_allocator]`. Every public entry point takes the lock for its
//! whole critical section, so operations are linearizable; mapping and
//! unmapping syscalls happen under the lock, which is acceptable because
//! they are rare next to reuse hits.
//!
//! A spin mutex rather than an OS mutex: the allocator must not allocate
//! while synchronizing itself, and the critical sections are short.

use core::alloc::{GlobalAlloc, Layout};
use core::mem;
use core::ptr;

use spin::Mutex;

use crate::block::PAYLOAD_ALIGN;
use crate::config::Config;
use crate::mmap::MmapAllocator;

/// Thread-safe allocator front end. One instance owns one heap; processes
/// normally keep exactly one in a `static`.
///
/// ```ignore
/// #[global_allocator]
/// static ALLOCATOR: mapalloc::MemAlloc = mapalloc::MemAlloc::new();
/// ```
pub struct MemAlloc {
    inner: Mutex<MmapAllocator>,
}

impl MemAlloc {
    pub const fn new() -> Self {
        Self { inner: Mutex::new(MmapAllocator::new()) }
    }

    /// Allocates `size` payload bytes. Returns null when the kernel
    /// refuses to map a new region.
    pub fn allocate(&self, size: usize) -> *mut u8 {
        let config = Config::from_env();
        unsafe { self.inner.lock().allocate(size, &config) }
    }

    /// Releases a payload pointer. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this
    /// instance and not freed since.
    pub unsafe fn free(&self, ptr: *mut u8) {
        unsafe { self.inner.lock().free(ptr) }
    }

    /// Allocates `count * elem_size` bytes, zeroed. Null on overflow or
    /// mapping failure.
    pub fn zeroed_allocate(&self, count: usize, elem_size: usize) -> *mut u8 {
        let config = Config::from_env();
        unsafe { self.inner.lock().zeroed_allocate(count, elem_size, &config) }
    }

    /// Allocates with a caller-supplied debug label (at most 31 bytes are
    /// kept) instead of the auto-generated `"Allocation <n>"` name.
    pub fn named_allocate(&self, size: usize, name: &str) -> *mut u8 {
        self.named_allocate_bytes(size, name.as_bytes())
    }

    pub(crate) fn named_allocate_bytes(&self, size: usize, name: &[u8]) -> *mut u8 {
        let config = Config::from_env();
        unsafe { self.inner.lock().named_allocate(size, name, &config) }
    }

    /// Moves an allocation to a new block of `new_size` bytes, copying the
    /// payload and freeing the old block. Null input allocates; zero size
    /// frees and returns null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer from this instance.
    pub unsafe fn resize(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        let config = Config::from_env();
        unsafe { self.inner.lock().resize(ptr, new_size, &config) }
    }

    /// Writes the current region/block map to standard output.
    pub fn dump_state(&self) {
        self.inner.lock().dump();
    }
}

impl Default for MemAlloc {
    fn default() -> Self {
        Self::new()
    }
}

// Payloads sit 100 bytes past a page-aligned-or-8-aligned header, so they
// are only ever 4-aligned. Layouts that need more are served by
// over-allocating and keeping the original payload pointer in the word
// just below the aligned address, the way a memalign shim does it.
unsafe impl GlobalAlloc for MemAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.size() == 0 {
            // Dangling but well-aligned, the usual ZST convention.
            return layout.align() as *mut u8;
        }

        if layout.align() <= PAYLOAD_ALIGN {
            return self.allocate(layout.size());
        }

        let total = layout.size() + layout.align() + mem::size_of::<usize>();
        let payload = self.allocate(total);
        if payload.is_null() {
            return ptr::null_mut();
        }

        let base = payload as usize + mem::size_of::<usize>();
        let aligned = (base + layout.align() - 1) & !(layout.align() - 1);
        unsafe {
            ((aligned - mem::size_of::<usize>()) as *mut usize).write_unaligned(payload as usize);
        }
        aligned as *mut u8
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        if layout.align() <= PAYLOAD_ALIGN {
            unsafe { self.free(ptr) };
            return;
        }

        unsafe {
            let payload = ((ptr as usize - mem::size_of::<usize>()) as *const usize).read_unaligned();
            self.free(payload as *mut u8);
        }
    }
}
