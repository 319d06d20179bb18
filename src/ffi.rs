//! C-ABI entry points for `LD_PRELOAD` interposition.
//!
//! Built into the cdylib with `--features ffi`, these replace the C
//! runtime's allocation symbols for a whole process:
//!
//! ```bash,ignore
//! LD_PRELOAD=$(pwd)/libmapalloc.so command
//! ```
//!
//! The extra `malloc_name` and `print_memory` symbols are the debugging
//! surface: name an allocation from C, then dump the region/block map.

use core::ffi::{c_char, c_void, CStr};

use crate::MemAlloc;

static ALLOC: MemAlloc = MemAlloc::new();

#[no_mangle]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
    ALLOC.allocate(size).cast()
}

#[no_mangle]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    unsafe { ALLOC.free(ptr.cast()) }
}

#[no_mangle]
pub unsafe extern "C" fn calloc(nmemb: usize, size: usize) -> *mut c_void {
    ALLOC.zeroed_allocate(nmemb, size).cast()
}

#[no_mangle]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    unsafe { ALLOC.resize(ptr.cast(), size).cast() }
}

/// `malloc` plus a debug label stamped into the block header.
#[no_mangle]
pub unsafe extern "C" fn malloc_name(size: usize, name: *const c_char) -> *mut c_void {
    if name.is_null() {
        return ALLOC.allocate(size).cast();
    }

    let label = unsafe { CStr::from_ptr(name) };
    ALLOC.named_allocate_bytes(size, label.to_bytes()).cast()
}

/// Prints the current memory state to standard output.
#[no_mangle]
pub unsafe extern "C" fn print_memory() {
    ALLOC.dump_state();
}
