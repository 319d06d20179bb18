//! Environment-driven configuration.
//!
//! Two variables are consulted on every allocation, matching the behavior
//! of the C runtime knobs this allocator exposes:
//!
//! - `ALLOCATOR_ALGORITHM`: `first_fit` (default), `best_fit`, `worst_fit`.
//!   Unknown values fall back to first fit.
//! - `ALLOCATOR_SCRIBBLE`: when set to exactly `1`, freshly returned
//!   payloads are filled with `0xAA` so use of uninitialized memory shows
//!   up immediately in a debugger.
//!
//! Reads go through `getenv`/`GetEnvironmentVariableA` rather than
//! `std::env`: the std accessors build owned strings, and this code runs on
//! the allocation path of a process whose `malloc` may be us.

use core::ffi::CStr;

use crate::policy::Policy;

const ALGORITHM_VAR: &CStr = c"ALLOCATOR_ALGORITHM";
const SCRIBBLE_VAR: &CStr = c"ALLOCATOR_SCRIBBLE";

/// Longest value we care about; anything bigger is unknown anyway.
const VALUE_CAP: usize = 32;

/// Per-allocation configuration snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    /// Placement policy for reusing free blocks.
    pub policy: Policy,
    /// Fill fresh payloads with `0xAA` before returning them.
    pub scribble: bool,
}

impl Config {
    /// Reads both variables from the process environment.
    pub fn from_env() -> Self {
        let mut buf = [0u8; VALUE_CAP];

        let policy = match sys::read_env(ALGORITHM_VAR, &mut buf) {
            Some(len) => Policy::parse(&buf[..len]),
            None => Policy::FirstFit,
        };

        let scribble = matches!(sys::read_env(SCRIBBLE_VAR, &mut buf), Some(len) if buf[..len] == *b"1");

        Config { policy, scribble }
    }
}

#[cfg(unix)]
mod sys {
    use core::ffi::CStr;

    /// Copies the value of `name` into `buf` and returns its length.
    /// `None` when the variable is unset or its value does not fit.
    pub(super) fn read_env(name: &CStr, buf: &mut [u8]) -> Option<usize> {
        unsafe {
            let value = libc::getenv(name.as_ptr());
            if value.is_null() {
                return None;
            }

            let bytes = CStr::from_ptr(value).to_bytes();
            if bytes.len() > buf.len() {
                return None;
            }

            buf[..bytes.len()].copy_from_slice(bytes);
            Some(bytes.len())
        }
    }
}

#[cfg(windows)]
mod sys {
    use core::ffi::CStr;

    use windows::core::PCSTR;
    use windows::Win32::System::Environment::GetEnvironmentVariableA;

    pub(super) fn read_env(name: &CStr, buf: &mut [u8]) -> Option<usize> {
        unsafe {
            let len = GetEnvironmentVariableA(PCSTR::from_raw(name.as_ptr().cast()), Some(buf));
            // 0 means unset; a value >= buf.len() means the buffer was too
            // small and `len` is the required size.
            if len == 0 || len as usize >= buf.len() {
                return None;
            }
            Some(len as usize)
        }
    }
}
