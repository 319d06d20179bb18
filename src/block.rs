//! In-band block metadata.
//!
//! Every allocation is prefixed by a fixed 100-byte header carrying the
//! block's debug name, its total size (header included), a free flag, the
//! id of the region it was carved from, and the `next`/`prev` links of the
//! global block list. The payload handed to the caller starts exactly
//! [`BLOCK_HEADER_SIZE`] bytes past the header:
//!
//! ```text
//! +----------------+        +
//! |   name[32]     |        |
//! +----------------+        |
//! |      size      |        |
//! +----------------+        |
//! |   free (1b)    |        | -> Header (100 bytes, packed)
//! +----------------+        |
//! |   region_id    |        |
//! +----------------+        |
//! |  next | prev   |        |
//! +----------------+        +
//! |    Payload     |
//! |                |
//! +----------------+
//! ```
//!
//! The 100-byte figure is an external convention: tooling that walks a core
//! dump of a process using this allocator hardcodes it. The struct is packed
//! and its size is asserted at compile time.

use core::fmt;
use core::mem;
use core::ptr::NonNull;
use core::str;

use crate::utils::FixedWriter;

/// Header size of a block. External tooling assumes this value; it is a
/// convention, not the sum of the field sizes.
pub const BLOCK_HEADER_SIZE: usize = 100;

/// Alignment unit for block sizes. Every block size is a multiple of this.
pub const ALIGNMENT: usize = 8;

/// Guaranteed alignment of payload pointers (`base + 100` is only 4-aligned).
pub const PAYLOAD_ALIGN: usize = 4;

/// Capacity of the in-header debug name, terminator included.
pub const NAME_SIZE: usize = 32;

/// Smallest block worth carving out: a header plus one aligned word of
/// payload. `split` refuses to produce a suffix below this.
pub const MIN_BLOCK_SIZE: usize = BLOCK_HEADER_SIZE + PAYLOAD_ALIGN;

const PADDING: usize = 35;

/// The 100-byte metadata prefix of every block.
///
/// Field order and packing are part of the on-memory format. `next`/`prev`
/// are plain nullable pointers rather than `Option<NonNull>` for the same
/// reason; use [`BlockHeader::next`] and [`BlockHeader::prev`] to get the
/// `Option` view.
#[repr(C, packed)]
pub struct BlockHeader {
    name: [u8; NAME_SIZE],
    pub size: usize,
    pub free: bool,
    pub region_id: u64,
    pub next: *mut BlockHeader,
    pub prev: *mut BlockHeader,
    _padding: [u8; PADDING],
}

const _: () = assert!(mem::size_of::<BlockHeader>() == BLOCK_HEADER_SIZE);

impl BlockHeader {
    /// Recovers the header from a payload pointer previously handed out.
    ///
    /// # Safety
    ///
    /// `payload` must point 100 bytes past a live header written by this
    /// allocator. Anything else is undefined behavior.
    #[inline]
    pub unsafe fn from_payload(payload: *mut u8) -> NonNull<BlockHeader> {
        unsafe { NonNull::new_unchecked(payload.sub(BLOCK_HEADER_SIZE).cast()) }
    }

    /// Address where the caller-visible bytes of this block begin.
    #[inline]
    pub fn payload(&self) -> *mut u8 {
        unsafe { (self as *const Self as *mut u8).add(BLOCK_HEADER_SIZE) }
    }

    /// One-past-the-end address of the block (`base + size`).
    #[inline]
    pub fn end(&self) -> *mut u8 {
        let size = self.size;
        unsafe { (self as *const Self as *mut u8).add(size) }
    }

    /// Bytes the payload can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size - BLOCK_HEADER_SIZE
    }

    #[inline]
    pub fn next(&self) -> Option<NonNull<BlockHeader>> {
        NonNull::new(self.next)
    }

    #[inline]
    pub fn prev(&self) -> Option<NonNull<BlockHeader>> {
        NonNull::new(self.prev)
    }

    /// The debug name, up to the first terminator.
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        str::from_utf8(&self.name[..len]).unwrap_or("<non-utf8>")
    }

    /// Overwrites the debug name, truncating to 31 bytes plus terminator.
    pub fn set_name(&mut self, name: &[u8]) {
        self.name = [0; NAME_SIZE];
        let n = name.len().min(NAME_SIZE - 1);
        self.name[..n].copy_from_slice(&name[..n]);
    }

    /// Formats a name directly into the header, e.g. `"Allocation 7"`.
    /// Used for the auto-generated names; never allocates.
    pub fn set_name_fmt(&mut self, args: fmt::Arguments<'_>) {
        self.name = [0; NAME_SIZE];
        let mut w = FixedWriter::new(&mut self.name[..NAME_SIZE - 1]);
        let _ = fmt::Write::write_fmt(&mut w, args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed_header() -> Box<BlockHeader> {
        unsafe { Box::new(mem::zeroed()) }
    }

    #[test]
    fn header_is_exactly_100_bytes() {
        assert_eq!(mem::size_of::<BlockHeader>(), 100);
    }

    #[test]
    fn payload_starts_100_bytes_past_header() {
        let header = zeroed_header();
        let base = &*header as *const BlockHeader as usize;
        assert_eq!(header.payload() as usize, base + 100);
    }

    #[test]
    fn from_payload_round_trips() {
        let mut header = zeroed_header();
        let payload = header.payload();
        let recovered = unsafe { BlockHeader::from_payload(payload) };
        assert_eq!(recovered.as_ptr(), &mut *header as *mut BlockHeader);
    }

    #[test]
    fn end_uses_total_size() {
        let mut header = zeroed_header();
        header.size = 120;
        let base = &*header as *const BlockHeader as usize;
        assert_eq!(header.end() as usize, base + 120);
        assert_eq!(header.capacity(), 20);
    }

    #[test]
    fn name_is_truncated_to_31_bytes() {
        let mut header = zeroed_header();
        header.set_name(b"this name is much longer than the 31 bytes that fit");
        assert_eq!(header.name().len(), 31);
        assert_eq!(header.name(), "this name is much longer than t");
    }

    #[test]
    fn formatted_names() {
        let mut header = zeroed_header();
        header.set_name_fmt(format_args!("Allocation {}", 3));
        assert_eq!(header.name(), "Allocation 3");

        header.set_name_fmt(format_args!("Split block {}", 17));
        assert_eq!(header.name(), "Split block 17");
    }
}
