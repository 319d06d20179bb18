//! The allocation engine.
//!
//! [`MmapAllocator`] owns the global block list and the three monotonic
//! counters (allocations, regions, splits) and implements the core moves:
//!
//! - **reuse**: find a free block with the configured placement policy and
//!   carve the request out of it,
//! - **split**: turn one free block into a used-size prefix plus a free
//!   suffix,
//! - **merge**: fold a freshly freed block into its free neighbors within
//!   the same region, then give the region back to the kernel once it holds
//!   nothing but that one free block,
//! - **region mapping**: when nothing is reusable, request a fresh
//!   page-multiple anonymous region and carve the first block from it.
//!
//! ```text
//!
//!  +----------------> block base
//!  |                                                      +-----> suffix (stays free)
//!  |                                                      |
//!  +------------------------------------+      +----------+---------+----------+-----------+
//!  |          |                         |      |          |         |          |           |
//!  |  Header  |       Free payload      |  ->  |  Header  | Payload |  Header  |  Payload  |
//!  |          |                         |      |          |         |          |           |
//!  +------------------------------------+      +----------+---------+----------+-----------+
//!                   split at T                  <------- T -------->
//! ```
//!
//! The engine is single-threaded on purpose; [`crate::MemAlloc`] wraps it
//! in the global lock and is the type everything outside this crate talks
//! to.

use core::ptr::{self, NonNull};

use log::{debug, error, trace};

use crate::block::{BlockHeader, ALIGNMENT, BLOCK_HEADER_SIZE, MIN_BLOCK_SIZE};
use crate::config::Config;
use crate::kernel;
use crate::list::BlockList;
use crate::utils::align;

/// Engine state: every block ever carved, plus naming counters.
pub struct MmapAllocator {
    blocks: BlockList,
    /// Regions mapped so far; names new regions' first blocks.
    allocations: u64,
    /// Next region id to stamp on a fresh mapping.
    regions: u64,
    /// Blocks split so far; names split suffixes.
    splits: u64,
}

// The engine is a plain state machine over raw block pointers; nothing in
// it is tied to a particular thread. `MemAlloc` adds the locking.
unsafe impl Send for MmapAllocator {}

impl MmapAllocator {
    pub const fn new() -> Self {
        Self {
            blocks: BlockList::new(),
            allocations: 0,
            regions: 0,
            splits: 0,
        }
    }

    /// Serves `size` payload bytes and returns the payload pointer, or null
    /// when the kernel refuses to map a new region.
    ///
    /// # Safety
    ///
    /// The engine must not be shared between threads without external
    /// locking; block headers are mutated through raw pointers.
    pub unsafe fn allocate(&mut self, size: usize, config: &Config) -> *mut u8 {
        if size > isize::MAX as usize {
            return ptr::null_mut();
        }

        let total = size + BLOCK_HEADER_SIZE;
        let aligned = align(total, ALIGNMENT);
        trace!("allocation request; size = {size}, total = {total}, aligned = {aligned}");

        if let Some(block) = unsafe { self.reuse(aligned, config) } {
            let b = block.as_ptr();
            unsafe {
                (*b).free = false;
                let payload = (*b).payload();
                if config.scribble {
                    ptr::write_bytes(payload, 0xAA, size);
                }
                return payload;
            }
        }

        let region_size = align(aligned, kernel::page_size());
        debug!("new region; size = {region_size}");

        let Some(base) = (unsafe { kernel::request_memory(region_size) }) else {
            error!("anonymous mapping of {region_size} bytes failed");
            return ptr::null_mut();
        };

        let block = base.cast::<BlockHeader>();
        let b = block.as_ptr();
        unsafe {
            (*b).set_name_fmt(format_args!("Allocation {}", self.allocations));
            self.allocations += 1;
            (*b).region_id = self.regions;
            self.regions += 1;
            (*b).free = true;
            (*b).size = region_size;
            self.blocks.push_back(block);

            let _ = self.split(block, aligned);
            (*b).free = false;

            let payload = (*b).payload();
            trace!("new allocation {:p} (payload = {:p})", b, payload);
            if config.scribble {
                ptr::write_bytes(payload, 0xAA, size);
            }
            payload
        }
    }

    /// Releases a payload pointer previously returned by [`allocate`].
    /// Null is a no-op. Pointers this allocator never produced are
    /// undefined behavior.
    ///
    /// [`allocate`]: MmapAllocator::allocate
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live payload pointer from this engine.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        unsafe {
            let block = BlockHeader::from_payload(ptr);
            let size = (*block.as_ptr()).size;
            trace!("free request; address = {ptr:p}, size = {size}");

            (*block.as_ptr()).free = true;
            self.merge(block);
        }
    }

    /// `count * elem_size` bytes, zeroed. Returns null on multiplication
    /// overflow instead of quietly mapping a wrong-sized block.
    ///
    /// # Safety
    ///
    /// Same contract as [`MmapAllocator::allocate`].
    pub unsafe fn zeroed_allocate(&mut self, count: usize, elem_size: usize, config: &Config) -> *mut u8 {
        let Some(total) = count.checked_mul(elem_size) else {
            return ptr::null_mut();
        };

        let payload = unsafe { self.allocate(total, config) };
        if !payload.is_null() {
            unsafe { ptr::write_bytes(payload, 0, total) };
        }
        payload
    }

    /// Allocates and then stamps the caller's label into the block header,
    /// truncated to the 31 bytes the name field holds.
    ///
    /// # Safety
    ///
    /// Same contract as [`MmapAllocator::allocate`].
    pub unsafe fn named_allocate(&mut self, size: usize, name: &[u8], config: &Config) -> *mut u8 {
        let payload = unsafe { self.allocate(size, config) };
        if !payload.is_null() {
            unsafe {
                let block = BlockHeader::from_payload(payload);
                (*block.as_ptr()).set_name(name);
            }
            trace!("named block at {payload:p}");
        }
        payload
    }

    /// Grows or shrinks an allocation by moving it: a new block is
    /// allocated, the payload copied over (up to the smaller of the two
    /// capacities), and the old block freed.
    ///
    /// Null input allocates; zero size frees and returns null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live payload pointer from this engine.
    pub unsafe fn resize(&mut self, ptr: *mut u8, new_size: usize, config: &Config) -> *mut u8 {
        trace!("reallocation request; address = {ptr:p}, new size = {new_size}");

        if ptr.is_null() {
            return unsafe { self.allocate(new_size, config) };
        }

        if new_size == 0 {
            unsafe { self.free(ptr) };
            return ptr::null_mut();
        }

        unsafe {
            let old_capacity = (*BlockHeader::from_payload(ptr).as_ptr()).capacity();

            let new_ptr = self.allocate(new_size, config);
            if new_ptr.is_null() {
                return ptr::null_mut();
            }

            ptr::copy_nonoverlapping(ptr, new_ptr, old_capacity.min(new_size));
            self.free(ptr);
            new_ptr
        }
    }

    /// True when every region has been unmapped.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Prints the full memory state: a banner per region (on region-id
    /// transitions) and one line per block.
    pub fn dump(&self) {
        use core::fmt::Write;

        use crate::utils::FixedWriter;

        kernel::write_stdout(b"-- Current Memory State --\n");

        let mut current_region = None;
        for block in self.blocks.iter() {
            unsafe {
                let b = &*block.as_ptr();
                let (region_id, size, free) = (b.region_id, b.size, b.free);
                let mut line = [0u8; 160];

                if current_region != Some(region_id) {
                    let mut w = FixedWriter::new(&mut line);
                    let _ = writeln!(w, "[REGION {}] {:p}", region_id, block.as_ptr());
                    kernel::write_stdout(w.as_bytes());
                    current_region = Some(region_id);
                }

                let mut w = FixedWriter::new(&mut line);
                let _ = writeln!(
                    w,
                    "  [BLOCK] {:p}-{:p} '{}' {} [{}]",
                    block.as_ptr(),
                    b.end(),
                    b.name(),
                    size,
                    if free { "FREE" } else { "USED" },
                );
                kernel::write_stdout(w.as_bytes());
            }
        }
    }

    /// Tries to satisfy an aligned request from an existing free block.
    /// On a hit the candidate is split down to `aligned` bytes when the
    /// remainder is big enough to stand alone; otherwise the candidate is
    /// handed out whole, slack included.
    unsafe fn reuse(&mut self, aligned: usize, config: &Config) -> Option<NonNull<BlockHeader>> {
        let candidate = config.policy.find(&self.blocks, aligned)?;
        let _ = unsafe { self.split(candidate, aligned) };
        Some(candidate)
    }

    /// Splits a free block so its prefix spans exactly `size` bytes and the
    /// remainder becomes a new free block spliced in right after it.
    ///
    /// Refused (returning `None`, block untouched) when the block is not
    /// free, when `size` is below the minimum carveable block, or when the
    /// remainder would be too small to hold a header plus one aligned word.
    /// The prefix's `free` flag is left for the caller to set.
    unsafe fn split(&mut self, block: NonNull<BlockHeader>, size: usize) -> Option<NonNull<BlockHeader>> {
        let b = block.as_ptr();

        if size < MIN_BLOCK_SIZE {
            return None;
        }
        unsafe {
            if !(*b).free {
                return None;
            }

            let remainder = (*b).size.checked_sub(size)?;
            if remainder < MIN_BLOCK_SIZE {
                return None;
            }

            let suffix = NonNull::new_unchecked(b.cast::<u8>().add(size).cast::<BlockHeader>());
            let s = suffix.as_ptr();

            (*s).set_name_fmt(format_args!("Split block {}", self.splits));
            self.splits += 1;
            (*s).size = remainder;
            (*s).free = true;
            (*s).region_id = (*b).region_id;

            self.blocks.insert_after(block, suffix);
            (*b).size = size;

            trace!("split block {b:p}; suffix {s:p} keeps {remainder} bytes");
            Some(suffix)
        }
    }

    /// Coalesces a just-freed block with its free neighbors in the same
    /// region, then unmaps the region once the merged block is all that is
    /// left of it. Blocks from different regions are never fused, no matter
    /// how their addresses happen to line up.
    unsafe fn merge(&mut self, block: NonNull<BlockHeader>) {
        let b = block.as_ptr();

        unsafe {
            // Absorb the next block first, then fold into the previous one;
            // the order keeps the surviving header at the lowest address.
            if let Some(next) = (*b).next() {
                let n = next.as_ptr();
                if (*n).free && (*n).region_id == (*b).region_id {
                    (*b).size += (*n).size;
                    self.blocks.remove(next);
                }
            }

            let mut merged = block;
            if let Some(prev) = (*b).prev() {
                let p = prev.as_ptr();
                if (*p).free && (*p).region_id == (*b).region_id {
                    (*p).size += (*b).size;
                    self.blocks.remove(block);
                    merged = prev;
                }
            }

            // The merged block owns its whole region exactly when neither
            // neighbor shares its region id; then the mapping goes back to
            // the kernel in one call.
            let m = merged.as_ptr();
            let region_id = (*m).region_id;
            let alone_before = (*m).prev().map_or(true, |p| (*p.as_ptr()).region_id != region_id);
            let alone_after = (*m).next().map_or(true, |n| (*n.as_ptr()).region_id != region_id);

            if alone_before && alone_after {
                let len = (*m).size;
                self.blocks.remove(merged);
                debug!("unmapping region {region_id} at {m:p} ({len} bytes)");
                if !kernel::return_memory(m.cast::<u8>(), len) {
                    // Best effort: the list no longer references the block,
                    // so the address range is simply leaked.
                    error!("unmapping region {region_id} at {m:p} failed");
                }
            }
        }
    }

    /// Walks the whole list and asserts the structural invariants: mutual
    /// `prev`/`next` links, minimum and 8-aligned sizes, exact address
    /// adjacency inside a region, and no two neighboring free blocks in
    /// the same region.
    #[cfg(test)]
    pub(crate) fn check_consistency(&self) {
        let mut prev: Option<NonNull<BlockHeader>> = None;

        for block in self.blocks.iter() {
            unsafe {
                let b = block.as_ptr();
                let (size, free, region_id) = ((*b).size, (*b).free, (*b).region_id);
                let back = (*b).prev;

                assert!(size >= MIN_BLOCK_SIZE, "undersized block: {size}");
                assert_eq!(size % ALIGNMENT, 0, "misaligned block size: {size}");

                match prev {
                    Some(expected) => assert_eq!(back, expected.as_ptr(), "broken prev link"),
                    None => {
                        assert!(back.is_null(), "head has a prev");
                        assert_eq!(self.blocks.head(), Some(block));
                    }
                }

                if let Some(before) = prev {
                    let p = before.as_ptr();
                    let (p_size, p_free, p_region) = ((*p).size, (*p).free, (*p).region_id);
                    if p_region == region_id {
                        assert_eq!(
                            p.cast::<u8>().add(p_size),
                            b.cast::<u8>(),
                            "same-region neighbors not address-adjacent",
                        );
                        assert!(!(p_free && free), "incomplete coalescing");
                    }
                }

                prev = Some(block);
            }
        }

        assert_eq!(self.blocks.tail(), prev, "tail does not match last block");
    }
}

impl Default for MmapAllocator {
    fn default() -> Self {
        Self::new()
    }
}
