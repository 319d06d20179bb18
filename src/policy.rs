//! Free-space placement policies.
//!
//! Each policy scans the global block list for a free block of at least the
//! requested (aligned, header-inclusive) size:
//!
//! - **First fit** returns the first match. Fast, but tends to fragment the
//!   front of the heap.
//! - **Best fit** returns the match with the least leftover space. Always
//!   walks the whole list.
//! - **Worst fit** returns the match with the most leftover space, keeping
//!   large remainders usable.
//!
//! Ties are broken by the first candidate encountered.

use core::ptr::NonNull;

use crate::block::BlockHeader;
use crate::list::BlockList;

/// Which free block to reuse for a request. Chosen per allocation from the
/// `ALLOCATOR_ALGORITHM` environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Return the first free block large enough.
    #[default]
    FirstFit,
    /// Return the free block with the smallest leftover.
    BestFit,
    /// Return the free block with the largest leftover.
    WorstFit,
}

impl Policy {
    /// Parses an `ALLOCATOR_ALGORITHM` value. Anything unrecognized falls
    /// back to first fit.
    pub fn parse(value: &[u8]) -> Policy {
        match value {
            b"best_fit" => Policy::BestFit,
            b"worst_fit" => Policy::WorstFit,
            _ => Policy::FirstFit,
        }
    }

    /// Scans `list` for a free block with `size >= requested`.
    pub(crate) fn find(self, list: &BlockList, requested: usize) -> Option<NonNull<BlockHeader>> {
        match self {
            Policy::FirstFit => first_fit(list, requested),
            Policy::BestFit => best_fit(list, requested),
            Policy::WorstFit => worst_fit(list, requested),
        }
    }
}

fn first_fit(list: &BlockList, requested: usize) -> Option<NonNull<BlockHeader>> {
    list.iter().find(|block| unsafe {
        let b = block.as_ptr();
        (*b).free && (*b).size >= requested
    })
}

fn best_fit(list: &BlockList, requested: usize) -> Option<NonNull<BlockHeader>> {
    let mut best: Option<(NonNull<BlockHeader>, usize)> = None;

    for block in list.iter() {
        let (free, size) = unsafe { ((*block.as_ptr()).free, (*block.as_ptr()).size) };
        if !free || size < requested {
            continue;
        }

        let slack = size - requested;
        if best.map_or(true, |(_, best_slack)| slack < best_slack) {
            best = Some((block, slack));
        }
    }

    best.map(|(block, _)| block)
}

fn worst_fit(list: &BlockList, requested: usize) -> Option<NonNull<BlockHeader>> {
    let mut worst: Option<(NonNull<BlockHeader>, usize)> = None;

    for block in list.iter() {
        let (free, size) = unsafe { ((*block.as_ptr()).free, (*block.as_ptr()).size) };
        if !free || size < requested {
            continue;
        }

        let slack = size - requested;
        if worst.map_or(true, |(_, worst_slack)| slack > worst_slack) {
            worst = Some((block, slack));
        }
    }

    worst.map(|(block, _)| block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_HEADER_SIZE;

    #[test]
    fn parse_known_values() {
        assert_eq!(Policy::parse(b"first_fit"), Policy::FirstFit);
        assert_eq!(Policy::parse(b"best_fit"), Policy::BestFit);
        assert_eq!(Policy::parse(b"worst_fit"), Policy::WorstFit);
    }

    #[test]
    fn parse_falls_back_to_first_fit() {
        assert_eq!(Policy::parse(b""), Policy::FirstFit);
        assert_eq!(Policy::parse(b"next_fit"), Policy::FirstFit);
        assert_eq!(Policy::parse(b"BEST_FIT"), Policy::FirstFit);
    }

    // A list of standalone headers is enough to drive the search; the
    // policies never look past `free` and `size`.
    fn synthetic_list(blocks: &[(usize, bool)]) -> (BlockList, Vec<NonNull<BlockHeader>>) {
        let mut list = BlockList::new();
        let mut nodes = Vec::new();

        for &(size, free) in blocks {
            let boxed: Box<[u8; BLOCK_HEADER_SIZE]> = Box::new([0; BLOCK_HEADER_SIZE]);
            let node = NonNull::new(Box::into_raw(boxed).cast::<BlockHeader>()).unwrap();
            unsafe {
                (*node.as_ptr()).size = size;
                (*node.as_ptr()).free = free;
                (*node.as_ptr()).region_id = 0;
                list.push_back(node);
            }
            nodes.push(node);
        }

        (list, nodes)
    }

    fn teardown(nodes: Vec<NonNull<BlockHeader>>) {
        for node in nodes {
            drop(unsafe { Box::from_raw(node.as_ptr().cast::<[u8; BLOCK_HEADER_SIZE]>()) });
        }
    }

    #[test]
    fn first_fit_takes_first_adequate() {
        let (list, nodes) = synthetic_list(&[(512, false), (256, true), (1024, true)]);

        let hit = Policy::FirstFit.find(&list, 200).unwrap();
        assert_eq!(hit, nodes[1]);

        teardown(nodes);
    }

    #[test]
    fn best_fit_minimizes_slack() {
        let (list, nodes) = synthetic_list(&[(1024, true), (256, true), (512, true)]);

        let hit = Policy::BestFit.find(&list, 200).unwrap();
        assert_eq!(hit, nodes[1]);

        teardown(nodes);
    }

    #[test]
    fn worst_fit_maximizes_slack() {
        let (list, nodes) = synthetic_list(&[(512, true), (1024, true), (256, true)]);

        let hit = Policy::WorstFit.find(&list, 200).unwrap();
        assert_eq!(hit, nodes[1]);

        teardown(nodes);
    }

    #[test]
    fn ties_break_to_first_candidate() {
        let (list, nodes) = synthetic_list(&[(512, true), (512, true)]);

        assert_eq!(Policy::BestFit.find(&list, 200).unwrap(), nodes[0]);
        assert_eq!(Policy::WorstFit.find(&list, 200).unwrap(), nodes[0]);

        teardown(nodes);
    }

    #[test]
    fn no_candidate_returns_none() {
        let (list, nodes) = synthetic_list(&[(512, false), (128, true)]);

        assert!(Policy::FirstFit.find(&list, 200).is_none());
        assert!(Policy::BestFit.find(&list, 200).is_none());
        assert!(Policy::WorstFit.find(&list, 200).is_none());

        teardown(nodes);
    }
}
