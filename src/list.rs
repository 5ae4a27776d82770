use std::{marker::PhantomData, ptr::NonNull};

use crate::{
    block::{Block, Link},
    error::AllocError,
    kernel::PlatformMemory,
    region::{self, Region},
};

/// Public view of one block, as reported by [`crate::MemAlloc::for_each_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload address, the pointer a caller would get for this block.
    pub addr: NonNull<u8>,
    /// Payload capacity in bytes.
    pub size: usize,
    pub is_free: bool,
}

/// Snapshot of the allocator's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Regions mapped from the platform so far.
    pub regions: usize,
    /// Total length of those regions, page slack included.
    pub mapped_bytes: usize,
    /// Blocks reachable from the list root.
    pub blocks: usize,
    pub free_blocks: usize,
    /// Payload bytes held by free blocks.
    pub free_bytes: usize,
    /// Payload bytes held by blocks in use.
    pub used_bytes: usize,
}

/// Outcome of a first-fit scan.
enum Search {
    Found(NonNull<Block>),
    /// Nothing fits; carries the last block of the list.
    Miss { tail: NonNull<Block> },
}

/// Singly linked list of every [`Block`] ever created, in request order.
///
/// Fresh regions are appended at the tail and split remainders are inserted
/// right after the block they were carved from. Merged blocks are unlinked
/// but their memory simply becomes part of the absorbing block's payload.
///
/// ```text
///  first
///    |
/// +--v------------------------------+      +-------------------+
/// | +-------+    +------+    +----+ |      | +-------+         |
/// | | Block | -> | Free | -> |Blk | | ---> | | Block |  slack  |
/// | +-------+    +------+    +----+ |      | +-------+         |
/// +---------------------------------+      +-------------------+
///          region (split)                     region (fresh)
/// ```
///
/// All methods expect the caller to hold the allocator lock.
pub(crate) struct BlockList {
    first: Link<Block>,
    regions: usize,
    mapped_bytes: usize,
}

// The list owns the memory its blocks point into.
unsafe impl Send for BlockList {}

pub(crate) struct Iter<'a> {
    current: Link<Block>,
    marker: PhantomData<&'a BlockList>,
}

impl BlockList {
    pub const fn new() -> Self {
        Self {
            first: None,
            regions: 0,
            mapped_bytes: 0,
        }
    }

    /// Returns a block of at least `need` bytes, marked in use.
    ///
    /// `need` must be a non-zero multiple of [`crate::utils::ALIGNMENT`].
    /// Reuses the first free block that fits and maps a new region otherwise.
    /// On error the list is left exactly as it was.
    pub fn allocate<P: PlatformMemory>(&mut self, need: usize) -> Result<NonNull<Block>, AllocError> {
        let tail = match self.first {
            // First allocation ever, the new region becomes the root.
            None => None,
            Some(first) => match unsafe { Self::find_free_block(first, need) } {
                Search::Found(block) => return Ok(block),
                Search::Miss { tail } => Some(tail),
            },
        };

        let Region { block, len } = unsafe { region::grow_region::<P>(tail, need)? };

        if self.first.is_none() {
            self.first = Some(block);
        }

        self.regions += 1;
        self.mapped_bytes += len;

        Ok(block)
    }

    /// First-fit scan starting at `first`.
    ///
    /// Free blocks are measured together with their adjacent free successors,
    /// so runs freed front to back are seen as a whole. Only the block that
    /// gets picked absorbs them; a miss leaves every header untouched.
    unsafe fn find_free_block(first: NonNull<Block>, need: usize) -> Search {
        let mut current = first;

        unsafe {
            loop {
                if current.as_ref().is_free && Block::merged_size(current) >= need {
                    let absorbed = Block::coalesce(current);
                    if absorbed > 0 {
                        atrace!("merged {absorbed} blocks into {:p} while searching", current);
                    }

                    if current.as_ref().can_split(need) {
                        let remainder = Block::split(current, need);
                        current.as_mut().is_free = false;

                        atrace!(
                            "split {:p}: {need} bytes in use, {} bytes free at {:p}",
                            current,
                            remainder.as_ref().size,
                            remainder
                        );

                        return Search::Found(current);
                    }

                    // Slack too small for a header stays inside this block.
                    current.as_mut().is_free = false;

                    atrace!("reused {:p} ({} bytes) for {need} bytes", current, current.as_ref().size);

                    return Search::Found(current);
                }

                match current.as_ref().next {
                    Some(next) => current = next,
                    None => return Search::Miss { tail: current },
                }
            }
        }
    }

    /// Marks `block` free and merges it with the free blocks right behind it.
    ///
    /// **SAFETY**: `block` must be a block of this list that is in use.
    pub unsafe fn deallocate(&mut self, mut block: NonNull<Block>) {
        unsafe {
            block.as_mut().is_free = true;

            let absorbed = Block::coalesce(block);

            atrace!(
                "freed {:p}, absorbed {absorbed} successors, now {} bytes",
                block,
                block.as_ref().size
            );
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            current: self.first,
            marker: PhantomData,
        }
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            regions: self.regions,
            mapped_bytes: self.mapped_bytes,
            ..HeapStats::default()
        };

        for block in self.iter() {
            stats.blocks += 1;

            if block.is_free {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
            } else {
                stats.used_bytes += block.size;
            }
        }

        stats
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;

        unsafe {
            let header = block.as_ref();
            self.current = header.next;

            Some(BlockInfo {
                addr: Block::payload(block),
                size: header.size,
                is_free: header.is_free,
            })
        }
    }
}

impl<'a> IntoIterator for &'a BlockList {
    type Item = BlockInfo;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
