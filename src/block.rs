use std::{mem, ptr::NonNull};

use crate::utils::ALIGNMENT;

/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// Header size of a block. Every payload starts this many bytes after its
/// header.
pub const BLOCK_HEADER_SIZE: usize = mem::size_of::<Block>();

const _: () = assert!(BLOCK_HEADER_SIZE % ALIGNMENT == 0);

/// This is the structure of a block. The fields of the block are its metadata,
/// content is placed right after this header.
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        |
/// +---------------------+        |
/// |    is_free (1b)     |        | -> Header
/// +---------------------+        |
/// |        next         |        |
/// +---------------------+ <------+ <-- pointer handed to the caller
/// |       Content       |        |
/// |         ...         |        | -> `size` bytes of payload
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// Headers are written at page boundaries (fresh regions) or at
/// `payload + need` of a block being split, where `need` is a multiple of
/// [`ALIGNMENT`]. Forcing the header itself to that alignment keeps every
/// payload address aligned on 32-bit targets too.
///
/// `next` follows request order, not address order. Two blocks linked by
/// `next` are only physically contiguous when one was split from the other
/// (or when the platform happened to map them back to back), which is why
/// [`Block::coalesce`] checks adjacency before merging.
#[repr(C, align(8))]
pub(crate) struct Block {
    /// Usable payload capacity in bytes, excluding the header.
    pub size: usize,
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
    /// Block created right after this one.
    pub next: Link<Block>,
}

impl Block {
    /// Writes a header at `addr` and returns it as a block.
    ///
    /// **SAFETY**: `addr` must be aligned for [`Block`] and valid for writes of
    /// `BLOCK_HEADER_SIZE + size` bytes.
    pub unsafe fn init(addr: NonNull<u8>, size: usize, is_free: bool, next: Link<Block>) -> NonNull<Block> {
        let block = addr.cast::<Block>();

        unsafe {
            block.as_ptr().write(Block { size, is_free, next });
        }

        block
    }

    /// Address of the payload of `block`.
    ///
    /// **SAFETY**: `block` must be a header written by [`Block::init`].
    #[inline]
    pub unsafe fn payload(block: NonNull<Block>) -> NonNull<u8> {
        unsafe { block.cast::<u8>().add(BLOCK_HEADER_SIZE) }
    }

    /// Recovers the header that precedes `ptr`.
    ///
    /// **SAFETY**: `ptr` must have been produced by [`Block::payload`].
    #[inline]
    pub unsafe fn from_payload(ptr: NonNull<u8>) -> NonNull<Block> {
        unsafe { ptr.sub(BLOCK_HEADER_SIZE).cast() }
    }

    /// First address past the payload of `block`.
    ///
    /// **SAFETY**: `block` must be a valid header.
    #[inline]
    pub unsafe fn end(block: NonNull<Block>) -> usize {
        unsafe { Block::payload(block).as_ptr() as usize + block.as_ref().size }
    }

    /// Whether carving `need` bytes out of this block still leaves room for
    /// a header and a minimal payload behind them.
    #[inline]
    pub fn can_split(&self, need: usize) -> bool {
        self.size >= need && self.size - need >= BLOCK_HEADER_SIZE + ALIGNMENT
    }

    /// Shrinks `block` to `need` bytes and turns the rest of its payload into
    /// a new free block linked right after it.
    ///
    /// ```text
    /// before:  | hdr |              size               | -> next
    /// after:   | hdr |   need   | hdr |   remainder    | -> next
    ///                             ^ returned, free
    /// ```
    ///
    /// **SAFETY**: `block` must be valid and `can_split(need)` must hold.
    pub unsafe fn split(mut block: NonNull<Block>, need: usize) -> NonNull<Block> {
        unsafe {
            let remainder_addr = Block::payload(block).add(need);
            let current = block.as_mut();

            let remainder = Block::init(
                remainder_addr,
                current.size - need - BLOCK_HEADER_SIZE,
                true,
                current.next,
            );

            current.size = need;
            current.next = Some(remainder);

            remainder
        }
    }

    /// Whether `next` starts exactly where the payload of `block` ends.
    ///
    /// **SAFETY**: `block` must be a valid header.
    #[inline]
    pub unsafe fn is_adjacent(block: NonNull<Block>, next: NonNull<Block>) -> bool {
        unsafe { Block::end(block) == next.as_ptr() as usize }
    }

    /// Payload capacity `block` would have after [`Block::coalesce`], measured
    /// without writing anything.
    ///
    /// **SAFETY**: `block` and every block reachable from it must be valid.
    pub unsafe fn merged_size(block: NonNull<Block>) -> usize {
        unsafe {
            let mut size = block.as_ref().size;
            let mut last = block;

            while let Some(next) = last.as_ref().next {
                if !next.as_ref().is_free || !Block::is_adjacent(last, next) {
                    break;
                }

                size += BLOCK_HEADER_SIZE + next.as_ref().size;
                last = next;
            }

            size
        }
    }

    /// Absorbs the chain of free successors that sit directly behind `block`
    /// in memory. Stops at the first successor that is missing, in use or
    /// not adjacent. Returns how many blocks were absorbed.
    ///
    /// Only forward merges happen here: a free predecessor is merged with
    /// `block` once the predecessor itself goes through this function.
    ///
    /// **SAFETY**: `block` and every block reachable from it must be valid.
    pub unsafe fn coalesce(mut block: NonNull<Block>) -> usize {
        let mut absorbed = 0;

        unsafe {
            while let Some(next) = block.as_ref().next {
                let next_block = next.as_ref();

                if !next_block.is_free || !Block::is_adjacent(block, next) {
                    break;
                }

                let (next_size, next_next) = (next_block.size, next_block.next);

                let current = block.as_mut();
                current.size += BLOCK_HEADER_SIZE + next_size;
                current.next = next_next;

                absorbed += 1;
            }
        }

        absorbed
    }
}
