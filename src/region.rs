use std::ptr::NonNull;

use crate::{
    block::{BLOCK_HEADER_SIZE, Block, Link},
    error::AllocError,
    kernel::PlatformMemory,
    utils::checked_align,
};

/// A fresh mapping obtained from the platform, holding exactly one block.
///
/// [`libc::mmap`] gives us memory regions aligned with the computer page
/// size, and we cannot assume two regions are adjacent. The block sits at the
/// start of the mapping; whatever is left after its payload up to the page
/// boundary stays unused.
///
/// ```text
/// +------------------------------------------+
/// | Block hdr |   payload   |  page slack    |
/// +------------------------------------------+
/// ^ mapping base                             ^ base + len
/// ```
pub(crate) struct Region {
    /// The block living at the base of the mapping.
    pub block: NonNull<Block>,
    /// Length of the mapping in bytes.
    pub len: usize,
}

/// Maps a new region large enough for a `payload`-byte block and links the
/// block after `tail`.
///
/// `payload` must already be a multiple of [`crate::utils::ALIGNMENT`]. The
/// block comes back in use. Nothing is linked when the platform refuses the
/// mapping.
///
/// **SAFETY**: `tail`, if any, must be a valid block owned by the caller.
pub(crate) unsafe fn grow_region<P: PlatformMemory>(
    tail: Link<Block>,
    payload: usize,
) -> Result<Region, AllocError> {
    let overflow = AllocError::SizeOverflow { requested: payload };

    // What we really need to map is the payload plus the header in front of it.
    let needed = payload.checked_add(BLOCK_HEADER_SIZE).ok_or(overflow)?;
    let len = checked_align(needed, P::page_size()).ok_or(overflow)?;

    let Some(addr) = (unsafe { P::request_memory(len) }) else {
        awarn!("platform refused a {len}-byte mapping for a {payload}-byte block");
        return Err(AllocError::ResourceExhaustion { requested: payload });
    };

    unsafe {
        let block = Block::init(addr, payload, false, None);

        if let Some(mut tail) = tail {
            tail.as_mut().next = Some(block);
        }

        adebug!("mapped {len} bytes at {:p} for a {payload}-byte block", addr);

        Ok(Region { block, len })
    }
}
