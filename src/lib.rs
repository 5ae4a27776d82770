//! # blockalloc - a first-fit block allocator
//!
//! A general purpose heap allocator built directly on the platform's virtual
//! memory mapping (`mmap` on unix, `VirtualAlloc` on windows). It can be used
//! as a standalone allocator through [`MemAlloc::allocate`] and
//! [`MemAlloc::deallocate`], or registered as the `#[global_allocator]`.
//!
//! Every allocated block has a header with metadata that precedes the memory
//! handed to the caller:
//!
//! ```text
//! +-------------------------------+
//! | Header   | Actual memory block|
//! +-------------------------------+
//!            ^ returned pointer
//! ```
//!
//! Blocks are kept in a single list in the order they were created:
//!
//! - **allocate** walks the list and takes the first free block that fits.
//!   When the block is large enough to hold another header plus
//!   [`ALIGNMENT`] bytes behind the request, its tail is split off as a new
//!   free block. When nothing fits, a new region is mapped and appended.
//! - **deallocate** marks the block free and merges it with the free blocks
//!   that directly follow it in memory.
//!
//! Mapped memory is never returned to the platform. A single spin lock
//! serializes every operation, including the mapping syscall.
//!
//! ```
//! use blockalloc::MemAlloc;
//!
//! let allocator = MemAlloc::new();
//!
//! let ptr = allocator.allocate(100).expect("out of memory");
//! unsafe {
//!     ptr.as_ptr().write_bytes(0xAA, 100);
//!     allocator.deallocate(ptr.as_ptr());
//! }
//!
//! // Same size again: the freed block is handed back.
//! assert_eq!(Some(ptr), allocator.allocate(100));
//! ```
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOCATOR: blockalloc::MemAlloc = blockalloc::MemAlloc::new();
//! ```

use std::{
    alloc::{GlobalAlloc, Layout},
    fmt,
    marker::PhantomData,
    mem,
    ptr::{self, NonNull},
    sync::atomic::{AtomicBool, Ordering},
};

use spin::Mutex;

#[macro_use]
mod alog;

mod block;
mod error;
mod kernel;
mod list;
mod region;
mod utils;

pub use block::BLOCK_HEADER_SIZE;
pub use error::AllocError;
pub use kernel::{Kernel, PlatformMemory};
pub use list::{BlockInfo, HeapStats};
pub use utils::ALIGNMENT;

use block::Block;
use list::BlockList;
use utils::{align, checked_align};

static ALLOC_LOG: AtomicBool = AtomicBool::new(false);

/// Enables logging for the allocator.
///
/// Do not enable it while this crate is the global allocator of a process
/// whose logger allocates: the log call would re-enter the allocator.
pub fn enable_logging() {
    ALLOC_LOG.store(true, Ordering::Relaxed);
}

/// Disables logging for the allocator.
pub fn disable_logging() {
    ALLOC_LOG.store(false, Ordering::Relaxed);
}

pub(crate) fn should_log() -> bool {
    ALLOC_LOG.load(Ordering::Relaxed)
}

/// First-fit block allocator backed by memory from `P`.
///
/// All state sits behind one lock, so a shared reference is enough to
/// allocate and deallocate from any thread.
pub struct MemAlloc<P = Kernel> {
    blocks: Mutex<BlockList>,
    platform: PhantomData<fn() -> P>,
}

impl MemAlloc {
    /// Creates an allocator backed by the operating system. No memory is
    /// mapped until the first allocation.
    pub const fn new() -> Self {
        Self::with_platform()
    }
}

impl Default for MemAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PlatformMemory> MemAlloc<P> {
    /// Creates an allocator that maps its regions through `P`.
    pub const fn with_platform() -> Self {
        Self {
            blocks: Mutex::new(BlockList::new()),
            platform: PhantomData,
        }
    }

    /// Allocates at least `size` bytes aligned to [`ALIGNMENT`].
    ///
    /// Returns `None` for zero-sized requests, for sizes that cannot be
    /// represented once aligned and when the platform refuses to map more
    /// memory. See [`MemAlloc::try_allocate`] for the reason.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.try_allocate(size).ok()
    }

    /// Same as [`MemAlloc::allocate`], reporting why the request failed.
    ///
    /// A zero-sized request fails without taking the lock.
    pub fn try_allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }

        let need = checked_align(size, ALIGNMENT).ok_or(AllocError::SizeOverflow { requested: size })?;

        let block = self.blocks.lock().allocate::<P>(need)?;

        Ok(unsafe { Block::payload(block) })
    }

    /// Gives back memory obtained from [`MemAlloc::allocate`]. A null `ptr`
    /// is ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by this allocator that has
    /// not been deallocated yet. Anything else corrupts the block list.
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        unsafe {
            let block = Block::from_payload(ptr);
            self.blocks.lock().deallocate(block);
        }
    }

    /// Bookkeeping snapshot. Walks the whole list under the lock.
    pub fn stats(&self) -> HeapStats {
        self.blocks.lock().stats()
    }

    /// Calls `f` for every block, in list order, while holding the lock.
    ///
    /// `f` must not allocate from this allocator, it would deadlock.
    pub fn for_each_block(&self, f: impl FnMut(BlockInfo)) {
        self.blocks.lock().iter().for_each(f);
    }

    /// Serves layouts aligned beyond [`ALIGNMENT`].
    ///
    /// The request is padded by `align` bytes and the returned pointer is
    /// moved forward to the next boundary, leaving at least one word below
    /// it. That word records the distance back to the block payload.
    ///
    /// ```text
    /// payload                        returned
    ///    v                              v
    ///    +-----------------+--------+---------------------+
    ///    |     padding     | offset |    layout.size()    |
    ///    +-----------------+--------+---------------------+
    /// ```
    fn allocate_over_aligned(&self, layout: Layout) -> Option<NonNull<u8>> {
        let padded = layout.size().checked_add(layout.align())?;
        let payload = self.allocate(padded)?;

        let start = payload.as_ptr() as usize;
        let offset = align(start + mem::size_of::<usize>(), layout.align()) - start;

        unsafe {
            let ptr = payload.add(offset);
            ptr.cast::<usize>().sub(1).write(offset);
            Some(ptr)
        }
    }

    /// Undoes [`MemAlloc::allocate_over_aligned`].
    unsafe fn deallocate_over_aligned(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        unsafe {
            let offset = ptr.cast::<usize>().sub(1).read();
            self.deallocate(ptr.sub(offset).as_ptr());
        }
    }
}

unsafe impl<P: PlatformMemory> GlobalAlloc for MemAlloc<P> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = if layout.align() <= ALIGNMENT {
            self.allocate(layout.size())
        } else {
            self.allocate_over_aligned(layout)
        };

        ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe {
            if layout.align() <= ALIGNMENT {
                self.deallocate(ptr);
            } else {
                self.deallocate_over_aligned(ptr);
            }
        }
    }
}

impl<P: PlatformMemory> fmt::Debug for MemAlloc<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.blocks.try_lock() {
            Some(blocks) => f.debug_struct("MemAlloc").field("stats", &blocks.stats()).finish(),
            None => write!(f, "MemAlloc {{ <locked> }}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_common {
    use ctor::ctor;

    #[ctor]
    static INIT: () = {
        env_logger::builder().is_test(true).init();
        crate::enable_logging();
    };
}
