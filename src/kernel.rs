use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Page size reported when the platform query fails.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Low level memory services the allocator is built on. As the allocator,
/// our top level view of this has nothing to do with the concrete
/// APIs offered by each kernel.
///
/// Memory obtained here is never handed back: blocks live for the rest of
/// the process, so there is no release operation.
pub trait PlatformMemory {
    /// Requests `len` bytes of private, zero-initialized, read/write memory.
    /// Returns the base address or `None` if the underlying syscall fails.
    ///
    /// **SAFETY**: `len` must be a non-zero multiple of [`Self::page_size`].
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Virtual memory page size in bytes. Must be a power of two.
    fn page_size() -> usize;
}

/// The operating system of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Kernel;

/// Page size of the computer, usually 4096. We don't know it at compile
/// time, so it is queried once and cached here.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

fn cached_page_size(query: impl FnOnce() -> Option<usize>) -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = query()
                .filter(|size| size.is_power_of_two())
                .unwrap_or(FALLBACK_PAGE_SIZE);
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory, cached_page_size};

    use libc::{mmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            let addr = unsafe { mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET) };

            if addr == libc::MAP_FAILED {
                return None;
            }

            NonNull::new(addr.cast::<u8>())
        }

        fn page_size() -> usize {
            cached_page_size(|| {
                let size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
                usize::try_from(size).ok()
            })
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, ptr::NonNull};

    use super::{Kernel, PlatformMemory, cached_page_size};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        fn page_size() -> usize {
            cached_page_size(|| unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                usize::try_from(system_info.assume_init().dwPageSize).ok()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let size = Kernel::page_size();

        assert!(size.is_power_of_two());
        assert!(size >= 4096);
        assert_eq!(size, Kernel::page_size());
    }

    #[test]
    fn requested_memory_is_zeroed_and_writable() {
        let len = Kernel::page_size();

        unsafe {
            let addr = Kernel::request_memory(len).expect("mmap syscall returned None");
            let bytes = std::slice::from_raw_parts_mut(addr.as_ptr(), len);

            assert!(bytes.iter().all(|&byte| byte == 0));

            bytes.fill(0xAB);
            assert!(bytes.iter().all(|&byte| byte == 0xAB));
        }
    }

    #[test]
    fn independent_requests_do_not_overlap() {
        let len = Kernel::page_size();

        unsafe {
            let first = Kernel::request_memory(len).unwrap().as_ptr() as usize;
            let second = Kernel::request_memory(len).unwrap().as_ptr() as usize;

            assert!(first + len <= second || second + len <= first);
        }
    }
}
