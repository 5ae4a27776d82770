//! Size and address arithmetic shared by the allocator modules.

/// Alignment unit of every payload size and payload address handed out.
pub const ALIGNMENT: usize = 8;

/// Rounds `to_be_aligned` up to a multiple of `alignment`.
///
/// `alignment` must be a power of two. Used both for payload sizes
/// ([`ALIGNMENT`]) and for mapping lengths (the page size).
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Same as [`align`] but returns `None` when the rounded value does not
/// fit in a `usize`.
pub const fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    match to_be_aligned.checked_add(alignment - 1) {
        Some(bumped) => Some(bumped & !(alignment - 1)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_alignment_unit() {
        let aligments = vec![(1..9, 8), (9..17, 16), (17..25, 24), (25..33, 32)];

        for (sizes, expected) in aligments {
            for size in sizes {
                assert_eq!(expected, align(size, ALIGNMENT));
            }
        }
    }

    #[test]
    fn align_to_page() {
        let aligments = vec![(1..4097, 4096), (4097..8193, 8192)];

        for (sizes, expected) in aligments {
            for size in sizes {
                assert_eq!(expected, align(size, 4096))
            }
        }
    }

    #[test]
    fn zero_stays_zero() {
        assert_eq!(0, align(0, ALIGNMENT));
        assert_eq!(Some(0), checked_align(0, 4096));
    }

    #[test]
    fn checked_align_detects_overflow() {
        assert_eq!(None, checked_align(usize::MAX, ALIGNMENT));
        assert_eq!(None, checked_align(usize::MAX - 3, ALIGNMENT));
        assert_eq!(Some(usize::MAX - 7), checked_align(usize::MAX - 7, ALIGNMENT));
        assert_eq!(Some(104), checked_align(100, ALIGNMENT));
    }
}
