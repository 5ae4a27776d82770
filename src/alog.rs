//! Logging macros gated by [`crate::enable_logging`].
//!
//! A logger that allocates through this allocator would re-enter it, so
//! nothing is emitted until logging is switched on explicitly.

macro_rules! awarn {
    ($($arg:tt)*) => {
        if $crate::should_log() {
            ::log::warn!($($arg)*);
        }
    };
}

macro_rules! adebug {
    ($($arg:tt)*) => {
        if $crate::should_log() {
            ::log::debug!($($arg)*);
        }
    };
}

macro_rules! atrace {
    ($($arg:tt)*) => {
        if $crate::should_log() {
            ::log::trace!($($arg)*);
        }
    };
}
