/// Reasons an allocation request can fail.
///
/// Contract violations on the deallocation side (foreign pointers, double
/// frees) are not detected and have no variant here.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("zero-sized allocation request")]
    ZeroSize,
    #[error("allocation of {requested} bytes does not fit in the address space")]
    SizeOverflow { requested: usize },
    #[error("the platform refused to map memory for a {requested}-byte block")]
    ResourceExhaustion { requested: usize },
}
