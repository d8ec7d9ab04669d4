//! Allocation failures surfaced by the heap and the strict dictionary API.

use thiserror::Error;

/// The single failure kind the dictionary layer cares about: memory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The heap's configured byte limit would be exceeded, even after a
    /// collection.
    #[error("out of memory: requested {requested} bytes with {used} of {limit} bytes in use")]
    OutOfMemory {
        requested: usize,
        used: usize,
        limit: usize,
    },

    /// The system allocator refused the request.
    #[error("system allocator refused {bytes} bytes")]
    Exhausted { bytes: usize },
}
