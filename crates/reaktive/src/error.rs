#![forbid(unsafe_code)]

//! Error type for fallible reactive operations.
//!
//! Most mutations in this crate are lenient: an out-of-range index or the
//! removal of an absent element is a silent no-op that emits no change. The
//! strict `try_*` variants report the same conditions through
//! [`ReactiveError`] instead. A rejected operation never emits a partial
//! change.

/// Errors from reactive operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// A positional list mutation referred to an index outside the list.
    #[error("{operation} failed: index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// The mutation that was rejected.
        operation: &'static str,
        /// The requested index.
        index: usize,
        /// The list length at the time of the call.
        len: usize,
    },
    /// The target does not support the requested operation in its current
    /// state.
    #[error("{operation} is not supported by {target}")]
    UnsupportedOperation {
        /// The rejected operation.
        operation: &'static str,
        /// What the operation was attempted on.
        target: &'static str,
    },
}

/// Result alias for reactive operations.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
