//! Error types for the compression entry points.

use thiserror::Error;

/// Result alias for `pairzip` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported when validating the flattened input layout.
///
/// The error surface is narrow by design: only the prefix-sum end-offset
/// array handed to `compress_bytes` is checked. Dictionary exhaustion and
/// full matcher buckets are normal termination conditions during training,
/// not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The end-offset array must hold at least the leading zero.
    #[error("end offsets are empty, expected at least [0]")]
    EmptyLayout,

    /// The end-offset array must start at zero.
    #[error("end offsets must start at 0, found {first}")]
    NonZeroOrigin {
        /// The first element of the offending array.
        first: usize,
    },

    /// End offsets must be monotonically non-decreasing.
    #[error("end offset {next} at index {index} is below its predecessor {prev}")]
    UnorderedEnds {
        /// Index of the offending offset.
        index: usize,
        /// The preceding offset.
        prev: usize,
        /// The offending offset.
        next: usize,
    },

    /// The final end offset points past the data buffer.
    #[error("final end offset {last} exceeds the data length {data_len}")]
    EndOutOfRange {
        /// The final end offset.
        last: usize,
        /// Length of the data buffer.
        data_len: usize,
    },
}
