//! Error types for codec operations

use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Codec error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bit reader ran out of input
    #[error("Bitstream exhausted: needed {needed} bits, {available} available")]
    OutOfBits { needed: u32, available: u64 },

    /// Byte-run read past the end of the input
    #[error("Input exhausted: needed {needed} bytes, {available} available")]
    OutOfBytes { needed: usize, available: usize },

    /// A prefix code did not resolve to any symbol
    #[error("Invalid prefix code in bitstream")]
    InvalidCode,

    /// A code-length table violates the Kraft inequality
    #[error("Over-subscribed code-length table: {0} symbols")]
    OversubscribedTable(usize),

    /// Malformed codec preamble
    #[error("Invalid codec preamble: {0}")]
    InvalidPreamble(String),

    /// Back-reference distance outside the produced output
    #[error("Match distance {distance} exceeds produced output {produced}")]
    DistanceOutOfRange { distance: u64, produced: u64 },

    /// Decoded output would exceed the declared size
    #[error("Decoded run of {run} bytes overruns declared size {declared} at {produced}")]
    OutputOverrun {
        declared: u64,
        produced: u64,
        run: u64,
    },

    /// Produced byte count differs from the declared decompressed size
    #[error("Decompressed size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// External decoder failure
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),
}
