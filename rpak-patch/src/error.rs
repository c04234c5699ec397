//! Error types for patch operations

use thiserror::Error;

/// Result type for patch operations
pub type Result<T> = std::result::Result<T, PatchError>;

/// Errors that can occur while decoding a patch command stream
#[derive(Error, Debug)]
pub enum PatchError {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bitstream-level failure
    #[error("Patch bitstream error: {0}")]
    Codec(#[from] rpak_codec::Error),

    /// Size-field bit width outside the representable range
    #[error("Invalid size-field width: {0}")]
    InvalidWidth(u32),

    /// Replacement-data offset outside the stream
    #[error("Replacement data offset {offset} outside stream of {len} bytes")]
    ReplacementOutOfRange { offset: usize, len: usize },

    /// Replacement-data read past the end of the stream
    #[error("Replacement data exhausted: needed {needed} bytes, {available} available")]
    ReplacementExhausted { needed: usize, available: usize },

    /// Command stream ended with work outstanding
    #[error("Patch stream exhausted with {remaining} destination bytes outstanding")]
    StreamExhausted { remaining: u64 },
}
