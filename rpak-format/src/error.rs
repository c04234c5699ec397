//! Error types for rpak record parsing

use thiserror::Error;

/// Result type for format parsing operations
pub type Result<T> = std::result::Result<T, Error>;

/// rpak format error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid pak magic bytes
    #[error("Invalid pak magic: expected 'RPak', got {0:#010x}")]
    InvalidMagic(u32),

    /// Unknown or unsupported format version
    #[error("Unsupported pak version: {0}")]
    UnsupportedVersion(u16),

    /// Truncated data
    #[error("Truncated data: expected {expected} bytes, got {actual}")]
    TruncatedData { expected: u64, actual: u64 },

    /// Declared sizes violate a header invariant
    #[error("Header size invariant violated: decompressed {decompressed} < compressed {compressed}")]
    SizeInvariant { compressed: u64, decompressed: u64 },

    /// Patch data present on a version that does not support patching
    #[error("Version {version} pak declares {patch_count} patches")]
    PatchesUnsupported { version: u16, patch_count: u16 },

    /// Alignment field that is not a power of two
    #[error("Invalid alignment: {0:#x}")]
    InvalidAlignment(u64),

    /// Segment index out of range on a page record
    #[error("Page references segment {segment}, only {segment_count} declared")]
    SegmentOutOfRange { segment: u32, segment_count: u32 },

    /// Invalid UTF-8 in a path table
    #[error("Invalid UTF-8 in path table: {0}")]
    InvalidPath(#[from] std::str::Utf8Error),
}
