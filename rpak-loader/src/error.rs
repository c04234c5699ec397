//! Error types for pak loading

use std::path::PathBuf;
use thiserror::Error;

/// Result type for load operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors that can occur while loading a pak
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(#[from] rpak_format::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] rpak_codec::Error),

    #[error("Patch error: {0}")]
    Patch(#[from] rpak_patch::PatchError),

    /// More than one codec flag bit, or an unknown combination
    #[error("Unsupported codec flags: {0:#06x}")]
    UnsupportedCodecFlags(u16),

    /// A referenced patch file could not be read
    #[error("Missing patch file: {0}")]
    MissingPatchFile(PathBuf),

    /// Patch reconstruction integrity violation
    #[error("Patch integrity failure: {0}")]
    PatchIntegrity(String),

    /// A pointer referenced a page or offset outside the loaded layout
    #[error("Pointer out of range: page {page}, offset {offset:#x}")]
    PointerOutOfRange { page: u32, offset: u32 },

    /// Page data region shorter than the page table declares
    #[error("Page data out of bounds: need {needed} bytes, {available} available")]
    PageDataOutOfBounds { needed: u64, available: u64 },

    /// Read past the end of a segment collection
    #[error("Collection read out of bounds: {segment:?} offset {offset:#x} len {len}")]
    CollectionOutOfBounds {
        segment: rpak_format::SegmentType,
        offset: u64,
        len: u64,
    },

    /// Streamed data requested from a side-car that failed to open
    #[error("StarPak unavailable: {0}")]
    StarPakUnavailable(String),

    /// Streamed data request outside the side-car payload region
    #[error("StarPak read out of bounds: offset {offset:#x} size {size}")]
    StarPakOutOfBounds { offset: u64, size: u64 },

    /// No asset with the requested GUID
    #[error("Asset not found: {0:#018x}")]
    AssetNotFound(u64),
}
