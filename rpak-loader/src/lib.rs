//! Pak container loading.
//!
//! A caller supplies a file path (or buffers). The loader decompresses the
//! raw bytes when the header flags say so, normalizes the version-specific
//! header, then takes one of two paths: the direct parse for containers
//! with zero patch layers, or patch reconstruction for a base with an
//! ordered chain of patch files. Both end with a fully resolved asset
//! array handed to the registration pipeline, which runs the external
//! per-type callbacks under a worker pool.

pub mod config;
pub mod decode;
pub mod error;
pub mod layout;
pub mod pak;
pub mod process;
pub mod registry;
pub mod resolve;
pub mod starpak;

mod load;
mod reconstruct;
mod tables;

pub use config::LoadConfig;
pub use error::{LoadError, Result};
pub use pak::{Asset, Pak, PakStats};
pub use process::process_assets;
pub use registry::{
    AssetBinding, AssetCallback, AssetHandle, AssetTypeRegistry, POST_LOAD_PRIORITY,
};
pub use resolve::ResolvedPointer;
pub use starpak::{StarPak, StarPakEntry};

use std::path::Path;
use tracing::info;

use rpak_format::PatchRegion;
use rpak_patch::patch_file_name;

/// Load a pak from disk, reading any referenced patch files next to it,
/// and run the asset processing pipeline.
pub fn load_pak(
    path: impl AsRef<Path>,
    registry: &AssetTypeRegistry,
    config: &LoadConfig,
) -> Result<Pak> {
    let path = path.as_ref();
    info!("loading pak {}", path.display());

    let raw = std::fs::read(path)?;
    let (header, buffer) = decode::decompress_pak(raw)?;
    let dir = path.parent();

    let pak = if header.patch_count == 0 {
        load::build_unpatched(&buffer, header, dir)?
    } else {
        let region = PatchRegion::parse(&buffer, header.fixed_size(), header.patch_count)?;
        let mut patches = Vec::with_capacity(region.numbers.len());
        for &number in &region.numbers {
            let patch_path = patch_file_name(path, number);
            let patch_raw = std::fs::read(&patch_path)
                .map_err(|_| LoadError::MissingPatchFile(patch_path.clone()))?;
            let (_, patch_buffer) = decode::decompress_pak(patch_raw)?;
            patches.push(patch_buffer);
        }
        reconstruct::reconstruct(&buffer, header, &patches, registry, dir, config)?
    };

    process_assets(&pak, registry, config)?;
    Ok(pak)
}

/// Load a pak from in-memory buffers: the base file plus its patch files
/// in application order. Streaming side-cars are unavailable on this path.
pub fn load_pak_from_bytes(
    base: Vec<u8>,
    patches: Vec<Vec<u8>>,
    registry: &AssetTypeRegistry,
    config: &LoadConfig,
) -> Result<Pak> {
    let (header, buffer) = decode::decompress_pak(base)?;

    let pak = if header.patch_count == 0 {
        if !patches.is_empty() {
            return Err(LoadError::PatchIntegrity(format!(
                "{} patch buffers supplied for an unpatched pak",
                patches.len()
            )));
        }
        load::build_unpatched(&buffer, header, None)?
    } else {
        let mut decompressed = Vec::with_capacity(patches.len());
        for patch in patches {
            let (_, patch_buffer) = decode::decompress_pak(patch)?;
            decompressed.push(patch_buffer);
        }
        reconstruct::reconstruct(&buffer, header, &decompressed, registry, None, config)?
    };

    process_assets(&pak, registry, config)?;
    Ok(pak)
}
