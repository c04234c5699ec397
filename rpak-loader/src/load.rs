//! The non-patched load path.
//!
//! For containers with zero patch layers: walk the leading regions, place
//! every page into its segment collection with a running byte cursor, then
//! resolve the pointer table, guid refs and asset references. Given the
//! same input bytes this always produces the same relative-offset layout.

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use rpak_format::{PagePtr, PakHeader};

use crate::layout::{Locator, PageSlot, SegmentCollections, place_pages};
use crate::pak::{Asset, Pak};
use crate::resolve::{resolve_guid_refs, resolve_pointer_table, resolve_value};
use crate::starpak::StarPak;
use crate::tables::PakTables;
use crate::{LoadError, Result};

/// Open every referenced side-car, degrading failures to warnings.
pub(crate) fn open_starpaks(paths: &[String], dir: Option<&Path>) -> Vec<StarPak> {
    paths
        .iter()
        .map(|path| match dir {
            Some(dir) => StarPak::open_or_missing(&dir.join(path)),
            None => StarPak::missing(Path::new(path)),
        })
        .collect()
}

/// Resolve an asset page reference leniently: an unmappable reference is
/// logged and becomes the explicit invalid pointer.
pub(crate) fn resolve_asset_ref(
    raw: rpak_format::RawPtr,
    first_page: u32,
    locator: &Locator,
    guid: u64,
    what: &str,
) -> PagePtr {
    match resolve_value(raw, first_page, locator) {
        Ok(ptr) => ptr,
        Err(e) => {
            warn!(
                "asset {:#018x}: unresolvable {} reference ({}), marking invalid",
                guid, what, e
            );
            PagePtr::Null
        }
    }
}

/// Build asset records into resolved assets plus the guid lookup map.
pub(crate) fn build_assets(
    records: &[rpak_format::AssetRecord],
    first_page: u32,
    locator: &Locator,
) -> (Vec<Asset>, HashMap<u64, usize>) {
    let mut assets = Vec::with_capacity(records.len());
    let mut by_guid = HashMap::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let head = resolve_asset_ref(record.head, first_page, locator, record.guid, "head");
        let cpu = resolve_asset_ref(record.cpu, first_page, locator, record.guid, "cpu");
        assets.push(Asset::new(record, head, cpu));
        by_guid.insert(record.guid, index);
    }
    (assets, by_guid)
}

/// Load a container with zero patch layers from its decompressed image.
pub(crate) fn build_unpatched(
    buffer: &[u8],
    header: PakHeader,
    starpak_dir: Option<&Path>,
) -> Result<Pak> {
    debug_assert_eq!(header.patch_count, 0);

    let tables = PakTables::parse(buffer, &header, header.fixed_size())?;

    let (placements, sizes) = place_pages(&tables.pages, &tables.segments)?;
    let mut collections = SegmentCollections::with_sizes(sizes)?;

    // Locate every page's bytes with a running cursor over the data region
    // and copy them into the collections.
    let mut cursor = tables.data_start as u64;
    for (page, placement) in tables.pages.iter().zip(&placements) {
        let end = cursor + u64::from(page.size);
        if end > buffer.len() as u64 {
            return Err(LoadError::PageDataOutOfBounds {
                needed: end,
                available: buffer.len() as u64,
            });
        }
        collections.write(
            placement.segment,
            placement.offset,
            &buffer[cursor as usize..end as usize],
        )?;
        cursor = end;
    }

    let locator = Locator::new(
        placements.into_iter().map(PageSlot::Whole).collect(),
        Vec::new(),
    );

    let pointers = resolve_pointer_table(&tables.pointers, 0, &locator, &collections)?;
    let guid_refs = resolve_guid_refs(&tables.guid_refs, &locator)?;
    let (assets, by_guid) = build_assets(&tables.assets, 0, &locator);

    let starpaks = open_starpaks(&tables.starpak_paths, starpak_dir);
    let opt_starpaks = open_starpaks(&tables.opt_starpak_paths, starpak_dir);

    let leading = buffer[header.fixed_size()..tables.data_start].to_vec();

    debug!(
        "loaded unpatched pak: {} assets, {} pointers resolved",
        assets.len(),
        pointers.len()
    );

    Ok(Pak {
        header,
        collections,
        locator,
        first_page: 0,
        pointers,
        guid_refs,
        relations: tables.relations,
        assets,
        by_guid,
        starpaks,
        opt_starpaks,
        leading,
    })
}
