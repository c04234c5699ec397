//! The loaded container.
//!
//! A [`Pak`] owns the segment collections, the resolved pointer and
//! guid-ref tables, the asset array and the streaming side-car records.
//! External per-type loaders consume it through the accessors here.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

use rpak_format::{AssetKind, AssetRecord, NO_STREAM_OFFSET, PagePtr, PakHeader, SegmentType};

use crate::layout::{Locator, SegmentCollections};
use crate::resolve::ResolvedPointer;
use crate::starpak::StarPak;
use crate::{LoadError, Result};

/// The starpak offset field packs a path-list index in its low 12 bits and
/// a 4KiB-aligned byte offset above them.
const STARPAK_INDEX_MASK: u64 = 0xFFF;

/// One loaded asset.
#[derive(Debug, Clone)]
pub struct Asset {
    pub guid: u64,
    pub kind: AssetKind,
    pub version: u32,
    pub header_size: u32,
    /// Resolved location of the header/metadata block.
    pub head: PagePtr,
    /// Resolved location of the bulk payload block.
    pub cpu: PagePtr,
    pub starpak_offset: Option<u64>,
    pub opt_starpak_offset: Option<u64>,
    pub dependents_index: u32,
    pub dependents_count: u32,
    pub dependencies_index: u32,
    pub dependencies_count: u32,
}

impl Asset {
    pub(crate) fn new(record: &AssetRecord, head: PagePtr, cpu: PagePtr) -> Self {
        Self {
            guid: record.guid,
            kind: record.kind,
            version: record.version,
            header_size: record.header_size,
            head,
            cpu,
            starpak_offset: (record.starpak_offset != NO_STREAM_OFFSET)
                .then_some(record.starpak_offset),
            opt_starpak_offset: (record.opt_starpak_offset != NO_STREAM_OFFSET)
                .then_some(record.opt_starpak_offset),
            dependents_index: record.dependents_index,
            dependents_count: record.dependents_count,
            dependencies_index: record.dependencies_index,
            dependencies_count: record.dependencies_count,
        }
    }
}

/// Summary counters for a loaded pak.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PakStats {
    pub asset_count: usize,
    pub page_count: u32,
    pub patch_count: u16,
    pub pointer_count: usize,
    pub collection_sizes: [u64; SegmentType::COUNT],
    pub starpak_count: usize,
}

/// A fully loaded, resolved pak container.
#[derive(Debug)]
pub struct Pak {
    pub(crate) header: PakHeader,
    pub(crate) collections: SegmentCollections,
    pub(crate) locator: Locator,
    pub(crate) first_page: u32,
    pub(crate) pointers: Vec<ResolvedPointer>,
    pub(crate) guid_refs: Vec<PagePtr>,
    pub(crate) relations: Vec<u32>,
    pub(crate) assets: Vec<Asset>,
    pub(crate) by_guid: HashMap<u64, usize>,
    pub(crate) starpaks: Vec<StarPak>,
    pub(crate) opt_starpaks: Vec<StarPak>,
    /// Right-sized copy of the non-paged leading region.
    pub(crate) leading: Vec<u8>,
}

impl Pak {
    pub fn header(&self) -> &PakHeader {
        &self.header
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn asset_by_guid(&self, guid: u64) -> Option<&Asset> {
        self.by_guid.get(&guid).map(|&i| &self.assets[i])
    }

    /// Resolved pointer-table entries.
    pub fn pointers(&self) -> &[ResolvedPointer] {
        &self.pointers
    }

    /// Resolved guid-ref slot locations. Targets are the consumer's job.
    pub fn guid_refs(&self) -> &[PagePtr] {
        &self.guid_refs
    }

    /// Dependents table: asset indices.
    pub fn relations(&self) -> &[u32] {
        &self.relations
    }

    /// First-page index: pages below it came from patch layers.
    pub fn first_page(&self) -> u32 {
        self.first_page
    }

    /// One segment collection's bytes.
    pub fn collection(&self, segment: SegmentType) -> &[u8] {
        self.collections.get(segment)
    }

    /// Borrow `len` bytes at a resolved location.
    pub fn view(&self, location: PagePtr, len: u64) -> Result<&[u8]> {
        let (segment, offset) = location.resolved().ok_or(LoadError::PointerOutOfRange {
            page: u32::MAX,
            offset: u32::MAX,
        })?;
        self.collections.slice(segment, offset, len)
    }

    /// The asset's header/metadata bytes.
    pub fn asset_header(&self, asset: &Asset) -> Result<&[u8]> {
        self.view(asset.head, u64::from(asset.header_size))
    }

    /// The asset's bulk payload bytes: from its cpu block to the end of
    /// the owning collection.
    pub fn asset_cpu(&self, asset: &Asset) -> Result<&[u8]> {
        let (segment, offset) = asset.cpu.resolved().ok_or(LoadError::PointerOutOfRange {
            page: u32::MAX,
            offset: u32::MAX,
        })?;
        let arena = self.collections.get(segment);
        let len = arena.len() as u64 - offset.min(arena.len() as u64);
        self.collections.slice(segment, offset, len)
    }

    /// Ordered dependency GUIDs of an asset, read from its guid-ref slots.
    /// Slots marked invalid read as zero.
    pub fn dependencies(&self, asset: &Asset) -> Result<Vec<u64>> {
        let start = asset.dependencies_index as usize;
        let end = start + asset.dependencies_count as usize;
        let slots = self
            .guid_refs
            .get(start..end)
            .ok_or(LoadError::PointerOutOfRange {
                page: u32::MAX,
                offset: asset.dependencies_index,
            })?;

        let mut guids = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                PagePtr::Null => guids.push(0),
                location => {
                    let bytes = self.view(*location, 8)?;
                    guids.push(Cursor::new(bytes).read_u64::<LittleEndian>()?);
                }
            }
        }
        Ok(guids)
    }

    /// Fetch streamed side-car bytes by the packed offset field.
    pub fn starpak_data(&self, offset: u64, size: u64, optional: bool) -> Result<Vec<u8>> {
        let list = if optional {
            &self.opt_starpaks
        } else {
            &self.starpaks
        };
        let index = (offset & STARPAK_INDEX_MASK) as usize;
        let byte_offset = offset & !STARPAK_INDEX_MASK;
        let starpak = list.get(index).ok_or_else(|| {
            LoadError::StarPakUnavailable(format!("no starpak at index {index}"))
        })?;
        starpak.fetch(byte_offset, size)
    }

    /// Mandatory streaming side-cars, in path-table order.
    pub fn starpaks(&self) -> &[StarPak] {
        &self.starpaks
    }

    /// Optional streaming side-cars (v8), in path-table order.
    pub fn opt_starpaks(&self) -> &[StarPak] {
        &self.opt_starpaks
    }

    /// The right-sized non-paged leading region.
    pub fn leading(&self) -> &[u8] {
        &self.leading
    }

    pub fn stats(&self) -> PakStats {
        PakStats {
            asset_count: self.assets.len(),
            page_count: self.locator.page_count(),
            patch_count: self.header.patch_count,
            pointer_count: self.pointers.len(),
            collection_sizes: [
                self.collections.get(SegmentType::Unused).len() as u64,
                self.collections.get(SegmentType::Header).len() as u64,
                self.collections.get(SegmentType::Cpu).len() as u64,
                self.collections.get(SegmentType::Temp).len() as u64,
            ],
            starpak_count: self.starpaks.len() + self.opt_starpaks.len(),
        }
    }
}
