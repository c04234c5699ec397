//! The linear walk over a pak's non-paged leading regions.
//!
//! Both load paths parse the same sequence: streaming-file path runs,
//! segment array, page array, pointer array, asset array, guid-ref array,
//! dependency array and, for v8, the external-asset-reference tables.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::debug;

use rpak_format::ioutils::{read_cstring_run, slice_exact};
use rpak_format::{
    AssetRecord, PAGE_RECORD_SIZE, PTR_RECORD_SIZE, PageHeader, PakHeader, PakVersion, RawPtr,
    SEGMENT_RECORD_SIZE, SegmentHeader,
};

use crate::Result;

/// Every parsed leading-region table.
#[derive(Debug)]
pub(crate) struct PakTables {
    pub starpak_paths: Vec<String>,
    pub opt_starpak_paths: Vec<String>,
    pub segments: Vec<SegmentHeader>,
    pub pages: Vec<PageHeader>,
    /// Pointer-table descriptors: locations of pointer slots.
    pub pointers: Vec<RawPtr>,
    pub assets: Vec<AssetRecord>,
    /// Guid-ref descriptors: locations where dependency GUIDs live.
    pub guid_refs: Vec<RawPtr>,
    /// Dependents table: asset indices.
    pub relations: Vec<u32>,
    /// External asset references (v8), GUIDs plus a name table.
    pub external_guids: Vec<u64>,
    pub external_names: Vec<String>,
    /// Offset just past the refs regions: page data, or for a patched pak
    /// the patch command stream, starts here.
    pub data_start: usize,
}

impl PakTables {
    /// Walk the buffer linearly starting at `offset` (just past the fixed
    /// header and any patch-data region).
    pub fn parse(buffer: &[u8], header: &PakHeader, offset: usize) -> Result<Self> {
        let mut cursor = offset;

        let starpak_paths =
            read_cstring_run(buffer, cursor, usize::from(header.starpak_paths_size))?;
        cursor += usize::from(header.starpak_paths_size);

        let opt_starpak_paths =
            read_cstring_run(buffer, cursor, usize::from(header.opt_starpak_paths_size))?;
        cursor += usize::from(header.opt_starpak_paths_size);

        let mut segments = Vec::with_capacity(usize::from(header.segment_count));
        for _ in 0..header.segment_count {
            segments.push(SegmentHeader::parse(slice_exact(
                buffer,
                cursor,
                SEGMENT_RECORD_SIZE,
            )?)?);
            cursor += SEGMENT_RECORD_SIZE;
        }

        let mut pages = Vec::with_capacity(usize::from(header.page_count));
        for _ in 0..header.page_count {
            pages.push(PageHeader::parse(
                slice_exact(buffer, cursor, PAGE_RECORD_SIZE)?,
                u32::from(header.segment_count),
            )?);
            cursor += PAGE_RECORD_SIZE;
        }

        let mut pointers = Vec::with_capacity(header.pointer_count as usize);
        for _ in 0..header.pointer_count {
            pointers.push(RawPtr::parse(slice_exact(buffer, cursor, PTR_RECORD_SIZE)?)?);
            cursor += PTR_RECORD_SIZE;
        }

        let record_size = header.version.asset_record_size();
        let mut assets = Vec::with_capacity(header.asset_count as usize);
        for _ in 0..header.asset_count {
            assets.push(AssetRecord::parse(
                slice_exact(buffer, cursor, record_size)?,
                header.version,
            )?);
            cursor += record_size;
        }

        let mut guid_refs = Vec::with_capacity(header.guid_ref_count as usize);
        for _ in 0..header.guid_ref_count {
            guid_refs.push(RawPtr::parse(slice_exact(buffer, cursor, PTR_RECORD_SIZE)?)?);
            cursor += PTR_RECORD_SIZE;
        }

        let mut relations = Vec::with_capacity(header.relation_count as usize);
        {
            let run = slice_exact(buffer, cursor, header.relation_count as usize * 4)?;
            let mut r = Cursor::new(run);
            for _ in 0..header.relation_count {
                relations.push(r.read_u32::<LittleEndian>()?);
            }
            cursor += run.len();
        }

        let mut external_guids = Vec::new();
        let mut external_names = Vec::new();
        if header.version == PakVersion::V8 {
            let run = slice_exact(buffer, cursor, header.external_ref_count as usize * 8)?;
            let mut r = Cursor::new(run);
            for _ in 0..header.external_ref_count {
                external_guids.push(r.read_u64::<LittleEndian>()?);
            }
            cursor += run.len();

            external_names =
                read_cstring_run(buffer, cursor, header.external_ref_size as usize)?;
            cursor += header.external_ref_size as usize;
        }

        debug!(
            "parsed tables: {} segments, {} pages, {} pointers, {} assets, {} guid refs",
            segments.len(),
            pages.len(),
            pointers.len(),
            assets.len(),
            guid_refs.len()
        );

        Ok(Self {
            starpak_paths,
            opt_starpak_paths,
            segments,
            pages,
            pointers,
            assets,
            guid_refs,
            relations,
            external_guids,
            external_names,
            data_start: cursor,
        })
    }
}
