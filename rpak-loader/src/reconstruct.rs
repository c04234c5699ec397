//! The patch reconstruction engine.
//!
//! A patched base pak carries the final header, the patch-data region and
//! only its own page bytes; the patch files carry the final tables, the
//! patch command stream, replacement data and the patch-contributed pages.
//! Reconstruction concatenates every patch payload behind one copy of the
//! base header, re-derives the tables from that image, then replays the
//! command stream to transform the pre-patch page image into the segment
//! collections. Asset headers are regrouped per type inside the header
//! collection; pointer and guid-ref locations falling inside a relocated
//! header shift with it through the span mapping.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tracing::{debug, warn};

use rpak_format::ioutils::{align_up, read_cstring_run};
use rpak_format::{AssetKind, PakHeader, PatchRegion, SegmentType};
use rpak_patch::{PatchOp, PatchStream};

use crate::config::LoadConfig;
use crate::layout::{HeaderSpan, Locator, PagePlacement, PageSlot, SegmentCollections};
use crate::load::{build_assets, open_starpaks};
use crate::pak::Pak;
use crate::registry::AssetTypeRegistry;
use crate::resolve::{adjust_page_index, resolve_guid_refs, resolve_pointer_table};
use crate::tables::PakTables;
use crate::{LoadError, Result};

/// Extra replay steps tolerated beyond the byte-count bound.
const RETRY_CEILING: u64 = 64;

/// Sequential reader over the pre-patch page image: patch-contributed page
/// data first, then the base file's own page bytes.
struct SourceCursor<'a> {
    parts: [&'a [u8]; 2],
    part: usize,
    pos: usize,
}

impl<'a> SourceCursor<'a> {
    fn new(new_pages: &'a [u8], base_pages: &'a [u8]) -> Self {
        Self {
            parts: [new_pages, base_pages],
            part: 0,
            pos: 0,
        }
    }

    fn remaining(&self) -> u64 {
        let mut total = (self.parts[self.part].len() - self.pos) as u64;
        for part in &self.parts[self.part + 1..] {
            total += part.len() as u64;
        }
        total
    }

    fn take(&mut self, n: usize, mut sink: impl FnMut(&[u8]) -> Result<()>) -> Result<()> {
        let mut left = n;
        while left > 0 {
            if self.part >= self.parts.len() {
                return Err(LoadError::PatchIntegrity(format!(
                    "source exhausted with {left} bytes requested"
                )));
            }
            let part = self.parts[self.part];
            let available = part.len() - self.pos;
            if available == 0 {
                self.part += 1;
                self.pos = 0;
                continue;
            }
            let chunk = available.min(left);
            sink(&part[self.pos..self.pos + chunk])?;
            self.pos += chunk;
            left -= chunk;
        }
        Ok(())
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n, |_| Ok(()))
    }
}

/// One destination run awaiting patched bytes.
#[derive(Debug, Clone, Copy)]
struct DestSlot {
    segment: SegmentType,
    offset: u64,
    remaining: u64,
}

struct Destinations {
    slots: VecDeque<DestSlot>,
}

impl Destinations {
    fn total_remaining(&self) -> u64 {
        self.slots.iter().map(|s| s.remaining).sum()
    }

    fn finished(&self) -> bool {
        self.slots.is_empty()
    }

    /// Advance to the next slot still needing bytes: replay step (a).
    fn current(&mut self) -> Option<&mut DestSlot> {
        while let Some(front) = self.slots.front() {
            if front.remaining == 0 {
                self.slots.pop_front();
            } else {
                break;
            }
        }
        self.slots.front_mut()
    }
}

/// Per-asset header relocation computed before replay.
struct HeaderLayout {
    spans: Vec<HeaderSpan>,
    /// Total header collection size.
    arena_size: u64,
}

/// Steps 4 and 5: sort assets by head-page address (patch-contributed
/// pages group first) and lay their headers out per type.
fn layout_headers(
    tables: &PakTables,
    first_page: u32,
    page_count: u32,
    registry: &AssetTypeRegistry,
) -> Result<HeaderLayout> {
    // Sorted view of asset indices by absolute (page, offset). Pages below
    // the first-page index come from patch layers, so their assets group
    // first, matching the order the patch stream emits them.
    let mut order: Vec<usize> = (0..tables.assets.len()).collect();
    let mut abs_heads: Vec<Option<(u32, u32)>> = Vec::with_capacity(tables.assets.len());
    for record in &tables.assets {
        if record.head.is_null() {
            abs_heads.push(None);
        } else {
            let page = adjust_page_index(record.head.page, first_page, page_count)?;
            abs_heads.push(Some((page, record.head.offset)));
        }
    }
    order.sort_by_key(|&i| abs_heads[i].unwrap_or((u32::MAX, u32::MAX)));

    // Running write offset within each type's header group.
    let mut type_order: Vec<AssetKind> = Vec::new();
    let mut type_sizes: HashMap<AssetKind, u64> = HashMap::new();
    let mut within: Vec<u64> = vec![0; tables.assets.len()];
    for &i in &order {
        if abs_heads[i].is_none() {
            continue;
        }
        let record = &tables.assets[i];
        let align = u64::from(registry.header_align(record.kind));
        let cursor = type_sizes.entry(record.kind).or_insert_with(|| {
            type_order.push(record.kind);
            0
        });
        *cursor = align_up(*cursor, align)?;
        within[i] = *cursor;
        *cursor += u64::from(record.header_size);
    }

    // Group base offsets: all headers of one type end up contiguous.
    let mut type_bases: HashMap<AssetKind, u64> = HashMap::new();
    let mut arena_size = 0u64;
    for kind in &type_order {
        let align = u64::from(registry.header_align(*kind));
        arena_size = align_up(arena_size, align)?;
        type_bases.insert(*kind, arena_size);
        arena_size += type_sizes[kind];
    }

    let mut spans = Vec::new();
    for &i in &order {
        let Some((page, page_offset)) = abs_heads[i] else {
            continue;
        };
        let record = &tables.assets[i];
        spans.push(HeaderSpan {
            page,
            page_offset,
            size: record.header_size,
            dest: type_bases[&record.kind] + within[i],
        });
    }

    Ok(HeaderLayout { spans, arena_size })
}

/// Reconstruct a patched pak from the base image and its decompressed
/// patch files.
pub(crate) fn reconstruct(
    base: &[u8],
    header: PakHeader,
    patch_buffers: &[Vec<u8>],
    registry: &AssetTypeRegistry,
    starpak_dir: Option<&Path>,
    config: &LoadConfig,
) -> Result<Pak> {
    let fixed = header.fixed_size();
    let region = PatchRegion::parse(base, fixed, header.patch_count)?;
    let first_page = region.data.page_count;

    if patch_buffers.len() != usize::from(header.patch_count) {
        return Err(LoadError::PatchIntegrity(format!(
            "{} patch files supplied, header declares {}",
            patch_buffers.len(),
            header.patch_count
        )));
    }

    // Step 2: one combined buffer, base header first, then every patch
    // file's payload with its own fixed header skipped.
    let mut combined = Vec::new();
    combined.extend_from_slice(&base[..fixed]);
    for (i, buf) in patch_buffers.iter().enumerate() {
        let patch_header = PakHeader::parse(buf)?;
        if buf.len() as u64 != region.files[i].decompressed_size {
            warn!(
                "patch file {} is {} bytes, region declares {}",
                region.numbers[i],
                buf.len(),
                region.files[i].decompressed_size
            );
        }
        combined.extend_from_slice(&buf[patch_header.fixed_size()..]);
    }

    // Step 3: re-derive every table against the combined buffer.
    let tables_offset = fixed + header.patch_region_size();
    let combined_region = PatchRegion::parse(&combined, fixed, header.patch_count)?;
    if combined_region != region {
        integrity(config, "patch region differs between base and patch payload")?;
    }
    let tables = PakTables::parse(&combined, &header, tables_offset)?;
    let page_count = tables.pages.len() as u32;
    if first_page > page_count {
        return Err(LoadError::PatchIntegrity(format!(
            "first-page index {first_page} exceeds {page_count} pages"
        )));
    }

    let stream_start = tables.data_start;
    let stream_size = region.data.stream_size as usize;
    let stream_end = stream_start
        .checked_add(stream_size)
        .filter(|&end| end <= combined.len())
        .ok_or_else(|| {
            LoadError::PatchIntegrity(format!(
                "command stream of {stream_size} bytes does not fit the combined buffer"
            ))
        })?;

    // Steps 4-5: asset sort and per-type header layout.
    let layout = layout_headers(&tables, first_page, page_count, registry)?;

    // Step 6: size the collections. Non-header pages place as usual;
    // header pages split into per-asset spans.
    let mut sizes = [0u64; SegmentType::COUNT];
    sizes[SegmentType::Header.index()] = layout.arena_size;
    let mut slots: Vec<PageSlot> = Vec::with_capacity(tables.pages.len());
    for page in &tables.pages {
        let segment = tables.segments[page.segment as usize].segment_type();
        if segment == SegmentType::Header {
            slots.push(PageSlot::Split);
        } else {
            let cursor = &mut sizes[segment.index()];
            *cursor = align_up(*cursor, u64::from(page.alignment))?;
            slots.push(PageSlot::Whole(PagePlacement {
                segment,
                offset: *cursor,
                size: u64::from(page.size),
            }));
        }
    }
    let mut collections = SegmentCollections::with_sizes(sizes)?;

    // Destination sequence: pages in index order; split pages expand into
    // their header spans in page-offset order.
    let mut spans_by_page: HashMap<u32, Vec<HeaderSpan>> = HashMap::new();
    for span in &layout.spans {
        spans_by_page.entry(span.page).or_default().push(*span);
    }
    for spans in spans_by_page.values_mut() {
        spans.sort_by_key(|s| s.page_offset);
    }

    let mut dest = Destinations {
        slots: VecDeque::new(),
    };
    for (index, slot) in slots.iter().enumerate() {
        match slot {
            PageSlot::Whole(placement) => dest.slots.push_back(DestSlot {
                segment: placement.segment,
                offset: placement.offset,
                remaining: placement.size,
            }),
            PageSlot::Split => {
                if let Some(spans) = spans_by_page.get(&(index as u32)) {
                    for span in spans {
                        dest.slots.push_back(DestSlot {
                            segment: SegmentType::Header,
                            offset: span.dest,
                            remaining: u64::from(span.size),
                        });
                    }
                }
            }
        }
    }

    // Source sequence: patch-contributed page bytes from the combined
    // buffer, then the base file's own page bytes.
    let new_pages_size: u64 = tables.pages[..first_page as usize]
        .iter()
        .map(|p| u64::from(p.size))
        .sum();
    let new_page_data = usize::try_from(new_pages_size)
        .ok()
        .and_then(|len| stream_end.checked_add(len))
        .and_then(|end| combined.get(stream_end..end))
        .ok_or_else(|| {
            LoadError::PatchIntegrity(format!(
                "patch page data of {new_pages_size} bytes does not fit the combined buffer"
            ))
        })?;

    let base_data_start = fixed + header.patch_region_size();
    let base_pages_size = header.contained_pages_size(&tables.pages, first_page);
    let base_page_data = usize::try_from(base_pages_size)
        .ok()
        .and_then(|len| base_data_start.checked_add(len))
        .and_then(|end| base.get(base_data_start..end))
        .ok_or_else(|| {
            LoadError::PatchIntegrity(format!(
                "base page data of {base_pages_size} bytes does not fit the base buffer"
            ))
        })?;

    // Steps 7-8: replay the command stream until nothing is outstanding.
    let mut stream = PatchStream::new(&combined[stream_start..stream_end])?;
    let mut src = SourceCursor::new(new_page_data, base_page_data);
    let step_ceiling = dest.total_remaining() + src.remaining() + RETRY_CEILING;
    let mut steps = 0u64;

    while !dest.finished() {
        if dest.current().is_none() {
            break;
        }
        steps += 1;
        if steps > step_ceiling {
            integrity(config, "replay step ceiling exceeded")?;
            zero_fill_remaining(&mut dest, &mut collections)?;
            break;
        }

        let command = match stream.next_command() {
            Ok(command) => command,
            Err(e) => {
                integrity(config, &format!("command stream ended early: {e}"))?;
                zero_fill_remaining(&mut dest, &mut collections)?;
                break;
            }
        };

        let result = execute(
            command.op,
            command.size,
            &mut dest,
            &mut src,
            &mut stream,
            &mut collections,
        );
        if let Err(e) = result {
            integrity(config, &format!("command failed: {e}"))?;
            zero_fill_remaining(&mut dest, &mut collections)?;
            break;
        }
    }

    debug!(
        "patch replay finished after {} steps, {} bytes outstanding",
        steps,
        dest.total_remaining()
    );

    // Resolution against the regrouped layout. Pointer and guid-ref
    // entries inside relocated headers shift with them via the spans.
    let locator = Locator::new(slots, layout.spans);
    let pointers = resolve_pointer_table(&tables.pointers, first_page, &locator, &collections)?;
    let guid_refs = resolve_guid_refs(&tables.guid_refs, &locator)?;
    let (assets, by_guid) = build_assets(&tables.assets, first_page, &locator);

    // Step 9: drop the oversized buffers, keep a right-sized copy of the
    // leading region, and re-parse the side-car path lists from it.
    let leading = combined[fixed..stream_start].to_vec();
    let paths_offset = header.patch_region_size();
    let starpak_paths = read_cstring_run(
        &leading,
        paths_offset,
        usize::from(header.starpak_paths_size),
    )?;
    let opt_starpak_paths = read_cstring_run(
        &leading,
        paths_offset + usize::from(header.starpak_paths_size),
        usize::from(header.opt_starpak_paths_size),
    )?;

    let starpaks = open_starpaks(&starpak_paths, starpak_dir);
    let opt_starpaks = open_starpaks(&opt_starpak_paths, starpak_dir);

    debug!(
        "reconstructed pak: {} assets, {} patch layers, first page {}",
        assets.len(),
        header.patch_count,
        first_page
    );

    Ok(Pak {
        header,
        collections,
        locator,
        first_page,
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

/// Execute one command, splitting it across destination slots as needed.
fn execute(
    op: PatchOp,
    size: u64,
    dest: &mut Destinations,
    src: &mut SourceCursor<'_>,
    stream: &mut PatchStream<'_>,
    collections: &mut SegmentCollections,
) -> Result<()> {
    let mut left = size;

    // Source-only operators never touch a destination slot.
    if op == PatchOp::Skip {
        return src.skip(usize::try_from(size).unwrap_or(usize::MAX));
    }

    while left > 0 {
        let slot = dest
            .current()
            .ok_or_else(|| LoadError::PatchIntegrity(format!(
                "command overruns destinations by {left} bytes"
            )))?;
        let chunk = slot.remaining.min(left) as usize;
        let segment = slot.segment;
        let offset = slot.offset;

        match op {
            PatchOp::Copy => {
                let mut at = offset;
                src.take(chunk, |bytes| {
                    collections.write(segment, at, bytes)?;
                    at += bytes.len() as u64;
                    Ok(())
                })?;
            }
            PatchOp::Replace => {
                let bytes = stream.take_replacement(chunk)?;
                collections.write(segment, offset, bytes)?;
                src.skip(chunk)?;
            }
            PatchOp::Insert => {
                let bytes = stream.take_replacement(chunk)?;
                collections.write(segment, offset, bytes)?;
            }
            PatchOp::Zero => {
                collections.zero(segment, offset, chunk as u64)?;
            }
            PatchOp::Skip => unreachable!("handled above"),
        }

        let slot = dest.current().ok_or_else(|| {
            LoadError::PatchIntegrity("destination vanished mid-command".to_string())
        })?;
        slot.offset += chunk as u64;
        slot.remaining -= chunk as u64;
        left -= chunk as u64;
    }
    Ok(())
}

/// Lenient-mode cleanup: zero whatever never received patched bytes.
fn zero_fill_remaining(
    dest: &mut Destinations,
    collections: &mut SegmentCollections,
) -> Result<()> {
    while let Some(slot) = dest.current() {
        let (segment, offset, remaining) = (slot.segment, slot.offset, slot.remaining);
        slot.remaining = 0;
        collections.zero(segment, offset, remaining)?;
    }
    Ok(())
}

/// Report a patch integrity violation: fatal in strict mode, logged
/// otherwise.
fn integrity(config: &LoadConfig, message: &str) -> Result<()> {
    if config.strict {
        Err(LoadError::PatchIntegrity(message.to_string()))
    } else {
        warn!("patch integrity: {message}; continuing best-effort");
        Ok(())
    }
}
