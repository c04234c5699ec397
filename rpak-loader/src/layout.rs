//! Segment collections and page layout.
//!
//! Pages are concatenated, in declaration order, into one arena per
//! segment type. The patched path additionally splits header-type pages:
//! their asset headers are regrouped per type inside the header arena, so
//! a header page maps through per-asset spans instead of one placement.

use tracing::trace;

use rpak_format::ioutils::align_up;
use rpak_format::{PageHeader, SegmentHeader, SegmentType};

use crate::{LoadError, Result};

/// Final location of one page inside its segment collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlacement {
    pub segment: SegmentType,
    pub offset: u64,
    pub size: u64,
}

/// How a page index maps into the collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSlot {
    /// The whole page occupies one contiguous run.
    Whole(PagePlacement),
    /// A header page whose contents were regrouped per asset header.
    Split,
}

/// One relocated asset header inside a split page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderSpan {
    pub page: u32,
    pub page_offset: u32,
    pub size: u32,
    /// Destination offset inside the header collection.
    pub dest: u64,
}

/// One arena per segment type, sized before any page bytes land.
#[derive(Debug)]
pub struct SegmentCollections {
    data: [Vec<u8>; SegmentType::COUNT],
}

impl SegmentCollections {
    pub fn with_sizes(sizes: [u64; SegmentType::COUNT]) -> Result<Self> {
        let mut data: [Vec<u8>; SegmentType::COUNT] = Default::default();
        for (arena, &size) in data.iter_mut().zip(sizes.iter()) {
            let size = usize::try_from(size).map_err(|_| LoadError::PageDataOutOfBounds {
                needed: size,
                available: usize::MAX as u64,
            })?;
            *arena = vec![0u8; size];
        }
        Ok(Self { data })
    }

    pub fn get(&self, segment: SegmentType) -> &[u8] {
        &self.data[segment.index()]
    }

    /// Borrow `len` bytes at `offset` in one collection.
    pub fn slice(&self, segment: SegmentType, offset: u64, len: u64) -> Result<&[u8]> {
        let arena = self.get(segment);
        let start = usize::try_from(offset);
        let end = offset.checked_add(len).map(usize::try_from);
        match (start, end) {
            (Ok(start), Some(Ok(end))) if end <= arena.len() => Ok(&arena[start..end]),
            _ => Err(LoadError::CollectionOutOfBounds {
                segment,
                offset,
                len,
            }),
        }
    }

    /// Copy `bytes` into one collection at `offset`.
    pub fn write(&mut self, segment: SegmentType, offset: u64, bytes: &[u8]) -> Result<()> {
        let arena = &mut self.data[segment.index()];
        let start = usize::try_from(offset).ok();
        let end = start.and_then(|s| s.checked_add(bytes.len()));
        match (start, end) {
            (Some(start), Some(end)) if end <= arena.len() => {
                arena[start..end].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(LoadError::CollectionOutOfBounds {
                segment,
                offset,
                len: bytes.len() as u64,
            }),
        }
    }

    /// Zero-fill a run in one collection.
    pub fn zero(&mut self, segment: SegmentType, offset: u64, len: u64) -> Result<()> {
        let arena = &mut self.data[segment.index()];
        let start = usize::try_from(offset).ok();
        let end = start.and_then(|s| s.checked_add(usize::try_from(len).ok()?));
        match (start, end) {
            (Some(start), Some(end)) if end <= arena.len() => {
                arena[start..end].fill(0);
                Ok(())
            }
            _ => Err(LoadError::CollectionOutOfBounds {
                segment,
                offset,
                len,
            }),
        }
    }
}

/// Compute every page's aligned placement and the resulting arena sizes.
pub fn place_pages(
    pages: &[PageHeader],
    segments: &[SegmentHeader],
) -> Result<(Vec<PagePlacement>, [u64; SegmentType::COUNT])> {
    let mut cursors = [0u64; SegmentType::COUNT];
    let mut placements = Vec::with_capacity(pages.len());

    for page in pages {
        let segment = segments[page.segment as usize].segment_type();
        let cursor = &mut cursors[segment.index()];
        *cursor = align_up(*cursor, u64::from(page.alignment))?;
        placements.push(PagePlacement {
            segment,
            offset: *cursor,
            size: u64::from(page.size),
        });
        trace!(
            "page -> {:?} at {:#x} (+{:#x})",
            segment, *cursor, page.size
        );
        *cursor += u64::from(page.size);
    }

    Ok((placements, cursors))
}

/// Maps (page, offset) locations to collection addresses, through whole
/// placements or per-asset header spans.
#[derive(Debug)]
pub struct Locator {
    slots: Vec<PageSlot>,
    /// Spans of split pages, sorted by (page, page_offset).
    spans: Vec<HeaderSpan>,
}

impl Locator {
    pub fn new(slots: Vec<PageSlot>, mut spans: Vec<HeaderSpan>) -> Self {
        spans.sort_by_key(|s| (s.page, s.page_offset));
        Self { slots, spans }
    }

    pub fn page_count(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn slots(&self) -> &[PageSlot] {
        &self.slots
    }

    /// Map a location to its collection address.
    pub fn map(&self, page: u32, offset: u32) -> Result<(SegmentType, u64)> {
        let slot = self
            .slots
            .get(page as usize)
            .ok_or(LoadError::PointerOutOfRange { page, offset })?;

        match slot {
            PageSlot::Whole(placement) => {
                if u64::from(offset) >= placement.size {
                    return Err(LoadError::PointerOutOfRange { page, offset });
                }
                Ok((placement.segment, placement.offset + u64::from(offset)))
            }
            PageSlot::Split => {
                // Binary search for the span containing this offset.
                let idx = self
                    .spans
                    .partition_point(|s| (s.page, s.page_offset) <= (page, offset));
                let span = idx
                    .checked_sub(1)
                    .map(|i| self.spans[i])
                    .filter(|s| {
                        s.page == page && offset < s.page_offset + s.size
                    })
                    .ok_or(LoadError::PointerOutOfRange { page, offset })?;
                Ok((
                    SegmentType::Header,
                    span.dest + u64::from(offset - span.page_offset),
                ))
            }
        }
    }
}
