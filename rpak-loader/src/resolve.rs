//! Pointer and guid-ref resolution.
//!
//! For each pointer-table entry the raw (page, offset) pair is loaded from
//! its slot inside the materialized collections, the page index is
//! adjusted relative to the first-page index (wrapping past the end of the
//! page array where the unadjusted index would land below it), and the
//! result becomes an explicit `PagePtr::Resolved`. Guid-ref slots resolve
//! their locations the same way; their targets are filled in by the
//! consuming layer, not here.

use rpak_format::{PagePtr, RawPtr};

use crate::layout::{Locator, SegmentCollections};
use crate::{LoadError, Result};

/// A pointer-table entry after resolution: where the slot lives, and the
/// address the slot's raw pair resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPointer {
    pub slot: PagePtr,
    pub value: PagePtr,
}

/// Adjust a stored page index relative to `first_page`, wrapping modulo
/// the page count.
pub(crate) fn adjust_page_index(raw_page: u32, first_page: u32, page_count: u32) -> Result<u32> {
    if raw_page >= page_count {
        return Err(LoadError::PointerOutOfRange {
            page: raw_page,
            offset: 0,
        });
    }
    Ok((raw_page + first_page) % page_count)
}

/// Resolve a raw pointer value into a collection address.
pub(crate) fn resolve_value(raw: RawPtr, first_page: u32, locator: &Locator) -> Result<PagePtr> {
    if raw.is_null() {
        return Ok(PagePtr::Null);
    }
    let page = adjust_page_index(raw.page, first_page, locator.page_count())?;
    let (segment, offset) = locator.map(page, raw.offset)?;
    Ok(PagePtr::Resolved { segment, offset })
}

/// Read the raw pair stored inside the collections at a resolved location.
pub(crate) fn read_raw_at(
    collections: &SegmentCollections,
    location: PagePtr,
) -> Result<RawPtr> {
    let (segment, offset) = location.resolved().ok_or(LoadError::PointerOutOfRange {
        page: u32::MAX,
        offset: u32::MAX,
    })?;
    let bytes = collections.slice(segment, offset, 8)?;
    Ok(RawPtr::parse(bytes)?)
}

/// Resolve the whole pointer table: each descriptor names a slot; the raw
/// pair stored there becomes a direct address.
pub(crate) fn resolve_pointer_table(
    descriptors: &[RawPtr],
    first_page: u32,
    locator: &Locator,
    collections: &SegmentCollections,
) -> Result<Vec<ResolvedPointer>> {
    let mut resolved = Vec::with_capacity(descriptors.len());
    for desc in descriptors {
        let (segment, offset) = locator.map(desc.page, desc.offset)?;
        let slot = PagePtr::Resolved { segment, offset };
        let raw = read_raw_at(collections, slot)?;
        let value = resolve_value(raw, first_page, locator)?;
        resolved.push(ResolvedPointer { slot, value });
    }
    Ok(resolved)
}

/// Resolve guid-ref slot locations. A sentinel descriptor stays null.
pub(crate) fn resolve_guid_refs(
    descriptors: &[RawPtr],
    locator: &Locator,
) -> Result<Vec<PagePtr>> {
    let mut resolved = Vec::with_capacity(descriptors.len());
    for desc in descriptors {
        if desc.is_null() {
            resolved.push(PagePtr::Null);
            continue;
        }
        let (segment, offset) = locator.map(desc.page, desc.offset)?;
        resolved.push(PagePtr::Resolved { segment, offset });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_wraps() {
        // 5 pages, first-page index 2: stored 0 -> 2, stored 3 -> 0.
        assert_eq!(adjust_page_index(0, 2, 5).unwrap(), 2);
        assert_eq!(adjust_page_index(2, 2, 5).unwrap(), 4);
        assert_eq!(adjust_page_index(3, 2, 5).unwrap(), 0);
        assert_eq!(adjust_page_index(4, 2, 5).unwrap(), 1);
    }

    #[test]
    fn test_adjust_rejects_out_of_range() {
        assert!(adjust_page_index(5, 0, 5).is_err());
        assert!(adjust_page_index(0, 0, 0).is_err());
    }
}
