//! Relocatable page pointers.
//!
//! On disk a pointer is a (page index, byte offset) pair. After the pages
//! are materialized into segment collections it becomes a direct reference
//! into one collection. Resolution is an explicit state transition on the
//! [`PagePtr`] sum type, never an in-place reinterpretation.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::Result;
use crate::segment::SegmentType;

/// Sentinel value marking an invalid pointer (both fields at maximum).
pub const PTR_SENTINEL: u32 = u32::MAX;

/// The raw on-disk pointer pair (8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPtr {
    pub page: u32,
    pub offset: u32,
}

impl RawPtr {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(data);
        let page = r.read_u32::<LittleEndian>()?;
        let offset = r.read_u32::<LittleEndian>()?;
        Ok(Self { page, offset })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let _ = out.write_u32::<LittleEndian>(self.page);
        let _ = out.write_u32::<LittleEndian>(self.offset);
    }

    /// Whether both fields carry the sentinel value.
    pub fn is_null(&self) -> bool {
        self.page == PTR_SENTINEL && self.offset == PTR_SENTINEL
    }

    pub const fn null() -> Self {
        Self {
            page: PTR_SENTINEL,
            offset: PTR_SENTINEL,
        }
    }
}

/// A page pointer in one of its lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePtr {
    /// The on-disk form: page index + byte offset within that page.
    Unresolved { page: u32, offset: u32 },
    /// The materialized form: segment collection + byte offset within it.
    Resolved { segment: SegmentType, offset: u64 },
    /// Explicitly invalid (sentinel index/offset on disk).
    Null,
}

impl PagePtr {
    pub fn from_raw(raw: RawPtr) -> Self {
        if raw.is_null() {
            Self::Null
        } else {
            Self::Unresolved {
                page: raw.page,
                offset: raw.offset,
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The resolved (segment, offset) location, if this pointer has been
    /// resolved.
    pub fn resolved(&self) -> Option<(SegmentType, u64)> {
        match self {
            Self::Resolved { segment, offset } => Some((*segment, *offset)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        let ptr = RawPtr { page: 3, offset: 0x40 };
        let mut buf = Vec::new();
        ptr.write_to(&mut buf);
        assert_eq!(buf.len(), crate::PTR_RECORD_SIZE);
        assert_eq!(RawPtr::parse(&buf).unwrap(), ptr);
    }

    #[test]
    fn test_null_sentinel() {
        assert!(RawPtr::null().is_null());
        assert!(!RawPtr { page: PTR_SENTINEL, offset: 0 }.is_null());
        assert_eq!(PagePtr::from_raw(RawPtr::null()), PagePtr::Null);
        assert_eq!(
            PagePtr::from_raw(RawPtr { page: 1, offset: 4 }),
            PagePtr::Unresolved { page: 1, offset: 4 }
        );
    }

    #[test]
    fn test_resolved_accessor() {
        let ptr = PagePtr::Resolved {
            segment: SegmentType::Cpu,
            offset: 0x80,
        };
        assert_eq!(ptr.resolved(), Some((SegmentType::Cpu, 0x80)));
        assert_eq!(PagePtr::Null.resolved(), None);
    }
}
