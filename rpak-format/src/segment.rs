//! Segment and page records.
//!
//! A segment classifies pages by purpose; it owns no bytes itself. Pages are
//! contiguous byte runs assigned to one segment, concatenated into
//! per-segment-type arenas at load time.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::{Error, Result};

/// Low nibble of the segment flags selects the segment type.
const SEGMENT_TYPE_MASK: u32 = 0xF;

/// Classification of a segment's pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentType {
    /// Pages holding no live data.
    Unused,
    /// Pages holding asset header/metadata blocks.
    Header,
    /// Pages holding bulk payload ("cpu") data.
    Cpu,
    /// Pages holding load-time scratch data.
    Temp,
}

impl SegmentType {
    /// Number of distinct segment types, and so of segment collections.
    pub const COUNT: usize = 4;

    /// Decode the type nibble of a segment's flags field.
    pub fn from_flags(flags: u32) -> Self {
        match flags & SEGMENT_TYPE_MASK {
            0x1 => Self::Header,
            0x2 => Self::Cpu,
            0x3 => Self::Temp,
            _ => Self::Unused,
        }
    }

    pub const fn to_flags(self) -> u32 {
        match self {
            Self::Unused => 0x0,
            Self::Header => 0x1,
            Self::Cpu => 0x2,
            Self::Temp => 0x3,
        }
    }

    /// Stable index used to address the per-type segment collections.
    pub const fn index(self) -> usize {
        match self {
            Self::Unused => 0,
            Self::Header => 1,
            Self::Cpu => 2,
            Self::Temp => 3,
        }
    }
}

/// One on-disk segment record (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub flags: u32,
    pub alignment: u32,
    pub size: u64,
}

impl SegmentHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(data);
        let flags = r.read_u32::<LittleEndian>()?;
        let alignment = r.read_u32::<LittleEndian>()?;
        let size = r.read_u64::<LittleEndian>()?;
        if alignment > 1 && !alignment.is_power_of_two() {
            return Err(Error::InvalidAlignment(u64::from(alignment)));
        }
        Ok(Self {
            flags,
            alignment,
            size,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let _ = out.write_u32::<LittleEndian>(self.flags);
        let _ = out.write_u32::<LittleEndian>(self.alignment);
        let _ = out.write_u64::<LittleEndian>(self.size);
    }

    pub fn segment_type(&self) -> SegmentType {
        SegmentType::from_flags(self.flags)
    }
}

/// One on-disk page record (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Index into the segment table.
    pub segment: u32,
    pub alignment: u32,
    pub size: u32,
}

impl PageHeader {
    pub fn parse(data: &[u8], segment_count: u32) -> Result<Self> {
        let mut r = Cursor::new(data);
        let segment = r.read_u32::<LittleEndian>()?;
        let alignment = r.read_u32::<LittleEndian>()?;
        let size = r.read_u32::<LittleEndian>()?;
        if segment >= segment_count {
            return Err(Error::SegmentOutOfRange {
                segment,
                segment_count,
            });
        }
        if alignment > 1 && !alignment.is_power_of_two() {
            return Err(Error::InvalidAlignment(u64::from(alignment)));
        }
        Ok(Self {
            segment,
            alignment,
            size,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let _ = out.write_u32::<LittleEndian>(self.segment);
        let _ = out.write_u32::<LittleEndian>(self.alignment);
        let _ = out.write_u32::<LittleEndian>(self.size);
    }
}
