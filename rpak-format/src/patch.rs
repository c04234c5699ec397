//! Patch-chain records.
//!
//! A patch-capable pak with `patch_count > 0` carries a patch-data region
//! directly after its fixed header: one [`PatchDataHeader`], then one
//! [`PatchFileHeader`] per patch layer, then one `u16` file number per
//! patch layer.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::ioutils::slice_exact;
use crate::Result;

/// Head of the patch-data region (8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchDataHeader {
    /// Total byte size of the patch command stream.
    pub stream_size: u32,
    /// Number of pages carried by patch layers. In the final page numbering
    /// these occupy indices `0..page_count`; the base file's own pages
    /// start at this index.
    pub page_count: u32,
}

impl PatchDataHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(data);
        Ok(Self {
            stream_size: r.read_u32::<LittleEndian>()?,
            page_count: r.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let _ = out.write_u32::<LittleEndian>(self.stream_size);
        let _ = out.write_u32::<LittleEndian>(self.page_count);
    }
}

/// Size record for one patch file (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchFileHeader {
    pub compressed_size: u64,
    pub decompressed_size: u64,
}

impl PatchFileHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(data);
        Ok(Self {
            compressed_size: r.read_u64::<LittleEndian>()?,
            decompressed_size: r.read_u64::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let _ = out.write_u64::<LittleEndian>(self.compressed_size);
        let _ = out.write_u64::<LittleEndian>(self.decompressed_size);
    }
}

/// The complete patch-data region of a base pak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRegion {
    pub data: PatchDataHeader,
    pub files: Vec<PatchFileHeader>,
    /// Patch file numbers, in application order; each names the on-disk
    /// `(NN)` suffix of one patch file.
    pub numbers: Vec<u16>,
}

impl PatchRegion {
    /// Byte size of a patch region declaring `patch_count` layers.
    pub const fn byte_size(patch_count: u16) -> usize {
        8 + patch_count as usize * (16 + 2)
    }

    /// Parse the patch region at `offset` in `data`.
    pub fn parse(data: &[u8], offset: usize, patch_count: u16) -> Result<Self> {
        let region = slice_exact(data, offset, Self::byte_size(patch_count))?;

        let header = PatchDataHeader::parse(&region[..8])?;
        let mut files = Vec::with_capacity(patch_count as usize);
        let mut cursor = 8;
        for _ in 0..patch_count {
            files.push(PatchFileHeader::parse(&region[cursor..cursor + 16])?);
            cursor += 16;
        }
        let mut numbers = Vec::with_capacity(patch_count as usize);
        let mut r = Cursor::new(&region[cursor..]);
        for _ in 0..patch_count {
            numbers.push(r.read_u16::<LittleEndian>()?);
        }

        Ok(Self {
            data: header,
            files,
            numbers,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        self.data.write_to(out);
        for file in &self.files {
            file.write_to(out);
        }
        for &number in &self.numbers {
            let _ = out.write_u16::<LittleEndian>(number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_roundtrip() {
        let region = PatchRegion {
            data: PatchDataHeader {
                stream_size: 0x300,
                page_count: 2,
            },
            files: vec![
                PatchFileHeader {
                    compressed_size: 0x100,
                    decompressed_size: 0x180,
                },
                PatchFileHeader {
                    compressed_size: 0x200,
                    decompressed_size: 0x200,
                },
            ],
            numbers: vec![1, 2],
        };

        let mut buf = Vec::new();
        region.write_to(&mut buf);
        assert_eq!(buf.len(), PatchRegion::byte_size(2));

        let parsed = PatchRegion::parse(&buf, 0, 2).unwrap();
        assert_eq!(parsed, region);
    }

    #[test]
    fn test_region_truncated() {
        let buf = vec![0u8; PatchRegion::byte_size(2) - 1];
        assert!(PatchRegion::parse(&buf, 0, 2).is_err());
    }
}
