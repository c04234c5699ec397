//! Pak header parsing and multi-version normalization.
//!
//! Three on-disk header layouts exist (versions 6, 7 and 8). All of them
//! decode into the single owned [`PakHeader`] record; downstream code never
//! sees a version-specific layout.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use tracing::{debug, trace};

use crate::segment::PageHeader;
use crate::{Error, PAGE_RECORD_SIZE, PTR_RECORD_SIZE, RELATION_RECORD_SIZE, Result,
    SEGMENT_RECORD_SIZE};

/// Pak magic, `RPak` in little-endian byte order.
pub const PAK_MAGIC: u32 = 0x6b61_5052;

/// Header flag bit: payload compressed with the pak LZ codec.
pub const FLAG_COMPRESS_PAK: u16 = 0x100;
/// Header flag bit: payload compressed with the third-party (deflate) codec.
pub const FLAG_COMPRESS_DEFLATE: u16 = 0x200;
/// Header flag bit: payload compressed with the snowflake range codec.
pub const FLAG_COMPRESS_SNOWFLAKE: u16 = 0x400;
/// All compression flag bits.
pub const FLAG_COMPRESS_MASK: u16 = 0x700;

/// On-disk header format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PakVersion {
    V6,
    V7,
    V8,
}

impl PakVersion {
    /// Parse the version field.
    pub fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            6 => Ok(Self::V6),
            7 => Ok(Self::V7),
            8 => Ok(Self::V8),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    pub const fn as_raw(self) -> u16 {
        match self {
            Self::V6 => 6,
            Self::V7 => 7,
            Self::V8 => 8,
        }
    }

    /// Byte size of the fixed header for this version.
    pub const fn fixed_size(self) -> usize {
        match self {
            Self::V6 => 0x58,
            Self::V7 => 0x60,
            Self::V8 => 0x80,
        }
    }

    /// Byte size of one on-disk asset record for this version.
    pub const fn asset_record_size(self) -> usize {
        match self {
            Self::V6 | Self::V7 => 0x48,
            Self::V8 => 0x50,
        }
    }

    /// Whether this version can carry patch layers.
    pub const fn patch_capable(self) -> bool {
        !matches!(self, Self::V6)
    }
}

/// Normalized view over all on-disk header versions.
///
/// Counts are widened to their largest on-disk representation; fields that a
/// version does not carry are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakHeader {
    pub version: PakVersion,
    pub flags: u16,
    pub created_at: u64,
    pub crc: u64,
    pub compressed_size: u64,
    pub decompressed_size: u64,
    /// Offset of an embedded starpak blob (v8 only, 0 if absent).
    pub embedded_starpak_offset: u64,
    /// Size of an embedded starpak blob (v8 only, 0 if absent).
    pub embedded_starpak_size: u64,
    pub starpak_paths_size: u16,
    pub opt_starpak_paths_size: u16,
    pub segment_count: u16,
    pub page_count: u16,
    pub patch_count: u16,
    pub pointer_count: u32,
    pub asset_count: u32,
    pub guid_ref_count: u32,
    pub relation_count: u32,
    pub external_ref_count: u32,
    pub external_ref_size: u32,
}

impl PakHeader {
    /// Parse a pak header from the start of `data`.
    ///
    /// Fails on wrong magic or unknown version without reading past the
    /// fixed header size for the detected version.
    pub fn parse(data: &[u8]) -> Result<Self> {
        // Magic + version are enough to know how much header must follow.
        if data.len() < 8 {
            return Err(Error::TruncatedData {
                expected: 8,
                actual: data.len() as u64,
            });
        }

        let mut r = Cursor::new(data);
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != PAK_MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let version = PakVersion::from_raw(r.read_u16::<LittleEndian>()?)?;
        if data.len() < version.fixed_size() {
            return Err(Error::TruncatedData {
                expected: version.fixed_size() as u64,
                actual: data.len() as u64,
            });
        }

        let flags = r.read_u16::<LittleEndian>()?;
        let created_at = r.read_u64::<LittleEndian>()?;
        let crc = r.read_u64::<LittleEndian>()?;
        let compressed_size = r.read_u64::<LittleEndian>()?;

        let header = match version {
            PakVersion::V6 | PakVersion::V7 => {
                let decompressed_size = r.read_u64::<LittleEndian>()?;
                let starpak_paths_size = r.read_u16::<LittleEndian>()?;
                let segment_count = r.read_u16::<LittleEndian>()?;
                let page_count = r.read_u16::<LittleEndian>()?;
                let patch_count = r.read_u16::<LittleEndian>()?;
                let pointer_count = r.read_u32::<LittleEndian>()?;
                let asset_count = r.read_u32::<LittleEndian>()?;
                let guid_ref_count = r.read_u32::<LittleEndian>()?;
                let relation_count = r.read_u32::<LittleEndian>()?;

                Self {
                    version,
                    flags,
                    created_at,
                    crc,
                    compressed_size,
                    decompressed_size,
                    embedded_starpak_offset: 0,
                    embedded_starpak_size: 0,
                    starpak_paths_size,
                    opt_starpak_paths_size: 0,
                    segment_count,
                    page_count,
                    patch_count,
                    pointer_count,
                    asset_count,
                    guid_ref_count,
                    relation_count,
                    external_ref_count: 0,
                    external_ref_size: 0,
                }
            }
            PakVersion::V8 => {
                let embedded_starpak_offset = r.read_u64::<LittleEndian>()?;
                let decompressed_size = r.read_u64::<LittleEndian>()?;
                let embedded_starpak_size = r.read_u64::<LittleEndian>()?;
                let starpak_paths_size = r.read_u16::<LittleEndian>()?;
                let opt_starpak_paths_size = r.read_u16::<LittleEndian>()?;
                let segment_count = r.read_u16::<LittleEndian>()?;
                let page_count = r.read_u16::<LittleEndian>()?;
                let patch_count = r.read_u16::<LittleEndian>()?;
                let _reserved = r.read_u16::<LittleEndian>()?;
                let pointer_count = r.read_u32::<LittleEndian>()?;
                let asset_count = r.read_u32::<LittleEndian>()?;
                let guid_ref_count = r.read_u32::<LittleEndian>()?;
                let relation_count = r.read_u32::<LittleEndian>()?;
                let external_ref_count = r.read_u32::<LittleEndian>()?;
                let external_ref_size = r.read_u32::<LittleEndian>()?;

                Self {
                    version,
                    flags,
                    created_at,
                    crc,
                    compressed_size,
                    decompressed_size,
                    embedded_starpak_offset,
                    embedded_starpak_size,
                    starpak_paths_size,
                    opt_starpak_paths_size,
                    segment_count,
                    page_count,
                    patch_count,
                    pointer_count,
                    asset_count,
                    guid_ref_count,
                    relation_count,
                    external_ref_count,
                    external_ref_size,
                }
            }
        };

        header.validate()?;

        debug!(
            "Parsed pak header: v{}, {} segments, {} pages, {} assets, {} patches",
            header.version.as_raw(),
            header.segment_count,
            header.page_count,
            header.asset_count,
            header.patch_count,
        );

        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.is_compressed() && self.decompressed_size < self.compressed_size {
            return Err(Error::SizeInvariant {
                compressed: self.compressed_size,
                decompressed: self.decompressed_size,
            });
        }
        if self.patch_count != 0 && !self.version.patch_capable() {
            return Err(Error::PatchesUnsupported {
                version: self.version.as_raw(),
                patch_count: self.patch_count,
            });
        }
        Ok(())
    }

    /// Serialize this header into its on-disk layout.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        // Vec<u8> writes cannot fail.
        let _ = self.write_impl(out);
        debug_assert_eq!(out.len() - start, self.version.fixed_size());
    }

    fn write_impl(&self, w: &mut Vec<u8>) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(PAK_MAGIC)?;
        w.write_u16::<LittleEndian>(self.version.as_raw())?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u64::<LittleEndian>(self.created_at)?;
        w.write_u64::<LittleEndian>(self.crc)?;
        w.write_u64::<LittleEndian>(self.compressed_size)?;

        match self.version {
            PakVersion::V6 | PakVersion::V7 => {
                w.write_u64::<LittleEndian>(self.decompressed_size)?;
                w.write_u16::<LittleEndian>(self.starpak_paths_size)?;
                w.write_u16::<LittleEndian>(self.segment_count)?;
                w.write_u16::<LittleEndian>(self.page_count)?;
                w.write_u16::<LittleEndian>(self.patch_count)?;
                w.write_u32::<LittleEndian>(self.pointer_count)?;
                w.write_u32::<LittleEndian>(self.asset_count)?;
                w.write_u32::<LittleEndian>(self.guid_ref_count)?;
                w.write_u32::<LittleEndian>(self.relation_count)?;
            }
            PakVersion::V8 => {
                w.write_u64::<LittleEndian>(self.embedded_starpak_offset)?;
                w.write_u64::<LittleEndian>(self.decompressed_size)?;
                w.write_u64::<LittleEndian>(self.embedded_starpak_size)?;
                w.write_u16::<LittleEndian>(self.starpak_paths_size)?;
                w.write_u16::<LittleEndian>(self.opt_starpak_paths_size)?;
                w.write_u16::<LittleEndian>(self.segment_count)?;
                w.write_u16::<LittleEndian>(self.page_count)?;
                w.write_u16::<LittleEndian>(self.patch_count)?;
                w.write_u16::<LittleEndian>(0)?;
                w.write_u32::<LittleEndian>(self.pointer_count)?;
                w.write_u32::<LittleEndian>(self.asset_count)?;
                w.write_u32::<LittleEndian>(self.guid_ref_count)?;
                w.write_u32::<LittleEndian>(self.relation_count)?;
                w.write_u32::<LittleEndian>(self.external_ref_count)?;
                w.write_u32::<LittleEndian>(self.external_ref_size)?;
            }
        }

        // Reserved tail up to the fixed size.
        let written = match self.version {
            PakVersion::V6 | PakVersion::V7 => 0x40,
            PakVersion::V8 => 0x5c,
        };
        w.resize(w.len() + (self.version.fixed_size() - written), 0);
        Ok(())
    }

    /// Whether any compression flag bit is set.
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESS_MASK != 0
    }

    /// The compression flag bits in isolation.
    pub fn codec_flags(&self) -> u16 {
        self.flags & FLAG_COMPRESS_MASK
    }

    /// Byte offset of the end of the fixed header.
    pub fn fixed_size(&self) -> usize {
        self.version.fixed_size()
    }

    /// Total byte size of the non-paged leading regions: streaming-file path
    /// tables plus the segment/page/pointer/asset tables.
    pub fn leading_size(&self) -> usize {
        usize::from(self.starpak_paths_size)
            + usize::from(self.opt_starpak_paths_size)
            + usize::from(self.segment_count) * SEGMENT_RECORD_SIZE
            + usize::from(self.page_count) * PAGE_RECORD_SIZE
            + self.pointer_count as usize * PTR_RECORD_SIZE
            + self.asset_count as usize * self.version.asset_record_size()
    }

    /// Total byte size of the guid-ref, dependency and external-reference
    /// regions.
    pub fn refs_size(&self) -> usize {
        self.guid_ref_count as usize * PTR_RECORD_SIZE
            + self.relation_count as usize * RELATION_RECORD_SIZE
            + self.external_ref_count as usize * 8
            + self.external_ref_size as usize
    }

    /// Byte size of the patch-data region following the fixed header.
    ///
    /// Zero when `patch_count == 0`; no patch data follows the header then.
    pub fn patch_region_size(&self) -> usize {
        if self.patch_count == 0 {
            0
        } else {
            crate::patch::PatchRegion::byte_size(self.patch_count)
        }
    }

    /// Summed byte size of the pages this file itself contains, i.e. pages
    /// from `first_page` onward. Pages below `first_page` belong to patch
    /// layers.
    pub fn contained_pages_size(&self, pages: &[PageHeader], first_page: u32) -> u64 {
        let total: u64 = pages
            .iter()
            .skip(first_page as usize)
            .map(|p| u64::from(p.size))
            .sum();
        trace!(
            "{} pages from index {}: {} bytes contained",
            pages.len(),
            first_page,
            total
        );
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_header(version: PakVersion) -> PakHeader {
        PakHeader {
            version,
            flags: 0,
            created_at: 0x01d9_8765_4321_0000,
            crc: 0xdead_beef_cafe_f00d,
            compressed_size: 0x1000,
            decompressed_size: 0x1000,
            embedded_starpak_offset: 0,
            embedded_starpak_size: 0,
            starpak_paths_size: 0x20,
            opt_starpak_paths_size: 0,
            segment_count: 2,
            page_count: 3,
            patch_count: 0,
            pointer_count: 4,
            asset_count: 1,
            guid_ref_count: 2,
            relation_count: 2,
            external_ref_count: 0,
            external_ref_size: 0,
        }
    }

    #[test]
    fn test_header_roundtrip_all_versions() {
        for version in [PakVersion::V6, PakVersion::V7, PakVersion::V8] {
            let header = sample_header(version);
            let mut buf = Vec::new();
            header.write_to(&mut buf);
            assert_eq!(buf.len(), version.fixed_size());

            let parsed = PakHeader::parse(&buf).unwrap();
            assert_eq!(parsed, header);
        }
    }

    #[test]
    fn test_invalid_magic() {
        let mut buf = Vec::new();
        sample_header(PakVersion::V7).write_to(&mut buf);
        buf[0] = b'X';
        assert!(matches!(
            PakHeader::parse(&buf),
            Err(Error::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_unknown_version_fails_fast() {
        let mut buf = Vec::new();
        sample_header(PakVersion::V7).write_to(&mut buf);
        buf[4] = 99;
        // Truncate to just past the version field: an unknown version must
        // fail before trying to read a full header.
        buf.truncate(8);
        assert!(matches!(
            PakHeader::parse(&buf),
            Err(Error::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_truncated_header() {
        let mut buf = Vec::new();
        sample_header(PakVersion::V8).write_to(&mut buf);
        buf.truncate(0x40);
        assert!(matches!(
            PakHeader::parse(&buf),
            Err(Error::TruncatedData { expected: 0x80, .. })
        ));
    }

    #[test]
    fn test_size_invariant() {
        let mut header = sample_header(PakVersion::V7);
        header.flags = FLAG_COMPRESS_PAK;
        header.compressed_size = 0x2000;
        header.decompressed_size = 0x1000;
        let mut buf = Vec::new();
        header.write_to(&mut buf);
        assert!(matches!(
            PakHeader::parse(&buf),
            Err(Error::SizeInvariant { .. })
        ));
    }

    #[test]
    fn test_v6_rejects_patches() {
        let mut header = sample_header(PakVersion::V6);
        header.patch_count = 1;
        let mut buf = Vec::new();
        header.write_to(&mut buf);
        assert!(matches!(
            PakHeader::parse(&buf),
            Err(Error::PatchesUnsupported { version: 6, .. })
        ));
    }

    #[test]
    fn test_derived_sizes() {
        let header = sample_header(PakVersion::V7);
        assert_eq!(header.fixed_size(), 0x60);
        // paths + 2 segments + 3 pages + 4 pointers + 1 asset
        assert_eq!(
            header.leading_size(),
            0x20 + 2 * 16 + 3 * 12 + 4 * 8 + 0x48
        );
        assert_eq!(header.refs_size(), 2 * 8 + 2 * 4);
        assert_eq!(header.patch_region_size(), 0);
    }

    #[test]
    fn test_contained_pages_size() {
        let header = sample_header(PakVersion::V7);
        let pages = vec![
            PageHeader { segment: 0, alignment: 8, size: 0x100 },
            PageHeader { segment: 0, alignment: 8, size: 0x200 },
            PageHeader { segment: 1, alignment: 8, size: 0x400 },
        ];
        assert_eq!(header.contained_pages_size(&pages, 0), 0x700);
        assert_eq!(header.contained_pages_size(&pages, 1), 0x600);
        assert_eq!(header.contained_pages_size(&pages, 3), 0);
    }
}
