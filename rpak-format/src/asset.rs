//! On-disk asset records.
//!
//! Two layouts exist: versions 6/7 use a 0x48-byte record, version 8 adds
//! an optional-stream offset and a reserved field for 0x50 bytes.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Cursor;

use crate::header::PakVersion;
use crate::ptr::RawPtr;
use crate::Result;

/// Sentinel for the streamed-payload offset fields: no streamed data.
pub const NO_STREAM_OFFSET: u64 = u64::MAX;

/// Four-character asset type tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetKind(pub [u8; 4]);

impl AssetKind {
    pub const fn new(tag: &[u8; 4]) -> Self {
        Self(*tag)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetKind({self})")
    }
}

/// One on-disk asset record, normalized across layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetRecord {
    /// Unique 64-bit GUID within a loaded container.
    pub guid: u64,
    /// Location of the asset's header/metadata block.
    pub head: RawPtr,
    /// Location of the asset's bulk payload block.
    pub cpu: RawPtr,
    /// Streamed-payload offset field (`NO_STREAM_OFFSET` if absent).
    pub starpak_offset: u64,
    /// Optional-stream offset field, v8 only (`NO_STREAM_OFFSET` if absent).
    pub opt_starpak_offset: u64,
    /// Index range into the shared dependents (relation) table.
    pub dependents_index: u32,
    pub dependents_count: u32,
    /// Index range into the shared guid-ref table.
    pub dependencies_index: u32,
    pub dependencies_count: u32,
    /// Byte size of the asset's header struct.
    pub header_size: u32,
    /// Asset-type-specific format version.
    pub version: u32,
    /// Four-character type tag.
    pub kind: AssetKind,
}

impl AssetRecord {
    pub fn parse(data: &[u8], pak_version: PakVersion) -> Result<Self> {
        let mut r = Cursor::new(data);
        let guid = r.read_u64::<LittleEndian>()?;
        let head = RawPtr {
            page: r.read_u32::<LittleEndian>()?,
            offset: r.read_u32::<LittleEndian>()?,
        };
        let cpu = RawPtr {
            page: r.read_u32::<LittleEndian>()?,
            offset: r.read_u32::<LittleEndian>()?,
        };
        let starpak_offset = r.read_u64::<LittleEndian>()?;
        let opt_starpak_offset = if pak_version == PakVersion::V8 {
            r.read_u64::<LittleEndian>()?
        } else {
            NO_STREAM_OFFSET
        };
        let dependents_index = r.read_u32::<LittleEndian>()?;
        let dependents_count = r.read_u32::<LittleEndian>()?;
        let dependencies_index = r.read_u32::<LittleEndian>()?;
        let dependencies_count = r.read_u32::<LittleEndian>()?;
        let header_size = r.read_u32::<LittleEndian>()?;
        let version = r.read_u32::<LittleEndian>()?;
        let mut kind = [0u8; 4];
        std::io::Read::read_exact(&mut r, &mut kind)?;

        Ok(Self {
            guid,
            head,
            cpu,
            starpak_offset,
            opt_starpak_offset,
            dependents_index,
            dependents_count,
            dependencies_index,
            dependencies_count,
            header_size,
            version,
            kind: AssetKind(kind),
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>, pak_version: PakVersion) {
        let _ = out.write_u64::<LittleEndian>(self.guid);
        self.head.write_to(out);
        self.cpu.write_to(out);
        let _ = out.write_u64::<LittleEndian>(self.starpak_offset);
        if pak_version == PakVersion::V8 {
            let _ = out.write_u64::<LittleEndian>(self.opt_starpak_offset);
        }
        let _ = out.write_u32::<LittleEndian>(self.dependents_index);
        let _ = out.write_u32::<LittleEndian>(self.dependents_count);
        let _ = out.write_u32::<LittleEndian>(self.dependencies_index);
        let _ = out.write_u32::<LittleEndian>(self.dependencies_count);
        let _ = out.write_u32::<LittleEndian>(self.header_size);
        let _ = out.write_u32::<LittleEndian>(self.version);
        out.extend_from_slice(&self.kind.0);
        // Reserved tail.
        out.extend_from_slice(&[0u8; 12]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset() -> AssetRecord {
        AssetRecord {
            guid: 0x1122_3344_5566_7788,
            head: RawPtr { page: 0, offset: 0x10 },
            cpu: RawPtr { page: 2, offset: 0 },
            starpak_offset: NO_STREAM_OFFSET,
            opt_starpak_offset: NO_STREAM_OFFSET,
            dependents_index: 0,
            dependents_count: 0,
            dependencies_index: 0,
            dependencies_count: 2,
            header_size: 0x40,
            version: 9,
            kind: AssetKind::new(b"txtr"),
        }
    }

    #[test]
    fn test_record_roundtrip_v7() {
        let asset = sample_asset();
        let mut buf = Vec::new();
        asset.write_to(&mut buf, PakVersion::V7);
        assert_eq!(buf.len(), PakVersion::V7.asset_record_size());
        assert_eq!(AssetRecord::parse(&buf, PakVersion::V7).unwrap(), asset);
    }

    #[test]
    fn test_record_roundtrip_v8() {
        let mut asset = sample_asset();
        asset.opt_starpak_offset = 0x2000;
        let mut buf = Vec::new();
        asset.write_to(&mut buf, PakVersion::V8);
        assert_eq!(buf.len(), PakVersion::V8.asset_record_size());
        assert_eq!(AssetRecord::parse(&buf, PakVersion::V8).unwrap(), asset);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(AssetKind::new(b"mdl_").to_string(), "mdl_");
        assert_eq!(AssetKind([0x01, b'a', b'b', b'c']).to_string(), "\\x01abc");
    }
}
