//! Synthetic unpatched pak containers.

use rpak_format::header::{
    FLAG_COMPRESS_DEFLATE, FLAG_COMPRESS_PAK, FLAG_COMPRESS_SNOWFLAKE,
};
use rpak_format::{
    AssetKind, AssetRecord, NO_STREAM_OFFSET, PakHeader, PakVersion, RawPtr, SegmentHeader,
    SegmentType,
};

/// Convenience asset record: a header-only asset with no payload block,
/// streamed data or dependencies.
pub fn asset_record(
    guid: u64,
    tag: &[u8; 4],
    head_page: u32,
    head_offset: u32,
    header_size: u32,
) -> AssetRecord {
    AssetRecord {
        guid,
        head: RawPtr {
            page: head_page,
            offset: head_offset,
        },
        cpu: RawPtr::null(),
        starpak_offset: NO_STREAM_OFFSET,
        opt_starpak_offset: NO_STREAM_OFFSET,
        dependents_index: 0,
        dependents_count: 0,
        dependencies_index: 0,
        dependencies_count: 0,
        header_size,
        version: 1,
        kind: AssetKind::new(tag),
    }
}

struct PageBuf {
    segment: u32,
    alignment: u32,
    data: Vec<u8>,
}

/// Builder for a container with zero patch layers.
pub struct PakBuilder {
    version: PakVersion,
    codec_flags: u16,
    window_log: u32,
    starpak_paths: Vec<String>,
    opt_starpak_paths: Vec<String>,
    segments: Vec<(SegmentType, u32)>,
    pages: Vec<PageBuf>,
    pointers: Vec<RawPtr>,
    assets: Vec<AssetRecord>,
    guid_refs: Vec<RawPtr>,
    relations: Vec<u32>,
}

impl PakBuilder {
    pub fn new(version: PakVersion) -> Self {
        Self {
            version,
            codec_flags: 0,
            window_log: 12,
            starpak_paths: Vec::new(),
            opt_starpak_paths: Vec::new(),
            segments: Vec::new(),
            pages: Vec::new(),
            pointers: Vec::new(),
            assets: Vec::new(),
            guid_refs: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Compress the payload with the given codec flag bit.
    pub fn compress(&mut self, codec_flag: u16) -> &mut Self {
        self.codec_flags = codec_flag;
        self
    }

    pub fn add_segment(&mut self, kind: SegmentType, alignment: u32) -> u32 {
        self.segments.push((kind, alignment));
        (self.segments.len() - 1) as u32
    }

    pub fn add_page(&mut self, segment: u32, alignment: u32, data: Vec<u8>) -> u32 {
        assert!((segment as usize) < self.segments.len(), "unknown segment");
        self.pages.push(PageBuf {
            segment,
            alignment,
            data,
        });
        (self.pages.len() - 1) as u32
    }

    /// Add a pointer-table entry at (src_page, src_offset) whose stored
    /// raw pair targets (dst_page, dst_offset).
    pub fn add_pointer(
        &mut self,
        src_page: u32,
        src_offset: u32,
        dst_page: u32,
        dst_offset: u32,
    ) -> &mut Self {
        self.write_page_bytes(
            src_page,
            src_offset,
            &raw_pair_bytes(dst_page, dst_offset),
        );
        self.pointers.push(RawPtr {
            page: src_page,
            offset: src_offset,
        });
        self
    }

    /// Add a guid-ref slot at (page, offset) holding a dependency GUID.
    pub fn add_guid_ref(&mut self, page: u32, offset: u32, guid: u64) -> &mut Self {
        self.write_page_bytes(page, offset, &guid.to_le_bytes());
        self.guid_refs.push(RawPtr { page, offset });
        self
    }

    pub fn add_asset(&mut self, record: AssetRecord) -> &mut Self {
        self.assets.push(record);
        self
    }

    pub fn add_relation(&mut self, asset_index: u32) -> &mut Self {
        self.relations.push(asset_index);
        self
    }

    pub fn add_starpak_path(&mut self, path: &str) -> &mut Self {
        self.starpak_paths.push(path.to_string());
        self
    }

    pub fn add_opt_starpak_path(&mut self, path: &str) -> &mut Self {
        assert_eq!(self.version, PakVersion::V8, "optional paths are v8-only");
        self.opt_starpak_paths.push(path.to_string());
        self
    }

    fn write_page_bytes(&mut self, page: u32, offset: u32, bytes: &[u8]) {
        let data = &mut self.pages[page as usize].data;
        let end = offset as usize + bytes.len();
        assert!(end <= data.len(), "write outside page data");
        data[offset as usize..end].copy_from_slice(bytes);
    }

    /// Serialize the container.
    pub fn build(&self) -> Vec<u8> {
        let starpak_paths = path_run(&self.starpak_paths);
        let opt_starpak_paths = path_run(&self.opt_starpak_paths);

        let mut payload = Vec::new();
        payload.extend_from_slice(&starpak_paths);
        payload.extend_from_slice(&opt_starpak_paths);

        for (i, &(kind, alignment)) in self.segments.iter().enumerate() {
            let size: u64 = self
                .pages
                .iter()
                .filter(|p| p.segment as usize == i)
                .map(|p| p.data.len() as u64)
                .sum();
            SegmentHeader {
                flags: kind.to_flags(),
                alignment,
                size,
            }
            .write_to(&mut payload);
        }

        for page in &self.pages {
            rpak_format::PageHeader {
                segment: page.segment,
                alignment: page.alignment,
                size: page.data.len() as u32,
            }
            .write_to(&mut payload);
        }

        for pointer in &self.pointers {
            pointer.write_to(&mut payload);
        }
        for asset in &self.assets {
            asset.write_to(&mut payload, self.version);
        }
        for guid_ref in &self.guid_refs {
            guid_ref.write_to(&mut payload);
        }
        for &relation in &self.relations {
            payload.extend_from_slice(&relation.to_le_bytes());
        }

        for page in &self.pages {
            payload.extend_from_slice(&page.data);
        }

        let fixed = self.version.fixed_size() as u64;
        let mut header = PakHeader {
            version: self.version,
            flags: self.codec_flags,
            created_at: 0x01da_0000_0000_0000,
            crc: 0,
            compressed_size: 0,
            decompressed_size: fixed + payload.len() as u64,
            embedded_starpak_offset: 0,
            embedded_starpak_size: 0,
            starpak_paths_size: starpak_paths.len() as u16,
            opt_starpak_paths_size: opt_starpak_paths.len() as u16,
            segment_count: self.segments.len() as u16,
            page_count: self.pages.len() as u16,
            patch_count: 0,
            pointer_count: self.pointers.len() as u32,
            asset_count: self.assets.len() as u32,
            guid_ref_count: self.guid_refs.len() as u32,
            relation_count: self.relations.len() as u32,
            external_ref_count: 0,
            external_ref_size: 0,
        };

        let payload = match self.codec_flags {
            0 => payload,
            FLAG_COMPRESS_PAK => {
                rpak_codec::pak_compress(&payload, self.window_log).expect("pak compress")
            }
            FLAG_COMPRESS_DEFLATE => {
                rpak_codec::deflate_compress(&payload).expect("deflate compress")
            }
            FLAG_COMPRESS_SNOWFLAKE => {
                rpak_codec::snowflake_compress(&payload, self.window_log)
                    .expect("snowflake compress")
            }
            other => panic!("unsupported codec flags {other:#x}"),
        };
        header.compressed_size = fixed + payload.len() as u64;

        let mut out = Vec::new();
        header.write_to(&mut out);
        out.extend_from_slice(&payload);
        out
    }
}

pub(crate) fn raw_pair_bytes(page: u32, offset: u32) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&page.to_le_bytes());
    bytes[4..].copy_from_slice(&offset.to_le_bytes());
    bytes
}

pub(crate) fn path_run(paths: &[String]) -> Vec<u8> {
    let mut run = Vec::new();
    for path in paths {
        run.extend_from_slice(path.as_bytes());
        run.push(0);
    }
    // Pad to a 4-byte multiple the way shipping paks do.
    while run.len() % 4 != 0 {
        run.push(0);
    }
    run
}
