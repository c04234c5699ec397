//! Synthetic patch chains.
//!
//! Builds the on-disk artifacts of a patched container: the base file
//! (final header, patch region, base page bytes) and the patch files
//! carrying the final tables, the command stream and the patch-contributed
//! pages. The command stream is generated by a byte-run diff between each
//! page's pre-patch image and its final content.

use rpak_format::{
    AssetRecord, PageHeader, PakHeader, PakVersion, PatchDataHeader, PatchFileHeader,
    PatchRegion, RawPtr, SegmentHeader, SegmentType,
};
use rpak_patch::PatchStreamWriter;

use crate::pak::{path_run, raw_pair_bytes};

struct ChainPage {
    segment: u32,
    alignment: u32,
    /// Pre-patch image: base file content for base pages, the shipped
    /// bytes for patch-contributed pages.
    source: Vec<u8>,
    /// Final content after replay.
    fin: Vec<u8>,
    from_patch: bool,
}

/// Deferred write of a raw pointer pair into a page's final image.
struct PtrWrite {
    page: u32,
    offset: u32,
    target_page: u32,
    target_offset: u32,
}

/// Builder for a base pak plus its ordered patch files.
pub struct PatchChainBuilder {
    version: PakVersion,
    file_count: u16,
    starpak_paths: Vec<String>,
    segments: Vec<(SegmentType, u32)>,
    pages: Vec<ChainPage>,
    pointers: Vec<RawPtr>,
    ptr_writes: Vec<PtrWrite>,
    assets: Vec<AssetRecord>,
    guid_refs: Vec<RawPtr>,
    guid_writes: Vec<(u32, u32, u64)>,
    relations: Vec<u32>,
}

impl PatchChainBuilder {
    pub fn new(version: PakVersion, file_count: u16) -> Self {
        assert!(version.patch_capable(), "version cannot carry patches");
        assert!(file_count >= 1);
        Self {
            version,
            file_count,
            starpak_paths: Vec::new(),
            segments: Vec::new(),
            pages: Vec::new(),
            pointers: Vec::new(),
            ptr_writes: Vec::new(),
            assets: Vec::new(),
            guid_refs: Vec::new(),
            guid_writes: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, kind: SegmentType, alignment: u32) -> u32 {
        self.segments.push((kind, alignment));
        (self.segments.len() - 1) as u32
    }

    /// Add a patch-contributed page. These occupy the lowest indices of
    /// the final numbering and must all precede base pages.
    pub fn add_patch_page(&mut self, segment: u32, alignment: u32, data: Vec<u8>) -> u32 {
        assert!(
            self.pages.iter().all(|p| p.from_patch),
            "patch pages must precede base pages"
        );
        self.pages.push(ChainPage {
            segment,
            alignment,
            source: data.clone(),
            fin: data,
            from_patch: true,
        });
        (self.pages.len() - 1) as u32
    }

    /// Add a base page with its pre-patch and final contents. Both images
    /// must be the same size.
    pub fn add_base_page(
        &mut self,
        segment: u32,
        alignment: u32,
        old: Vec<u8>,
        new: Vec<u8>,
    ) -> u32 {
        assert_eq!(old.len(), new.len(), "page size must stay constant");
        self.pages.push(ChainPage {
            segment,
            alignment,
            source: old,
            fin: new,
            from_patch: false,
        });
        (self.pages.len() - 1) as u32
    }

    /// Rewrite a run of a page's final image.
    pub fn patch_final_bytes(&mut self, page: u32, offset: u32, bytes: &[u8]) -> &mut Self {
        let fin = &mut self.pages[page as usize].fin;
        let end = offset as usize + bytes.len();
        assert!(end <= fin.len(), "write outside page data");
        fin[offset as usize..end].copy_from_slice(bytes);
        self
    }

    /// Pointer-table entry at (src_page, src_offset), in final numbering,
    /// targeting (dst_page, dst_offset).
    pub fn add_pointer(
        &mut self,
        src_page: u32,
        src_offset: u32,
        dst_page: u32,
        dst_offset: u32,
    ) -> &mut Self {
        self.pointers.push(RawPtr {
            page: src_page,
            offset: src_offset,
        });
        self.ptr_writes.push(PtrWrite {
            page: src_page,
            offset: src_offset,
            target_page: dst_page,
            target_offset: dst_offset,
        });
        self
    }

    /// Guid-ref slot at (page, offset) holding a dependency GUID.
    pub fn add_guid_ref(&mut self, page: u32, offset: u32, guid: u64) -> &mut Self {
        self.guid_refs.push(RawPtr { page, offset });
        self.guid_writes.push((page, offset, guid));
        self
    }

    /// Asset record with head/cpu in final page numbering.
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

    fn first_page(&self) -> u32 {
        self.pages.iter().filter(|p| p.from_patch).count() as u32
    }

    /// Store a page index relative to the first-page index, the inverse of
    /// the loader's wrap-around adjustment.
    fn relativize(&self, absolute: u32) -> u32 {
        let count = self.pages.len() as u32;
        (absolute + count - self.first_page()) % count
    }

    fn relativize_ptr(&self, raw: RawPtr) -> RawPtr {
        if raw.is_null() {
            raw
        } else {
            RawPtr {
                page: self.relativize(raw.page),
                offset: raw.offset,
            }
        }
    }

    /// Serialize the base file and the patch files, in application order.
    pub fn build(&mut self) -> (Vec<u8>, Vec<Vec<u8>>) {
        let first_page = self.first_page();
        let page_count = self.pages.len() as u32;

        // Apply deferred slot writes to the final images, pointer values
        // stored relative to the first-page index.
        for write in &self.ptr_writes {
            let pair = raw_pair_bytes(
                self.relativize(write.target_page),
                write.target_offset,
            );
            let fin = &mut self.pages[write.page as usize].fin;
            let end = write.offset as usize + 8;
            assert!(end <= fin.len(), "pointer slot outside page data");
            fin[write.offset as usize..end].copy_from_slice(&pair);
        }
        for &(page, offset, guid) in &self.guid_writes {
            let fin = &mut self.pages[page as usize].fin;
            let end = offset as usize + 8;
            assert!(end <= fin.len(), "guid slot outside page data");
            fin[offset as usize..end].copy_from_slice(&guid.to_le_bytes());
        }
        // Patch pages ship their final content.
        for page in &mut self.pages {
            if page.from_patch {
                page.source = page.fin.clone();
            }
        }

        // Final tables.
        let starpak_paths = path_run(&self.starpak_paths);
        let mut tables = Vec::new();
        tables.extend_from_slice(&starpak_paths);
        for (i, &(kind, alignment)) in self.segments.iter().enumerate() {
            let size: u64 = self
                .pages
                .iter()
                .filter(|p| p.segment as usize == i)
                .map(|p| p.fin.len() as u64)
                .sum();
            SegmentHeader {
                flags: kind.to_flags(),
                alignment,
                size,
            }
            .write_to(&mut tables);
        }
        for page in &self.pages {
            PageHeader {
                segment: page.segment,
                alignment: page.alignment,
                size: page.fin.len() as u32,
            }
            .write_to(&mut tables);
        }
        for pointer in &self.pointers {
            pointer.write_to(&mut tables);
        }
        for asset in &self.assets {
            let mut record = *asset;
            record.head = self.relativize_ptr(record.head);
            record.cpu = self.relativize_ptr(record.cpu);
            record.write_to(&mut tables, self.version);
        }
        for guid_ref in &self.guid_refs {
            guid_ref.write_to(&mut tables);
        }
        for &relation in &self.relations {
            tables.extend_from_slice(&relation.to_le_bytes());
        }

        // Command stream: pages in index order; header pages emit per
        // asset-header span with gaps skipped.
        let mut writer = PatchStreamWriter::new().expect("stream writer");
        for (index, page) in self.pages.iter().enumerate() {
            let segment = self.segments[page.segment as usize].0;
            if segment == SegmentType::Header {
                let mut spans: Vec<(u32, u32)> = self
                    .assets
                    .iter()
                    .filter(|a| !a.head.is_null() && a.head.page == index as u32)
                    .map(|a| (a.head.offset, a.header_size))
                    .collect();
                spans.sort_unstable();

                let mut cursor = 0u32;
                for (offset, size) in spans {
                    assert!(offset >= cursor, "overlapping asset headers");
                    if offset > cursor {
                        writer.skip(u64::from(offset - cursor)).expect("skip");
                    }
                    let range = offset as usize..(offset + size) as usize;
                    diff_runs(&mut writer, &page.source[range.clone()], &page.fin[range]);
                    cursor = offset + size;
                }
                let len = page.fin.len() as u32;
                if cursor < len {
                    writer.skip(u64::from(len - cursor)).expect("skip");
                }
            } else {
                diff_runs(&mut writer, &page.source, &page.fin);
            }
        }
        let stream = writer.finish();

        // Patch-contributed page data, in index order.
        let mut new_page_data = Vec::new();
        for page in self.pages.iter().filter(|p| p.from_patch) {
            new_page_data.extend_from_slice(&page.source);
        }

        // Assemble the logical payload and split it across the files.
        let region_size = PatchRegion::byte_size(self.file_count);
        let payload_len = region_size + tables.len() + stream.len() + new_page_data.len();
        let patch_fixed = self.version.fixed_size();

        let slice_sizes = split_sizes(payload_len, usize::from(self.file_count));
        let region = PatchRegion {
            data: PatchDataHeader {
                stream_size: stream.len() as u32,
                page_count: first_page,
            },
            files: slice_sizes
                .iter()
                .map(|&len| PatchFileHeader {
                    compressed_size: (patch_fixed + len) as u64,
                    decompressed_size: (patch_fixed + len) as u64,
                })
                .collect(),
            numbers: (1..=self.file_count).collect(),
        };
        let mut region_bytes = Vec::new();
        region.write_to(&mut region_bytes);
        assert_eq!(region_bytes.len(), region_size);

        let mut payload = Vec::with_capacity(payload_len);
        payload.extend_from_slice(&region_bytes);
        payload.extend_from_slice(&tables);
        payload.extend_from_slice(&stream);
        payload.extend_from_slice(&new_page_data);

        // Base file: final header + patch region + base page bytes.
        let mut base_pages = Vec::new();
        for page in self.pages.iter().filter(|p| !p.from_patch) {
            base_pages.extend_from_slice(&page.source);
        }

        let base_len =
            (self.version.fixed_size() + region_size + base_pages.len()) as u64;
        let header = PakHeader {
            version: self.version,
            flags: 0,
            created_at: 0x01da_0000_0000_0000,
            crc: 0,
            compressed_size: base_len,
            decompressed_size: base_len,
            embedded_starpak_offset: 0,
            embedded_starpak_size: 0,
            starpak_paths_size: starpak_paths.len() as u16,
            opt_starpak_paths_size: 0,
            segment_count: self.segments.len() as u16,
            page_count: page_count as u16,
            patch_count: self.file_count,
            pointer_count: self.pointers.len() as u32,
            asset_count: self.assets.len() as u32,
            guid_ref_count: self.guid_refs.len() as u32,
            relation_count: self.relations.len() as u32,
            external_ref_count: 0,
            external_ref_size: 0,
        };

        let mut base = Vec::new();
        header.write_to(&mut base);
        base.extend_from_slice(&region_bytes);
        base.extend_from_slice(&base_pages);

        // Patch files: a minimal header per file, then its payload slice.
        let mut patches = Vec::with_capacity(slice_sizes.len());
        let mut cursor = 0usize;
        for &len in &slice_sizes {
            let total = (patch_fixed + len) as u64;
            let patch_header = PakHeader {
                version: self.version,
                flags: 0,
                created_at: 0x01da_0000_0000_0000,
                crc: 0,
                compressed_size: total,
                decompressed_size: total,
                embedded_starpak_offset: 0,
                embedded_starpak_size: 0,
                starpak_paths_size: 0,
                opt_starpak_paths_size: 0,
                segment_count: 0,
                page_count: 0,
                patch_count: 0,
                pointer_count: 0,
                asset_count: 0,
                guid_ref_count: 0,
                relation_count: 0,
                external_ref_count: 0,
                external_ref_size: 0,
            };
            let mut file = Vec::new();
            patch_header.write_to(&mut file);
            file.extend_from_slice(&payload[cursor..cursor + len]);
            patches.push(file);
            cursor += len;
        }
        assert_eq!(cursor, payload.len());

        (base, patches)
    }
}

/// Emit copy/replace runs transforming `source` into `fin`.
fn diff_runs(writer: &mut PatchStreamWriter, source: &[u8], fin: &[u8]) {
    assert_eq!(source.len(), fin.len());
    let mut i = 0;
    while i < source.len() {
        let mut j = i;
        while j < source.len() && source[j] == fin[j] {
            j += 1;
        }
        if j > i {
            writer.copy((j - i) as u64).expect("copy");
            i = j;
            continue;
        }
        while j < source.len() && source[j] != fin[j] {
            j += 1;
        }
        writer.replace(&fin[i..j]).expect("replace");
        i = j;
    }
}

/// Near-even split of `total` bytes into `parts` non-negative slices.
fn split_sizes(total: usize, parts: usize) -> Vec<usize> {
    let base = total / parts;
    let extra = total % parts;
    (0..parts)
        .map(|i| base + usize::from(i < extra))
        .collect()
}
