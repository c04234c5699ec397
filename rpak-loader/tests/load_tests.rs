//! Non-patched load path integration tests.

use pretty_assertions::assert_eq;

use rpak_format::header::{
    FLAG_COMPRESS_DEFLATE, FLAG_COMPRESS_PAK, FLAG_COMPRESS_SNOWFLAKE,
};
use rpak_format::{PagePtr, PakVersion, SegmentType};
use rpak_loader::{AssetTypeRegistry, LoadConfig, LoadError, load_pak, load_pak_from_bytes};
use rpak_test_utils::{PakBuilder, asset_record, starpak_bytes};

fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// Two segments (one HEADER, one CPU), three pages, one pointer from page 0
/// offset 4 into page 1 offset 0, one asset whose head page is page 0.
fn scenario_builder() -> PakBuilder {
    let mut builder = PakBuilder::new(PakVersion::V7);
    let header_seg = builder.add_segment(SegmentType::Header, 8);
    let cpu_seg = builder.add_segment(SegmentType::Cpu, 8);

    builder.add_page(header_seg, 8, patterned(64, 0x10));
    builder.add_page(cpu_seg, 8, patterned(32, 0x80));
    builder.add_page(cpu_seg, 8, patterned(16, 0xC0));

    builder.add_pointer(0, 4, 1, 0);
    builder.add_asset(asset_record(0x1111_2222_3333_4444, b"txtr", 0, 0x10, 0x20));
    builder
}

#[test]
fn test_concrete_pointer_and_asset_scenario() {
    let bytes = scenario_builder().build();
    let registry = AssetTypeRegistry::new();
    let pak = load_pak_from_bytes(bytes, Vec::new(), &registry, &LoadConfig::default()).unwrap();

    // The resolved pointer must name page 1's base plus 0: page 1 is the
    // first CPU page, so offset 0 of the CPU collection.
    let pointer = pak.pointers()[0];
    assert_eq!(
        pointer.slot,
        PagePtr::Resolved {
            segment: SegmentType::Header,
            offset: 4
        }
    );
    assert_eq!(
        pointer.value,
        PagePtr::Resolved {
            segment: SegmentType::Cpu,
            offset: 0
        }
    );
    assert_eq!(pak.view(pointer.value, 4).unwrap(), &patterned(32, 0x80)[..4]);

    // The asset's header bytes start at page 0's base plus its on-disk
    // head-page offset.
    let asset = pak.asset_by_guid(0x1111_2222_3333_4444).unwrap();
    assert_eq!(
        asset.head,
        PagePtr::Resolved {
            segment: SegmentType::Header,
            offset: 0x10
        }
    );
    assert_eq!(
        pak.asset_header(asset).unwrap(),
        &patterned(64, 0x10)[0x10..0x30]
    );
}

#[test]
fn test_resolution_is_idempotent() {
    let bytes = scenario_builder().build();
    let registry = AssetTypeRegistry::new();
    let config = LoadConfig::default();

    let first = load_pak_from_bytes(bytes.clone(), Vec::new(), &registry, &config).unwrap();
    let second = load_pak_from_bytes(bytes, Vec::new(), &registry, &config).unwrap();

    assert_eq!(first.pointers(), second.pointers());
    for segment in [
        SegmentType::Unused,
        SegmentType::Header,
        SegmentType::Cpu,
        SegmentType::Temp,
    ] {
        assert_eq!(first.collection(segment), second.collection(segment));
    }
}

#[test]
fn test_zero_patches_routes_to_unpatched_path() {
    let bytes = scenario_builder().build();
    let registry = AssetTypeRegistry::new();
    let pak = load_pak_from_bytes(bytes, Vec::new(), &registry, &LoadConfig::default()).unwrap();

    assert_eq!(pak.header().patch_count, 0);
    assert_eq!(pak.first_page(), 0);
    assert_eq!(pak.stats().patch_count, 0);
}

#[test]
fn test_bad_magic_fails_fast() {
    let mut bytes = scenario_builder().build();
    bytes[0] = b'X';
    let registry = AssetTypeRegistry::new();
    let err =
        load_pak_from_bytes(bytes, Vec::new(), &registry, &LoadConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Format(rpak_format::Error::InvalidMagic(_))
    ));
}

#[test]
fn test_unknown_version_fails_without_overread() {
    let mut bytes = scenario_builder().build();
    bytes[4] = 0x2A;
    // Nothing but magic and version: an unknown version must fail before
    // any further header reads.
    bytes.truncate(8);
    let registry = AssetTypeRegistry::new();
    let err =
        load_pak_from_bytes(bytes, Vec::new(), &registry, &LoadConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Format(rpak_format::Error::UnsupportedVersion(0x2A))
    ));
}

#[test]
fn test_compressed_loads_match_uncompressed() {
    let registry = AssetTypeRegistry::new();
    let config = LoadConfig::default();
    let plain = load_pak_from_bytes(
        scenario_builder().build(),
        Vec::new(),
        &registry,
        &config,
    )
    .unwrap();

    for flag in [
        FLAG_COMPRESS_PAK,
        FLAG_COMPRESS_DEFLATE,
        FLAG_COMPRESS_SNOWFLAKE,
    ] {
        let mut builder = scenario_builder();
        builder.compress(flag);
        let pak = load_pak_from_bytes(builder.build(), Vec::new(), &registry, &config).unwrap();

        assert_eq!(pak.pointers(), plain.pointers(), "flag {flag:#x}");
        assert_eq!(
            pak.collection(SegmentType::Header),
            plain.collection(SegmentType::Header),
            "flag {flag:#x}"
        );
        assert_eq!(
            pak.collection(SegmentType::Cpu),
            plain.collection(SegmentType::Cpu),
            "flag {flag:#x}"
        );
    }
}

#[test]
fn test_dependencies_read_from_guid_refs() {
    let mut builder = PakBuilder::new(PakVersion::V7);
    let header_seg = builder.add_segment(SegmentType::Header, 8);
    let cpu_seg = builder.add_segment(SegmentType::Cpu, 8);
    builder.add_page(header_seg, 8, patterned(32, 0));
    builder.add_page(cpu_seg, 8, vec![0u8; 32]);

    builder.add_guid_ref(1, 0, 0xAAAA_0001);
    builder.add_guid_ref(1, 8, 0xAAAA_0002);

    let mut record = asset_record(0x5555, b"matl", 0, 0, 0x10);
    record.dependencies_index = 0;
    record.dependencies_count = 2;
    builder.add_asset(record);
    builder.add_relation(0);

    let registry = AssetTypeRegistry::new();
    let pak = load_pak_from_bytes(builder.build(), Vec::new(), &registry, &LoadConfig::default())
        .unwrap();

    let asset = pak.asset_by_guid(0x5555).unwrap();
    assert_eq!(
        pak.dependencies(asset).unwrap(),
        vec![0xAAAA_0001, 0xAAAA_0002]
    );
    assert_eq!(pak.relations(), &[0]);
}

#[test]
fn test_starpak_discovery_and_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let blob = b"streamed texture payload";
    std::fs::write(dir.path().join("scenario.starpak"), starpak_bytes(&[blob])).unwrap();

    let mut builder = scenario_builder();
    builder.add_starpak_path("scenario.starpak");
    std::fs::write(dir.path().join("scenario.rpak"), builder.build()).unwrap();

    let registry = AssetTypeRegistry::new();
    let pak = load_pak(
        dir.path().join("scenario.rpak"),
        &registry,
        &LoadConfig::default(),
    )
    .unwrap();

    assert_eq!(pak.starpaks().len(), 1);
    assert!(pak.starpaks()[0].is_available());
    // Packed offset field: starpak index in the low 12 bits, byte offset
    // above; blob 0 sits at byte offset 0 of starpak 0.
    assert_eq!(
        pak.starpak_data(0, blob.len() as u64, false).unwrap(),
        blob
    );
}

#[test]
fn test_missing_starpak_degrades_to_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = scenario_builder();
    builder.add_starpak_path("not_written.starpak");
    std::fs::write(dir.path().join("scenario.rpak"), builder.build()).unwrap();

    let registry = AssetTypeRegistry::new();
    let pak = load_pak(
        dir.path().join("scenario.rpak"),
        &registry,
        &LoadConfig::default(),
    )
    .unwrap();

    assert!(!pak.starpaks()[0].is_available());
    assert!(matches!(
        pak.starpak_data(0, 4, false),
        Err(LoadError::StarPakUnavailable(_))
    ));
}
