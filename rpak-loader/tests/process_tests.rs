//! Asset registration and parallel pipeline tests.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rpak_format::{PakVersion, SegmentType};
use rpak_loader::{
    AssetBinding, AssetTypeRegistry, LoadConfig, load_pak_from_bytes,
};
use rpak_test_utils::{PakBuilder, asset_record};

fn pipeline_pak() -> Vec<u8> {
    let mut builder = PakBuilder::new(PakVersion::V7);
    let header_seg = builder.add_segment(SegmentType::Header, 8);
    builder.add_page(header_seg, 8, vec![0u8; 0x100]);

    // Deliberately shuffled priority order: matl and dtbl before txtr.
    builder.add_asset(asset_record(0x10, b"matl", 0, 0x00, 0x20));
    builder.add_asset(asset_record(0x11, b"dtbl", 0, 0x20, 0x20));
    builder.add_asset(asset_record(0x12, b"txtr", 0, 0x40, 0x20));
    builder.add_asset(asset_record(0x13, b"txtr", 0, 0x60, 0x20));
    builder.add_asset(asset_record(0x14, b"matl", 0, 0x80, 0x20));
    builder.build()
}

fn binding_with_log(
    load_log: &Arc<Mutex<Vec<u64>>>,
    post_log: &Arc<Mutex<Vec<[u8; 4]>>>,
    align: u32,
) -> AssetBinding {
    let load_log = Arc::clone(load_log);
    let post_log = Arc::clone(post_log);
    AssetBinding {
        load: Some(Arc::new(move |_pak, handle| {
            load_log.lock().push(handle.guid);
            handle.extension = Some(Box::new(handle.guid as u32));
        })),
        post_load: Some(Arc::new(move |_pak, handle| {
            // The extension slot carries what the load phase stored.
            let stored = handle
                .extension
                .as_ref()
                .and_then(|ext| ext.downcast_ref::<u32>())
                .copied();
            assert_eq!(stored, Some(handle.guid as u32));
            post_log.lock().push(handle.kind.0);
        })),
        header_align: align,
        export_name: "test",
    }
}

#[test]
fn test_load_phase_invokes_each_asset_once() {
    let load_log = Arc::new(Mutex::new(Vec::new()));
    let post_log = Arc::new(Mutex::new(Vec::new()));

    let mut registry = AssetTypeRegistry::new();
    registry.register(b"txtr", binding_with_log(&load_log, &post_log, 8));
    registry.register(b"matl", binding_with_log(&load_log, &post_log, 8));
    // dtbl stays unregistered: no wrapper is constructed for it.

    let pak =
        load_pak_from_bytes(pipeline_pak(), Vec::new(), &registry, &LoadConfig::default())
            .unwrap();
    assert_eq!(pak.assets().len(), 5);

    let mut loaded = load_log.lock().clone();
    loaded.sort_unstable();
    assert_eq!(loaded, vec![0x10, 0x12, 0x13, 0x14]);
    assert_eq!(registry.asset_count(), 4);
}

#[test]
fn test_post_load_runs_in_priority_groups() {
    let load_log = Arc::new(Mutex::new(Vec::new()));
    let post_log = Arc::new(Mutex::new(Vec::new()));

    let mut registry = AssetTypeRegistry::new();
    registry.register(b"txtr", binding_with_log(&load_log, &post_log, 8));
    registry.register(b"matl", binding_with_log(&load_log, &post_log, 8));

    load_pak_from_bytes(pipeline_pak(), Vec::new(), &registry, &LoadConfig::default())
        .unwrap();

    let order = post_log.lock().clone();
    assert_eq!(order.len(), 4);
    // All txtr post-loads finish before any matl post-load starts.
    let last_txtr = order.iter().rposition(|t| t == b"txtr").unwrap();
    let first_matl = order.iter().position(|t| t == b"matl").unwrap();
    assert!(
        last_txtr < first_matl,
        "post-load order violated: {order:?}"
    );
}

#[test]
fn test_worker_pool_claims_every_index() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut registry = AssetTypeRegistry::new();
    let claimed = Arc::clone(&counter);
    registry.register(
        b"txtr",
        AssetBinding {
            load: Some(Arc::new(move |_pak, _handle| {
                claimed.fetch_add(1, Ordering::Relaxed);
            })),
            ..Default::default()
        },
    );

    let mut builder = PakBuilder::new(PakVersion::V7);
    let header_seg = builder.add_segment(SegmentType::Header, 8);
    builder.add_page(header_seg, 8, vec![0u8; 0x400]);
    for i in 0..32u64 {
        builder.add_asset(asset_record(0x1000 + i, b"txtr", 0, (i * 0x20) as u32, 0x20));
    }

    let config = LoadConfig {
        worker_threads: 4,
        ..LoadConfig::default()
    };
    load_pak_from_bytes(builder.build(), Vec::new(), &registry, &config).unwrap();
    assert_eq!(counter.load(Ordering::Relaxed), 32);
}

#[test]
fn test_panicking_callback_is_isolated() {
    let survived = Arc::new(AtomicUsize::new(0));
    let mut registry = AssetTypeRegistry::new();
    let survived_clone = Arc::clone(&survived);
    registry.register(
        b"txtr",
        AssetBinding {
            load: Some(Arc::new(move |_pak, handle| {
                if handle.guid == 0x12 {
                    panic!("one bad asset");
                }
                survived_clone.fetch_add(1, Ordering::Relaxed);
            })),
            ..Default::default()
        },
    );

    let result =
        load_pak_from_bytes(pipeline_pak(), Vec::new(), &registry, &LoadConfig::default());
    assert!(result.is_ok(), "a single panicking asset must not be fatal");
    // The other txtr asset still loaded, and the panicked wrapper is still
    // in the list.
    assert_eq!(survived.load(Ordering::Relaxed), 1);
    assert_eq!(registry.asset_count(), 2);
}
