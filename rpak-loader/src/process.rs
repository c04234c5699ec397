//! The two-phase parallel asset processing pipeline.
//!
//! Phase 1 partitions the resolved asset array across a bounded worker
//! pool; each worker claims the next unclaimed index off an atomic counter
//! and runs the type's load callback exactly once, appending the new
//! wrapper to the registry's shared list under its mutex. Phase 2 re-sorts
//! the wrappers so the fixed priority types group first, then runs each
//! type group's post-load callbacks in parallel, with a barrier between
//! groups: an asset's post-load code may assume every higher-priority type
//! has already finished.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use rpak_format::AssetKind;

use crate::config::LoadConfig;
use crate::pak::Pak;
use crate::registry::{AssetCallback, AssetHandle, AssetTypeRegistry, priority_rank};
use crate::Result;

/// Run the load and post-load phases for a freshly loaded container.
pub fn process_assets(pak: &Pak, registry: &AssetTypeRegistry, config: &LoadConfig) -> Result<()> {
    let workers = config.worker_threads.max(1);
    let start = registry.asset_count();

    run_load_phase(pak, registry, workers);

    debug!(
        "load phase complete: {} wrappers constructed",
        registry.asset_count() - start
    );

    run_post_load_phase(pak, registry, workers, start);
    Ok(())
}

fn run_load_phase(pak: &Pak, registry: &AssetTypeRegistry, workers: usize) {
    let assets = pak.assets();
    let claim = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let index = claim.fetch_add(1, Ordering::Relaxed);
                    if index >= assets.len() {
                        break;
                    }
                    let asset = &assets[index];
                    let Some(load) = registry
                        .binding(asset.kind)
                        .and_then(|b| b.load.clone())
                    else {
                        continue;
                    };

                    let mut handle = AssetHandle::new(asset.guid, asset.kind, index);
                    invoke(&load, pak, &mut handle, "load");
                    registry.push_asset(handle);
                }
            });
        }
    });
}

fn run_post_load_phase(
    pak: &Pak,
    registry: &AssetTypeRegistry,
    workers: usize,
    start: usize,
) {
    // This load's wrappers are the tail appended during phase 1. Re-sort
    // them by priority; earlier containers' wrappers stay untouched.
    let mut all = registry.take_assets();
    let mut tail: Vec<AssetHandle> = all.split_off(start.min(all.len()));
    tail.sort_by_key(|handle| priority_rank(handle.kind));

    // Distinct type groups in priority-then-first-appearance order.
    let mut group_order: Vec<AssetKind> = Vec::new();
    let mut groups: HashMap<AssetKind, Vec<usize>> = HashMap::new();
    for (i, handle) in tail.iter().enumerate() {
        groups
            .entry(handle.kind)
            .or_insert_with(|| {
                group_order.push(handle.kind);
                Vec::new()
            })
            .push(i);
    }

    // Individual locks let one group's workers mutate disjoint wrappers.
    let handles: Vec<Mutex<AssetHandle>> = tail.into_iter().map(Mutex::new).collect();

    for kind in group_order {
        let Some(post_load) = registry.binding(kind).and_then(|b| b.post_load.clone()) else {
            continue;
        };
        let indices = &groups[&kind];
        let claim = AtomicUsize::new(0);

        debug!("post-load group {}: {} assets", kind, indices.len());

        // The scope is the per-group barrier: the next group starts only
        // once every worker has drained this one.
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let i = claim.fetch_add(1, Ordering::Relaxed);
                        if i >= indices.len() {
                            break;
                        }
                        let mut handle = handles[indices[i]].lock();
                        invoke(&post_load, pak, &mut handle, "post-load");
                    }
                });
            }
        });
    }

    all.extend(handles.into_iter().map(Mutex::into_inner));
    registry.with_assets(|list| *list = all);
}

/// Invoke one callback, catching per-asset panics: a failed single asset
/// is logged, never fatal to the whole container.
fn invoke(callback: &AssetCallback, pak: &Pak, handle: &mut AssetHandle, phase: &str) {
    let guid = handle.guid;
    let kind = handle.kind;
    let outcome = catch_unwind(AssertUnwindSafe(|| callback(pak, handle)));
    if outcome.is_err() {
        warn!("{} callback for {} asset {:#018x} panicked", phase, kind, guid);
    }
}
