//! Asset type bindings and the shared asset list.
//!
//! The registry is an explicit object passed into the load pipeline; there
//! is no ambient global state. It maps four-character type tags to their
//! callbacks and owns the list of per-asset wrappers constructed during
//! the load phase.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use rpak_format::AssetKind;

use crate::pak::Pak;

/// Must-initialize-before ordering for post-load: raw payload formats
/// before UI atlases, shader headers before shader sets before materials,
/// skeletal rigs before models before animation sequences.
pub const POST_LOAD_PRIORITY: [&[u8; 4]; 8] = [
    b"txtr", b"ui_i", b"shdr", b"shds", b"matl", b"arig", b"mdl_", b"aseq",
];

/// Default header alignment when a type declares none.
pub const DEFAULT_HEADER_ALIGN: u32 = 8;

/// Callback signature for load and post-load hooks.
pub type AssetCallback = Arc<dyn Fn(&Pak, &mut AssetHandle) + Send + Sync>;

/// Binding of one asset type tag to its callbacks and metadata.
#[derive(Clone)]
pub struct AssetBinding {
    pub load: Option<AssetCallback>,
    pub post_load: Option<AssetCallback>,
    /// Required alignment of this type's header structs.
    pub header_align: u32,
    /// Name used by export tooling.
    pub export_name: &'static str,
}

impl std::fmt::Debug for AssetBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetBinding")
            .field("load", &self.load.is_some())
            .field("post_load", &self.post_load.is_some())
            .field("header_align", &self.header_align)
            .field("export_name", &self.export_name)
            .finish()
    }
}

impl Default for AssetBinding {
    fn default() -> Self {
        Self {
            load: None,
            post_load: None,
            header_align: DEFAULT_HEADER_ALIGN,
            export_name: "",
        }
    }
}

/// Per-asset wrapper constructed during the load phase.
pub struct AssetHandle {
    pub guid: u64,
    pub kind: AssetKind,
    /// Index into the owning pak's asset array.
    pub index: usize,
    /// Opaque slot for the type-specific parsed representation, written by
    /// the external callbacks.
    pub extension: Option<Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for AssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetHandle")
            .field("guid", &format_args!("{:#018x}", self.guid))
            .field("kind", &self.kind)
            .field("index", &self.index)
            .field("extension", &self.extension.is_some())
            .finish()
    }
}

impl AssetHandle {
    pub(crate) fn new(guid: u64, kind: AssetKind, index: usize) -> Self {
        Self {
            guid,
            kind,
            index,
            extension: None,
        }
    }
}

/// Registry of type bindings plus the shared global asset list.
#[derive(Debug, Default)]
pub struct AssetTypeRegistry {
    bindings: HashMap<AssetKind, AssetBinding>,
    /// The only shared-mutation point of the parallel load phase.
    assets: Mutex<Vec<AssetHandle>>,
}

impl AssetTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding for a type tag, replacing any previous one.
    pub fn register(&mut self, tag: &[u8; 4], binding: AssetBinding) {
        self.bindings.insert(AssetKind::new(tag), binding);
    }

    pub fn binding(&self, kind: AssetKind) -> Option<&AssetBinding> {
        self.bindings.get(&kind)
    }

    /// Required header alignment for a type (default when unregistered).
    pub fn header_align(&self, kind: AssetKind) -> u32 {
        self.bindings
            .get(&kind)
            .map_or(DEFAULT_HEADER_ALIGN, |b| b.header_align.max(1))
    }

    pub(crate) fn push_asset(&self, handle: AssetHandle) {
        self.assets.lock().push(handle);
    }

    /// Stable re-sort of the asset list by post-load priority: the fixed
    /// priority tags group first in declared order, everything else keeps
    /// its position after them.
    pub fn sort_for_post_load(&self) {
        let mut assets = self.assets.lock();
        assets.sort_by_key(|handle| priority_rank(handle.kind));
    }

    /// Run `f` over the current asset list.
    pub fn with_assets<R>(&self, f: impl FnOnce(&mut Vec<AssetHandle>) -> R) -> R {
        f(&mut self.assets.lock())
    }

    /// Number of wrappers accumulated so far.
    pub fn asset_count(&self) -> usize {
        self.assets.lock().len()
    }

    /// Drain the asset list, e.g. when a container is unloaded.
    pub fn take_assets(&self) -> Vec<AssetHandle> {
        std::mem::take(&mut self.assets.lock())
    }
}

/// Rank of a tag in the post-load priority order; unlisted tags sort after
/// every listed one.
pub(crate) fn priority_rank(kind: AssetKind) -> usize {
    POST_LOAD_PRIORITY
        .iter()
        .position(|&tag| kind == AssetKind::new(tag))
        .unwrap_or(POST_LOAD_PRIORITY.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rank() {
        assert_eq!(priority_rank(AssetKind::new(b"txtr")), 0);
        assert_eq!(priority_rank(AssetKind::new(b"aseq")), 7);
        assert_eq!(priority_rank(AssetKind::new(b"dtbl")), 8);
    }

    #[test]
    fn test_sort_is_stable_for_unlisted() {
        let registry = AssetTypeRegistry::new();
        for (i, tag) in [b"dtbl", b"aseq", b"ui_i", b"stlt", b"txtr"].iter().enumerate() {
            registry.push_asset(AssetHandle::new(i as u64, AssetKind::new(tag), i));
        }
        registry.sort_for_post_load();
        registry.with_assets(|assets| {
            let order: Vec<u64> = assets.iter().map(|a| a.guid).collect();
            // txtr, ui_i, aseq first in priority order; dtbl then stlt keep
            // their relative order after.
            assert_eq!(order, vec![4, 2, 1, 0, 3]);
        });
    }

    #[test]
    fn test_header_align_default() {
        let mut registry = AssetTypeRegistry::new();
        assert_eq!(registry.header_align(AssetKind::new(b"txtr")), 8);
        registry.register(
            b"txtr",
            AssetBinding {
                header_align: 16,
                ..Default::default()
            },
        );
        assert_eq!(registry.header_align(AssetKind::new(b"txtr")), 16);
    }
}
