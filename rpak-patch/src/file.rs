//! Patch file naming.
//!
//! Patch layers live next to their base pak, named by a deterministic
//! suffix derived from the patch file number: `common.rpak` is patched by
//! `common(01).rpak`, `common(02).rpak`, and so on.

use std::path::{Path, PathBuf};

/// Path of the patch file carrying `number` for the given base pak.
pub fn patch_file_name(base: &Path, number: u16) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut name = format!("{stem}({number:02})");
    if let Some(ext) = base.extension().and_then(|s| s.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    base.with_file_name(name)
}
