//! Synthetic starpak side-car images.

use byteorder::{LittleEndian, WriteBytesExt};

/// Serialize a starpak: blob payloads back to back, the trailing
/// (offset, size) table, then the entry count.
pub fn starpak_bytes(blobs: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut entries = Vec::new();
    for blob in blobs {
        entries.push((out.len() as u64, blob.len() as u64));
        out.extend_from_slice(blob);
    }
    for (offset, size) in &entries {
        let _ = out.write_u64::<LittleEndian>(*offset);
        let _ = out.write_u64::<LittleEndian>(*size);
    }
    let _ = out.write_u64::<LittleEndian>(entries.len() as u64);
    out
}
