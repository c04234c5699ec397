//! Third-party codec adapter.
//!
//! Wraps the external deflate decoder behind the incremental decode-some
//! interface: compressed bytes are fed repeatedly until a call consumes and
//! produces nothing, or the output buffer is full.

use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::Write;
use tracing::{debug, trace};

use crate::{Error, Result};

/// Decompress a raw-deflate payload of a known decompressed size.
pub fn deflate_decompress(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut decoder = Decompress::new(false);
    let mut out = vec![0u8; expected_size];
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;

    while out_pos < expected_size {
        let before_in = decoder.total_in();
        let before_out = decoder.total_out();

        let status = decoder
            .decompress(&input[in_pos..], &mut out[out_pos..], FlushDecompress::Finish)
            .map_err(|e| Error::DecompressionFailed(format!("deflate: {e}")))?;

        let consumed = (decoder.total_in() - before_in) as usize;
        let produced = (decoder.total_out() - before_out) as usize;
        trace!("deflate step: consumed {}, produced {}", consumed, produced);
        in_pos += consumed;
        out_pos += produced;

        if matches!(status, Status::StreamEnd) || (consumed == 0 && produced == 0) {
            break;
        }
    }

    if out_pos != expected_size {
        return Err(Error::SizeMismatch {
            expected: expected_size as u64,
            actual: out_pos as u64,
        });
    }

    debug!("deflate: {} bytes -> {} bytes", input.len(), out_pos);
    Ok(out)
}

/// Compress `data` as a raw deflate stream.
pub fn deflate_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"adapter roundtrip payload, adapter roundtrip payload";
        let compressed = deflate_compress(data).unwrap();
        let out = deflate_decompress(&compressed, data.len()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_roundtrip_empty() {
        let compressed = deflate_compress(b"").unwrap();
        assert_eq!(deflate_decompress(&compressed, 0).unwrap(), b"");
    }

    #[test]
    fn test_truncated_input() {
        let data = vec![7u8; 4096];
        let mut compressed = deflate_compress(&data).unwrap();
        compressed.truncate(compressed.len() / 2);
        assert!(deflate_decompress(&compressed, data.len()).is_err());
    }

    #[test]
    fn test_wrong_expected_size() {
        let data = b"size mismatch probe";
        let compressed = deflate_compress(data).unwrap();
        // Larger than the real payload: decoder stalls short of the target.
        assert!(matches!(
            deflate_decompress(&compressed, data.len() + 4),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_garbage_input() {
        // 0x06 starts a block with the reserved BTYPE, always invalid.
        assert!(deflate_decompress(&[0x06; 8], 128).is_err());
    }
}
