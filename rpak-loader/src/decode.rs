//! Whole-file decompression.
//!
//! The fixed header is always stored uncompressed; when a codec flag bit is
//! set, everything after it is one compressed payload. The result buffer
//! reproduces the full decompressed file image: header bytes followed by
//! the decompressed payload.

use tracing::debug;

use rpak_codec::{PakDecoder, deflate_decompress, snowflake_decompress};
use rpak_format::header::{
    FLAG_COMPRESS_DEFLATE, FLAG_COMPRESS_PAK, FLAG_COMPRESS_SNOWFLAKE,
};
use rpak_format::PakHeader;

use crate::{LoadError, Result};

/// Parse the header of `raw` and decompress the payload if the header
/// flags say so. Returns the normalized header and the full decompressed
/// file image.
pub fn decompress_pak(raw: Vec<u8>) -> Result<(PakHeader, Vec<u8>)> {
    let header = PakHeader::parse(&raw)?;
    if !header.is_compressed() {
        return Ok((header, raw));
    }

    let fixed = header.fixed_size();
    let expected = header
        .decompressed_size
        .saturating_sub(fixed as u64);

    let payload = match header.codec_flags() {
        FLAG_COMPRESS_PAK => {
            let decoder = PakDecoder::init(&raw, fixed)?;
            if decoder.decompressed_size() != expected {
                return Err(LoadError::Codec(rpak_codec::Error::SizeMismatch {
                    expected,
                    actual: decoder.decompressed_size(),
                }));
            }
            decoder.decompress()?
        }
        FLAG_COMPRESS_DEFLATE => {
            let expected = usize::try_from(expected)
                .map_err(|_| LoadError::UnsupportedCodecFlags(header.flags))?;
            deflate_decompress(&raw[fixed..], expected)?
        }
        FLAG_COMPRESS_SNOWFLAKE => {
            let out = snowflake_decompress(&raw, fixed)?;
            if out.len() as u64 != expected {
                return Err(LoadError::Codec(rpak_codec::Error::SizeMismatch {
                    expected,
                    actual: out.len() as u64,
                }));
            }
            out
        }
        other => return Err(LoadError::UnsupportedCodecFlags(other)),
    };

    debug!(
        "decompressed pak payload: {} -> {} bytes",
        raw.len() - fixed,
        payload.len()
    );

    let mut out = Vec::with_capacity(fixed + payload.len());
    out.extend_from_slice(&raw[..fixed]);
    out.extend_from_slice(&payload);
    Ok((header, out))
}
