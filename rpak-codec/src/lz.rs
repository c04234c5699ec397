//! The "pak" LZ/entropy codec.
//!
//! A pak payload compressed with this codec starts with a small bit-packed
//! preamble (variable-width decompressed size, then the window log whose
//! complement is the stored inverse ring mask), followed by a token stream.
//! Each token starts with a 5-bit code looked up in a precomputed static
//! table: short codes are literal runs copied verbatim from the byte-aligned
//! input cursor or matches copied from earlier output; code 31 escapes to an
//! 8-bit extension for longer runs and matches.

use tracing::{debug, trace};

use crate::bits::{BitReader, BitWriter};
use crate::matchfind::longest_match;
use crate::{Error, Result};

/// Shortest encodable match.
const MIN_MATCH: usize = 3;
/// Longest match reachable through the escape code.
const MAX_MATCH: usize = 145;
/// Longest literal run reachable through the escape code.
const MAX_RUN: usize = 144;
/// Escape threshold: literal runs longer than this need the escape code.
const SHORT_RUN_MAX: usize = 16;
/// Matches longer than this need the escape code.
const SHORT_MATCH_MAX: usize = 17;

const WINDOW_LOG_MIN: u32 = 8;
const WINDOW_LOG_MAX: u32 = 24;

/// One decoded 5-bit op.
#[derive(Debug, Clone, Copy)]
enum LzOp {
    /// Copy `n` bytes verbatim from the input cursor.
    Run(u8),
    /// Back-reference of `n` bytes; distance bits follow.
    Match(u8),
    /// 8-bit extension follows.
    Escape,
}

const fn build_ops() -> [LzOp; 32] {
    let mut ops = [LzOp::Escape; 32];
    let mut code = 0;
    while code < 31 {
        ops[code] = if code < 16 {
            LzOp::Run(code as u8 + 1)
        } else {
            LzOp::Match(code as u8 - 13)
        };
        code += 1;
    }
    ops
}

/// Static code table mapping the next 5 bits to an operation.
static LZ_OPS: [LzOp; 32] = build_ops();

/// Decode context for one pak-codec payload.
#[derive(Debug)]
pub struct PakDecoder<'a> {
    reader: BitReader<'a>,
    decompressed_size: u64,
    window_log: u32,
    /// Complement of the ring mask; `!inverse_mask` is the largest reachable
    /// back-reference distance minus one.
    inverse_mask: u64,
}

impl<'a> PakDecoder<'a> {
    /// Establish a decode context from the preamble at `header_offset`.
    pub fn init(input: &'a [u8], header_offset: usize) -> Result<Self> {
        if header_offset > input.len() {
            return Err(Error::OutOfBytes {
                needed: header_offset,
                available: input.len(),
            });
        }
        let mut reader = BitReader::new(&input[header_offset..]);

        let size_bits = reader.read(6)? as u32;
        if size_bits == 0 || size_bits > 56 {
            return Err(Error::InvalidPreamble(format!(
                "size field width {size_bits} out of range"
            )));
        }
        let decompressed_size = reader.read(size_bits)?;

        let window_log = reader.read(5)? as u32;
        if !(WINDOW_LOG_MIN..=WINDOW_LOG_MAX).contains(&window_log) {
            return Err(Error::InvalidPreamble(format!(
                "window log {window_log} out of range"
            )));
        }

        debug!(
            "pak codec init: {} bytes declared, window 2^{}",
            decompressed_size, window_log
        );

        Ok(Self {
            reader,
            decompressed_size,
            window_log,
            inverse_mask: !((1u64 << window_log) - 1),
        })
    }

    /// Declared decompressed size from the preamble.
    pub fn decompressed_size(&self) -> u64 {
        self.decompressed_size
    }

    /// Run the decode loop to completion.
    pub fn decompress(mut self) -> Result<Vec<u8>> {
        let size = usize::try_from(self.decompressed_size).map_err(|_| {
            Error::InvalidPreamble(format!("declared size {} unrepresentable", self.decompressed_size))
        })?;
        let window = !self.inverse_mask + 1;

        let mut out: Vec<u8> = Vec::with_capacity(size);
        while out.len() < size {
            let code = self.reader.read(5)? as usize;
            let (run, matched) = match LZ_OPS[code] {
                LzOp::Run(n) => (usize::from(n), None),
                LzOp::Match(n) => (0, Some(usize::from(n))),
                LzOp::Escape => {
                    let ext = self.reader.read(8)? as usize;
                    if ext < 128 {
                        (ext + SHORT_RUN_MAX + 1, None)
                    } else {
                        (0, Some(ext - 128 + SHORT_MATCH_MAX + 1))
                    }
                }
            };

            if let Some(length) = matched {
                let distance = self.reader.read(self.window_log)? + 1;
                if distance > out.len() as u64 || distance > window {
                    return Err(Error::DistanceOutOfRange {
                        distance,
                        produced: out.len() as u64,
                    });
                }
                if out.len() + length > size {
                    return Err(Error::OutputOverrun {
                        declared: size as u64,
                        produced: out.len() as u64,
                        run: length as u64,
                    });
                }
                trace!("match len={} dist={}", length, distance);
                let start = out.len() - distance as usize;
                // Byte-by-byte so overlapping references replicate.
                for i in 0..length {
                    let byte = out[start + i];
                    out.push(byte);
                }
            } else {
                if out.len() + run > size {
                    return Err(Error::OutputOverrun {
                        declared: size as u64,
                        produced: out.len() as u64,
                        run: run as u64,
                    });
                }
                trace!("literal run len={}", run);
                let bytes = self.reader.take_bytes(run)?;
                out.extend_from_slice(bytes);
            }
        }

        if out.len() as u64 != self.decompressed_size {
            return Err(Error::SizeMismatch {
                expected: self.decompressed_size,
                actual: out.len() as u64,
            });
        }
        Ok(out)
    }
}

/// Decompress a pak-codec payload whose preamble sits at `header_offset`.
pub fn pak_decompress(input: &[u8], header_offset: usize) -> Result<Vec<u8>> {
    PakDecoder::init(input, header_offset)?.decompress()
}

/// Compress `data` into the pak codec format.
pub fn pak_compress(data: &[u8], window_log: u32) -> Result<Vec<u8>> {
    if !(WINDOW_LOG_MIN..=WINDOW_LOG_MAX).contains(&window_log) {
        return Err(Error::InvalidPreamble(format!(
            "window log {window_log} out of range"
        )));
    }

    let mut w = BitWriter::new();
    let size = data.len() as u64;
    let size_bits = (64 - size.leading_zeros()).max(1);
    w.write(u64::from(size_bits), 6);
    w.write(size, size_bits);
    w.write(u64::from(window_log), 5);

    let window = 1usize << window_log;
    let mut pos = 0;
    let mut literal_start = 0;
    while pos < data.len() {
        match longest_match(data, pos, window, MIN_MATCH, MAX_MATCH) {
            Some((distance, length)) => {
                flush_literals(&mut w, &data[literal_start..pos]);
                if length <= SHORT_MATCH_MAX {
                    w.write((length + 13) as u64, 5);
                } else {
                    w.write(31, 5);
                    w.write((length - SHORT_MATCH_MAX - 1 + 128) as u64, 8);
                }
                w.write(distance as u64 - 1, window_log);
                pos += length;
                literal_start = pos;
            }
            None => pos += 1,
        }
    }
    flush_literals(&mut w, &data[literal_start..]);

    Ok(w.finish())
}

fn flush_literals(w: &mut BitWriter, mut literals: &[u8]) {
    while !literals.is_empty() {
        let take = if literals.len() > SHORT_RUN_MAX {
            literals.len().min(MAX_RUN)
        } else {
            literals.len()
        };
        if take > SHORT_RUN_MAX {
            w.write(31, 5);
            w.write((take - SHORT_RUN_MAX - 1) as u64, 8);
        } else {
            w.write((take - 1) as u64, 5);
        }
        w.write_bytes(&literals[..take]);
        literals = &literals[take..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_known_fixture() {
        // Hand-assembled stream: size=5 (3-bit field), window log 8, one
        // 5-byte literal run.
        let fixture = [0x43, 0x11, 0x01, b'h', b'e', b'l', b'l', b'o'];
        let out = pak_decompress(&fixture, 0).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_roundtrip_text() {
        let data = b"the quick brown fox jumps over the lazy dog, the quick brown fox";
        let compressed = pak_compress(data, 16).unwrap();
        let out = pak_decompress(&compressed, 0).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_roundtrip_repetitive() {
        let mut data = Vec::new();
        for i in 0..64u32 {
            data.extend_from_slice(format!("block {:04} ", i % 7).as_bytes());
        }
        let compressed = pak_compress(&data, 12).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(pak_decompress(&compressed, 0).unwrap(), data);
    }

    #[test]
    fn test_roundtrip_overlapping_run() {
        let data = vec![0x61u8; 500];
        let compressed = pak_compress(&data, 8).unwrap();
        assert_eq!(pak_decompress(&compressed, 0).unwrap(), data);
    }

    #[test]
    fn test_roundtrip_empty() {
        let compressed = pak_compress(b"", 8).unwrap();
        assert_eq!(pak_decompress(&compressed, 0).unwrap(), b"");
    }

    #[test]
    fn test_roundtrip_incompressible() {
        // A de Bruijn-ish byte spread with no repeats of length >= 3.
        let data: Vec<u8> = (0..=255u8).collect();
        let compressed = pak_compress(&data, 8).unwrap();
        assert_eq!(pak_decompress(&compressed, 0).unwrap(), data);
    }

    #[test]
    fn test_header_offset() {
        let data = b"offset payload offset payload";
        let compressed = pak_compress(data, 10).unwrap();
        let mut framed = vec![0xEE; 7];
        framed.extend_from_slice(&compressed);
        assert_eq!(pak_decompress(&framed, 7).unwrap(), data);
    }

    #[test]
    fn test_truncated_input_fails() {
        let data = b"truncate me truncate me truncate me";
        let mut compressed = pak_compress(data, 10).unwrap();
        compressed.truncate(compressed.len() / 2);
        assert!(pak_decompress(&compressed, 0).is_err());
    }

    #[test]
    fn test_bad_window_log() {
        // Preamble: size width 1, size 0, window log 31.
        let mut w = BitWriter::new();
        w.write(1, 6);
        w.write(0, 1);
        w.write(31, 5);
        let bytes = w.finish();
        assert!(matches!(
            pak_decompress(&bytes, 0),
            Err(Error::InvalidPreamble(_))
        ));
    }

    #[test]
    fn test_distance_out_of_range() {
        // size=4, wlog=8, then a match (len 3, dist 200) with nothing produced.
        let mut w = BitWriter::new();
        w.write(3, 6);
        w.write(4, 3);
        w.write(8, 5);
        w.write(16, 5); // match, length 3
        w.write(199, 8); // distance 200
        let bytes = w.finish();
        assert!(matches!(
            pak_decompress(&bytes, 0),
            Err(Error::DistanceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_declared_size_respected() {
        // Declares 2 bytes but encodes a 5-byte literal run.
        let mut w = BitWriter::new();
        w.write(2, 6);
        w.write(2, 2);
        w.write(8, 5);
        w.write(4, 5); // run of 5
        w.write_bytes(b"hello");
        let bytes = w.finish();
        assert!(matches!(
            pak_decompress(&bytes, 0),
            Err(Error::OutputOverrun { .. })
        ));
    }
}
