//! Patch command stream writer.
//!
//! Produces streams in the exact layout [`PatchStream`](crate::PatchStream)
//! decodes: both canonical length tables, the 24-bit replacement-data
//! offset, the command bits, then the replacement data itself. Used by the
//! patch-chain fixture builders and the decoder tests.

use rpak_codec::bits::BitWriter;
use rpak_codec::canon::CanonicalTable;

use crate::decode::{COMMAND_ALPHABET, WIDTH_ALPHABET};
use crate::{PatchError, Result};

/// Byte size of the fixed stream header: two 4-bit length tables plus the
/// 24-bit replacement offset, which happens to land on a byte boundary.
const STREAM_HEADER_SIZE: usize = (COMMAND_ALPHABET + WIDTH_ALPHABET) / 2 + 3;

/// Builder for one patch command stream.
#[derive(Debug)]
pub struct PatchStreamWriter {
    commands: CanonicalTable,
    widths: CanonicalTable,
    body: BitWriter,
    replacement: Vec<u8>,
}

impl PatchStreamWriter {
    /// Writer with complete uniform code tables.
    pub fn new() -> Result<Self> {
        Ok(Self {
            commands: CanonicalTable::from_lengths(vec![6u8; COMMAND_ALPHABET])?,
            widths: CanonicalTable::from_lengths(vec![8u8; WIDTH_ALPHABET])?,
            body: BitWriter::new(),
            replacement: Vec::new(),
        })
    }

    /// Emit one data command (ids 0..=4) with an explicit size.
    fn emit_sized(&mut self, cmd: u32, size: u64) -> Result<()> {
        debug_assert!(cmd < 5 && size > 0);
        let value = size - 1;
        let len_class = (value & 7) as u32;
        let high = value >> 3;
        let width = if high == 0 {
            0
        } else {
            64 - high.leading_zeros()
        };
        if width > 32 {
            return Err(PatchError::InvalidWidth(width));
        }

        self.emit_raw(cmd, len_class)?;
        self.widths.encode(&mut self.body, width as u16)?;
        self.body.write(high, width);
        Ok(())
    }

    /// Emit a bare command selector symbol. For the fixed-size command ids
    /// (5..=7) the length class is ignored by decoders.
    pub fn emit_raw(&mut self, cmd: u32, len_class: u32) -> Result<()> {
        let sym = ((len_class << 3) | cmd) as u16;
        self.commands.encode(&mut self.body, sym)?;
        Ok(())
    }

    /// Copy `size` bytes from the source cursor.
    pub fn copy(&mut self, size: u64) -> Result<()> {
        self.emit_sized(0, size)
    }

    /// Replace `data.len()` source bytes with `data`.
    pub fn replace(&mut self, data: &[u8]) -> Result<()> {
        self.emit_sized(1, data.len() as u64)?;
        self.replacement.extend_from_slice(data);
        Ok(())
    }

    /// Insert `data` without consuming source bytes.
    pub fn insert(&mut self, data: &[u8]) -> Result<()> {
        self.emit_sized(2, data.len() as u64)?;
        self.replacement.extend_from_slice(data);
        Ok(())
    }

    /// Skip `size` source bytes.
    pub fn skip(&mut self, size: u64) -> Result<()> {
        self.emit_sized(3, size)
    }

    /// Zero-fill `size` destination bytes.
    pub fn zero(&mut self, size: u64) -> Result<()> {
        self.emit_sized(4, size)
    }

    /// Assemble the final stream.
    pub fn finish(self) -> Vec<u8> {
        let body = self.body.finish();
        let replacement_offset = STREAM_HEADER_SIZE + body.len();

        let mut w = BitWriter::new();
        self.commands.write_lengths(&mut w);
        self.widths.write_lengths(&mut w);
        w.write(replacement_offset as u64, 24);
        w.write_bytes(&body);

        let mut stream = w.finish();
        debug_assert_eq!(stream.len(), replacement_offset);
        stream.extend_from_slice(&self.replacement);
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_constant() {
        // 320 symbols at 4 bits each, plus the 24-bit offset.
        assert_eq!(STREAM_HEADER_SIZE, 163);
    }

    #[test]
    fn test_finish_places_replacement_at_offset() {
        let mut writer = PatchStreamWriter::new().unwrap();
        writer.replace(b"DATA").unwrap();
        let stream = writer.finish();
        assert_eq!(&stream[stream.len() - 4..], b"DATA");
    }
}
