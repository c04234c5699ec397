//! The patch command bitstream decoder.
//!
//! Stream layout, in one continuous LSB-first bitstream: a canonical code
//! table over the 64-symbol command alphabet, a canonical code table over
//! the 256-symbol size-width alphabet, a 24-bit offset locating the literal
//! replacement-data region, then the command bits. Each step decodes one
//! 64-alphabet symbol carrying the command id (low 3 bits) and a
//! length-class index (high 3 bits); data commands follow with one
//! 256-alphabet symbol giving the bit width of an explicit size field.

use tracing::{debug, trace};

use rpak_codec::bits::BitReader;
use rpak_codec::canon::CanonicalTable;

use crate::{PatchError, Result};

/// Command alphabet size (6-bit symbols).
pub const COMMAND_ALPHABET: usize = 64;
/// Size-width alphabet size (8-bit symbols).
pub const WIDTH_ALPHABET: usize = 256;

/// A patch operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    /// Copy bytes from the source cursor; source and destination advance.
    Copy,
    /// Copy bytes from the replacement-data region; the source cursor
    /// advances past the bytes being replaced.
    Replace,
    /// Copy bytes from the replacement-data region; the source cursor does
    /// not move.
    Insert,
    /// Advance the source cursor without writing.
    Skip,
    /// Zero-fill the destination.
    Zero,
}

/// Operator dispatch table indexed by command id.
const OPERATORS: [PatchOp; 8] = [
    PatchOp::Copy,
    PatchOp::Replace,
    PatchOp::Insert,
    PatchOp::Skip,
    PatchOp::Zero,
    PatchOp::Copy,
    PatchOp::Copy,
    PatchOp::Zero,
];

/// Fixed byte counts for the no-data command ids 5..=7.
const FIXED_SIZES: [u64; 3] = [8, 16, 4];

/// Command ids below this carry an explicit bit-packed size.
const FIRST_FIXED_COMMAND: u32 = 5;

/// Widest accepted explicit size field.
const MAX_SIZE_WIDTH: u32 = 32;

/// One decoded patch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchCommand {
    pub op: PatchOp,
    /// Byte count this operator processes.
    pub size: u64,
}

/// Decode state over one patch command stream.
#[derive(Debug)]
pub struct PatchStream<'a> {
    stream: &'a [u8],
    reader: BitReader<'a>,
    commands: CanonicalTable,
    widths: CanonicalTable,
    /// Next unconsumed replacement-data byte.
    replacement: usize,
}

impl<'a> PatchStream<'a> {
    /// Build the side tables from the stream header; the equivalent of the
    /// decode-data construction done once per load.
    pub fn new(stream: &'a [u8]) -> Result<Self> {
        let mut reader = BitReader::new(stream);
        let commands = CanonicalTable::parse(&mut reader, COMMAND_ALPHABET)?;
        let widths = CanonicalTable::parse(&mut reader, WIDTH_ALPHABET)?;

        let replacement = reader.read(24)? as usize;
        if replacement > stream.len() {
            return Err(PatchError::ReplacementOutOfRange {
                offset: replacement,
                len: stream.len(),
            });
        }

        debug!(
            "patch stream: {} bytes, replacement data at {:#x}",
            stream.len(),
            replacement
        );

        Ok(Self {
            stream,
            reader,
            commands,
            widths,
            replacement,
        })
    }

    /// Decode one command: the 6-bit selector symbol, then the explicit
    /// size field for data commands.
    pub fn next_command(&mut self) -> Result<PatchCommand> {
        let sym = u32::from(self.commands.decode(&mut self.reader)?);
        let cmd = sym & 7;
        let len_class = u64::from(sym >> 3);

        let (op, size) = if cmd < FIRST_FIXED_COMMAND {
            let width = u32::from(self.widths.decode(&mut self.reader)?) & 0x3F;
            if width > MAX_SIZE_WIDTH {
                return Err(PatchError::InvalidWidth(width));
            }
            let high = self.reader.read(width)?;
            (OPERATORS[cmd as usize], ((high << 3) | len_class) + 1)
        } else {
            (
                OPERATORS[cmd as usize],
                FIXED_SIZES[(cmd - FIRST_FIXED_COMMAND) as usize],
            )
        };

        trace!("patch cmd {:?} size {}", op, size);
        Ok(PatchCommand { op, size })
    }

    /// Take `n` bytes from the replacement-data region.
    pub fn take_replacement(&mut self, n: usize) -> Result<&'a [u8]> {
        let available = self.stream.len() - self.replacement;
        if available < n {
            return Err(PatchError::ReplacementExhausted {
                needed: n,
                available,
            });
        }
        let run = &self.stream[self.replacement..self.replacement + n];
        self.replacement += n;
        Ok(run)
    }

    /// Whether any command bits remain.
    pub fn has_bits(&self) -> bool {
        self.reader.bits_remaining() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::PatchStreamWriter;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_roundtrip() {
        let mut writer = PatchStreamWriter::new().unwrap();
        writer.copy(1).unwrap();
        writer.copy(8).unwrap();
        writer.replace(b"patched!").unwrap();
        writer.insert(b"xyz").unwrap();
        writer.skip(100).unwrap();
        writer.zero(12).unwrap();
        writer.copy(70_000).unwrap();
        let stream = writer.finish();

        let mut decoder = PatchStream::new(&stream).unwrap();
        let expected = [
            (PatchOp::Copy, 1u64),
            (PatchOp::Copy, 8),
            (PatchOp::Replace, 8),
            (PatchOp::Insert, 3),
            (PatchOp::Skip, 100),
            (PatchOp::Zero, 12),
            (PatchOp::Copy, 70_000),
        ];
        for (op, size) in expected {
            let cmd = decoder.next_command().unwrap();
            assert_eq!((cmd.op, cmd.size), (op, size));
        }

        assert_eq!(decoder.take_replacement(8).unwrap(), b"patched!");
        assert_eq!(decoder.take_replacement(3).unwrap(), b"xyz");
    }

    #[test]
    fn test_fixed_size_commands() {
        // Fixed-size shorthands decode without a width symbol.
        let mut writer = PatchStreamWriter::new().unwrap();
        writer.emit_raw(5, 0).unwrap();
        writer.emit_raw(6, 0).unwrap();
        writer.emit_raw(7, 0).unwrap();
        let stream = writer.finish();

        let mut decoder = PatchStream::new(&stream).unwrap();
        let expected = [
            (PatchOp::Copy, 8u64),
            (PatchOp::Copy, 16),
            (PatchOp::Zero, 4),
        ];
        for (op, size) in expected {
            let cmd = decoder.next_command().unwrap();
            assert_eq!((cmd.op, cmd.size), (op, size));
        }
    }

    #[test]
    fn test_replacement_exhausted() {
        let mut writer = PatchStreamWriter::new().unwrap();
        writer.replace(b"ab").unwrap();
        let stream = writer.finish();

        let mut decoder = PatchStream::new(&stream).unwrap();
        decoder.next_command().unwrap();
        assert!(matches!(
            decoder.take_replacement(3),
            Err(PatchError::ReplacementExhausted {
                needed: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn test_empty_stream_rejected() {
        assert!(PatchStream::new(&[]).is_err());
    }

    #[test]
    fn test_replacement_offset_bounds() {
        // A syntactically valid header whose replacement offset points past
        // the stream end must be rejected.
        let mut writer = PatchStreamWriter::new().unwrap();
        writer.copy(4).unwrap();
        let mut stream = writer.finish();
        // The 24-bit offset sits right after the two length tables
        // (64 + 256 symbols at 4 bits each = 160 bytes).
        stream[160] = 0xFF;
        stream[161] = 0xFF;
        stream[162] = 0x7F;
        assert!(matches!(
            PatchStream::new(&stream),
            Err(PatchError::ReplacementOutOfRange { .. })
        ));
    }
}
