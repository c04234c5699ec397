//! The "snowflake" adaptive range codec.
//!
//! `Init` reads the scalar parameters and the two canonical side tables
//! (64- and 256-symbol alphabets, the same construction as the patch
//! command stream) whose code lengths seed per-symbol adaptive interval
//! tables. `Decompress` then drives a carry-less range decoder: cumulative
//! frequency search runs as a coarse 16-lane bucket cascade followed by a
//! fine within-bucket pass, and every decoded symbol moves its interval
//! table multiplicatively toward itself. Output is produced in bounded
//! chunks; decoder state persists across calls so a token interrupted at a
//! chunk boundary resumes correctly.

use tracing::{debug, trace};

use crate::bits::{BitReader, BitWriter};
use crate::canon::CanonicalTable;
use crate::matchfind::longest_match;
use crate::range::{RangeDecoder, RangeEncoder};
use crate::{Error, Result};

const WINDOW_LOG_MIN: u32 = 8;
const WINDOW_LOG_MAX: u32 = 24;

/// Token alphabet: 0..=31 literal runs, 32..=62 short matches, 63 long match.
const TOKEN_ALPHABET: usize = 64;
const LITERAL_ALPHABET: usize = 256;
/// Literal-run tokens encode lengths 1..=32.
const MAX_RUN: usize = 32;
/// Short-match tokens encode lengths 3..=33.
const MIN_MATCH: usize = 3;
const SHORT_MATCH_MAX: usize = 33;
/// Long matches add 12 direct bits to length 34.
const LONG_MATCH_BASE: usize = 34;
const LONG_MATCH_BITS: u32 = 12;
const MAX_MATCH: usize = LONG_MATCH_BASE + ((1 << LONG_MATCH_BITS) - 1);

/// Number of frequency lanes scanned per cascade step.
const LANES: usize = 16;
/// Halve all frequencies once the total passes this.
const RESCALE_LIMIT: u32 = 1 << 15;

/// Adaptive frequency table with a 16-lane coarse index.
#[derive(Debug, Clone)]
struct Model {
    freq: Vec<u16>,
    buckets: Vec<u32>,
    total: u32,
}

impl Model {
    /// Seed initial intervals from canonical code lengths: shorter codes
    /// start with proportionally wider intervals.
    fn seeded(lengths: &[u8], max_log: u32) -> Self {
        debug_assert!(lengths.len() % LANES == 0);
        let freq: Vec<u16> = lengths
            .iter()
            .map(|&len| {
                if len == 0 {
                    1
                } else {
                    1u16 << (max_log - u32::from(len).min(max_log))
                }
            })
            .collect();

        let mut model = Self {
            buckets: vec![0; freq.len() / LANES],
            total: 0,
            freq,
        };
        model.rebuild();
        model
    }

    fn rebuild(&mut self) {
        self.total = 0;
        for (lane, chunk) in self.freq.chunks(LANES).enumerate() {
            let sum: u32 = chunk.iter().map(|&f| u32::from(f)).sum();
            self.buckets[lane] = sum;
            self.total += sum;
        }
    }

    fn decode(&self, rc: &mut RangeDecoder<'_>) -> Result<usize> {
        let target = rc.freq_value(self.total);

        // Coarse cascade over the lane sums, then the fine pass.
        let mut cum = 0u32;
        let mut lane = 0usize;
        while cum + self.buckets[lane] <= target {
            cum += self.buckets[lane];
            lane += 1;
        }
        let mut sym = lane * LANES;
        while cum + u32::from(self.freq[sym]) <= target {
            cum += u32::from(self.freq[sym]);
            sym += 1;
        }

        rc.freq_update(cum, u32::from(self.freq[sym]))?;
        Ok(sym)
    }

    fn encode(&self, rc: &mut RangeEncoder, sym: usize) {
        let mut cum = 0u32;
        for &bucket in &self.buckets[..sym / LANES] {
            cum += bucket;
        }
        for &f in &self.freq[(sym / LANES) * LANES..sym] {
            cum += u32::from(f);
        }
        rc.encode_freq(cum, u32::from(self.freq[sym]), self.total);
    }

    /// Move the table toward `sym`: geometric growth with halving rescale.
    fn update(&mut self, sym: usize) {
        let add = u32::from(self.freq[sym] >> 3) + 8;
        self.freq[sym] += add as u16;
        self.buckets[sym / LANES] += add;
        self.total += add;
        if self.total > RESCALE_LIMIT {
            for f in &mut self.freq {
                *f = (*f >> 1).max(1);
            }
            self.rebuild();
        }
    }
}

/// A token interrupted at a chunk boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    /// Literal run with `remaining` literals still to decode.
    Run { remaining: usize },
    /// Back-reference copy still in flight.
    Copy { distance: usize, remaining: usize },
}

/// Decode state for one snowflake payload.
#[derive(Debug)]
pub struct SnowflakeDecoder<'a> {
    rc: RangeDecoder<'a>,
    tokens: Model,
    literals: [Model; 4],
    window_log: u32,
    chunk_size: usize,
    decompressed_size: u64,
    last_byte: u8,
    out: Vec<u8>,
    pending: Pending,
    /// Diagnostic only: completed token count.
    cycles: u64,
}

impl<'a> SnowflakeDecoder<'a> {
    /// Parse the preamble and side tables at `header_offset` and seed the
    /// range decoder.
    pub fn init(input: &'a [u8], header_offset: usize) -> Result<Self> {
        if header_offset > input.len() {
            return Err(Error::OutOfBytes {
                needed: header_offset,
                available: input.len(),
            });
        }
        let payload = &input[header_offset..];
        let mut reader = BitReader::new(payload);

        let window_log = reader.read(5)? as u32;
        if !(WINDOW_LOG_MIN..=WINDOW_LOG_MAX).contains(&window_log) {
            return Err(Error::InvalidPreamble(format!(
                "window log {window_log} out of range"
            )));
        }
        let last_byte = reader.read(8)? as u8;
        let chunk_log = reader.read(4)? as u32;
        let chunk_size = 1usize << (chunk_log + 8);

        let size_bits = reader.read(6)? as u32;
        if size_bits == 0 || size_bits > 56 {
            return Err(Error::InvalidPreamble(format!(
                "size field width {size_bits} out of range"
            )));
        }
        let decompressed_size = reader.read(size_bits)?;

        let token_table = CanonicalTable::parse(&mut reader, TOKEN_ALPHABET)?;
        let literal_table = CanonicalTable::parse(&mut reader, LITERAL_ALPHABET)?;

        reader.align_to_byte();
        let rc = RangeDecoder::new(&payload[reader.byte_position()..])?;

        debug!(
            "snowflake init: {} bytes declared, window 2^{}, chunk {}",
            decompressed_size, window_log, chunk_size
        );

        let tokens = Model::seeded(token_table.lengths(), 10);
        let literals = [
            Model::seeded(literal_table.lengths(), 8),
            Model::seeded(literal_table.lengths(), 8),
            Model::seeded(literal_table.lengths(), 8),
            Model::seeded(literal_table.lengths(), 8),
        ];

        Ok(Self {
            rc,
            tokens,
            literals,
            window_log,
            chunk_size,
            decompressed_size,
            last_byte,
            out: Vec::new(),
            pending: Pending::None,
            cycles: 0,
        })
    }

    pub fn decompressed_size(&self) -> u64 {
        self.decompressed_size
    }

    /// Completed token count, purely diagnostic.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_done(&self) -> bool {
        self.out.len() as u64 == self.decompressed_size && self.pending == Pending::None
    }

    fn decode_literal(&mut self) -> Result<()> {
        let ctx = usize::from(self.last_byte >> 6);
        let byte = self.literals[ctx].decode(&mut self.rc)? as u8;
        self.literals[ctx].update(usize::from(byte));
        self.out.push(byte);
        self.last_byte = byte;
        Ok(())
    }

    fn copy_step(&mut self, distance: usize) {
        let byte = self.out[self.out.len() - distance];
        self.out.push(byte);
        self.last_byte = byte;
    }

    /// Decode up to one chunk of output. Returns `true` once the declared
    /// size has been fully produced.
    pub fn decompress_chunk(&mut self) -> Result<bool> {
        let size = usize::try_from(self.decompressed_size).map_err(|_| {
            Error::InvalidPreamble(format!(
                "declared size {} unrepresentable",
                self.decompressed_size
            ))
        })?;
        let budget_end = size.min(self.out.len() + self.chunk_size);

        // Resume an interrupted token first.
        match self.pending {
            Pending::None => {}
            Pending::Run { mut remaining } => {
                while remaining > 0 && self.out.len() < budget_end {
                    self.decode_literal()?;
                    remaining -= 1;
                }
                self.pending = if remaining > 0 {
                    Pending::Run { remaining }
                } else {
                    self.cycles += 1;
                    Pending::None
                };
            }
            Pending::Copy {
                distance,
                mut remaining,
            } => {
                while remaining > 0 && self.out.len() < budget_end {
                    self.copy_step(distance);
                    remaining -= 1;
                }
                self.pending = if remaining > 0 {
                    Pending::Copy {
                        distance,
                        remaining,
                    }
                } else {
                    self.cycles += 1;
                    Pending::None
                };
            }
        }

        while self.pending == Pending::None && self.out.len() < budget_end {
            let sym = self.tokens.decode(&mut self.rc)?;
            self.tokens.update(sym);

            if sym < MAX_RUN {
                let run = sym + 1;
                if self.out.len() + run > size {
                    return Err(Error::OutputOverrun {
                        declared: size as u64,
                        produced: self.out.len() as u64,
                        run: run as u64,
                    });
                }
                trace!("literal run len={}", run);
                let mut remaining = run;
                while remaining > 0 && self.out.len() < budget_end {
                    self.decode_literal()?;
                    remaining -= 1;
                }
                if remaining > 0 {
                    self.pending = Pending::Run { remaining };
                } else {
                    self.cycles += 1;
                }
            } else {
                let length = if sym < TOKEN_ALPHABET - 1 {
                    sym - 29
                } else {
                    LONG_MATCH_BASE + self.rc.direct_bits(LONG_MATCH_BITS)? as usize
                };

                let dist_log = self.rc.direct_bits(5)? as u32;
                if dist_log > 30 {
                    return Err(Error::InvalidPreamble(format!(
                        "distance magnitude {dist_log} out of range"
                    )));
                }
                let distance = if dist_log == 0 {
                    1
                } else {
                    (1usize << dist_log) + self.rc.direct_bits(dist_log)? as usize
                };

                if distance > self.out.len() || distance > (1 << self.window_log) {
                    return Err(Error::DistanceOutOfRange {
                        distance: distance as u64,
                        produced: self.out.len() as u64,
                    });
                }
                if self.out.len() + length > size {
                    return Err(Error::OutputOverrun {
                        declared: size as u64,
                        produced: self.out.len() as u64,
                        run: length as u64,
                    });
                }

                trace!("match len={} dist={}", length, distance);
                let mut remaining = length;
                while remaining > 0 && self.out.len() < budget_end {
                    self.copy_step(distance);
                    remaining -= 1;
                }
                if remaining > 0 {
                    self.pending = Pending::Copy {
                        distance,
                        remaining,
                    };
                } else {
                    self.cycles += 1;
                }
            }
        }

        Ok(self.is_done())
    }

    /// The produced output; complete once `decompress_chunk` returned true.
    pub fn into_output(self) -> Vec<u8> {
        self.out
    }
}

/// Decompress a complete snowflake payload at `header_offset`.
pub fn snowflake_decompress(input: &[u8], header_offset: usize) -> Result<Vec<u8>> {
    let mut decoder = SnowflakeDecoder::init(input, header_offset)?;
    while !decoder.decompress_chunk()? {}
    debug!("snowflake: {} tokens decoded", decoder.cycles());
    Ok(decoder.into_output())
}

/// Compress `data` into the snowflake format.
pub fn snowflake_compress(data: &[u8], window_log: u32) -> Result<Vec<u8>> {
    if !(WINDOW_LOG_MIN..=WINDOW_LOG_MAX).contains(&window_log) {
        return Err(Error::InvalidPreamble(format!(
            "window log {window_log} out of range"
        )));
    }

    // Fixed complete side tables; the adaptive models do the real work.
    let token_table = CanonicalTable::from_lengths(vec![6u8; TOKEN_ALPHABET])?;
    let literal_table = CanonicalTable::from_lengths(vec![8u8; LITERAL_ALPHABET])?;

    let mut header = BitWriter::new();
    header.write(u64::from(window_log), 5);
    header.write(0, 8); // initial last-byte context
    header.write(4, 4); // chunk log: 4096-byte chunks
    let size = data.len() as u64;
    let size_bits = (64 - size.leading_zeros()).max(1);
    header.write(u64::from(size_bits), 6);
    header.write(size, size_bits);
    token_table.write_lengths(&mut header);
    literal_table.write_lengths(&mut header);
    let mut out = header.finish();

    let mut tokens = Model::seeded(token_table.lengths(), 10);
    let mut literals = [
        Model::seeded(literal_table.lengths(), 8),
        Model::seeded(literal_table.lengths(), 8),
        Model::seeded(literal_table.lengths(), 8),
        Model::seeded(literal_table.lengths(), 8),
    ];

    let mut rc = RangeEncoder::new();
    let window = 1usize << window_log;
    let mut last_byte = 0u8;
    let mut pos = 0usize;

    while pos < data.len() {
        if let Some((distance, length)) = longest_match(data, pos, window, MIN_MATCH, MAX_MATCH) {
            let sym = if length <= SHORT_MATCH_MAX {
                length + 29
            } else {
                TOKEN_ALPHABET - 1
            };
            tokens.encode(&mut rc, sym);
            tokens.update(sym);
            if sym == TOKEN_ALPHABET - 1 {
                rc.encode_direct_bits((length - LONG_MATCH_BASE) as u64, LONG_MATCH_BITS);
            }

            let dist_log = usize::BITS - 1 - (distance as usize).leading_zeros();
            rc.encode_direct_bits(u64::from(dist_log), 5);
            if dist_log > 0 {
                rc.encode_direct_bits((distance - (1 << dist_log)) as u64, dist_log);
            }

            pos += length;
            last_byte = data[pos - 1];
        } else {
            // Gather a literal run up to the next match opportunity.
            let mut run = 1usize;
            while run < MAX_RUN
                && pos + run < data.len()
                && longest_match(data, pos + run, window, MIN_MATCH, MAX_MATCH).is_none()
            {
                run += 1;
            }
            let sym = run - 1;
            tokens.encode(&mut rc, sym);
            tokens.update(sym);
            for &byte in &data[pos..pos + run] {
                let ctx = usize::from(last_byte >> 6);
                literals[ctx].encode(&mut rc, usize::from(byte));
                literals[ctx].update(usize::from(byte));
                last_byte = byte;
            }
            pos += run;
        }
    }

    out.extend_from_slice(&rc.finish());
    Ok(out)
}
