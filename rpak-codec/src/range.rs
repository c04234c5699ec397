//! Carry-less range coder primitives used by the snowflake codec.
//!
//! Encoder and decoder are exact mirrors: a 32-bit range with 24-bit
//! renormalization, a 5-byte seed, frequency-interval operations for
//! adaptive models and direct bits for raw values. The byte-exact behavior
//! here is file-format normative.

use crate::{Error, Result};

/// Renormalization threshold.
pub(crate) const TOP: u32 = 1 << 24;

/// Upper bound on model totals so the interval division never collapses.
pub(crate) const MAX_TOTAL: u32 = 1 << 16;

/// Zero bytes a decoder may synthesize past the stream end; the encoder
/// flush guarantees valid streams never need more.
const MAX_STARVED: u32 = 4;

/// Decoding half of the range coder.
#[derive(Debug)]
pub struct RangeDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    code: u32,
    range: u32,
    /// Interval quantum from the last `freq_value` call.
    div: u32,
    starved: u32,
}

impl<'a> RangeDecoder<'a> {
    /// Seed the decoder from the first 5 stream bytes.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut dec = Self {
            data,
            pos: 0,
            code: 0,
            range: u32::MAX,
            div: 0,
            starved: 0,
        };
        for _ in 0..5 {
            let byte = dec.next_byte()?;
            dec.code = (dec.code << 8) | u32::from(byte);
        }
        Ok(dec)
    }

    fn next_byte(&mut self) -> Result<u8> {
        if self.pos < self.data.len() {
            let byte = self.data[self.pos];
            self.pos += 1;
            Ok(byte)
        } else if self.starved < MAX_STARVED {
            self.starved += 1;
            Ok(0)
        } else {
            Err(Error::OutOfBytes {
                needed: 1,
                available: 0,
            })
        }
    }

    fn normalize(&mut self) -> Result<()> {
        while self.range < TOP {
            let byte = self.next_byte()?;
            self.code = (self.code << 8) | u32::from(byte);
            self.range <<= 8;
        }
        Ok(())
    }

    /// Project the current code into a cumulative-frequency value below
    /// `total`. Must be followed by exactly one `freq_update`.
    pub fn freq_value(&mut self, total: u32) -> u32 {
        debug_assert!(total > 0 && total <= MAX_TOTAL);
        self.div = self.range / total;
        (self.code / self.div).min(total - 1)
    }

    /// Narrow the interval to the symbol at `[cum, cum + freq)`.
    pub fn freq_update(&mut self, cum: u32, freq: u32) -> Result<()> {
        self.code -= cum * self.div;
        self.range = self.div * freq;
        self.normalize()
    }

    /// Decode one raw bit.
    pub fn direct_bit(&mut self) -> Result<u32> {
        self.range >>= 1;
        let bit = if self.code >= self.range {
            self.code -= self.range;
            1
        } else {
            0
        };
        self.normalize()?;
        Ok(bit)
    }

    /// Decode `n` raw bits, most significant first.
    pub fn direct_bits(&mut self, n: u32) -> Result<u64> {
        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.direct_bit()?);
        }
        Ok(value)
    }
}

/// Encoding half of the range coder.
#[derive(Debug)]
pub struct RangeEncoder {
    out: Vec<u8>,
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u64,
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeEncoder {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            low: 0,
            range: u32::MAX,
            cache: 0,
            cache_size: 1,
        }
    }

    fn shift_low(&mut self) {
        if (self.low as u32) < 0xFF00_0000 || (self.low >> 32) != 0 {
            let carry = (self.low >> 32) as u8;
            let mut byte = self.cache;
            loop {
                self.out.push(byte.wrapping_add(carry));
                byte = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << 8;
    }

    /// Encode the symbol occupying `[cum, cum + freq)` of `total`.
    pub fn encode_freq(&mut self, cum: u32, freq: u32, total: u32) {
        debug_assert!(freq > 0 && cum + freq <= total && total <= MAX_TOTAL);
        let div = self.range / total;
        self.low += u64::from(div) * u64::from(cum);
        self.range = div * freq;
        while self.range < TOP {
            self.shift_low();
            self.range <<= 8;
        }
    }

    /// Encode one raw bit.
    pub fn encode_direct_bit(&mut self, bit: u32) {
        self.range >>= 1;
        if bit != 0 {
            self.low += u64::from(self.range);
        }
        while self.range < TOP {
            self.shift_low();
            self.range <<= 8;
        }
    }

    /// Encode `n` raw bits, most significant first.
    pub fn encode_direct_bits(&mut self, value: u64, n: u32) {
        for bit in (0..n).rev() {
            self.encode_direct_bit(((value >> bit) & 1) as u32);
        }
    }

    /// Flush the coder and return the stream.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_bits_roundtrip() {
        let values: &[(u64, u32)] = &[(0b1011, 4), (0, 1), (0xdead, 16), (1, 1), (0x3ff, 10)];

        let mut enc = RangeEncoder::new();
        for &(value, n) in values {
            enc.encode_direct_bits(value, n);
        }
        let stream = enc.finish();

        let mut dec = RangeDecoder::new(&stream).unwrap();
        for &(value, n) in values {
            assert_eq!(dec.direct_bits(n).unwrap(), value, "width {n}");
        }
    }

    #[test]
    fn test_freq_roundtrip_static_model() {
        // Fixed model: 4 symbols with frequencies 1, 2, 5, 8 (total 16).
        let freqs = [1u32, 2, 5, 8];
        let cums = [0u32, 1, 3, 8];
        let total = 16;
        let symbols: Vec<usize> = vec![3, 0, 2, 2, 1, 3, 3, 0, 1, 2, 3, 3, 3, 2, 0, 1];

        let mut enc = RangeEncoder::new();
        for &s in &symbols {
            enc.encode_freq(cums[s], freqs[s], total);
        }
        let stream = enc.finish();

        let mut dec = RangeDecoder::new(&stream).unwrap();
        for &s in &symbols {
            let value = dec.freq_value(total);
            let sym = (0..4).rfind(|&i| cums[i] <= value).unwrap();
            assert_eq!(sym, s);
            dec.freq_update(cums[sym], freqs[sym]).unwrap();
        }
    }

    #[test]
    fn test_mixed_ops_roundtrip() {
        let freqs = [3u32, 13];
        let cums = [0u32, 3];
        let total = 16;

        let mut enc = RangeEncoder::new();
        for i in 0..200u32 {
            let s = usize::from(i % 3 == 0);
            enc.encode_freq(cums[s], freqs[s], total);
            enc.encode_direct_bits(u64::from(i & 0x1f), 5);
        }
        let stream = enc.finish();

        let mut dec = RangeDecoder::new(&stream).unwrap();
        for i in 0..200u32 {
            let s = usize::from(i % 3 == 0);
            let value = dec.freq_value(total);
            let sym = usize::from(value >= cums[1]);
            assert_eq!(sym, s, "symbol {i}");
            dec.freq_update(cums[sym], freqs[sym]).unwrap();
            assert_eq!(dec.direct_bits(5).unwrap(), u64::from(i & 0x1f), "bits {i}");
        }
    }

    #[test]
    fn test_empty_stream_is_decodable_seed() {
        // A flushed empty encoder still yields a seedable stream.
        let stream = RangeEncoder::new().finish();
        assert!(stream.len() >= 5);
        assert!(RangeDecoder::new(&stream).is_ok());
    }

    #[test]
    fn test_truncated_stream_errors() {
        assert!(RangeDecoder::new(&[]).is_err());
    }
}
