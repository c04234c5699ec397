//! Decompression codecs for the rpak container.
//!
//! Three mutually exclusive codecs exist, selected by pak header flag bits:
//! an LZ-style byte/bit codec ([`lz`]), an adapter over an external deflate
//! decoder ([`deflate`]), and an adaptive range codec ([`snowflake`]).
//! The bit-reader and canonical-code primitives they share also back the
//! patch command bitstream decoder.
//!
//! Every codec operates on fully-buffered input, produces output of a size
//! known in advance, and fails with an error on malformed input rather than
//! reading or writing out of bounds.

pub mod bits;
pub mod canon;
pub mod deflate;
pub mod error;
pub mod lz;
pub mod range;
pub mod snowflake;

mod matchfind;

pub use bits::{BitReader, BitWriter};
pub use canon::CanonicalTable;
pub use deflate::{deflate_compress, deflate_decompress};
pub use error::{Error, Result};
pub use lz::{PakDecoder, pak_compress, pak_decompress};
pub use snowflake::{SnowflakeDecoder, snowflake_compress, snowflake_decompress};
