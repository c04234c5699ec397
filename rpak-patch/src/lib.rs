//! Patch command bitstream decoding for rpak patch chains.
//!
//! A patch-capable pak carries one command stream that transforms the
//! pre-patch page image into the final one. This crate decodes that
//! stream: the side tables built once per load, the per-step command
//! decoder, and the operator dispatch table. Replaying the commands against
//! segment collections is the loader's job.

pub mod decode;
pub mod encode;
pub mod error;
pub mod file;

pub use decode::{PatchCommand, PatchOp, PatchStream};
pub use encode::PatchStreamWriter;
pub use error::{PatchError, Result};
pub use file::patch_file_name;
