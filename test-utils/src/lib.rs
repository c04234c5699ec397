//! Test utilities for rpak-rs
//!
//! Provides fixture builders for synthetic pak containers, patch chains
//! and starpak side-cars used by the integration tests.

pub mod pak;
pub mod patch;
pub mod starpak;

pub use pak::{PakBuilder, asset_record};
pub use patch::PatchChainBuilder;
pub use starpak::starpak_bytes;
