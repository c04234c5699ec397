//! Utility functions for binary operations used in rpak file layouts

use crate::{Error, Result};

/// Align `value` up to the next multiple of `alignment`.
///
/// An alignment of 0 or 1 leaves the value unchanged.
///
/// # Errors
/// * Returns an error if `alignment` is not zero and not a power of two
pub fn align_up(value: u64, alignment: u64) -> Result<u64> {
    if alignment <= 1 {
        return Ok(value);
    }
    if !alignment.is_power_of_two() {
        return Err(Error::InvalidAlignment(alignment));
    }
    Ok((value + alignment - 1) & !(alignment - 1))
}

/// Parse a fixed-size region containing a run of NUL-terminated strings.
///
/// Path tables in the pak leading region are sized regions holding zero or
/// more NUL-terminated paths, padded with NUL bytes up to the declared
/// region size. Empty strings produced by the padding are discarded.
///
/// # Errors
/// * Returns an error if the region extends past `data`, or a path is not
///   valid UTF-8
pub fn read_cstring_run(data: &[u8], offset: usize, size: usize) -> Result<Vec<String>> {
    let end = offset
        .checked_add(size)
        .filter(|&end| end <= data.len())
        .ok_or(Error::TruncatedData {
            expected: offset.saturating_add(size) as u64,
            actual: data.len() as u64,
        })?;

    let mut paths = Vec::new();
    for run in data[offset..end].split(|&b| b == 0) {
        if !run.is_empty() {
            paths.push(std::str::from_utf8(run)?.to_string());
        }
    }
    Ok(paths)
}

/// Read an exact sub-slice of `data`, reporting truncation as an error.
pub fn slice_exact(data: &[u8], offset: usize, size: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(size)
        .filter(|&end| end <= data.len())
        .ok_or(Error::TruncatedData {
            expected: offset.saturating_add(size) as u64,
            actual: data.len() as u64,
        })?;
    Ok(&data[offset..end])
}
