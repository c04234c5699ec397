//! StarPak side-car files.
//!
//! A starpak holds streamed bulk payload outside the main pak buffer:
//! payload bytes, then a trailing array of (offset, size) pairs, then a
//! final entry count. The loader only discovers the offset table; payload
//! bytes are fetched on demand by absolute offset and size.

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{LoadError, Result};

/// One trailing-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarPakEntry {
    pub offset: u64,
    pub size: u64,
}

enum Backing {
    /// Memory-mapped fast path.
    Mapped(Mmap),
    /// Seek-and-read fallback.
    File(Mutex<File>),
    /// The side-car was not found; fetches fail, the load goes on.
    Missing,
}

impl std::fmt::Debug for Backing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapped(_) => f.write_str("Mapped"),
            Self::File(_) => f.write_str("File"),
            Self::Missing => f.write_str("Missing"),
        }
    }
}

/// An opened (or missing) streaming side-car.
#[derive(Debug)]
pub struct StarPak {
    path: PathBuf,
    entries: Vec<StarPakEntry>,
    /// Payload bytes end where the trailing table begins.
    payload_end: u64,
    backing: Backing,
}

impl StarPak {
    /// Open a side-car and read its trailing offset/size table.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < 8 {
            return Err(LoadError::StarPakUnavailable(format!(
                "{}: {} bytes is too short for an entry count",
                path.display(),
                len
            )));
        }

        // Prefer a map; fall back to seeking reads.
        let backing = match unsafe { Mmap::map(&file) } {
            Ok(map) => Backing::Mapped(map),
            Err(e) => {
                debug!("starpak mmap failed, using file reads: {}", e);
                Backing::File(Mutex::new(file))
            }
        };

        let mut this = Self {
            path: path.to_path_buf(),
            entries: Vec::new(),
            payload_end: 0,
            backing,
        };

        let mut count_bytes = [0u8; 8];
        this.read_at(len - 8, &mut count_bytes)?;
        let count = Cursor::new(count_bytes).read_u64::<LittleEndian>()?;

        let table_size = count
            .checked_mul(16)
            .and_then(|t| t.checked_add(8))
            .filter(|&t| t <= len)
            .ok_or_else(|| {
                LoadError::StarPakUnavailable(format!(
                    "{}: trailing table of {count} entries does not fit",
                    path.display()
                ))
            })?;
        this.payload_end = len - table_size;

        let mut table = vec![0u8; (count * 16) as usize];
        this.read_at(this.payload_end, &mut table)?;
        let mut r = Cursor::new(table);
        for _ in 0..count {
            this.entries.push(StarPakEntry {
                offset: r.read_u64::<LittleEndian>()?,
                size: r.read_u64::<LittleEndian>()?,
            });
        }

        debug!(
            "opened starpak {}: {} entries, {} payload bytes",
            path.display(),
            count,
            this.payload_end
        );
        Ok(this)
    }

    /// Open a side-car, degrading a failure to a warning and a missing
    /// record; streamed data is simply unavailable then.
    pub fn open_or_missing(path: &Path) -> Self {
        match Self::open(path) {
            Ok(starpak) => starpak,
            Err(e) => {
                warn!("starpak {} unavailable: {}", path.display(), e);
                Self {
                    path: path.to_path_buf(),
                    entries: Vec::new(),
                    payload_end: 0,
                    backing: Backing::Missing,
                }
            }
        }
    }

    /// A record for a side-car that was never found.
    pub fn missing(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: Vec::new(),
            payload_end: 0,
            backing: Backing::Missing,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backing, Backing::Missing)
    }

    pub fn entries(&self) -> &[StarPakEntry] {
        &self.entries
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match &self.backing {
            Backing::Mapped(map) => {
                let start = offset as usize;
                let end = start + buf.len();
                if end > map.len() {
                    return Err(LoadError::StarPakOutOfBounds {
                        offset,
                        size: buf.len() as u64,
                    });
                }
                buf.copy_from_slice(&map[start..end]);
                Ok(())
            }
            Backing::File(file) => {
                let mut file = file.lock();
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(buf)?;
                Ok(())
            }
            Backing::Missing => Err(LoadError::StarPakUnavailable(format!(
                "{}",
                self.path.display()
            ))),
        }
    }

    /// Fetch `size` payload bytes at an absolute offset.
    pub fn fetch(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        if !self.is_available() {
            return Err(LoadError::StarPakUnavailable(format!(
                "{}",
                self.path.display()
            )));
        }
        let end = offset.checked_add(size).ok_or(LoadError::StarPakOutOfBounds {
            offset,
            size,
        })?;
        if end > self.payload_end {
            return Err(LoadError::StarPakOutOfBounds { offset, size });
        }
        let mut buf = vec![0u8; size as usize];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn write_starpak(dir: &Path, name: &str, blobs: &[&[u8]]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        let mut entries = Vec::new();
        let mut offset = 0u64;
        for blob in blobs {
            file.write_all(blob).unwrap();
            entries.push((offset, blob.len() as u64));
            offset += blob.len() as u64;
        }
        for (offset, size) in &entries {
            file.write_u64::<LittleEndian>(*offset).unwrap();
            file.write_u64::<LittleEndian>(*size).unwrap();
        }
        file.write_u64::<LittleEndian>(entries.len() as u64).unwrap();
        path
    }

    #[test]
    fn test_open_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_starpak(dir.path(), "a.starpak", &[b"first blob", b"second"]);

        let starpak = StarPak::open(&path).unwrap();
        assert!(starpak.is_available());
        assert_eq!(starpak.entries().len(), 2);
        assert_eq!(
            starpak.entries()[1],
            StarPakEntry {
                offset: 10,
                size: 6
            }
        );
        assert_eq!(starpak.fetch(0, 10).unwrap(), b"first blob");
        assert_eq!(starpak.fetch(10, 6).unwrap(), b"second");
    }

    #[test]
    fn test_fetch_out_of_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_starpak(dir.path(), "b.starpak", &[b"payload"]);
        let starpak = StarPak::open(&path).unwrap();
        // Reaching into the trailing table region is out of bounds.
        assert!(matches!(
            starpak.fetch(0, 8),
            Err(LoadError::StarPakOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_missing_degrades() {
        let starpak = StarPak::open_or_missing(Path::new("/nonexistent/x.starpak"));
        assert!(!starpak.is_available());
        assert!(matches!(
            starpak.fetch(0, 4),
            Err(LoadError::StarPakUnavailable(_))
        ));
    }

    #[test]
    fn test_truncated_table_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.starpak");
        let mut file = File::create(&path).unwrap();
        // Claims 100 entries in a 8-byte file.
        file.write_u64::<LittleEndian>(100).unwrap();
        drop(file);
        assert!(StarPak::open(&path).is_err());
    }
}
