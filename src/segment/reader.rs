//! Entry Reader
//!
//! Sequential scan over the records of a segment file.
//!
//! Each step peeks the buffered input to tell a clean end of file from a
//! record boundary, then consumes exactly the number of bytes the length
//! prefix declares.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{KvError, Result};

use super::entry::{decode, Entry, ENTRY_OVERHEAD, LEN_PREFIX_SIZE};

/// A record together with its position in the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEntry {
    /// Offset of the record's first byte
    pub offset: u64,
    /// Bytes the record occupies, length prefix included
    pub len: u64,
    pub entry: Entry,
}

/// Reads records from a segment file front to back
pub struct EntryReader {
    path: PathBuf,
    reader: BufReader<File>,
    /// Offset of the next record boundary
    offset: u64,
    /// Set after an error so iteration stops instead of reading misaligned bytes
    failed: bool,
}

impl EntryReader {
    /// Open a segment file positioned at its first record
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_at(path, 0)
    }

    /// Open a segment file positioned at `offset`, which must be a record boundary
    pub fn open_at(path: &Path, offset: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            offset,
            failed: false,
        })
    }

    /// Offset of the next record boundary
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next record
    ///
    /// Returns:
    /// - `Ok(Some(entry))`: a complete record
    /// - `Ok(None)`: clean end of file, no bytes left
    /// - `Err(Corruption)`: a torn or inconsistent record
    pub fn next_entry(&mut self) -> Result<Option<ReadEntry>> {
        // Peek: zero bytes left is the only clean way to stop
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let mut prefix = [0u8; LEN_PREFIX_SIZE];
        if let Err(e) = self.reader.read_exact(&mut prefix) {
            return Err(match e.kind() {
                ErrorKind::UnexpectedEof => KvError::corruption(
                    &self.path,
                    self.offset,
                    "truncated length prefix at end of file",
                ),
                _ => KvError::Io(e),
            });
        }

        let total = u32::from_le_bytes(prefix) as usize;
        if total < ENTRY_OVERHEAD {
            return Err(KvError::corruption(
                &self.path,
                self.offset,
                format!(
                    "declared length {} is below the {}-byte minimum",
                    total, ENTRY_OVERHEAD
                ),
            ));
        }

        // Grow only as bytes actually arrive; a garbage prefix must not
        // trigger a huge allocation
        let mut record = prefix.to_vec();
        (&mut self.reader)
            .take((total - LEN_PREFIX_SIZE) as u64)
            .read_to_end(&mut record)?;

        if record.len() != total {
            return Err(KvError::corruption(
                &self.path,
                self.offset,
                format!(
                    "truncated record: declared {} bytes, found {}",
                    total,
                    record.len()
                ),
            ));
        }

        let entry = decode(&record)
            .map_err(|e| KvError::corruption(&self.path, self.offset, e.to_string()))?;

        let read = ReadEntry {
            offset: self.offset,
            len: total as u64,
            entry,
        };
        self.offset += total as u64;

        Ok(Some(read))
    }
}

impl Iterator for EntryReader {
    type Item = Result<ReadEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Read the single record starting at `offset`
///
/// The caller promises a record starts there, so every failure (a missing
/// record included) is reported as corruption.
pub fn read_entry_at(path: &Path, offset: u64) -> Result<Entry> {
    let as_corruption = |e: KvError| match e {
        KvError::Io(io) => KvError::corruption(path, offset, format!("read failed: {}", io)),
        other => other,
    };

    let mut reader = EntryReader::open_at(path, offset).map_err(as_corruption)?;
    match reader.next_entry().map_err(as_corruption)? {
        Some(read) => Ok(read.entry),
        None => Err(KvError::corruption(
            path,
            offset,
            "indexed offset is past the end of the file",
        )),
    }
}
