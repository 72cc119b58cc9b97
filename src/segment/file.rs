//! Segment
//!
//! An append-only data file and the index of where each key's newest
//! record starts in it.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncStrategy;
use crate::error::{KvError, Result};

use super::entry::encode;
use super::reader::read_entry_at;
use super::recovery::SegmentRecovery;
use super::HashIndex;

/// Append handle of a segment
///
/// Implemented for [`File`]; wrappers let tests inject short or failed writes.
pub trait SegmentFile: Write + fmt::Debug + Send + Sync {
    fn sync_all(&self) -> io::Result<()>;

    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl SegmentFile for File {
    fn sync_all(&self) -> io::Result<()> {
        File::sync_all(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// One segment file plus its index
///
/// The index and the file share a lifetime: an index entry is only ever
/// created for bytes this handle has fully appended or replayed.
#[derive(Debug)]
pub struct Segment {
    /// Current location of the file
    path: PathBuf,

    /// Append handle; `None` once closed
    file: Option<Box<dyn SegmentFile>>,

    /// Total bytes appended so far, i.e. where the next record lands
    out_offset: u64,

    /// key → offset of its newest record in this file
    index: HashIndex,

    sync_strategy: SyncStrategy,

    /// Writes since the last fsync
    unsynced_writes: usize,
}

impl Segment {
    /// Open (creating if absent) a segment file and replay it
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let (index, result) = SegmentRecovery::recover(path)?;
        tracing::debug!(
            path = %path.display(),
            entries = result.entries_replayed,
            keys = result.live_keys,
            bytes = result.bytes_replayed,
            "Segment recovered"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(Box::new(file)),
            out_offset: result.bytes_replayed,
            index,
            sync_strategy: SyncStrategy::Never,
            unsynced_writes: 0,
        })
    }

    /// Create a brand new, empty segment file; fails if the file exists
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(Box::new(file)),
            out_offset: 0,
            index: HashIndex::new(),
            sync_strategy: SyncStrategy::Never,
            unsynced_writes: 0,
        })
    }

    /// Set how often appends are fsynced
    pub fn with_sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.sync_strategy = strategy;
        self
    }

    /// Append a record
    ///
    /// The index only learns about the record after every byte of it was
    /// accepted. A failed or short write is rolled back by truncating the
    /// file to the previous offset.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let record = encode(key, value)?;
        let file = self.file.as_mut().ok_or(KvError::Closed)?;

        let written = loop {
            match file.write(&record) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match written {
            Ok(n) if n == record.len() => {}
            Ok(n) => {
                self.rollback_tail();
                return Err(KvError::PartialWrite {
                    expected: record.len(),
                    written: n,
                });
            }
            Err(e) => {
                self.rollback_tail();
                return Err(e.into());
            }
        }

        if let Err(e) = self.maybe_sync() {
            self.rollback_tail();
            return Err(e);
        }

        self.index.insert(key.to_vec(), self.out_offset);
        self.out_offset += record.len() as u64;

        Ok(())
    }

    /// Look up the newest value for `key` in this segment
    ///
    /// Reads through a fresh handle so the append handle's position is
    /// never disturbed.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let offset = *self.index.get(key).ok_or(KvError::KeyNotFound)?;
        if self.file.is_none() {
            return Err(KvError::Closed);
        }

        let entry = read_entry_at(&self.path, offset)?;
        if entry.key != key {
            return Err(KvError::corruption(
                &self.path,
                offset,
                "record at indexed offset belongs to another key",
            ));
        }

        Ok(entry.value)
    }

    /// fsync the file
    pub fn sync(&mut self) -> Result<()> {
        let file = self.file.as_ref().ok_or(KvError::Closed)?;
        file.sync_all()?;
        self.unsynced_writes = 0;
        Ok(())
    }

    /// Flush and release the file handle; closing twice is a no-op
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Swap the append handle for a wrapper around it
    ///
    /// Does nothing on a closed segment.
    pub fn wrap_file<F>(&mut self, wrap: F)
    where
        F: FnOnce(Box<dyn SegmentFile>) -> Box<dyn SegmentFile>,
    {
        self.file = self.file.take().map(wrap);
    }

    /// Move the file, keeping the open handle and the index
    pub fn rename_to(&mut self, path: &Path) -> Result<()> {
        fs::rename(&self.path, path)?;
        self.path = path.to_path_buf();
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total bytes appended so far
    pub fn offset(&self) -> u64 {
        self.out_offset
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Keys present in this segment, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.index.keys().map(|k| k.as_slice())
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn maybe_sync(&mut self) -> Result<()> {
        self.unsynced_writes += 1;
        let due = match self.sync_strategy {
            SyncStrategy::Never => false,
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => self.unsynced_writes >= count,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    /// Cut off whatever a failed append left past `out_offset`
    fn rollback_tail(&mut self) {
        if let Some(file) = self.file.as_ref() {
            if let Err(e) = file.set_len(self.out_offset) {
                tracing::warn!(
                    path = %self.path.display(),
                    offset = self.out_offset,
                    "Failed to roll back partial append: {}",
                    e
                );
            }
        }
    }
}
