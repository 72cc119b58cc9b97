//! Segment Recovery
//!
//! Rebuilds a segment's index by replaying its file from offset 0.

use std::path::Path;

use crate::error::Result;

use super::reader::EntryReader;
use super::HashIndex;

/// Handles index reconstruction on open
pub struct SegmentRecovery;

/// Result of a recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records replayed (shadowed copies included)
    pub entries_replayed: u64,

    /// Number of distinct keys in the rebuilt index
    pub live_keys: usize,

    /// Bytes consumed; the append offset for the next write
    pub bytes_replayed: u64,
}

impl RecoveryResult {
    /// Records that are still on disk but no longer reachable
    pub fn shadowed_entries(&self) -> u64 {
        self.entries_replayed - self.live_keys as u64
    }
}

impl SegmentRecovery {
    /// Replay every record in the file
    ///
    /// A later record for a key replaces the offset of an earlier one.
    /// Any torn or inconsistent record fails the whole recovery.
    pub fn recover(path: &Path) -> Result<(HashIndex, RecoveryResult)> {
        let mut index = HashIndex::new();
        let mut result = RecoveryResult::default();

        let mut reader = EntryReader::open(path)?;
        while let Some(read) = reader.next_entry()? {
            index.insert(read.entry.key, read.offset);
            result.entries_replayed += 1;
        }

        result.bytes_replayed = reader.offset();
        result.live_keys = index.len();

        Ok((index, result))
    }

    /// Check a segment file without keeping its index
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::recover(path).map(|(_, result)| result)
    }
}
