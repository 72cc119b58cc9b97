//! Segment Merge
//!
//! Folds every sealed segment into one `segment-merged` file holding only
//! the newest value of each key.
//!
//! ## Protocol
//! 1. Copy newest-first into `merge.tmp` while readers keep running
//! 2. fsync, then under the exclusive lock rename over `segment-merged`
//!    and swap the sequence to `[merged, active]`
//! 3. fsync the directory, then close and delete the inputs oldest-first
//!
//! Deleting oldest-first keeps a crash between steps 2 and 3 readable: any
//! input still on disk is newer than every deleted one, so newest-first
//! resolution still lands on the merged value or an identical copy.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use parking_lot::RwLockUpgradableReadGuard;

use crate::error::Result;
use crate::segment::Segment;

use super::manager::{sync_dir, SegmentManager, MERGED_SEGMENT_NAME, MERGE_TEMP_NAME};

/// What a merge did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Sealed segments folded into the output
    pub segments_merged: usize,
    /// Distinct keys written to the output
    pub keys_written: usize,
    /// Size of the output file
    pub bytes_written: u64,
}

impl SegmentManager {
    /// Merge all sealed segments into one
    ///
    /// Does nothing unless at least two sealed segments exist. On failure the
    /// segment sequence is untouched and the partial output is removed.
    pub fn merge(&self) -> Result<MergeStats> {
        let segments = self.segments.upgradable_read();
        if segments.len() < 3 {
            return Ok(MergeStats::default());
        }

        let sealed_count = segments.len() - 1;
        let temp_path = self.data_dir().join(MERGE_TEMP_NAME);
        let merged_path = self.data_dir().join(MERGED_SEGMENT_NAME);

        let mut merged = write_merged(&segments[..sealed_count], &temp_path)?;
        let stats = MergeStats {
            segments_merged: sealed_count,
            keys_written: merged.len(),
            bytes_written: merged.offset(),
        };

        let mut segments = RwLockUpgradableReadGuard::upgrade(segments);
        if let Err(e) = merged.rename_to(&merged_path) {
            discard(merged);
            return Err(e);
        }

        let mut inputs = std::mem::take(&mut *segments);
        let active = inputs.split_off(sealed_count);
        segments.push(merged.with_sync_strategy(self.sync_strategy));
        segments.extend(active);
        drop(segments);

        // The rename must reach the disk before any input is unlinked
        if let Err(e) = sync_dir(self.data_dir()) {
            tracing::warn!(dir = %self.data_dir().display(), "Failed to sync data dir after merge rename: {}", e);
        }

        // Oldest first
        for input in inputs {
            retire(input, &merged_path);
        }

        tracing::info!(
            segments = stats.segments_merged,
            keys = stats.keys_written,
            bytes = stats.bytes_written,
            "Merged sealed segments"
        );

        Ok(stats)
    }
}

/// Build the merge output at `temp_path`
fn write_merged(sealed: &[Segment], temp_path: &Path) -> Result<Segment> {
    match fs::remove_file(temp_path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut merged = Segment::create(temp_path)?;
    match copy_newest(sealed, &mut merged) {
        Ok(()) => Ok(merged),
        Err(e) => {
            discard(merged);
            Err(e)
        }
    }
}

/// Walk sealed segments newest → oldest; the first value seen for a key wins
fn copy_newest(sealed: &[Segment], merged: &mut Segment) -> Result<()> {
    for segment in sealed.iter().rev() {
        for key in segment.keys() {
            if merged.contains_key(key) {
                continue;
            }
            let value = segment.get(key)?;
            merged.put(key, &value)?;
        }
    }
    merged.sync()
}

/// Drop a merge output that will not be used
fn discard(mut merged: Segment) {
    if let Err(e) = merged.close() {
        tracing::warn!(path = %merged.path().display(), "Failed to close discarded merge output: {}", e);
    }
    if let Err(e) = fs::remove_file(merged.path()) {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %merged.path().display(), "Failed to remove discarded merge output: {}", e);
        }
    }
}

/// Close a merged-away input and delete its file
///
/// An input living at the merged name was replaced by the rename, so only
/// its handle is released.
fn retire(mut input: Segment, merged_path: &Path) {
    if let Err(e) = input.close() {
        tracing::warn!(path = %input.path().display(), "Failed to close merged segment: {}", e);
    }
    if input.path() == merged_path {
        return;
    }
    if let Err(e) = fs::remove_file(input.path()) {
        tracing::warn!(path = %input.path().display(), "Failed to delete merged segment: {}", e);
    }
}
