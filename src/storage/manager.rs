//! Segment Manager
//!
//! Owns the segment sequence of a store directory.
//!
//! ## Responsibilities
//! - Discover and order existing segment files on startup
//! - Search segments newest → oldest for reads
//! - Append to the active segment and rotate to a new one
//! - Track the segment counter independently of file-name slicing

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::config::SyncStrategy;
use crate::error::{KvError, Result};
use crate::segment::Segment;

/// Every file whose name starts with this is a segment
pub const SEGMENT_PREFIX: &str = "segment";

/// Fixed name of the merge output
pub const MERGED_SEGMENT_NAME: &str = "segment-merged";

/// Scratch file a merge writes before it is renamed into place
pub const MERGE_TEMP_NAME: &str = "merge.tmp";

/// A parsed segment file name
///
/// The derived ordering is the age ordering, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SegmentName {
    /// Starts with the prefix but carries no counter we understand
    Unrecognized(String),
    /// `segment-merged`
    Merged,
    /// `segment-<n>` (or the legacy `segment<n>`)
    Numbered(u64),
}

impl SegmentName {
    /// Parse a file name; `None` when it is not a segment at all
    pub fn parse(file_name: &str) -> Option<Self> {
        let rest = file_name.strip_prefix(SEGMENT_PREFIX)?;
        if file_name == MERGED_SEGMENT_NAME {
            return Some(SegmentName::Merged);
        }

        let digits = rest.strip_prefix('-').unwrap_or(rest);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = digits.parse() {
                return Some(SegmentName::Numbered(n));
            }
        }

        Some(SegmentName::Unrecognized(file_name.to_string()))
    }

    pub fn number(&self) -> Option<u64> {
        match self {
            SegmentName::Numbered(n) => Some(*n),
            _ => None,
        }
    }
}

/// Manages the segment sequence
///
/// ## Concurrency:
/// - `segments`: RwLock; readers share it, appends and the final swap of a
///   merge take it exclusively, and a merge holds it upgradable while it
///   copies so readers are not blocked during the copy
/// - `next_segment_id`: Atomic counter (lock-free)
/// - All methods use `&self`
pub struct SegmentManager {
    /// Directory holding the segment files
    data_dir: PathBuf,

    /// Open segments, ordered oldest → newest; the last one is active
    pub(super) segments: RwLock<Vec<Segment>>,

    /// Counter for the next rotated segment
    next_segment_id: AtomicU64,

    /// Applied to every segment this manager writes to
    pub(super) sync_strategy: SyncStrategy,
}

impl SegmentManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Remove a merge scratch file left by a crash
    /// 3. Discover segment files and order them oldest → newest
    /// 4. Replay each one
    /// 5. Make sure the newest segment is a numbered, writable one
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(path)?;

        remove_stale_merge_output(&path.join(MERGE_TEMP_NAME))?;

        let mut discovered: Vec<(SegmentName, PathBuf)> = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = SegmentName::parse(file_name) {
                if let SegmentName::Unrecognized(ref raw) = name {
                    tracing::warn!(file = %raw, "Segment file without a counter, treating it as oldest");
                }
                discovered.push((name, entry.path()));
            }
        }

        discovered.sort();

        let mut segments = Vec::with_capacity(discovered.len() + 1);
        for (_, segment_path) in &discovered {
            let segment = Segment::open(segment_path)?.with_sync_strategy(sync_strategy);
            segments.push(segment);
        }

        // Next ID = max + 1, or 0 if no numbered segment exists
        let mut next_id = match discovered.iter().filter_map(|(name, _)| name.number()).max() {
            Some(max) => max.checked_add(1).ok_or_else(counter_exhausted)?,
            None => 0,
        };

        // The merged file (or a stray name) must never become the write target
        let newest_is_numbered = matches!(discovered.last(), Some((SegmentName::Numbered(_), _)));
        if !newest_is_numbered {
            let active_path = Self::segment_path_with_dir(path, next_id);
            let active = Segment::create(&active_path)?.with_sync_strategy(sync_strategy);
            segments.push(active);
            next_id = next_id.checked_add(1).ok_or_else(counter_exhausted)?;
        }

        tracing::info!(
            dir = %path.display(),
            segments = segments.len(),
            next_segment_id = next_id,
            "Storage opened"
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            segments: RwLock::new(segments),
            next_segment_id: AtomicU64::new(next_id),
            sync_strategy,
        })
    }

    /// Get a value by key (searches all segments newest → oldest)
    ///
    /// The first segment that indexes the key holds its latest value.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let segments = self.segments.read();

        for segment in segments.iter().rev() {
            match segment.get(key) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(KvError::KeyNotFound)
    }

    /// Append to the active segment
    ///
    /// Returns the active segment's size after the write.
    pub fn append(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut segments = self.segments.write();
        let active = segments.last_mut().ok_or(KvError::Closed)?;

        active.put(key, value)?;
        Ok(active.offset())
    }

    /// Start a new, empty active segment
    ///
    /// The previous active segment becomes sealed.
    ///
    /// Fails without touching the sequence once the counter cannot advance.
    pub fn rotate(&self) -> Result<PathBuf> {
        let id = self
            .next_segment_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| counter_exhausted())?;
        let path = self.segment_path(id);

        let segment = Segment::create(&path)?.with_sync_strategy(self.sync_strategy);

        let mut segments = self.segments.write();
        if let Some(sealed) = segments.last_mut() {
            // Sealed segments are never appended to again
            sealed.sync()?;
        }
        segments.push(segment);

        tracing::debug!(path = %path.display(), segments = segments.len(), "Rotated to new segment");
        Ok(path)
    }

    /// Close every segment
    ///
    /// Keeps going after a failure and reports the first one.
    pub fn close_all(&self) -> Result<()> {
        let mut segments = self.segments.write();
        let mut first_error = None;

        for segment in segments.iter_mut() {
            if let Err(e) = segment.close() {
                tracing::warn!(path = %segment.path().display(), "Failed to close segment: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Get the number of live segments
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Segment file paths, oldest → newest
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.segments
            .read()
            .iter()
            .map(|s| s.path().to_path_buf())
            .collect()
    }

    /// Size of the active segment in bytes
    pub fn active_offset(&self) -> u64 {
        self.segments.read().last().map_or(0, Segment::offset)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next segment ID (for testing/debugging)
    pub fn next_segment_id(&self) -> u64 {
        self.next_segment_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn segment_path(&self, id: u64) -> PathBuf {
        Self::segment_path_with_dir(&self.data_dir, id)
    }

    /// "segment-42"
    fn segment_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("{}-{}", SEGMENT_PREFIX, id))
    }
}

/// fsync a directory so renames and unlinks inside it are durable
pub fn sync_dir(path: &Path) -> Result<()> {
    fs::File::open(path)?.sync_all()?;
    Ok(())
}

/// Remove a merge output left behind by a crash
///
/// Anything other than a regular file under that name is refused, since a
/// merge could never create its output there.
fn remove_stale_merge_output(stale: &Path) -> Result<()> {
    match fs::symlink_metadata(stale) {
        Ok(meta) if meta.is_file() => {
            fs::remove_file(stale)?;
            tracing::warn!(path = %stale.display(), "Removed unfinished merge output");
            Ok(())
        }
        Ok(_) => Err(KvError::Config(format!(
            "{} exists and is not a regular file",
            stale.display()
        ))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn counter_exhausted() -> KvError {
    KvError::Config(format!(
        "segment counter exhausted: a {}-{} file already exists",
        SEGMENT_PREFIX,
        u64::MAX
    ))
}
