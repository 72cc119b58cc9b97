//! Engine Module
//!
//! The store: routes reads and writes over the segment sequence.
//!
//! ## Responsibilities
//! - Serialize writes, rotations and merges
//! - Rotate the active segment once it reaches the size budget
//! - Keep at most two segments after every rotation by merging
//! - Own the `Open → Closed` lifecycle

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::storage::SegmentManager;

/// Segments kept after a rotation: one merged history plus the active one
const MAX_SEGMENTS_AFTER_ROTATION: usize = 2;

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put, and the rotation/merge a put may trigger): serialized
///   by `write_lock`, so the segment sequence only ever changes under it
///
/// - **Reads** (get): never take `write_lock`
///   - Share the sequence read lock with other readers
///   - Wait only for an append or the final swap of a merge, never for
///     the copy phase of a merge
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Ordered segment sequence (internal RwLock)
    storage: SegmentManager,

    /// Serializes write operations (put/rotate/merge/close)
    write_lock: Mutex<()>,

    /// Set once by `close`; there is no way back
    closed: AtomicBool,
}

impl Engine {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. Open/create the data directory
    /// 3. Replay every segment file found there
    pub fn open(config: Config) -> Result<Self> {
        if config.segment_size == 0 {
            return Err(KvError::Config(
                "segment_size must be greater than zero".to_string(),
            ));
        }
        if config.data_dir.is_file() {
            return Err(KvError::Config(format!(
                "data_dir {} is a file",
                config.data_dir.display()
            )));
        }

        let storage = SegmentManager::open(&config.data_dir, config.sync_strategy)?;

        Ok(Self {
            config,
            storage,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Get the latest value written for `key`
    ///
    /// Fails with `KeyNotFound` if no segment holds the key.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.storage.get(key)
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Append to the active segment
    /// 3. Rotate if the active segment reached the size budget
    /// 4. Merge if rotation left more than two segments
    ///
    /// A failing merge is reported even though the value itself was stored.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.ensure_open()?;

        let active_size = self.storage.append(key, value)?;
        if active_size < self.config.segment_size {
            return Ok(());
        }

        self.storage.rotate()?;

        if self.storage.segment_count() > MAX_SEGMENTS_AFTER_ROTATION {
            self.storage.merge()?;
        }

        Ok(())
    }

    /// Close the store
    ///
    /// Every segment is closed even if an earlier one fails; the first
    /// failure is returned. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(dir = %self.config.data_dir.display(), "Closing store");
        self.storage.close_all()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the number of live segments
    pub fn segment_count(&self) -> usize {
        self.storage.segment_count()
    }

    /// Segment file paths, oldest → newest
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.storage.segment_paths()
    }

    /// Size of the active segment in bytes
    pub fn active_segment_size(&self) -> u64 {
        self.storage.active_offset()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(KvError::Closed);
        }
        Ok(())
    }
}
