//! Storage Module
//!
//! The ordered sequence of segments that makes up one store directory.
//!
//! ## Responsibilities
//! - Discover existing segment files on startup and replay them
//! - Resolve reads newest → oldest so the latest write wins
//! - Start a new active segment on rotation
//! - Fold sealed segments into one merged segment (compaction)
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── segment-merged     oldest: output of the last merge
//!   ├── segment-7          sealed
//!   ├── segment-8          active (always the newest)
//!   └── merge.tmp          only while a merge is being written
//! ```

mod manager;
mod merge;

pub use manager::{
    sync_dir, SegmentManager, SegmentName, MERGED_SEGMENT_NAME, MERGE_TEMP_NAME, SEGMENT_PREFIX,
};
pub use merge::MergeStats;
