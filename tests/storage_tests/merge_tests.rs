//! Tests for segment merge
//!
//! These tests verify:
//! - Merging is skipped while fewer than two sealed segments exist
//! - A merge collapses the sequence to [merged, active]
//! - The merged segment keeps only the newest value per key
//! - Merged-away files are deleted once the data dir is synced
//! - A failed merge leaves the sequence and the directory untouched

use std::fs;
use std::path::{Path, PathBuf};

use segkv::config::SyncStrategy;
use segkv::segment::{Segment, SegmentRecovery};
use segkv::storage::{sync_dir, SegmentManager, MERGED_SEGMENT_NAME, MERGE_TEMP_NAME};
use segkv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_storage() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn write_segment(dir: &Path, name: &str, entries: &[(&[u8], &[u8])]) {
    let mut segment = Segment::open(&dir.join(name)).unwrap();
    for (key, value) in entries {
        segment.put(key, value).unwrap();
    }
    segment.close().unwrap();
}

/// Three segments: two sealed plus an active one
fn setup_three_segments(path: &Path) -> SegmentManager {
    write_segment(
        path,
        "segment-0",
        &[(b"a", b"a0"), (b"shared", b"old"), (b"a", b"a0-again")],
    );
    write_segment(path, "segment-1", &[(b"b", b"b1"), (b"shared", b"newer")]);
    write_segment(path, "segment-2", &[(b"shared", b"newest")]);
    SegmentManager::open(path, SyncStrategy::Never).unwrap()
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_skipped_with_two_segments() {
    let (_temp, path) = setup_temp_storage();
    let manager = SegmentManager::open(&path, SyncStrategy::Never).unwrap();
    manager.append(b"k", b"v").unwrap();
    manager.rotate().unwrap();

    let stats = manager.merge().unwrap();

    assert_eq!(stats.segments_merged, 0);
    assert_eq!(manager.segment_count(), 2);
    assert!(!path.join(MERGED_SEGMENT_NAME).exists());
}

#[test]
fn test_merge_collapses_to_two_segments() {
    let (_temp, path) = setup_temp_storage();
    let manager = setup_three_segments(&path);

    let stats = manager.merge().unwrap();

    assert_eq!(stats.segments_merged, 2);
    assert_eq!(stats.keys_written, 3);
    assert_eq!(
        manager.segment_paths(),
        vec![path.join(MERGED_SEGMENT_NAME), path.join("segment-2")]
    );
    assert!(!path.join("segment-0").exists());
    assert!(!path.join("segment-1").exists());
    assert!(!path.join(MERGE_TEMP_NAME).exists());
}

#[test]
fn test_merge_preserves_newest_values() {
    let (_temp, path) = setup_temp_storage();
    let manager = setup_three_segments(&path);

    manager.merge().unwrap();

    assert_eq!(manager.get(b"a").unwrap(), b"a0-again".to_vec());
    assert_eq!(manager.get(b"b").unwrap(), b"b1".to_vec());
    assert_eq!(manager.get(b"shared").unwrap(), b"newest".to_vec());
}

#[test]
fn test_merged_segment_holds_newest_sealed_value_once() {
    let (_temp, path) = setup_temp_storage();
    let manager = setup_three_segments(&path);

    manager.merge().unwrap();
    drop(manager);

    let result = SegmentRecovery::verify(&path.join(MERGED_SEGMENT_NAME)).unwrap();
    assert_eq!(result.entries_replayed, 3);
    assert_eq!(result.shadowed_entries(), 0);

    let merged = Segment::open(&path.join(MERGED_SEGMENT_NAME)).unwrap();
    assert_eq!(merged.get(b"shared").unwrap(), b"newer".to_vec());
}

#[test]
fn test_merge_survives_reopen() {
    let (_temp, path) = setup_temp_storage();
    let manager = setup_three_segments(&path);
    manager.merge().unwrap();
    manager.close_all().unwrap();
    drop(manager);

    let reopened = SegmentManager::open(&path, SyncStrategy::Never).unwrap();

    assert_eq!(reopened.segment_count(), 2);
    assert_eq!(reopened.get(b"a").unwrap(), b"a0-again".to_vec());
    assert_eq!(reopened.get(b"shared").unwrap(), b"newest".to_vec());
}

#[test]
fn test_second_merge_folds_previous_merge_output() {
    let (_temp, path) = setup_temp_storage();
    let manager = setup_three_segments(&path);
    manager.merge().unwrap();

    manager.append(b"b", b"b-updated").unwrap();
    manager.append(b"c", b"c3").unwrap();
    manager.rotate().unwrap();
    manager.append(b"d", b"d4").unwrap();

    let stats = manager.merge().unwrap();

    assert_eq!(stats.segments_merged, 2);
    assert_eq!(manager.segment_count(), 2);
    assert!(!path.join("segment-2").exists());
    assert!(path.join("segment-3").exists());
    assert_eq!(manager.get(b"a").unwrap(), b"a0-again".to_vec());
    assert_eq!(manager.get(b"b").unwrap(), b"b-updated".to_vec());
    assert_eq!(manager.get(b"c").unwrap(), b"c3".to_vec());
    assert_eq!(manager.get(b"d").unwrap(), b"d4".to_vec());
}

#[test]
fn test_active_segment_accepts_writes_after_merge() {
    let (_temp, path) = setup_temp_storage();
    let manager = setup_three_segments(&path);
    manager.merge().unwrap();

    manager.append(b"shared", b"after-merge").unwrap();

    assert_eq!(manager.get(b"shared").unwrap(), b"after-merge".to_vec());
}

#[test]
fn test_sync_dir() {
    let (_temp, path) = setup_temp_storage();

    sync_dir(&path).unwrap();

    let missing = sync_dir(&path.join("missing"));
    assert!(matches!(missing, Err(KvError::Io(_))));
}

#[test]
fn test_merge_output_survives_reopen_after_repeated_merges() {
    let (_temp, path) = setup_temp_storage();
    let manager = setup_three_segments(&path);
    manager.merge().unwrap();
    manager.append(b"shared", b"round-two").unwrap();
    manager.rotate().unwrap();
    manager.merge().unwrap();
    drop(manager);

    let reopened = SegmentManager::open(&path, SyncStrategy::Never).unwrap();

    assert_eq!(reopened.segment_count(), 2);
    assert_eq!(reopened.get(b"shared").unwrap(), b"round-two".to_vec());
    assert_eq!(reopened.get(b"a").unwrap(), b"a0-again".to_vec());
    assert!(!path.join("segment-2").exists());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_failed_merge_leaves_state_intact() {
    let (_temp, path) = setup_temp_storage();
    let manager = setup_three_segments(&path);
    let paths_before = manager.segment_paths();

    // The oldest sealed segment is read last; wreck it so the copy fails midway
    fs::write(path.join("segment-0"), b"garbage").unwrap();

    let result = manager.merge();

    assert!(matches!(result, Err(KvError::Corruption { .. })));
    assert_eq!(manager.segment_paths(), paths_before);
    assert!(!path.join(MERGE_TEMP_NAME).exists());
    assert!(!path.join(MERGED_SEGMENT_NAME).exists());
    assert!(path.join("segment-1").exists());
    assert_eq!(manager.get(b"b").unwrap(), b"b1".to_vec());
    assert_eq!(manager.get(b"shared").unwrap(), b"newest".to_vec());
}

#[test]
fn test_merge_fails_when_output_cannot_be_created() {
    let (_temp, path) = setup_temp_storage();
    let manager = setup_three_segments(&path);
    fs::create_dir(path.join(MERGE_TEMP_NAME)).unwrap();

    let result = manager.merge();

    assert!(matches!(result, Err(KvError::Io(_))));
    assert_eq!(manager.segment_count(), 3);
    assert!(path.join("segment-0").exists());
    assert_eq!(manager.get(b"a").unwrap(), b"a0-again".to_vec());
}
