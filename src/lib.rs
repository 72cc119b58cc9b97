//! # segkv
//!
//! A bitcask-style key-value store with:
//! - Append-only segment files with an in-memory hash index per segment
//! - Crash recovery by replaying every segment on open
//! - Rotation of the active segment at a size budget
//! - Compaction of sealed segments into a single merged segment
//! - A thin HTTP shim (`GET`/`POST /db/:key`)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Shim (axum)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │        (Single Writer / Multi Reader, rotation policy)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   SegmentManager                             │
//! │      [segment-merged, ..., active]   reads newest → oldest   │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │ Segment (sealed)│      ...       │ Segment (active)│
//!   │  file + index   │                │  file + index   │
//!   └─────────────────┘                └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod segment;
pub mod storage;
pub mod network;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of segkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
