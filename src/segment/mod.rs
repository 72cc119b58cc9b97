//! Segment Module
//!
//! One append-only data file plus the in-memory index that points into it.
//!
//! ## Responsibilities
//! - Frame key/value records with a self-describing length prefix
//! - Append records and remember where the newest copy of each key starts
//! - Rebuild the index by replaying the file on open
//! - Refuse to load a file whose tail was torn by a crash
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ Entry 1                                                   │
//! │ ┌──────────┬──────────┬───────┬──────────┬─────────────┐  │
//! │ │Total (4) │KeyLen (4)│  Key  │ValLen (4)│    Value    │  │
//! │ └──────────┴──────────┴───────┴──────────┴─────────────┘  │
//! ├───────────────────────────────────────────────────────────┤
//! │ Entry 2                                                   │
//! │ ...                                                       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian `u32`. `Total` counts the whole record,
//! its own four bytes included.

mod entry;
mod file;
mod reader;
mod recovery;

use std::collections::HashMap;

pub use entry::{decode, encode, DecodeError, Entry, ENTRY_OVERHEAD, LEN_PREFIX_SIZE};
pub use file::{Segment, SegmentFile};
pub use reader::{read_entry_at, EntryReader, ReadEntry};
pub use recovery::{RecoveryResult, SegmentRecovery};

/// Key → byte offset of the newest record for that key within one file
pub type HashIndex = HashMap<Vec<u8>, u64>;
