//! Segment storage.
//!
//! Each collection persists into its own append-only segment file. A put
//! record carries a full document version, a tombstone marks a deletion,
//! and replaying the file from the start rebuilds the collection.

mod compaction;
mod file;
mod record;

pub use compaction::CompactionStats;
pub use file::{Replay, SegmentFile};
pub use record::{RecordError, RecordKind, SegmentRecord};
