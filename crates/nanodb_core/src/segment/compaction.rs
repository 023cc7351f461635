//! Segment compaction.
//!
//! Compaction rewrites a segment so it holds exactly one put per live
//! document, preceded by a high-water mark record.
//!
//! ## Invariants
//!
//! - Compaction does not change logical state
//! - The high-water mark survives, so deleted ids are never reissued
//! - The old segment stays intact until the new one is fully synced

use crate::error::CoreResult;
use crate::id::DocumentId;
use crate::segment::file::{compaction_scratch_path, SegmentFile};
use crate::segment::record::SegmentRecord;
use nanodb_codec::{Document, Encode};
use nanodb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::fs;
use tracing::{debug, warn};

/// Result of a compaction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionStats {
    /// Put and tombstone records before compaction.
    pub records_before: u64,
    /// Put records after compaction (one per live document).
    pub records_after: u64,
    /// Segment size before compaction.
    pub bytes_before: u64,
    /// Segment size after compaction.
    pub bytes_after: u64,
}

impl CompactionStats {
    /// Number of dead records dropped.
    #[must_use]
    pub const fn records_removed(&self) -> u64 {
        self.records_before.saturating_sub(self.records_after)
    }

    /// Bytes freed on disk.
    #[must_use]
    pub const fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

impl SegmentFile {
    /// Rewrites the segment to hold only `live` documents.
    ///
    /// For file-backed segments the new contents go to a scratch file that
    /// is synced and then renamed over the segment.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or any file operation fails. If the
    /// failure happens before the rename, the original segment is kept. If
    /// the segment cannot be reopened afterwards it stays detached and
    /// rejects further writes.
    pub fn compact<'a, I>(
        &mut self,
        live: I,
        high_water: u64,
        records_before: u64,
    ) -> CoreResult<CompactionStats>
    where
        I: IntoIterator<Item = (DocumentId, &'a Document)>,
    {
        let bytes_before = self.size()?;

        let mut data = SegmentRecord::high_water(high_water).encode();
        let mut records_after = 0u64;
        for (id, doc) in live {
            data.extend(SegmentRecord::put(id.as_u64(), doc.encode()?).encode());
            records_after += 1;
        }

        match self.path().map(std::path::Path::to_path_buf) {
            None => {
                self.replace_backend(Box::new(InMemoryBackend::with_data(data)));
            }
            Some(path) => {
                let scratch = compaction_scratch_path(&path);
                if let Err(err) = write_synced(&scratch, &data) {
                    if let Err(cleanup) = fs::remove_file(&scratch) {
                        warn!(path = %scratch.display(), error = %cleanup, "failed to remove compaction file");
                    }
                    return Err(err);
                }

                // Release the old handle before renaming over it.
                self.detach();
                let renamed = fs::rename(&scratch, &path);

                // Whatever is at `path` now is a complete segment.
                self.reattach(&path)?;
                renamed?;
                self.sync_parent_dir()?;
            }
        }

        let stats = CompactionStats {
            records_before,
            records_after,
            bytes_before,
            bytes_after: self.size()?,
        };
        debug!(
            collection = %self.collection(),
            records_removed = stats.records_removed(),
            bytes_reclaimed = stats.bytes_reclaimed(),
            "compacted segment"
        );
        Ok(stats)
    }
}

fn write_synced(path: &std::path::Path, data: &[u8]) -> CoreResult<()> {
    let mut backend = FileBackend::create(path)?;
    backend.append(data)?;
    backend.sync()?;
    Ok(())
}
