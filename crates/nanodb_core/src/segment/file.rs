//! One collection's append-only segment.

use crate::dir::sync_directory;
use crate::error::{CoreError, CoreResult};
use crate::id::{DocumentId, ID_FIELD};
use crate::segment::record::{RecordError, RecordKind, SegmentRecord};
use nanodb_codec::{Decode, Document, Value};
use nanodb_storage::{FileBackend, StorageBackend, StorageError, StorageResult};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Collection state rebuilt from a segment.
#[derive(Debug, Default)]
pub struct Replay {
    /// Live documents by identifier.
    pub documents: HashMap<DocumentId, Document>,
    /// Highest identifier seen in any record.
    pub high_water: u64,
    /// Put and tombstone records in the segment, live or not.
    pub records: u64,
}

/// The open segment file of one collection.
///
/// Records are only ever appended. Deleting and updating documents leaves
/// dead records behind until the segment is compacted.
pub struct SegmentFile {
    collection: String,
    /// `None` for segments that live only in memory.
    path: Option<PathBuf>,
    backend: Box<dyn StorageBackend>,
    sync_on_write: bool,
}

impl SegmentFile {
    /// Opens (or creates) the segment file at `path`.
    ///
    /// A scratch file left behind by an interrupted compaction is removed;
    /// the segment itself is untouched until the rename, so it is still
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(collection: &str, path: &Path, sync_on_write: bool) -> CoreResult<Self> {
        let scratch = compaction_scratch_path(path);
        if scratch.exists() {
            debug!(collection, path = %scratch.display(), "removing stale compaction file");
            fs::remove_file(&scratch)?;
        }

        let backend = FileBackend::open_with_create_dirs(path)?;
        Ok(Self {
            collection: collection.to_string(),
            path: Some(path.to_path_buf()),
            backend: Box::new(backend),
            sync_on_write,
        })
    }

    /// Wraps an arbitrary backend.
    ///
    /// Compacting such a segment rewrites it into an in-memory backend.
    #[must_use]
    pub fn with_backend(
        collection: &str,
        backend: Box<dyn StorageBackend>,
        sync_on_write: bool,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            path: None,
            backend,
            sync_on_write,
        }
    }

    /// Returns the name of the collection this segment belongs to.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the file path, if the segment is file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the current size of the segment in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Appends a record and returns its offset.
    ///
    /// Either the whole record is in the segment afterwards or none of it
    /// is: a failed append is cut back off before returning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriteFailure`] if the record could not be
    /// written (or synced, with `sync_on_write`).
    pub fn append(&mut self, record: &SegmentRecord) -> CoreResult<u64> {
        let start = self
            .backend
            .size()
            .map_err(|e| CoreError::write_failure(&self.collection, e))?;

        let written = match self.backend.append(&record.encode()) {
            Ok(offset) if self.sync_on_write => self.backend.sync().map(|()| offset),
            other => other,
        };

        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                if let Err(rollback) = self.backend.truncate(start) {
                    warn!(
                        collection = %self.collection,
                        offset = start,
                        error = %rollback,
                        "failed to roll back partial append"
                    );
                }
                Err(CoreError::write_failure(&self.collection, err))
            }
        }
    }

    /// Rebuilds collection state by scanning every record.
    ///
    /// The last record for an identifier wins and tombstones remove. A
    /// record cut short at the very end of the file is the remains of an
    /// interrupted append; it is truncated away and the scan succeeds.
    /// A record only counts as cut short if no intact record follows it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] for a record that fails its
    /// checksum, whose document cannot be decoded, or whose length reaches
    /// past the end of the file while intact records follow it.
    pub fn replay(&mut self) -> CoreResult<Replay> {
        let data = self.backend.read_all()?;
        let mut replay = Replay::default();
        let mut pos = 0usize;

        while pos < data.len() {
            let offset = pos as u64;
            let (record, used) = match SegmentRecord::decode(&data[pos..]) {
                Ok(decoded) => decoded,
                Err(RecordError::Truncated { .. }) if valid_record_follows(&data[pos..]) => {
                    return Err(CoreError::corrupt_record(
                        &self.collection,
                        offset,
                        "record length runs past intact records",
                    ));
                }
                Err(RecordError::Truncated { needed, available }) => {
                    warn!(
                        collection = %self.collection,
                        offset,
                        needed,
                        available,
                        "truncating torn record at end of segment"
                    );
                    self.backend.truncate(offset)?;
                    break;
                }
                Err(err) => {
                    return Err(CoreError::corrupt_record(
                        &self.collection,
                        offset,
                        err.to_string(),
                    ))
                }
            };
            pos += used;

            replay.high_water = replay.high_water.max(record.document_id);
            if record.kind == RecordKind::HighWater {
                continue;
            }

            let id = DocumentId::new(record.document_id).ok_or_else(|| {
                CoreError::corrupt_record(&self.collection, offset, "record for document id 0")
            })?;
            replay.records += 1;

            if record.kind == RecordKind::Tombstone {
                replay.documents.remove(&id);
                continue;
            }

            let mut doc = Document::decode(&record.payload).map_err(|e| {
                CoreError::corrupt_record(
                    &self.collection,
                    offset,
                    format!("undecodable document: {e}"),
                )
            })?;
            doc.insert(ID_FIELD, Value::from(id));
            replay.documents.insert(id, doc);
        }

        Ok(replay)
    }

    /// Pushes appended records to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> CoreResult<()> {
        Ok(self.backend.flush()?)
    }

    /// Forces the segment to durable media.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        Ok(self.backend.sync()?)
    }

    /// Flushes, syncs and releases the segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or sync fails; the handle is
    /// released either way.
    pub fn close(mut self) -> CoreResult<()> {
        self.flush()?;
        self.sync()
    }

    /// Replaces the backend, returning the old one.
    pub(crate) fn replace_backend(
        &mut self,
        backend: Box<dyn StorageBackend>,
    ) -> Box<dyn StorageBackend> {
        std::mem::replace(&mut self.backend, backend)
    }

    /// Releases the file handle. Until [`reattach`](Self::reattach)
    /// succeeds every operation on the segment fails.
    pub(crate) fn detach(&mut self) {
        drop(self.replace_backend(Box::new(DetachedBackend)));
    }

    /// Opens `path` as the segment's backend.
    ///
    /// On failure the segment stays detached, so later writes report
    /// [`CoreError::WriteFailure`] instead of landing nowhere.
    pub(crate) fn reattach(&mut self, path: &Path) -> CoreResult<()> {
        match FileBackend::open(path) {
            Ok(backend) => {
                self.backend = Box::new(backend);
                Ok(())
            }
            Err(err) => {
                warn!(
                    collection = %self.collection,
                    path = %path.display(),
                    error = %err,
                    "segment left detached"
                );
                Err(err.into())
            }
        }
    }

    pub(crate) fn sync_parent_dir(&self) -> CoreResult<()> {
        match self.path.as_deref().and_then(Path::parent) {
            Some(parent) => sync_directory(parent),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SegmentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentFile")
            .field("collection", &self.collection)
            .field("path", &self.path)
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

/// Whether a checksummed record starts anywhere after the first byte of
/// `tail`.
fn valid_record_follows(tail: &[u8]) -> bool {
    (1..tail.len()).any(|start| SegmentRecord::decode(&tail[start..]).is_ok())
}

/// Stands in for a segment's file while it is being replaced.
struct DetachedBackend;

impl DetachedBackend {
    fn unavailable<T>() -> StorageResult<T> {
        Err(StorageError::Io(io::Error::other("segment file is detached")))
    }
}

impl StorageBackend for DetachedBackend {
    fn read_at(&self, _offset: u64, _len: usize) -> StorageResult<Vec<u8>> {
        Self::unavailable()
    }

    fn append(&mut self, _data: &[u8]) -> StorageResult<u64> {
        Self::unavailable()
    }

    fn flush(&mut self) -> StorageResult<()> {
        Self::unavailable()
    }

    fn size(&self) -> StorageResult<u64> {
        Self::unavailable()
    }

    fn sync(&mut self) -> StorageResult<()> {
        Self::unavailable()
    }

    fn truncate(&mut self, _new_size: u64) -> StorageResult<()> {
        Self::unavailable()
    }
}

/// Scratch file a segment is rewritten into during compaction.
pub(crate) fn compaction_scratch_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".compact");
    PathBuf::from(name)
}
