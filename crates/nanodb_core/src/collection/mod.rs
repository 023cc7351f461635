//! Collection engine.
//!
//! A collection keeps every live document in memory, keyed by identifier,
//! and persists each mutation to its segment before applying it. Readers
//! share a read lock; mutators serialize on the write lock, so a reader
//! never sees a half-applied change.

mod batch;
mod find;

pub use batch::{BatchFailure, BatchOutcome};
pub use find::Find;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::id::{DocumentId, IdAllocator, ID_FIELD};
use crate::query::{apply_update, matches};
use crate::segment::{CompactionStats, Replay, SegmentFile, SegmentRecord};
use nanodb_codec::{Document, Encode, Value};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Point-in-time counters for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStats {
    /// Live documents.
    pub documents: usize,
    /// Put and tombstone records in the segment.
    pub total_records: u64,
    /// Records superseded by a later update or delete.
    pub dead_records: u64,
    /// Identifier the next insert will receive.
    pub next_id: u64,
}

/// Handle to a named collection of documents.
///
/// Handles are cheap to clone and can be shared across threads; all clones
/// refer to the same collection. Once the owning database is closed every
/// operation fails with [`CoreError::EngineClosed`].
#[derive(Clone)]
pub struct Collection {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: Config,
    state: RwLock<CollectionState>,
}

struct CollectionState {
    documents: HashMap<DocumentId, Document>,
    /// Ids only grow, so id order is insertion order.
    order: BTreeSet<DocumentId>,
    allocator: IdAllocator,
    /// `None` once closed.
    segment: Option<SegmentFile>,
    /// Put and tombstone records in the segment.
    records: u64,
}

impl Collection {
    /// Loads a collection by replaying its segment.
    pub(crate) fn open(name: &str, mut segment: SegmentFile, config: Config) -> CoreResult<Self> {
        let Replay {
            documents,
            high_water,
            records,
        } = segment.replay()?;

        let mut allocator = IdAllocator::new();
        allocator.observe(high_water);
        let order = documents.keys().copied().collect();

        debug!(
            collection = name,
            documents = documents.len(),
            records,
            next_id = allocator.peek().as_u64(),
            "loaded collection"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                config,
                state: RwLock::new(CollectionState {
                    documents,
                    order,
                    allocator,
                    segment: Some(segment),
                    records,
                }),
            }),
        })
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Inserts a document and returns its new identifier.
    ///
    /// Any `id` field in `doc` is replaced by the assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriteFailure`] if the document could not be
    /// persisted; the collection is unchanged in that case.
    pub fn insert(&self, doc: Document) -> CoreResult<DocumentId> {
        self.inner.state.write().insert(doc)
    }

    /// Inserts documents in order.
    ///
    /// Not atomic: the batch stops at the first failure and earlier inserts
    /// stay. The outcome lists the ids assigned so far.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed; per
    /// document failures are reported in the outcome.
    pub fn insert_many<I>(&self, docs: I) -> CoreResult<BatchOutcome<DocumentId>>
    where
        I: IntoIterator<Item = Document>,
    {
        let docs = docs.into_iter();
        let mut outcome = BatchOutcome::with_capacity(docs.size_hint().0);

        let mut state = self.inner.state.write();
        state.ensure_open()?;
        for (index, doc) in docs.enumerate() {
            match state.insert(doc) {
                Ok(id) => outcome.completed.push(id),
                Err(error) => {
                    outcome.failure = Some(BatchFailure { index, error });
                    break;
                }
            }
        }
        Ok(outcome)
    }

    /// Looks up a document by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed.
    pub fn find_by_id(&self, id: DocumentId) -> CoreResult<Option<Document>> {
        let state = self.inner.state.read();
        state.ensure_open()?;
        Ok(state.documents.get(&id).cloned())
    }

    /// Returns matching documents in insertion order.
    ///
    /// The first `skip` matches are dropped and at most `limit` are
    /// returned; a `limit` of 0 means no limit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed.
    pub fn find(&self, filter: &Document, limit: usize, skip: usize) -> CoreResult<Vec<Document>> {
        let state = self.inner.state.read();
        state.ensure_open()?;
        Ok(state
            .scan(filter)
            .skip(skip)
            .take(effective_limit(limit))
            .cloned()
            .collect())
    }

    /// Returns the first matching document in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed.
    pub fn find_one(&self, filter: &Document) -> CoreResult<Option<Document>> {
        Ok(self.find(filter, 1, 0)?.pop())
    }

    /// Starts a fluent find query.
    pub fn query(&self, filter: Document) -> Find<'_> {
        Find::new(self, filter)
    }

    pub(crate) fn count(&self, filter: &Document, limit: usize, skip: usize) -> CoreResult<usize> {
        let state = self.inner.state.read();
        state.ensure_open()?;
        Ok(state
            .scan(filter)
            .skip(skip)
            .take(effective_limit(limit))
            .count())
    }

    /// Shallow-merges `spec` into a document and returns the new version.
    ///
    /// The document keeps its identifier and its place in insertion order;
    /// an `id` field in `spec` is ignored. Returns `None`, changing
    /// nothing, if there is no such document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriteFailure`] if the new version could not be
    /// persisted; the document is unchanged in that case.
    pub fn update_by_id(&self, id: DocumentId, spec: &Document) -> CoreResult<Option<Document>> {
        let mut state = self.inner.state.write();
        let updated = state.update(id, spec)?;
        if updated.is_some() {
            state.maybe_compact(&self.inner.config);
        }
        Ok(updated)
    }

    /// Updates every document matching `filter`, in insertion order.
    ///
    /// Matches are determined once, before the first update. Not atomic:
    /// the batch stops at the first failure and earlier updates stay.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed; per
    /// document failures are reported in the outcome.
    pub fn update_many(
        &self,
        filter: &Document,
        spec: &Document,
    ) -> CoreResult<BatchOutcome<Document>> {
        let mut state = self.inner.state.write();
        state.ensure_open()?;

        let ids = state.matching_ids(filter);
        let mut outcome = BatchOutcome::with_capacity(ids.len());
        for (index, id) in ids.into_iter().enumerate() {
            match state.update(id, spec) {
                Ok(Some(doc)) => outcome.completed.push(doc),
                Ok(None) => {}
                Err(error) => {
                    outcome.failure = Some(BatchFailure { index, error });
                    break;
                }
            }
        }

        if !outcome.is_empty() {
            state.maybe_compact(&self.inner.config);
        }
        Ok(outcome)
    }

    /// Deletes a document. Returns `false` if there was no such document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriteFailure`] if the deletion could not be
    /// persisted; the document is still present in that case.
    pub fn delete_by_id(&self, id: DocumentId) -> CoreResult<bool> {
        let mut state = self.inner.state.write();
        let deleted = state.delete(id)?;
        if deleted {
            state.maybe_compact(&self.inner.config);
        }
        Ok(deleted)
    }

    /// Deletes every document matching `filter`, in insertion order.
    ///
    /// The outcome lists the deleted ids; its [`len`](BatchOutcome::len)
    /// is the delete count. Matches are determined once, before the first
    /// delete. Not atomic: the batch stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed; per
    /// document failures are reported in the outcome.
    pub fn delete_many(&self, filter: &Document) -> CoreResult<BatchOutcome<DocumentId>> {
        let mut state = self.inner.state.write();
        state.ensure_open()?;

        let ids = state.matching_ids(filter);
        let mut outcome = BatchOutcome::with_capacity(ids.len());
        for (index, id) in ids.into_iter().enumerate() {
            match state.delete(id) {
                Ok(true) => outcome.completed.push(id),
                Ok(false) => {}
                Err(error) => {
                    outcome.failure = Some(BatchFailure { index, error });
                    break;
                }
            }
        }

        if !outcome.is_empty() {
            state.maybe_compact(&self.inner.config);
        }
        Ok(outcome)
    }

    /// Returns the number of live documents.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed.
    pub fn len(&self) -> CoreResult<usize> {
        let state = self.inner.state.read();
        state.ensure_open()?;
        Ok(state.documents.len())
    }

    /// Returns true if the collection holds no documents.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrites the segment to drop dead records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed or the rewrite fails.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        self.inner.state.write().compact()
    }

    /// Returns record and document counters.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed.
    pub fn stats(&self) -> CoreResult<CollectionStats> {
        let state = self.inner.state.read();
        state.ensure_open()?;
        Ok(CollectionStats {
            documents: state.documents.len(),
            total_records: state.records,
            dead_records: state.dead_records(),
            next_id: state.allocator.peek().as_u64(),
        })
    }

    /// Waits for in-flight operations, then syncs and releases the segment.
    ///
    /// Idempotent. The handle (and every clone of it) is unusable afterwards.
    pub(crate) fn close(&self) -> CoreResult<()> {
        let mut state = self.inner.state.write();
        let segment = state.segment.take();
        state.documents = HashMap::new();
        state.order = BTreeSet::new();
        match segment {
            Some(segment) => segment.close(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

fn effective_limit(limit: usize) -> usize {
    if limit == 0 {
        usize::MAX
    } else {
        limit
    }
}

impl CollectionState {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.segment.is_some() {
            Ok(())
        } else {
            Err(CoreError::EngineClosed)
        }
    }

    fn segment(&mut self) -> CoreResult<&mut SegmentFile> {
        self.segment.as_mut().ok_or(CoreError::EngineClosed)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn dead_records(&self) -> u64 {
        self.records.saturating_sub(self.documents.len() as u64)
    }

    fn scan<'a>(&'a self, filter: &'a Document) -> impl Iterator<Item = &'a Document> + 'a {
        self.order
            .iter()
            .filter_map(|id| self.documents.get(id))
            .filter(move |doc| matches(doc, filter))
    }

    fn matching_ids(&self, filter: &Document) -> Vec<DocumentId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.documents.get(id).is_some_and(|doc| matches(doc, filter)))
            .collect()
    }

    fn insert(&mut self, mut doc: Document) -> CoreResult<DocumentId> {
        let segment = self.segment.as_mut().ok_or(CoreError::EngineClosed)?;
        let (id, doc) = self.allocator.next_id_with(|id| {
            doc.insert(ID_FIELD, Value::from(id));
            let record = SegmentRecord::put(id.as_u64(), doc.encode()?);
            segment.append(&record)?;
            Ok::<_, CoreError>((id, doc))
        })?;

        self.documents.insert(id, doc);
        self.order.insert(id);
        self.records += 1;
        Ok(id)
    }

    fn update(&mut self, id: DocumentId, spec: &Document) -> CoreResult<Option<Document>> {
        self.ensure_open()?;

        let Some(current) = self.documents.get(&id) else {
            return Ok(None);
        };
        let mut updated = current.clone();
        apply_update(&mut updated, spec);
        let record = SegmentRecord::put(id.as_u64(), updated.encode()?);
        self.segment()?.append(&record)?;

        self.records += 1;
        self.documents.insert(id, updated.clone());
        Ok(Some(updated))
    }

    fn delete(&mut self, id: DocumentId) -> CoreResult<bool> {
        self.ensure_open()?;

        if !self.documents.contains_key(&id) {
            return Ok(false);
        }
        self.segment()?
            .append(&SegmentRecord::tombstone(id.as_u64()))?;

        self.records += 1;
        self.documents.remove(&id);
        self.order.remove(&id);
        Ok(true)
    }

    fn compact(&mut self) -> CoreResult<CompactionStats> {
        let Self {
            documents,
            order,
            allocator,
            segment,
            records,
        } = self;
        let segment = segment.as_mut().ok_or(CoreError::EngineClosed)?;
        let documents = &*documents;

        let live = order
            .iter()
            .filter_map(|id| documents.get(id).map(|doc| (*id, doc)));
        let stats = segment.compact(live, allocator.high_water(), *records)?;
        *records = stats.records_after;
        Ok(stats)
    }

    /// Compacts if the configured thresholds are met.
    ///
    /// The mutation that triggered it has already succeeded, so a failed
    /// compaction is logged rather than returned.
    fn maybe_compact(&mut self, config: &Config) {
        if !config.should_compact(self.records, self.dead_records()) {
            return;
        }
        if let Err(err) = self.compact() {
            let collection = self
                .segment
                .as_ref()
                .map_or("", |segment| segment.collection());
            warn!(collection, error = %err, "automatic compaction failed");
        }
    }
}
