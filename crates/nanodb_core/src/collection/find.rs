//! Fluent find queries.

use crate::collection::Collection;
use crate::error::CoreResult;
use nanodb_codec::Document;

/// A find query under construction.
///
/// ```no_run
/// # use nanodb_core::{Database, CoreResult};
/// # use nanodb_codec::doc;
/// # fn run(db: &Database) -> CoreResult<()> {
/// let users = db.collection("users")?;
/// let page = users.query(doc! { "role" => "Dev" }).skip(20).limit(10).exec()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "a query does nothing until it is executed"]
pub struct Find<'c> {
    collection: &'c Collection,
    filter: Document,
    skip: usize,
    limit: usize,
}

impl<'c> Find<'c> {
    pub(crate) fn new(collection: &'c Collection, filter: Document) -> Self {
        Self {
            collection,
            filter,
            skip: 0,
            limit: 0,
        }
    }

    /// Skips the first `n` matches.
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Returns at most `n` matches; 0 means no limit.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = n;
        self
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`](crate::CoreError::EngineClosed)
    /// if the database has been closed.
    pub fn exec(self) -> CoreResult<Vec<Document>> {
        self.collection.find(&self.filter, self.limit, self.skip)
    }

    /// Runs the query and returns the first result.
    ///
    /// # Errors
    ///
    /// Same as [`exec`](Self::exec).
    pub fn first(self) -> CoreResult<Option<Document>> {
        Ok(self.limit(1).exec()?.pop())
    }

    /// Counts the documents [`exec`](Self::exec) would return.
    ///
    /// # Errors
    ///
    /// Same as [`exec`](Self::exec).
    pub fn count(self) -> CoreResult<usize> {
        self.collection.count(&self.filter, self.limit, self.skip)
    }
}
