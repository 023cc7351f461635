//! Results of multi-document operations.

use crate::error::{CoreError, CoreResult};

/// Outcome of a batch operation that stops at the first failure.
///
/// Batches are not atomic: items completed before a failure stay applied.
/// `completed` lists them in order, and `failure` says where the batch
/// stopped and why.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Results of the items applied, in order.
    pub completed: Vec<T>,
    /// The item that failed, if any; nothing after it was attempted.
    pub failure: Option<BatchFailure>,
}

/// The item a batch stopped at.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the item in the batch.
    pub index: usize,
    /// Why it failed.
    pub error: CoreError,
}

impl<T> BatchOutcome<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            completed: Vec::with_capacity(capacity),
            failure: None,
        }
    }

    /// Number of items applied.
    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    /// Returns true if nothing was applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Returns true if every item was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Converts to the completed results, or the error that stopped the batch.
    ///
    /// # Errors
    ///
    /// Returns the failing item's error if the batch did not complete.
    pub fn into_result(self) -> CoreResult<Vec<T>> {
        match self.failure {
            None => Ok(self.completed),
            Some(failure) => Err(failure.error),
        }
    }
}
