//! Document identifiers and their allocation.

use crate::error::CoreError;
use nanodb_codec::Value;
use std::convert::Infallible;
use std::fmt;

/// Reserved document field holding the document's identifier.
pub const ID_FIELD: &str = "id";

/// Identifier of a document within its collection.
///
/// Identifiers are positive, issued in increasing order, and never reused
/// within a collection, even after the document is deleted and its segment
/// compacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Creates a document ID from a raw value.
    ///
    /// Returns `None` for zero, which is never issued.
    #[must_use]
    pub const fn new(id: u64) -> Option<Self> {
        if id == 0 {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reads an identifier out of a document field value.
    ///
    /// Accepts positive integers and integral floats, since ids that went
    /// through JSON may come back as either.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Self::try_from(*n).ok(),
            Value::Float(f) if f.fract() == 0.0 && *f >= 1.0 && *f < i64::MAX as f64 => {
                Self::try_from(*f as i64).ok()
            }
            _ => None,
        }
    }
}

impl TryFrom<i64> for DocumentId {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or(CoreError::InvalidDocumentId { value })
    }
}

impl From<DocumentId> for Value {
    #[allow(clippy::cast_possible_wrap)]
    fn from(id: DocumentId) -> Self {
        // Issued ids start at 1 and grow by one; i64::MAX is out of reach.
        Value::Integer(id.0 as i64)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out document identifiers for one collection.
///
/// Not synchronized: the owning collection's write lock serializes access.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    /// Highest identifier issued or observed so far (0 when none).
    high_water: u64,
}

impl IdAllocator {
    /// Creates an allocator for an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { high_water: 0 }
    }

    /// Returns the identifier [`next_id_with`](Self::next_id_with) would offer
    /// next, without issuing it.
    #[must_use]
    pub const fn peek(&self) -> DocumentId {
        DocumentId(self.high_water.saturating_add(1))
    }

    /// Issues a fresh identifier.
    pub fn next_id(&mut self) -> DocumentId {
        match self.next_id_with(Ok::<_, Infallible>) {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }

    /// Issues the next identifier once `persist` has stored it.
    ///
    /// This is the path inserts take.
    ///
    /// If `persist` fails the allocator is unchanged and the same identifier
    /// is offered again, so a failed write never burns an id.
    ///
    /// # Errors
    ///
    /// Returns whatever `persist` returns.
    pub fn next_id_with<T, E>(
        &mut self,
        persist: impl FnOnce(DocumentId) -> Result<T, E>,
    ) -> Result<T, E> {
        let id = self.peek();
        let value = persist(id)?;
        self.high_water = id.0;
        Ok(value)
    }

    /// Records an identifier found in storage so it is never issued again.
    pub fn observe(&mut self, id: u64) {
        self.high_water = self.high_water.max(id);
    }

    /// Returns the highest identifier issued or observed so far.
    #[must_use]
    pub const fn high_water(&self) -> u64 {
        self.high_water
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn issue(alloc: &mut IdAllocator) -> u64 {
        alloc.next_id_with(|id| Ok::<_, ()>(id)).unwrap().as_u64()
    }

    #[test]
    fn next_id_issues_unconditionally() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.next_id().as_u64(), 1);
        assert_eq!(issue(&mut alloc), 2);
        assert_eq!(alloc.next_id().as_u64(), 3);
    }

    #[test]
    fn starts_at_one() {
        let mut alloc = IdAllocator::new();
        assert_eq!(issue(&mut alloc), 1);
        assert_eq!(issue(&mut alloc), 2);
        assert_eq!(alloc.high_water(), 2);
    }

    #[test]
    fn failed_persist_keeps_the_id() {
        let mut alloc = IdAllocator::new();
        assert_eq!(issue(&mut alloc), 1);

        let offered = alloc.next_id_with(|id| Err::<(), _>(id.as_u64()));
        assert_eq!(offered, Err(2));
        assert_eq!(alloc.high_water(), 1);
        assert_eq!(issue(&mut alloc), 2);
    }

    #[test]
    fn observe_moves_past_stored_ids() {
        let mut alloc = IdAllocator::new();
        alloc.observe(41);
        alloc.observe(7);
        assert_eq!(alloc.peek().as_u64(), 42);
        assert_eq!(issue(&mut alloc), 42);
    }

    #[test]
    fn peek_does_not_issue() {
        let alloc = IdAllocator::new();
        assert_eq!(alloc.peek(), alloc.peek());
        assert_eq!(alloc.high_water(), 0);
    }

    #[test]
    fn rejects_non_positive_ids() {
        assert!(matches!(
            DocumentId::try_from(0),
            Err(CoreError::InvalidDocumentId { value: 0 })
        ));
        assert!(matches!(
            DocumentId::try_from(-3),
            Err(CoreError::InvalidDocumentId { value: -3 })
        ));
        assert_eq!(DocumentId::try_from(9).unwrap().as_u64(), 9);
        assert!(DocumentId::new(0).is_none());
    }

    #[test]
    fn from_field_value() {
        assert_eq!(
            DocumentId::from_value(&Value::Integer(3)),
            DocumentId::new(3)
        );
        assert_eq!(
            DocumentId::from_value(&Value::Float(3.0)),
            DocumentId::new(3)
        );
        assert_eq!(DocumentId::from_value(&Value::Float(3.5)), None);
        assert_eq!(DocumentId::from_value(&Value::from("3")), None);
        assert_eq!(Value::from(DocumentId::new(5).unwrap()), Value::Integer(5));
    }

    proptest! {
        #[test]
        fn never_reissues(observed in prop::collection::vec(1u64..10_000, 0..20), draws in 1usize..50) {
            let mut alloc = IdAllocator::new();
            for id in &observed {
                alloc.observe(*id);
            }
            let floor = observed.iter().copied().max().unwrap_or(0);
            let mut last = floor;
            for _ in 0..draws {
                let id = issue(&mut alloc);
                prop_assert!(id > last);
                last = id;
            }
        }
    }
}
