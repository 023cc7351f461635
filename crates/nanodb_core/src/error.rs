//! Error types for NanoDB core.

use nanodb_codec::CodecError;
use nanodb_storage::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in NanoDB core operations.
///
/// "Not found" is never an error: lookups return `Option`, scans return
/// empty vectors and deletes return `false` or a zero count.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A persisted record could not be read back.
    #[error("corrupt record in collection '{collection}' at offset {offset}: {reason}")]
    CorruptRecord {
        /// Collection whose segment holds the record.
        collection: String,
        /// Byte offset of the record within the segment.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Persisting a mutation failed; in-memory state was left unchanged.
    #[error("write to collection '{collection}' failed: {source}")]
    WriteFailure {
        /// Collection being written.
        collection: String,
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// The database has been closed.
    #[error("database is closed")]
    EngineClosed,

    /// Another live handle already owns this database directory.
    #[error("database at {} is already open", path.display())]
    AlreadyOpen {
        /// The database directory.
        path: PathBuf,
    },

    /// Identifiers are positive integers.
    #[error("invalid document id {value}: ids are positive integers")]
    InvalidDocumentId {
        /// The rejected value.
        value: i64,
    },

    /// The collection name cannot be used.
    #[error("invalid collection name {name:?}: {reason}")]
    InvalidCollectionName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Invalid database format or version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Document could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Storage backend error outside of a collection write.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a corrupt record error.
    pub fn corrupt_record(collection: &str, offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            collection: collection.to_string(),
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a write failure error.
    pub fn write_failure(collection: &str, source: StorageError) -> Self {
        Self::WriteFailure {
            collection: collection.to_string(),
            source,
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid collection name error.
    pub fn invalid_collection_name(name: &str, reason: &'static str) -> Self {
        Self::InvalidCollectionName {
            name: name.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_collection() {
        let err = CoreError::corrupt_record("users", 42, "checksum mismatch");
        assert_eq!(
            err.to_string(),
            "corrupt record in collection 'users' at offset 42: checksum mismatch"
        );

        let err = CoreError::write_failure(
            "users",
            StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk full")),
        );
        assert!(err.to_string().contains("'users'"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn already_open_shows_path() {
        let err = CoreError::AlreadyOpen {
            path: PathBuf::from("/tmp/db"),
        };
        assert_eq!(err.to_string(), "database at /tmp/db is already open");
    }
}
