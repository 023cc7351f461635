//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// NaN and infinities have no JSON representation and are rejected.
    #[error("non-finite float values cannot be stored")]
    NonFiniteFloat,

    /// Invalid UTF-8 in a text string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Bytes remained after the top-level value.
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },

    /// Invalid CBOR structure.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A CBOR construct that documents never contain.
    #[error("unsupported CBOR type: {type_name}")]
    UnsupportedType {
        /// Name of the unsupported type.
        type_name: String,
    },

    /// Integer does not fit in an `i64`.
    #[error("integer overflow")]
    IntegerOverflow,

    /// Containers nested deeper than the decoder allows.
    #[error("nesting deeper than {max_depth} levels")]
    DepthLimitExceeded {
        /// The configured limit.
        max_depth: usize,
    },

    /// A length prefix larger than the decoder allows.
    #[error("declared length {claimed} exceeds limit {max_allowed}")]
    SizeLimitExceeded {
        /// The length claimed by the input.
        claimed: u64,
        /// The maximum accepted length.
        max_allowed: u64,
    },

    /// A document was expected but the value is not an object.
    #[error("expected a document (object), found {found}")]
    NotAnObject {
        /// Kind of value that was found instead.
        found: &'static str,
    },

    /// JSON text could not be parsed or produced.
    #[error("JSON error: {message}")]
    Json {
        /// Message from the JSON parser.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}
