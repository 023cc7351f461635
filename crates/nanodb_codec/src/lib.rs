//! # NanoDB Codec
//!
//! The document model and its persisted byte form.
//!
//! - [`Value`] / [`Document`]: the schemaless, dynamically typed values a
//!   collection stores
//! - CBOR encoding ([`to_cbor`], [`from_cbor`]) used for records on disk
//! - JSON helpers for the string boundary callers talk across
//!
//! ## Encoding Rules
//!
//! - Document fields are written length-first, then bytewise by name
//! - Integers use the shortest encoding
//! - Floats are 8-byte doubles and must be finite
//! - Strings must be UTF-8
//! - No indefinite-length items, byte strings or tags
//!
//! The decoder enforces the same rules, so a flipped bit in a stored record
//! is far more likely to be reported than silently accepted.
//!
//! ## Usage
//!
//! ```
//! use nanodb_codec::{doc, Decode, Document, Encode};
//!
//! let user = doc! { "name" => "Kichu", "role" => "Dev" };
//! let bytes = user.encode().unwrap();
//! assert_eq!(Document::decode(&bytes).unwrap(), user);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod document;
mod encoder;
mod error;
mod json;
mod value;

pub use decoder::{document_from_cbor, from_cbor, Decoder, MAX_DEPTH};
pub use document::{documents_from_json_str, documents_to_json_string, Document};
pub use encoder::{document_to_cbor, to_cbor, Encoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that can be written in the persisted byte form.
pub trait Encode {
    /// Encode this value to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the value holds something that cannot be stored.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be read back from the persisted byte form.
pub trait Decode: Sized {
    /// Decode a value from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

impl Encode for Document {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        document_to_cbor(self)
    }
}

impl Decode for Document {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        document_from_cbor(bytes)
    }
}
