//! Deterministic CBOR encoder.

use crate::decoder::{MAX_CONTAINER_ELEMENTS, MAX_DEPTH, MAX_TEXT_LENGTH};
use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to CBOR bytes.
///
/// Output is deterministic for a given value:
/// - document fields are written length-first, then bytewise by name
/// - integers use the shortest possible encoding
/// - floats are always written as 8-byte doubles
/// - no indefinite-length items
///
/// Anything the decoder would refuse is refused here too, so every encoded
/// value reads back.
///
/// # Errors
///
/// Returns [`CodecError::NonFiniteFloat`] if the value contains NaN or an
/// infinity, [`CodecError::DepthLimitExceeded`] if containers nest deeper
/// than [`MAX_DEPTH`], and [`CodecError::SizeLimitExceeded`] for oversized
/// strings or containers.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// Encode a document to CBOR bytes (a CBOR map at the top level).
///
/// # Errors
///
/// Same as [`to_cbor`].
pub fn document_to_cbor(doc: &Document) -> CodecResult<Vec<u8>> {
    let mut encoder = Encoder::with_capacity(16 * doc.len() + 1);
    encoder.encode_document(doc)?;
    Ok(encoder.into_bytes())
}

/// A CBOR encoder writing into an in-memory buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    buffer: Vec<u8>,
    depth: usize,
}

impl Encoder {
    /// Create a new encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            depth: 0,
        }
    }

    /// Encode a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NonFiniteFloat`] for NaN or infinite floats and
    /// a limit error for values the decoder would reject.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Float(f) => self.encode_float(*f)?,
            Value::Text(s) => self.encode_text(s)?,
            Value::Array(items) => self.nested(|enc| {
                enc.encode_head(4, container_len(items.len())?);
                for item in items {
                    enc.encode(item)?;
                }
                Ok(())
            })?,
            Value::Object(doc) => self.encode_document(doc)?,
        }
        Ok(())
    }

    /// Encode a document as a CBOR map with text keys.
    ///
    /// # Errors
    ///
    /// Same as [`Encoder::encode`].
    pub fn encode_document(&mut self, doc: &Document) -> CodecResult<()> {
        // Documents iterate bytewise; CBOR key order is length-first.
        let mut fields: Vec<(&String, &Value)> = doc.iter().collect();
        fields.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(b.0)));

        self.nested(|enc| {
            enc.encode_head(5, container_len(fields.len())?);
            for (name, value) in fields {
                enc.encode_text(name)?;
                enc.encode(value)?;
            }
            Ok(())
        })
    }

    /// Consume this encoder and return the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(0, n as u64);
        } else {
            // -1 - n is in [0, i64::MAX] for every negative n.
            self.encode_head(1, (-1 - n) as u64);
        }
    }

    fn encode_float(&mut self, f: f64) -> CodecResult<()> {
        if !f.is_finite() {
            return Err(CodecError::NonFiniteFloat);
        }
        self.buffer.push(0xfb);
        self.buffer.extend_from_slice(&f.to_be_bytes());
        Ok(())
    }

    fn encode_text(&mut self, text: &str) -> CodecResult<()> {
        let len = text.len() as u64;
        if len > MAX_TEXT_LENGTH {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_TEXT_LENGTH,
            });
        }
        self.encode_head(3, len);
        self.buffer.extend_from_slice(text.as_bytes());
        Ok(())
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> CodecResult<()>) -> CodecResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::DepthLimitExceeded {
                max_depth: MAX_DEPTH,
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if u32::try_from(value).is_ok() {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }
}

fn container_len(len: usize) -> CodecResult<u64> {
    let len = len as u64;
    if len > MAX_CONTAINER_ELEMENTS {
        return Err(CodecError::SizeLimitExceeded {
            claimed: len,
            max_allowed: MAX_CONTAINER_ELEMENTS,
        });
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn encode_simple_values() {
        assert_eq!(to_cbor(&Value::Null).unwrap(), vec![0xf6]);
        assert_eq!(to_cbor(&Value::Bool(false)).unwrap(), vec![0xf4]);
        assert_eq!(to_cbor(&Value::Bool(true)).unwrap(), vec![0xf5]);
    }

    #[test]
    fn encode_integers_shortest_form() {
        assert_eq!(to_cbor(&Value::Integer(0)).unwrap(), vec![0x00]);
        assert_eq!(to_cbor(&Value::Integer(23)).unwrap(), vec![0x17]);
        assert_eq!(to_cbor(&Value::Integer(24)).unwrap(), vec![0x18, 24]);
        assert_eq!(
            to_cbor(&Value::Integer(256)).unwrap(),
            vec![0x19, 0x01, 0x00]
        );
        assert_eq!(
            to_cbor(&Value::Integer(65536)).unwrap(),
            vec![0x1a, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(to_cbor(&Value::Integer(-1)).unwrap(), vec![0x20]);
        assert_eq!(to_cbor(&Value::Integer(-100)).unwrap(), vec![0x38, 99]);
        assert_eq!(
            to_cbor(&Value::Integer(i64::MIN)).unwrap(),
            vec![0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn encode_float_as_double() {
        assert_eq!(
            to_cbor(&Value::Float(1.5)).unwrap(),
            vec![0xfb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            to_cbor(&Value::Float(f64::NAN)),
            Err(CodecError::NonFiniteFloat)
        );
        assert_eq!(
            to_cbor(&Value::Array(vec![Value::Float(f64::INFINITY)])),
            Err(CodecError::NonFiniteFloat)
        );
    }

    #[test]
    fn encode_text_and_array() {
        assert_eq!(to_cbor(&Value::from("")).unwrap(), vec![0x60]);
        assert_eq!(
            to_cbor(&Value::from("hello")).unwrap(),
            vec![0x65, b'h', b'e', b'l', b'l', b'o']
        );
        assert_eq!(
            to_cbor(&Value::from(vec![1, 2])).unwrap(),
            vec![0x82, 0x01, 0x02]
        );
    }

    #[test]
    fn document_fields_length_first() {
        // BTreeMap order would put "bb" before "c"; CBOR order is length-first.
        let bytes = document_to_cbor(&doc! { "bb" => 2, "c" => 1 }).unwrap();
        assert_eq!(bytes, vec![0xa2, 0x61, b'c', 0x01, 0x62, b'b', b'b', 0x02]);
    }

    #[test]
    fn deterministic_encoding() {
        let a = doc! { "z" => 1, "a" => 2, "nested" => doc! { "y" => true, "x" => () } };
        let b = doc! { "nested" => doc! { "x" => (), "y" => true }, "a" => 2, "z" => 1 };
        assert_eq!(document_to_cbor(&a).unwrap(), document_to_cbor(&b).unwrap());
        assert_eq!(
            document_to_cbor(&a).unwrap(),
            to_cbor(&Value::Object(a.clone())).unwrap()
        );
    }

    fn nested_arrays(depth: usize) -> Value {
        (0..depth).fold(Value::Null, |inner, _| Value::Array(vec![inner]))
    }

    #[test]
    fn depth_limit_matches_decoder() {
        let deepest = nested_arrays(MAX_DEPTH);
        let bytes = to_cbor(&deepest).unwrap();
        assert_eq!(crate::from_cbor(&bytes).unwrap(), deepest);

        assert_eq!(
            to_cbor(&nested_arrays(MAX_DEPTH + 1)),
            Err(CodecError::DepthLimitExceeded {
                max_depth: MAX_DEPTH
            })
        );
    }

    #[test]
    fn document_counts_as_a_level() {
        let mut doc = doc! { "leaf" => 1 };
        for _ in 1..MAX_DEPTH {
            doc = doc! { "child" => doc };
        }
        let bytes = document_to_cbor(&doc).unwrap();
        assert_eq!(crate::document_from_cbor(&bytes).unwrap(), doc);

        let too_deep = doc! { "child" => doc };
        assert_eq!(
            document_to_cbor(&too_deep),
            Err(CodecError::DepthLimitExceeded {
                max_depth: MAX_DEPTH
            })
        );
    }

    #[test]
    fn depth_resets_after_failure() {
        let mut encoder = Encoder::new();
        assert!(encoder.encode(&nested_arrays(MAX_DEPTH + 1)).is_err());
        assert!(encoder.encode(&nested_arrays(MAX_DEPTH)).is_ok());
    }
}
