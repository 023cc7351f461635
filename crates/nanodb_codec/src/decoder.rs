//! Strict CBOR decoder.

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Maximum element count accepted for arrays and maps.
pub(crate) const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum accepted text length in bytes.
pub(crate) const MAX_TEXT_LENGTH: u64 = 256 * 1024 * 1024;

/// Maximum container nesting depth.
pub const MAX_DEPTH: usize = 128;

/// Decode a single value from CBOR bytes.
///
/// The whole input must be consumed; trailing bytes are an error.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR, use constructs that
/// documents never contain (byte strings, tags, half floats), or violate the
/// deterministic form the encoder produces.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// Decode a document (a CBOR map at the top level).
///
/// # Errors
///
/// As [`from_cbor`], plus [`CodecError::NotAnObject`] if the top-level
/// value is not a map.
pub fn document_from_cbor(bytes: &[u8]) -> CodecResult<Document> {
    match from_cbor(bytes)? {
        Value::Object(doc) => Ok(doc),
        other => Err(CodecError::NotAnObject { found: other.kind() }),
    }
}

/// A CBOR decoder over a borrowed byte slice.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder for the given bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Decode the next value.
    ///
    /// # Errors
    ///
    /// See [`from_cbor`].
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_argument(additional_info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.decode_argument(additional_info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => Err(CodecError::unsupported_type("byte string")),
            3 => self.decode_text(additional_info).map(Value::Text),
            4 => self.nested(|d| d.decode_array(additional_info)),
            5 => self.nested(|d| d.decode_map(additional_info)),
            6 => Err(CodecError::unsupported_type("tagged value")),
            _ => self.decode_simple(additional_info),
        }
    }

    /// Check if all bytes have been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> CodecResult<Value>) -> CodecResult<Value> {
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

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(CodecError::UnexpectedEof)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn decode_argument(&mut self, additional_info: u8) -> CodecResult<u64> {
        let (value, shortest) = match additional_info {
            0..=23 => return Ok(u64::from(additional_info)),
            24 => {
                let v = u64::from(self.read_byte()?);
                (v, v >= 24)
            }
            25 => {
                let v = u64::from(u16::from_be_bytes(self.read_array()?));
                (v, v > u64::from(u8::MAX))
            }
            26 => {
                let v = u64::from(u32::from_be_bytes(self.read_array()?));
                (v, v > u64::from(u16::MAX))
            }
            27 => {
                let v = u64::from_be_bytes(self.read_array()?);
                (v, v > u64::from(u32::MAX))
            }
            31 => return Err(CodecError::invalid_structure("indefinite length")),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };

        if !shortest {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    fn decode_length(&mut self, additional_info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.decode_argument(additional_info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::SizeLimitExceeded {
            claimed,
            max_allowed,
        })
    }

    fn decode_text(&mut self, additional_info: u8) -> CodecResult<String> {
        let len = self.decode_length(additional_info, MAX_TEXT_LENGTH)?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn decode_array(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        // Cap the preallocation; a hostile length must not allocate up front.
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut doc = Document::new();
        let mut prev_key: Option<String> = None;

        for _ in 0..len {
            let key_byte = self.read_byte()?;
            if key_byte >> 5 != 3 {
                return Err(CodecError::unsupported_type("non-text map key"));
            }
            let key = self.decode_text(key_byte & 0x1f)?;

            // Keys must be strictly increasing, which also rules out duplicates.
            if let Some(prev) = &prev_key {
                if compare_keys(prev, &key) != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }

            let value = self.decode()?;
            doc.insert(key.clone(), value);
            prev_key = Some(key);
        }

        Ok(Value::Object(doc))
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Value> {
        match additional_info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            26 => {
                let f = f64::from(f32::from_be_bytes(self.read_array()?));
                Ok(Value::Float(f))
            }
            27 => {
                let f = f64::from_be_bytes(self.read_array()?);
                if f.is_finite() {
                    Ok(Value::Float(f))
                } else {
                    Err(CodecError::NonFiniteFloat)
                }
            }
            25 => Err(CodecError::unsupported_type("half-precision float")),
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            other => Err(CodecError::unsupported_type(format!(
                "simple value {other}"
            ))),
        }
    }
}

/// Order of document keys in encoded form: length-first, then bytewise.
fn compare_keys(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
