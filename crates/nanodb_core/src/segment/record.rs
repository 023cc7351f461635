//! Segment record encoding.
//!
//! Every record is self-framing and checksummed:
//!
//! ```text
//! | record_len (4) | kind (1) | document_id (8) | payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little endian. `record_len` covers the whole record,
//! including itself and the checksum; the CRC covers everything before it.

use thiserror::Error;

/// What a segment record stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// A full document version; the payload is its CBOR encoding.
    Put = 0x01,
    /// The document was deleted; empty payload.
    Tombstone = 0x02,
    /// Highest identifier ever issued in the collection; empty payload.
    ///
    /// Written at the head of a compacted segment, where the puts and
    /// tombstones that carried the larger ids may no longer exist.
    HighWater = 0x03,
}

impl RecordKind {
    /// Returns the byte stored on disk.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses a stored kind byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Put),
            0x02 => Some(Self::Tombstone),
            0x03 => Some(Self::HighWater),
            _ => None,
        }
    }
}

/// Why bytes could not be read as a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The data ends before the record does.
    #[error("record truncated: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the record claims to occupy.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// The length field is smaller than an empty record.
    #[error("invalid record length {len}")]
    InvalidLength {
        /// The stored length.
        len: usize,
    },

    /// Stored and computed checksums differ.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum read from the record.
        stored: u32,
        /// Checksum computed over the record bytes.
        computed: u32,
    },

    /// The kind byte is not one we write.
    #[error("unknown record kind {kind:#04x}")]
    UnknownKind {
        /// The stored byte.
        kind: u8,
    },
}

/// One entry of a collection segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Record kind.
    pub kind: RecordKind,
    /// Document the record refers to, or the high-water mark.
    pub document_id: u64,
    /// CBOR document for puts, empty otherwise.
    pub payload: Vec<u8>,
}

impl SegmentRecord {
    /// record_len (4) + kind (1) + document_id (8)
    pub const HEADER_SIZE: usize = 13;
    /// Trailing CRC32.
    pub const CRC_SIZE: usize = 4;
    /// Size of a record with an empty payload.
    pub const MIN_SIZE: usize = Self::HEADER_SIZE + Self::CRC_SIZE;

    /// Creates a put record.
    #[must_use]
    pub fn put(document_id: u64, payload: Vec<u8>) -> Self {
        Self {
            kind: RecordKind::Put,
            document_id,
            payload,
        }
    }

    /// Creates a tombstone record.
    #[must_use]
    pub fn tombstone(document_id: u64) -> Self {
        Self {
            kind: RecordKind::Tombstone,
            document_id,
            payload: Vec::new(),
        }
    }

    /// Creates a high-water mark record.
    #[must_use]
    pub fn high_water(highest_id: u64) -> Self {
        Self {
            kind: RecordKind::HighWater,
            document_id: highest_id,
            payload: Vec::new(),
        }
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::MIN_SIZE + self.payload.len()
    }

    /// Encodes the record to bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self) -> Vec<u8> {
        let record_len = self.encoded_size();
        let mut buf = Vec::with_capacity(record_len);

        buf.extend_from_slice(&(record_len as u32).to_le_bytes());
        buf.push(self.kind.as_byte());
        buf.extend_from_slice(&self.document_id.to_le_bytes());
        buf.extend_from_slice(&self.payload);

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Decodes the record at the start of `data`.
    ///
    /// Returns the record and the number of bytes it occupied; anything
    /// after that is left for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Truncated`] if `data` ends inside the record,
    /// and the other variants if the record itself is damaged.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), RecordError> {
        if data.len() < 4 {
            return Err(RecordError::Truncated {
                needed: 4,
                available: data.len(),
            });
        }

        let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_len < Self::MIN_SIZE {
            return Err(RecordError::InvalidLength { len: record_len });
        }
        if data.len() < record_len {
            return Err(RecordError::Truncated {
                needed: record_len,
                available: data.len(),
            });
        }

        let body_end = record_len - Self::CRC_SIZE;
        let stored = u32::from_le_bytes([
            data[body_end],
            data[body_end + 1],
            data[body_end + 2],
            data[body_end + 3],
        ]);
        let computed = crc32fast::hash(&data[..body_end]);
        if stored != computed {
            return Err(RecordError::ChecksumMismatch { stored, computed });
        }

        let kind = RecordKind::from_byte(data[4]).ok_or(RecordError::UnknownKind { kind: data[4] })?;

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&data[5..Self::HEADER_SIZE]);
        let document_id = u64::from_le_bytes(id_bytes);

        let payload = data[Self::HEADER_SIZE..body_end].to_vec();

        Ok((
            Self {
                kind,
                document_id,
                payload,
            },
            record_len,
        ))
    }
}
