//! Database manifest.
//!
//! Binary layout (little endian):
//!
//! ```text
//! | magic "NMFN" (4) | version (2) | next_segment_id (8) | count (4) |
//! | count x [ name_len (2) | name (name_len) | segment_id (8) ] | crc32 (4) |
//! ```

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;

/// Magic bytes for manifest file.
pub const MANIFEST_MAGIC: [u8; 4] = *b"NMFN";

/// Current manifest version.
pub const MANIFEST_VERSION: u16 = 1;

/// Maps collection names to the segment files that hold them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Collection name to segment ID mapping, sorted by name.
    pub collections: BTreeMap<String, u64>,
    /// Next segment ID to assign.
    pub next_segment_id: u64,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    /// Creates a new empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: BTreeMap::new(),
            next_segment_id: 1,
        }
    }

    /// Gets the segment ID for a name, assigning a fresh one if needed.
    ///
    /// Returns the ID and whether it was newly assigned.
    pub fn get_or_create_collection(&mut self, name: &str) -> (u64, bool) {
        if let Some(&id) = self.collections.get(name) {
            return (id, false);
        }

        let id = self.next_segment_id;
        self.next_segment_id += 1;
        self.collections.insert(name.to_string(), id);
        (id, true)
    }

    /// Collection names in sorted order.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Encodes the manifest to bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MANIFEST_MAGIC);
        buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.next_segment_id.to_le_bytes());
        buf.extend_from_slice(&(self.collections.len() as u32).to_le_bytes());

        // Names are validated to at most 255 bytes before they get here.
        for (name, &id) in &self.collections {
            buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(&id.to_le_bytes());
        }

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes a manifest from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the bytes are not a manifest
    /// this version can read.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < 4 || data[0..4] != MANIFEST_MAGIC {
            return Err(CoreError::invalid_format("invalid manifest magic"));
        }
        if data.len() < 8 {
            return Err(CoreError::invalid_format("manifest too short"));
        }

        let (body, crc_bytes) = data.split_at(data.len() - 4);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(body) != stored {
            return Err(CoreError::invalid_format("manifest checksum mismatch"));
        }

        let mut reader = Reader::new(&body[4..]);
        let version = reader.u16()?;
        if version > MANIFEST_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported manifest version: {version}"
            )));
        }

        let next_segment_id = reader.u64()?;
        let count = reader.u32()?;
        let mut collections = BTreeMap::new();
        for _ in 0..count {
            let name_len = usize::from(reader.u16()?);
            let name = std::str::from_utf8(reader.bytes(name_len)?)
                .map_err(|_| CoreError::invalid_format("invalid collection name"))?
                .to_string();
            let id = reader.u64()?;
            if id >= next_segment_id {
                return Err(CoreError::invalid_format(format!(
                    "segment id {id} for '{name}' not below next id {next_segment_id}"
                )));
            }
            collections.insert(name, id);
        }

        if !reader.is_empty() {
            return Err(CoreError::invalid_format("trailing bytes in manifest"));
        }

        Ok(Self {
            collections,
            next_segment_id,
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn bytes(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        if self.data.len() < len {
            return Err(CoreError::invalid_format("manifest too short"));
        }
        let (head, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> CoreResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> CoreResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_manifest() {
        let manifest = Manifest::new();
        assert!(manifest.collections.is_empty());
        assert_eq!(manifest.next_segment_id, 1);
    }

    #[test]
    fn get_or_create_collection() {
        let mut manifest = Manifest::default();

        let (id1, created1) = manifest.get_or_create_collection("users");
        let (id2, _) = manifest.get_or_create_collection("posts");
        let (id1_again, created_again) = manifest.get_or_create_collection("users");

        assert!(created1);
        assert!(!created_again);
        assert_eq!(id1, id1_again);
        assert_ne!(id1, id2);
        assert_eq!(
            manifest.collection_names().collect::<Vec<_>>(),
            vec!["posts", "users"]
        );
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut manifest = Manifest::new();
        manifest.get_or_create_collection("users");
        manifest.get_or_create_collection("benchmark_users");
        manifest.get_or_create_collection("Ünïcode");

        let decoded = Manifest::decode(&manifest.encode()).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn decode_empty_manifest() {
        let decoded = Manifest::decode(&Manifest::default().encode()).unwrap();
        assert!(decoded.collections.is_empty());
    }

    #[test]
    fn invalid_magic_rejected() {
        assert!(matches!(
            Manifest::decode(b"XXXX"),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn damaged_manifest_rejected() {
        let mut manifest = Manifest::new();
        manifest.get_or_create_collection("users");
        let encoded = manifest.encode();

        let mut flipped = encoded.clone();
        flipped[10] ^= 0x01;
        assert!(Manifest::decode(&flipped).is_err());

        assert!(Manifest::decode(&encoded[..encoded.len() - 1]).is_err());
    }

    #[test]
    fn newer_version_rejected() {
        let mut encoded = Manifest::new().encode();
        encoded[4..6].copy_from_slice(&(MANIFEST_VERSION + 1).to_le_bytes());
        let body_end = encoded.len() - 4;
        let crc = crc32fast::hash(&encoded[..body_end]);
        encoded[body_end..].copy_from_slice(&crc.to_le_bytes());

        let err = Manifest::decode(&encoded).unwrap_err();
        assert!(err.to_string().contains("unsupported manifest version"));
    }
}
