//! Persisted index snapshots.
//!
//! A snapshot is framed as `[magic 4][format u16][crc32 u32][len u64][rkyv payload]`.
//! The checksum covers the payload only; the archive is validated with
//! `bytecheck` before it is deserialized.

use crate::index::{MetadataTable, VectorIndex};
use crc32fast::Hasher;
use ragraph_core::fingerprint::fingerprint;
use rkyv::ser::{serializers::AllocSerializer, Serializer};
use rkyv::{AlignedVec, Archive, Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const MAGIC: &[u8; 4] = b"RGIX";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 8;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("not an index snapshot")]
    BadMagic,
    #[error("unsupported snapshot format {0}")]
    UnsupportedFormat(u16),
    #[error("snapshot truncated: expected {expected} payload bytes, found {found}")]
    Truncated { expected: u64, found: u64 },
    #[error("snapshot checksum mismatch: header {expected:08x}, payload {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("snapshot archive failed validation")]
    CorruptArchive,
    #[error("snapshot serialization failed")]
    Serialization,
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// Opaque identifier of one published index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct IndexVersion(String);

impl IndexVersion {
    /// `idx-<unix_millis>-<fingerprint>` over the given content parts.
    pub fn derive<'a, I>(built_at_millis: u128, parts: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        Self(format!("idx-{built_at_millis}-{}", fingerprint(parts)))
    }

    /// Accepts externally supplied versions. They end up in object keys, so only
    /// ASCII alphanumerics and `-` are allowed.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Clone)]
#[archive(check_bytes)]
pub struct IndexSnapshot {
    version: String,
    bucket: String,
    key_prefix: String,
    built_at_unix: u64,
    index: VectorIndex,
    metadata: MetadataTable,
}

impl IndexSnapshot {
    pub fn new(
        version: IndexVersion,
        bucket: impl Into<String>,
        key_prefix: impl Into<String>,
        built_at_unix: u64,
        index: VectorIndex,
        metadata: MetadataTable,
    ) -> Result<Self, SnapshotError> {
        let snapshot = Self {
            version: version.0,
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
            built_at_unix,
            index,
            metadata,
        };
        snapshot.check_consistency()?;
        Ok(snapshot)
    }

    /// Every indexed `doc_id` must resolve to a metadata row and vice versa.
    fn check_consistency(&self) -> Result<(), SnapshotError> {
        if IndexVersion::parse(&self.version).is_none() {
            return Err(SnapshotError::Inconsistent(format!(
                "invalid version {:?}",
                self.version
            )));
        }
        if self.index.len() != self.metadata.len() {
            return Err(SnapshotError::Inconsistent(format!(
                "{} vectors but {} metadata rows",
                self.index.len(),
                self.metadata.len()
            )));
        }
        for entry in self.index.entries() {
            if self.metadata.get(entry.doc_id).is_none() {
                return Err(SnapshotError::Inconsistent(format!(
                    "doc_id {} has no metadata",
                    entry.doc_id
                )));
            }
            if entry.vector.len() != self.index.dimension() {
                return Err(SnapshotError::Inconsistent(format!(
                    "doc_id {} has dimension {}",
                    entry.doc_id,
                    entry.vector.len()
                )));
            }
        }
        Ok(())
    }

    pub fn version(&self) -> IndexVersion {
        IndexVersion(self.version.clone())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn built_at_unix(&self) -> u64 {
        self.built_at_unix
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    pub fn document_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut serializer = AllocSerializer::<4096>::default();
        serializer
            .serialize_value(self)
            .map_err(|_| SnapshotError::Serialization)?;
        let payload = serializer.into_serializer().into_inner();

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return Err(SnapshotError::BadMagic);
        }

        let format = u16::from_le_bytes([bytes[4], bytes[5]]);
        if format != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedFormat(format));
        }

        let mut crc_buf = [0u8; 4];
        crc_buf.copy_from_slice(&bytes[6..10]);
        let expected = u32::from_le_bytes(crc_buf);

        let mut len_buf = [0u8; 8];
        len_buf.copy_from_slice(&bytes[10..18]);
        let len = u64::from_le_bytes(len_buf);

        let payload = &bytes[HEADER_LEN..];
        if payload.len() as u64 != len {
            return Err(SnapshotError::Truncated {
                expected: len,
                found: payload.len() as u64,
            });
        }

        let mut hasher = Hasher::new();
        hasher.update(payload);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(SnapshotError::ChecksumMismatch { expected, actual });
        }

        // Archives must be read from aligned memory.
        let mut aligned = AlignedVec::with_capacity(payload.len());
        aligned.extend_from_slice(payload);

        let archived = rkyv::check_archived_root::<IndexSnapshot>(&aligned[..])
            .map_err(|_| SnapshotError::CorruptArchive)?;
        let snapshot: IndexSnapshot = archived
            .deserialize(&mut rkyv::Infallible)
            .map_err(|_| SnapshotError::CorruptArchive)?;

        snapshot.check_consistency()?;
        Ok(snapshot)
    }
}
