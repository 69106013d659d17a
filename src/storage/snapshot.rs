//! Snapshot file format for the document store
//!
//! A snapshot holds every collection at a point in time. Together with the WAL
//! entries written after it, it reconstructs the full store.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (64 bytes)                       │
//! │   magic: [u8; 4] = "CRPS"               │
//! │   version: u16                          │
//! │   collection_count: u32                 │
//! │   document_count: u64                   │
//! │   compression: u8                       │
//! │   payload_size: u64                     │
//! │   payload_checksum: u32                 │
//! │   reserved: [u8; 29]                    │
//! │   header_checksum: u32                  │
//! ├─────────────────────────────────────────┤
//! │ PAYLOAD (payload_size bytes)            │
//! │   bincode(Vec<(collection, Vec<Doc>)>)  │
//! │   optionally LZ4 compressed             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Snapshots are written to a temporary file and renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::Document;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes for snapshot file identification
const SNAPSHOT_MAGIC: [u8; 4] = *b"CRPS";

/// Current snapshot format version
const SNAPSHOT_VERSION: u16 = 1;

/// Header size in bytes
const HEADER_SIZE: usize = 64;

/// In-memory layout of the store: collection → (id → document)
pub type Collections = HashMap<String, BTreeMap<String, Document>>;

/// Compression type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    #[default]
    Lz4 = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            _ => Err(StorageError::InvalidSnapshot(format!(
                "Unknown compression type: {}",
                value
            ))),
        }
    }
}

impl std::str::FromStr for CompressionType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(CompressionType::None),
            "lz4" => Ok(CompressionType::Lz4),
            other => Err(StorageError::InvalidSnapshot(format!(
                "Unknown compression type: {}",
                other
            ))),
        }
    }
}

/// Snapshot file header
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHeader {
    pub version: u16,
    pub collection_count: u32,
    pub document_count: u64,
    pub compression: CompressionType,
    pub payload_size: u64,
    pub payload_checksum: u32,
}

impl SnapshotHeader {
    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&SNAPSHOT_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..10].copy_from_slice(&self.collection_count.to_le_bytes());
        buf[10..18].copy_from_slice(&self.document_count.to_le_bytes());
        buf[18] = self.compression as u8;
        buf[19..27].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[27..31].copy_from_slice(&self.payload_checksum.to_le_bytes());
        // bytes 31-59 reserved

        let checksum = crc32fast::hash(&buf[0..60]);
        buf[60..64].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> StorageResult<Self> {
        let stored_checksum = u32::from_le_bytes([buf[60], buf[61], buf[62], buf[63]]);
        let computed_checksum = crc32fast::hash(&buf[0..60]);

        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "Header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        if buf[0..4] != SNAPSHOT_MAGIC {
            return Err(StorageError::InvalidSnapshot(format!(
                "Invalid magic: {:?}",
                &buf[0..4]
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > SNAPSHOT_VERSION {
            return Err(StorageError::InvalidSnapshot(format!(
                "Unsupported version: {}",
                version
            )));
        }

        let mut u64_buf = [0u8; 8];
        u64_buf.copy_from_slice(&buf[10..18]);
        let document_count = u64::from_le_bytes(u64_buf);
        u64_buf.copy_from_slice(&buf[19..27]);
        let payload_size = u64::from_le_bytes(u64_buf);

        Ok(Self {
            version,
            collection_count: u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
            document_count,
            compression: CompressionType::try_from(buf[18])?,
            payload_size,
            payload_checksum: u32::from_le_bytes([buf[27], buf[28], buf[29], buf[30]]),
        })
    }
}

/// Encode collections into a snapshot payload
fn encode_payload(collections: &Collections, compression: CompressionType) -> StorageResult<Vec<u8>> {
    // Sorted by collection name so identical stores produce identical files
    let mut entries: Vec<(&String, Vec<&Document>)> = collections
        .iter()
        .map(|(name, docs)| (name, docs.values().collect()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let serialized = bincode::serialize(&entries)?;

    Ok(match compression {
        CompressionType::None => serialized,
        CompressionType::Lz4 => lz4_flex::compress_prepend_size(&serialized),
    })
}

/// Decode a snapshot payload back into collections
fn decode_payload(payload: &[u8], compression: CompressionType) -> StorageResult<Collections> {
    let decompressed;
    let bytes = match compression {
        CompressionType::None => payload,
        CompressionType::Lz4 => {
            decompressed = lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| StorageError::Compression(e.to_string()))?;
            &decompressed
        }
    };

    let entries: Vec<(String, Vec<Document>)> = bincode::deserialize(bytes)?;

    Ok(entries
        .into_iter()
        .map(|(name, docs)| {
            let docs = docs.into_iter().map(|d| (d.id.clone(), d)).collect();
            (name, docs)
        })
        .collect())
}

/// Write a snapshot of all collections to `path`
pub fn write_snapshot(
    path: &Path,
    collections: &Collections,
    compression: CompressionType,
) -> StorageResult<SnapshotHeader> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let payload = encode_payload(collections, compression)?;
    let header = SnapshotHeader {
        version: SNAPSHOT_VERSION,
        collection_count: collections.len() as u32,
        document_count: collections.values().map(|c| c.len() as u64).sum(),
        compression,
        payload_size: payload.len() as u64,
        payload_checksum: crc32fast::hash(&payload),
    };

    let tmp_path = path.with_extension("snap.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(&header.to_bytes())?;
        writer.write_all(&payload)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    Ok(header)
}

/// Read a snapshot. Returns `None` when no snapshot exists yet.
pub fn read_snapshot(path: &Path) -> StorageResult<Option<(SnapshotHeader, Collections)>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = BufReader::new(File::open(path)?);

    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf)?;
    let header = SnapshotHeader::from_bytes(&header_buf)?;

    let mut payload = vec![0u8; header.payload_size as usize];
    reader.read_exact(&mut payload)?;

    let checksum = crc32fast::hash(&payload);
    if checksum != header.payload_checksum {
        return Err(StorageError::Corruption(format!(
            "Payload checksum mismatch: stored={}, computed={}",
            header.payload_checksum, checksum
        )));
    }

    let collections = decode_payload(&payload, header.compression)?;
    Ok(Some((header, collections)))
}
