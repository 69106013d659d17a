//! Write-Ahead Log (WAL) for durability guarantees
//!
//! Every mutation is persisted here before it is applied to the in-memory
//! collections. On open, entries written since the last snapshot are replayed.
//!
//! Format per entry:
//! - length: u32 (4 bytes)
//! - data: [u8; length] (bincode-serialized Mutation)
//! - crc: u32 (4 bytes, CRC32 of length + data)

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::Mutation;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Largest accepted entry payload
const MAX_ENTRY_SIZE: usize = 4 * 1024 * 1024;

/// Sync strategy for WAL writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalSyncMode {
    /// Fsync after every write (safest, slowest)
    EveryWrite,
    /// Fsync in batches (balanced)
    #[default]
    Batched,
    /// No fsync, rely on OS (fastest, risk of loss)
    None,
}

impl std::str::FromStr for WalSyncMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "every_write" | "always" => Ok(WalSyncMode::EveryWrite),
            "batched" => Ok(WalSyncMode::Batched),
            "none" => Ok(WalSyncMode::None),
            other => Err(StorageError::WalError(format!("Unknown sync mode: {}", other))),
        }
    }
}

/// Write-Ahead Log for durability
pub struct WriteAheadLog {
    writer: BufWriter<File>,
    path: PathBuf,
    entry_count: u64,
    bytes_since_sync: usize,
    sync_mode: WalSyncMode,
    /// Batch sync threshold (bytes)
    sync_threshold: usize,
}

impl WriteAheadLog {
    /// Open or create a WAL file
    pub fn open(path: impl AsRef<Path>, sync_mode: WalSyncMode) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let entry_count = Self::count_entries(&path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            entry_count,
            bytes_since_sync: 0,
            sync_mode,
            sync_threshold: 64 * 1024,
        })
    }

    /// Count entries in existing WAL (for recovery)
    fn count_entries(path: &Path) -> StorageResult<u64> {
        if !path.exists() {
            return Ok(0);
        }

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut count = 0u64;

        loop {
            match Self::read_entry_from(&mut reader) {
                Ok(Some(_)) => count += 1,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("WAL corruption at entry {}: {}", count, e);
                    break;
                }
            }
        }

        Ok(count)
    }

    /// Append a mutation to the WAL
    pub fn append(&mut self, mutation: &Mutation) -> StorageResult<()> {
        self.write_entry(mutation)?;
        self.maybe_sync()
    }

    /// Append multiple mutations, syncing once
    pub fn append_batch(&mut self, mutations: &[Mutation]) -> StorageResult<()> {
        for mutation in mutations {
            self.write_entry(mutation)?;
        }
        self.maybe_sync()
    }

    fn write_entry(&mut self, mutation: &Mutation) -> StorageResult<()> {
        let data = bincode::serialize(mutation)?;
        if data.len() > MAX_ENTRY_SIZE {
            return Err(StorageError::WalError(format!(
                "Entry length too large: {}",
                data.len()
            )));
        }

        let len_bytes = (data.len() as u32).to_le_bytes();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len_bytes);
        hasher.update(&data);
        let crc = hasher.finalize();

        // Write: length (4) + data (N) + crc (4)
        self.writer.write_all(&len_bytes)?;
        self.writer.write_all(&data)?;
        self.writer.write_all(&crc.to_le_bytes())?;

        self.entry_count += 1;
        self.bytes_since_sync += 8 + data.len();
        Ok(())
    }

    /// Conditionally sync based on mode and threshold
    fn maybe_sync(&mut self) -> StorageResult<()> {
        match self.sync_mode {
            WalSyncMode::EveryWrite => {
                self.sync()?;
            }
            WalSyncMode::Batched => {
                if self.bytes_since_sync >= self.sync_threshold {
                    self.sync()?;
                } else {
                    self.writer.flush()?;
                }
            }
            WalSyncMode::None => {
                self.writer.flush()?;
            }
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.bytes_since_sync = 0;
        Ok(())
    }

    /// Read all entries for recovery
    pub fn recover(&self) -> StorageResult<Vec<Mutation>> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        let mut mutations = Vec::new();

        loop {
            match Self::read_entry_from(&mut reader) {
                Ok(Some(mutation)) => mutations.push(mutation),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("WAL recovery stopped at entry {}: {}", mutations.len(), e);
                    break;
                }
            }
        }

        Ok(mutations)
    }

    /// Read a single entry from a reader
    fn read_entry_from<R: Read>(reader: &mut R) -> StorageResult<Option<Mutation>> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_ENTRY_SIZE {
            return Err(StorageError::WalError(format!(
                "Entry length too large: {}",
                len
            )));
        }

        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;

        let mut crc_buf = [0u8; 4];
        reader.read_exact(&mut crc_buf)?;
        let stored_crc = u32::from_le_bytes(crc_buf);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len_buf);
        hasher.update(&data);
        let computed_crc = hasher.finalize();

        if stored_crc != computed_crc {
            return Err(StorageError::Corruption(format!(
                "CRC mismatch: stored={}, computed={}",
                stored_crc, computed_crc
            )));
        }

        let mutation: Mutation = bincode::deserialize(&data)?;
        Ok(Some(mutation))
    }

    /// Truncate the WAL (after a successful snapshot)
    pub fn truncate(&mut self) -> StorageResult<()> {
        self.sync()?;

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;
        drop(file);

        self.writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        );

        self.entry_count = 0;
        self.bytes_since_sync = 0;

        Ok(())
    }

    /// Get the number of entries in the WAL
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Check if WAL has entries not yet covered by a snapshot
    pub fn has_pending(&self) -> bool {
        self.entry_count > 0
    }

    /// Get the file size
    pub fn file_size(&self) -> StorageResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{Document, Fields, Value};
    use std::io::{Seek, SeekFrom};
    use tempfile::tempdir;

    fn put(id: &str, title: &str) -> Mutation {
        let mut fields = Fields::new();
        fields.insert("title".to_string(), Value::from(title));
        Mutation::Put {
            collection: "reminders".to_string(),
            document: Document::new(id, fields),
        }
    }

    #[test]
    fn test_wal_basic_operations() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("test.wal");

        {
            let mut wal = WriteAheadLog::open(&wal_path, WalSyncMode::EveryWrite).unwrap();
            wal.append(&put("a", "Clearance")).unwrap();
            wal.append(&Mutation::Delete {
                collection: "reminders".to_string(),
                id: "a".to_string(),
            })
            .unwrap();
            assert_eq!(wal.entry_count(), 2);
        }

        {
            let wal = WriteAheadLog::open(&wal_path, WalSyncMode::EveryWrite).unwrap();
            let recovered = wal.recover().unwrap();

            assert_eq!(recovered.len(), 2);
            assert_eq!(recovered[0], put("a", "Clearance"));
            assert!(matches!(&recovered[1], Mutation::Delete { id, .. } if id == "a"));
        }
    }

    #[test]
    fn test_wal_truncate() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("test.wal");

        let mut wal = WriteAheadLog::open(&wal_path, WalSyncMode::EveryWrite).unwrap();
        for i in 0..10 {
            wal.append(&put(&format!("r{}", i), "x")).unwrap();
        }
        assert_eq!(wal.entry_count(), 10);

        wal.truncate().unwrap();
        assert_eq!(wal.entry_count(), 0);
        assert!(wal.recover().unwrap().is_empty());

        wal.append(&put("after", "y")).unwrap();
        assert_eq!(wal.recover().unwrap().len(), 1);
    }

    #[test]
    fn test_wal_batch_append() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("test.wal");

        let mut wal = WriteAheadLog::open(&wal_path, WalSyncMode::Batched).unwrap();
        let mutations: Vec<Mutation> = (0..100).map(|i| put(&format!("r{}", i), "x")).collect();

        wal.append_batch(&mutations).unwrap();
        wal.sync().unwrap();

        assert_eq!(wal.entry_count(), 100);
        assert_eq!(wal.recover().unwrap().len(), 100);
    }

    #[test]
    fn test_wal_crc_corruption_detection() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("test.wal");

        {
            let mut wal = WriteAheadLog::open(&wal_path, WalSyncMode::EveryWrite).unwrap();
            wal.append(&put("a", "Clearance")).unwrap();
        }

        {
            let mut file = OpenOptions::new().write(true).open(&wal_path).unwrap();
            file.seek(SeekFrom::Start(10)).unwrap();
            file.write_all(&[0xFF, 0xFF]).unwrap();
        }

        let wal = WriteAheadLog::open(&wal_path, WalSyncMode::EveryWrite).unwrap();
        assert!(wal.recover().unwrap().is_empty());
    }

    #[test]
    fn test_wal_persistence_across_opens() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("test.wal");

        {
            let mut wal = WriteAheadLog::open(&wal_path, WalSyncMode::EveryWrite).unwrap();
            for i in 0..5 {
                wal.append(&put(&format!("r{}", i), "x")).unwrap();
            }
        }

        {
            let mut wal = WriteAheadLog::open(&wal_path, WalSyncMode::EveryWrite).unwrap();
            assert_eq!(wal.entry_count(), 5);
            for i in 5..10 {
                wal.append(&put(&format!("r{}", i), "x")).unwrap();
            }
        }

        let wal = WriteAheadLog::open(&wal_path, WalSyncMode::EveryWrite).unwrap();
        assert_eq!(wal.entry_count(), 10);
        assert_eq!(wal.recover().unwrap().len(), 10);
    }

    #[test]
    fn test_sync_mode_parse() {
        assert_eq!("batched".parse::<WalSyncMode>().unwrap(), WalSyncMode::Batched);
        assert_eq!("every_write".parse::<WalSyncMode>().unwrap(), WalSyncMode::EveryWrite);
        assert!("sometimes".parse::<WalSyncMode>().is_err());
    }
}
