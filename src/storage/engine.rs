//! Local document store
//!
//! `LocalStore` orchestrates all storage components:
//! - Write path: Mutation → WAL → in-memory collections → change feed
//! - Read path: Query → in-memory collections → filter/order/limit
//! - Compaction: collections → snapshot file, then WAL truncate
//!
//! Thread-safe via Tokio's async RwLock for concurrent access.

use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration};
use uuid::Uuid;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::query::Query;
use crate::storage::snapshot::{read_snapshot, write_snapshot, Collections, CompressionType};
use crate::storage::types::{validate_segment, ChangeEvent, ChangeKind, Document, Fields, Mutation};
use crate::storage::wal::{WalSyncMode, WriteAheadLog};
use crate::storage::DocumentStore;

/// Configuration for the local store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for all data; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// WAL sync strategy
    pub wal_sync: WalSyncMode,
    /// Snapshot compression
    pub compression: CompressionType,
    /// How often the background task checks for compaction (default: 30s)
    pub compaction_interval_ms: u64,
    /// WAL entry count that triggers a background compaction (default: 1000)
    pub compaction_threshold: u64,
    /// Capacity of the change broadcast channel
    pub change_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: Some(PathBuf::from("corpsnet_data")),
            wal_sync: WalSyncMode::Batched,
            compression: CompressionType::Lz4,
            compaction_interval_ms: 30_000,
            compaction_threshold: 1000,
            change_capacity: 1024,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Default::default()
        }
    }

    /// Store without any files
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            ..Default::default()
        }
    }

    /// Get path to WAL file
    pub fn wal_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join("wal").join("current.wal"))
    }

    /// Get path to snapshot file
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join("snapshot").join("store.snap"))
    }

    /// Get path to the lock file guarding the data directory
    pub fn lock_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("LOCK"))
    }
}

/// Take the exclusive lock on a data directory.
///
/// The lock is held for as long as the returned file is open, so it goes
/// away with the process even after a crash.
fn lock_data_dir(path: &Path) -> StorageResult<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(|_| StorageError::Locked(path.display().to_string()))?;
    Ok(file)
}

/// The local document store
pub struct LocalStore {
    config: StoreConfig,
    /// collection → (id → document)
    collections: Arc<RwLock<Collections>>,
    /// Write-ahead log (absent for in-memory stores)
    wal: Option<Arc<RwLock<WriteAheadLog>>>,
    /// Change feed for live subscriptions
    changes: broadcast::Sender<ChangeEvent>,
    /// Shutdown signal
    shutdown: Arc<RwLock<bool>>,
    /// Exclusive lock on the data directory, released on drop
    _lock: Option<File>,
}

impl LocalStore {
    /// Open a store, restoring the latest snapshot and replaying the WAL
    pub async fn open(config: StoreConfig) -> StorageResult<Self> {
        let mut collections = Collections::new();
        let mut wal = None;
        let lock = config.lock_path().map(|path| lock_data_dir(&path)).transpose()?;

        if let (Some(wal_path), Some(snapshot_path)) = (config.wal_path(), config.snapshot_path()) {
            if let Some((header, restored)) = read_snapshot(&snapshot_path)? {
                tracing::info!(
                    documents = header.document_count,
                    collections = header.collection_count,
                    "Loaded snapshot"
                );
                collections = restored;
            }

            let log = WriteAheadLog::open(&wal_path, config.wal_sync)?;
            let recovered = log.recover()?;
            if !recovered.is_empty() {
                tracing::info!("Replaying {} mutations from WAL", recovered.len());
                for mutation in recovered {
                    apply_mutation(&mut collections, mutation);
                }
            }
            wal = Some(Arc::new(RwLock::new(log)));
        }

        let (changes, _) = broadcast::channel(config.change_capacity.max(1));

        Ok(Self {
            config,
            collections: Arc::new(RwLock::new(collections)),
            wal,
            changes,
            shutdown: Arc::new(RwLock::new(false)),
            _lock: lock,
        })
    }

    /// Open a store without files
    pub async fn in_memory() -> Self {
        let config = StoreConfig::in_memory();
        let (changes, _) = broadcast::channel(config.change_capacity);
        Self {
            config,
            collections: Arc::new(RwLock::new(Collections::new())),
            wal: None,
            changes,
            shutdown: Arc::new(RwLock::new(false)),
            _lock: None,
        }
    }

    /// Log, apply and announce a mutation
    async fn commit(&self, mutation: Mutation) -> StorageResult<Option<ChangeEvent>> {
        if *self.shutdown.read().await {
            return Err(StorageError::Closed);
        }

        let event = {
            // Holding the collections lock keeps WAL order identical to apply order
            let mut collections = self.collections.write().await;

            if let Mutation::Delete { collection, id } = &mutation {
                let exists = collections
                    .get(collection)
                    .map(|docs| docs.contains_key(id))
                    .unwrap_or(false);
                if !exists {
                    return Ok(None);
                }
            }

            if let Some(wal) = &self.wal {
                wal.write().await.append(&mutation)?;
            }

            apply_mutation(&mut collections, mutation)
        };

        // No receivers is fine: nobody is subscribed
        let _ = self.changes.send(event.clone());
        Ok(Some(event))
    }

    /// Write every collection to a snapshot and truncate the WAL
    pub async fn compact(&self) -> StorageResult<()> {
        let (Some(wal), Some(snapshot_path)) = (&self.wal, self.config.snapshot_path()) else {
            return Ok(());
        };

        // Read lock blocks writers until the WAL has been truncated
        let collections = self.collections.read().await;
        let mut wal = wal.write().await;

        if !wal.has_pending() && snapshot_path.exists() {
            return Ok(());
        }

        let header = write_snapshot(&snapshot_path, &collections, self.config.compression)?;
        wal.truncate()?;

        tracing::debug!(
            documents = header.document_count,
            bytes = header.payload_size,
            "Compacted store"
        );
        Ok(())
    }

    /// Start background compaction task
    pub fn start_background_compaction(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let period = Duration::from_millis(store.config.compaction_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                ticker.tick().await;

                if *store.shutdown.read().await {
                    break;
                }

                let pending = match &store.wal {
                    Some(wal) => wal.read().await.entry_count(),
                    None => break,
                };

                if pending >= store.config.compaction_threshold {
                    if let Err(e) = store.compact().await {
                        tracing::error!("Background compaction failed: {}", e);
                    }
                }
            }
        })
    }

    /// Get storage statistics
    pub async fn stats(&self) -> StoreStats {
        let collections = self.collections.read().await;

        let document_count = collections.values().map(|c| c.len()).sum();
        let estimated_bytes = collections
            .values()
            .flat_map(|c| c.values())
            .map(|d| d.estimated_size())
            .sum();

        let wal_entries = match &self.wal {
            Some(wal) => wal.read().await.entry_count(),
            None => 0,
        };

        let snapshot_size_bytes = self
            .config
            .snapshot_path()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        StoreStats {
            collection_count: collections.len(),
            document_count,
            estimated_bytes,
            wal_entries,
            snapshot_size_bytes,
        }
    }

    /// Whether the store has been shut down
    pub async fn is_shut_down(&self) -> bool {
        *self.shutdown.read().await
    }

    /// Shutdown the store gracefully
    pub async fn shutdown(&self) -> StorageResult<()> {
        self.compact().await?;

        if let Some(wal) = &self.wal {
            wal.write().await.sync()?;
        }

        *self.shutdown.write().await = true;
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// Apply a mutation to the collections, returning the change it produced
fn apply_mutation(collections: &mut Collections, mutation: Mutation) -> ChangeEvent {
    match mutation {
        Mutation::Put {
            collection,
            document,
        } => {
            let id = document.id.clone();
            collections
                .entry(collection.clone())
                .or_default()
                .insert(id.clone(), document);
            ChangeEvent {
                collection,
                id,
                kind: ChangeKind::Put,
            }
        }
        Mutation::Delete { collection, id } => {
            if let Some(docs) = collections.get_mut(&collection) {
                docs.remove(&id);
                if docs.is_empty() {
                    collections.remove(&collection);
                }
            }
            ChangeEvent {
                collection,
                id,
                kind: ChangeKind::Delete,
            }
        }
    }
}

/// Generate a fresh document id
fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn add(&self, collection: &str, fields: Fields) -> StorageResult<Document> {
        self.set(collection, &generate_id(), fields).await
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<Document> {
        validate_segment("collection", collection)?;
        validate_segment("document id", id)?;

        let document = Document::new(id, fields);
        self.commit(Mutation::Put {
            collection: collection.to_string(),
            document: document.clone(),
        })
        .await?;

        Ok(document)
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        validate_segment("collection", collection)?;
        validate_segment("document id", id)?;

        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>> {
        validate_segment("collection", &query.collection)?;

        let collections = self.collections.read().await;
        Ok(match collections.get(&query.collection) {
            Some(docs) => query.apply(docs.values()),
            None => Vec::new(),
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool> {
        validate_segment("collection", collection)?;
        validate_segment("document id", id)?;

        let event = self
            .commit(Mutation::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            })
            .await?;

        Ok(event.is_some())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub collection_count: usize,
    pub document_count: usize,
    pub estimated_bytes: usize,
    pub wal_entries: u64,
    pub snapshot_size_bytes: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Collections: {}, Documents: {}, WAL: {}, Snapshot: {:.2} MB",
            self.collection_count,
            self.document_count,
            self.wal_entries,
            self.snapshot_size_bytes as f64 / (1024.0 * 1024.0)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::query::Direction;
    use crate::storage::types::Value;
    use tempfile::tempdir;

    fn reminder(owner: &str, title: &str, date: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("userId".to_string(), Value::from(owner));
        fields.insert("title".to_string(), Value::from(title));
        fields.insert("date".to_string(), Value::from(date));
        fields
    }

    async fn create_test_store() -> (LocalStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path());
        let store = LocalStore::open(config).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_creation() {
        let (store, _dir) = create_test_store().await;
        let stats = store.stats().await;
        assert_eq!(stats.collection_count, 0);
        assert_eq!(stats.document_count, 0);
    }

    #[tokio::test]
    async fn test_add_get_delete() {
        let (store, _dir) = create_test_store().await;

        let doc = store
            .add("reminders", reminder("u1", "Clearance", "2025-03-01T09:00"))
            .await
            .unwrap();
        assert!(!doc.id.is_empty());

        let fetched = store.get("reminders", &doc.id).await.unwrap().unwrap();
        assert_eq!(fetched, doc);

        assert!(store.delete("reminders", &doc.id).await.unwrap());
        assert!(store.get("reminders", &doc.id).await.unwrap().is_none());
        assert!(!store.delete("reminders", &doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_replaces_document() {
        let store = LocalStore::in_memory().await;

        store
            .set("users", "u1", reminder("u1", "first", "2025-01-01T00:00"))
            .await
            .unwrap();
        store
            .set("users", "u1", reminder("u1", "second", "2025-01-01T00:00"))
            .await
            .unwrap();

        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.get_str("title"), Some("second"));
        assert_eq!(store.stats().await.document_count, 1);
    }

    #[tokio::test]
    async fn test_query_scoped_and_ordered() {
        let store = LocalStore::in_memory().await;

        store.add("reminders", reminder("u1", "late", "2025-06-01T10:00")).await.unwrap();
        store.add("reminders", reminder("u2", "other", "2025-01-01T10:00")).await.unwrap();
        store.add("reminders", reminder("u1", "early", "2025-02-01T10:00")).await.unwrap();

        let query = Query::collection("reminders")
            .where_eq("userId", "u1")
            .order_by("date", Direction::Asc);
        let results = store.query(&query).await.unwrap();

        let titles: Vec<&str> = results.iter().filter_map(|d| d.get_str("title")).collect();
        assert_eq!(titles, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_invalid_paths_rejected() {
        let store = LocalStore::in_memory().await;
        assert!(matches!(
            store.set("users", "a/b", Fields::new()).await,
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            store.get("", "x").await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_change_events() {
        let store = LocalStore::in_memory().await;
        let mut changes = store.changes();

        let doc = store.add("posts", reminder("u1", "hello", "x")).await.unwrap();
        store.delete("posts", &doc.id).await.unwrap();
        // Deleting a missing document emits nothing
        store.delete("posts", &doc.id).await.unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Put);
        assert_eq!(first.id, doc.id);

        let second = changes.recv().await.unwrap();
        assert_eq!(second.kind, ChangeKind::Delete);

        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_recovery_from_wal() {
        let dir = tempdir().unwrap();
        let kept_id;

        {
            let store = LocalStore::open(StoreConfig::new(dir.path())).await.unwrap();
            let kept = store.add("reminders", reminder("u1", "keep", "2025-01-01T00:00")).await.unwrap();
            let dropped = store.add("reminders", reminder("u1", "drop", "2025-01-02T00:00")).await.unwrap();
            store.delete("reminders", &dropped.id).await.unwrap();
            kept_id = kept.id;
        }

        let store = LocalStore::open(StoreConfig::new(dir.path())).await.unwrap();
        let docs = store.query(&Query::collection("reminders")).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, kept_id);
    }

    #[tokio::test]
    async fn test_recovery_from_snapshot_and_wal() {
        let dir = tempdir().unwrap();

        {
            let store = LocalStore::open(StoreConfig::new(dir.path())).await.unwrap();
            for i in 0..20 {
                store
                    .set("posts", &format!("p{:02}", i), reminder("u1", "post", "x"))
                    .await
                    .unwrap();
            }
            store.compact().await.unwrap();
            assert_eq!(store.stats().await.wal_entries, 0);

            store.delete("posts", "p00").await.unwrap();
            store.set("posts", "p99", reminder("u2", "late", "y")).await.unwrap();
        }

        let store = LocalStore::open(StoreConfig::new(dir.path())).await.unwrap();
        let stats = store.stats().await;
        assert_eq!(stats.document_count, 20);
        assert_eq!(stats.wal_entries, 2);
        assert!(store.get("posts", "p00").await.unwrap().is_none());
        assert!(store.get("posts", "p99").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_data_dir_locked_while_open() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(StoreConfig::new(dir.path())).await.unwrap();
        store.add("ppas", reminder("u1", "first", "x")).await.unwrap();

        assert!(matches!(
            LocalStore::open(StoreConfig::new(dir.path())).await,
            Err(StorageError::Locked(_))
        ));

        drop(store);
        let reopened = LocalStore::open(StoreConfig::new(dir.path())).await.unwrap();
        assert_eq!(reopened.stats().await.document_count, 1);
    }

    #[tokio::test]
    async fn test_writes_rejected_after_shutdown() {
        let (store, _dir) = create_test_store().await;
        store.shutdown().await.unwrap();

        assert!(store.is_shut_down().await);
        assert!(matches!(
            store.add("posts", Fields::new()).await,
            Err(StorageError::Closed)
        ));
    }
}
