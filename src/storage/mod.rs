//! Corpsnet document store
//!
//! This module provides the persistence layer behind every service:
//!
//! - **types**: Core data structures (Value, Document, Mutation, ChangeEvent)
//! - **query**: Field filters, ordering and limits
//! - **wal**: Write-ahead log for durability
//! - **snapshot**: Compressed point-in-time snapshot file
//! - **engine**: `LocalStore`, orchestrating all components
//! - **live**: Live query and document subscriptions
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Mutation → WAL → Collections → Change feed → Subscriptions
//!
//! Read Path:
//!   Query → Collections → Filter → Order → Limit
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use corpsnet::storage::{DocumentStore, LocalStore, Query, StoreConfig, Value};
//! use corpsnet::storage::types::Fields;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = LocalStore::open(StoreConfig::new("./data")).await?;
//!
//!     let mut fields = Fields::new();
//!     fields.insert("name".to_string(), Value::from("Lagos State Secretariat"));
//!     fields.insert("state".to_string(), Value::from("Lagos"));
//!     store.add("ppas", fields).await?;
//!
//!     let query = Query::collection("ppas").where_eq("state", "Lagos");
//!     let ppas = store.query(&query).await?;
//!     println!("{} PPAs in Lagos", ppas.len());
//!
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod live;
pub mod query;
pub mod snapshot;
pub mod types;
pub mod wal;

use async_trait::async_trait;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use engine::{LocalStore, StoreConfig, StoreStats};
pub use error::{StorageError, StorageResult};
pub use live::{subscribe_document, subscribe_query, DocumentSubscription, QuerySubscription};
pub use query::{Direction, FilterOp, Query};
pub use snapshot::CompressionType;
pub use types::{collections, to_fields, ChangeEvent, ChangeKind, Document, Fields, Value};
pub use wal::{WalSyncMode, WriteAheadLog};

/// A store of flat documents grouped into named collections.
///
/// Every successful write is announced on the change feed after it has been
/// applied, which is what live subscriptions build on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document under a freshly generated id
    async fn add(&self, collection: &str, fields: Fields) -> StorageResult<Document>;

    /// Create or fully replace the document with the given id
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<Document>;

    /// Read a document by id
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Run a query
    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>>;

    /// Delete a document. Returns `false` when it did not exist.
    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool>;

    /// Receive every change applied from now on
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}
