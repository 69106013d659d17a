//! Live query and document subscriptions
//!
//! A subscription delivers the current result immediately and then a fresh
//! result every time a relevant change makes it differ from the last one
//! delivered. Dropping the subscription (or calling `unsubscribe`) stops the
//! background task.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::storage::query::Query;
use crate::storage::types::{ChangeEvent, Document};
use crate::storage::DocumentStore;

/// Pending results buffered per subscription
const SUBSCRIPTION_BUFFER: usize = 16;

/// A live stream of results backed by a background task
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

/// Live results of a query
pub type QuerySubscription = Subscription<Vec<Document>>;

/// Live state of a single document (`None` while it does not exist)
pub type DocumentSubscription = Subscription<Option<Document>>;

impl<T> Subscription<T> {
    /// Wait for the next result. Returns `None` once the subscription ended.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop receiving results
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether the background task is still running
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribe to the live results of a query
pub fn subscribe_query(store: Arc<dyn DocumentStore>, query: Query) -> QuerySubscription {
    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    // Subscribe before the first read so no change slips in between
    let changes = store.changes();

    let task = tokio::spawn(async move {
        let collection = query.collection.clone();
        watch(
            changes,
            tx,
            move |event| event.collection == collection,
            move || {
                let store = Arc::clone(&store);
                let query = query.clone();
                async move { store.query(&query).await }
            },
        )
        .await;
    });

    Subscription { rx, task }
}

/// Subscribe to a single document
pub fn subscribe_document(
    store: Arc<dyn DocumentStore>,
    collection: impl Into<String>,
    id: impl Into<String>,
) -> DocumentSubscription {
    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let changes = store.changes();
    let collection = collection.into();
    let id = id.into();

    let task = tokio::spawn(async move {
        let (watch_collection, watch_id) = (collection.clone(), id.clone());
        watch(
            changes,
            tx,
            move |event| event.collection == watch_collection && event.id == watch_id,
            move || {
                let store = Arc::clone(&store);
                let (collection, id) = (collection.clone(), id.clone());
                async move { store.get(&collection, &id).await }
            },
        )
        .await;
    });

    Subscription { rx, task }
}

/// Deliver `fetch()` now and again after every relevant change that alters it
async fn watch<T, R, F, Fut>(
    mut changes: broadcast::Receiver<ChangeEvent>,
    tx: mpsc::Sender<T>,
    relevant: R,
    fetch: F,
) where
    T: Clone + PartialEq + Send,
    R: Fn(&ChangeEvent) -> bool,
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = crate::storage::StorageResult<T>>,
{
    let mut last = match fetch().await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("Subscription initial read failed: {}", e);
            return;
        }
    };

    if tx.send(last.clone()).await.is_err() {
        return;
    }

    loop {
        match changes.recv().await {
            Ok(event) if !relevant(&event) => continue,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                // Missed events: re-read unconditionally
                tracing::debug!("Subscription lagged by {} changes", skipped);
            }
            Err(RecvError::Closed) => break,
        }

        let next = match fetch().await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Subscription refresh failed: {}", e);
                continue;
            }
        };

        if next != last {
            last = next.clone();
            if tx.send(next).await.is_err() {
                break;
            }
        }
    }
}
