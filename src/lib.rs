//! # Corpsnet
//!
//! Back end for a corps-member community app: signup, a community feed,
//! clearance reminders with a live list, a searchable PPA directory and a
//! catalogue of sample letters and tips.
//!
//! ## Features
//!
//! - **Document store**: Flat documents in named collections, with a WAL and LZ4 snapshots
//! - **Live subscriptions**: Query and document subscriptions fed by a change stream
//! - **Identity**: Argon2 password hashing and bearer sessions
//! - **Real-time**: WebSocket topics for the reminder list and the profile
//!
//! ## Modules
//!
//! - [`storage`]: Document store
//! - [`identity`]: Accounts and sessions
//! - [`services`]: Feature logic, one service per page
//! - [`api`]: REST API server with Axum
//! - [`websocket`]: Live topics over WebSocket
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use corpsnet::identity::{IdentityConfig, IdentityService};
//! use corpsnet::services::{DirectorySearch, Services};
//! use corpsnet::storage::{DocumentStore, LocalStore, StoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store: Arc<dyn DocumentStore> =
//!         Arc::new(LocalStore::open(StoreConfig::new("./data")).await?);
//!     let identity = Arc::new(IdentityService::new(Arc::clone(&store), IdentityConfig::default())?);
//!     let services = Services::new(store, identity);
//!
//!     let ppas = services
//!         .directory
//!         .search(&DirectorySearch::new("Lagos", "Lagos"))
//!         .await?;
//!     println!("Found {} PPAs", ppas.len());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod identity;
pub mod integrations;
pub mod logging;
pub mod services;
pub mod storage;
pub mod websocket;

use chrono::{SecondsFormat, Utc};

// Re-export top-level types for convenience
pub use storage::{
    Document, DocumentStore, LocalStore, Query, StorageError, StorageResult, StoreConfig,
    StoreStats,
};

pub use identity::{AuthEvent, AuthUser, IdentityError, IdentityService, Session};

pub use services::{ServiceError, Services};

pub use api::{build_router, serve, ApiError, AppState};

pub use websocket::{ClientMessage, ConnectionHub, HubConfig, HubError, ServerMessage};

pub use config::{Config, ConfigError, LoggingConfig};

pub use integrations::{ImportError, PpaCsvImporter};

/// Current time as RFC 3339 UTC with milliseconds, e.g. `2025-01-31T09:15:00.123Z`
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
