//! Corpsnet API Server
//!
//! Run with: cargo run --bin corpsnet
//!
//! # Configuration
//!
//! Read from `--config <path>` or the default locations, then overridden by
//! environment variables:
//! - `CORPSNET_API_HOST`, `CORPSNET_API_PORT`: Bind address (default: 0.0.0.0:8082)
//! - `CORPSNET_DATA_DIR`: Data directory
//! - `CORPSNET_IN_MEMORY`: Keep all data in memory
//! - `CORPSNET_LOG_LEVEL`, `CORPSNET_LOG_FORMAT`: Logging
//! - `RUST_LOG`: Full filter, wins over the configured level

use clap::Parser;
use corpsnet::api::{serve, ApiConfig, AppState};
use corpsnet::config::Config;
use corpsnet::identity::IdentityService;
use corpsnet::logging::init_logging;
use corpsnet::services::Services;
use corpsnet::storage::{DocumentStore, LocalStore};
use corpsnet::websocket::HubConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How often expired sessions are swept
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "corpsnet")]
#[command(about = "Corpsnet API server", version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_logging(&config.logging);
    tracing::info!("Starting Corpsnet API server v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the document store
    let store_config = config.storage.to_store_config()?;
    match &store_config.data_dir {
        Some(dir) => tracing::info!("Data directory: {:?}", dir),
        None => tracing::warn!("Running in memory; nothing will be persisted"),
    }

    let store = Arc::new(LocalStore::open(store_config).await?);
    tracing::info!("Store opened: {}", store.stats().await);
    let compaction = store.start_background_compaction();

    let dyn_store: Arc<dyn DocumentStore> = store.clone();
    let identity = Arc::new(IdentityService::new(
        Arc::clone(&dyn_store),
        config.auth.to_identity_config(),
    )?);
    let services = Services::new(dyn_store, Arc::clone(&identity));

    let api_config = ApiConfig::from(&config.api);
    let hub_config = HubConfig {
        max_connections: config.websocket.max_connections,
    };
    let state = AppState::with_ws_config(
        Arc::clone(&store),
        services,
        api_config.clone(),
        hub_config,
    );
    let mut background = state.start_background_tasks();

    background.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = identity.evict_expired().await;
            if evicted > 0 {
                tracing::info!("Evicted {} expired sessions", evicted);
            }
        }
    }));

    // Run server
    serve(state, &api_config).await?;

    // Graceful shutdown
    for task in background {
        task.abort();
    }
    compaction.abort();

    tracing::info!("Shutting down store...");
    store.shutdown().await?;
    tracing::info!("Corpsnet API server stopped");

    Ok(())
}
