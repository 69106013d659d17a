//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::config;
use crate::services::Services;
use crate::storage::LocalStore;
use crate::websocket::{ConnectionHub, HubConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Document store, kept concrete for health and stats
    pub store: Arc<LocalStore>,
    /// Feature services
    pub services: Services,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// WebSocket connection hub for live subscriptions
    pub ws_hub: Arc<ConnectionHub>,
}

impl AppState {
    pub fn new(store: Arc<LocalStore>, services: Services, config: ApiConfig) -> Self {
        Self::with_ws_config(store, services, config, HubConfig::default())
    }

    /// Create AppState with custom WebSocket hub configuration
    pub fn with_ws_config(
        store: Arc<LocalStore>,
        services: Services,
        config: ApiConfig,
        hub_config: HubConfig,
    ) -> Self {
        let ws_hub = Arc::new(ConnectionHub::new(hub_config, services.clone()));
        Self {
            store,
            services,
            config: Arc::new(config),
            start_time: Instant::now(),
            ws_hub,
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn ws_connection_count(&self) -> usize {
        self.ws_hub.connection_count().await
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    pub request_timeout: Duration,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

impl From<&config::ApiConfig> for ApiConfig {
    fn from(config: &config::ApiConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            cors_origins: config.cors_origins.clone(),
            ..Default::default()
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
