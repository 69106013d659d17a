//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::identity::IdentityConfig;
use crate::storage::{CompressionType, StoreConfig, WalSyncMode};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub websocket: WebSocketConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Keep everything in memory (nothing written to disk)
    #[serde(default)]
    pub in_memory: bool,

    /// every_write, batched or none
    #[serde(default = "default_wal_sync")]
    pub wal_sync: String,

    /// lz4 or none
    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default = "default_compaction_interval")]
    pub compaction_interval_ms: u64,

    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: u64,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("corpsnet").to_string_lossy().to_string())
        .unwrap_or_else(|| "./corpsnet_data".to_string())
}

fn default_wal_sync() -> String {
    "batched".to_string()
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_compaction_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_compaction_threshold() -> u64 {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            in_memory: false,
            wal_sync: default_wal_sync(),
            compression: default_compression(),
            compaction_interval_ms: default_compaction_interval(),
            compaction_threshold: default_compaction_threshold(),
        }
    }
}

impl StorageConfig {
    /// Build the store configuration
    pub fn to_store_config(&self) -> Result<StoreConfig, ConfigError> {
        let wal_sync: WalSyncMode = self.wal_sync.parse().map_err(|e| ConfigError::Invalid {
            key: "storage.wal_sync".to_string(),
            error: format!("{}", e),
        })?;
        let compression: CompressionType =
            self.compression.parse().map_err(|e| ConfigError::Invalid {
                key: "storage.compression".to_string(),
                error: format!("{}", e),
            })?;

        let base = if self.in_memory {
            StoreConfig::in_memory()
        } else {
            StoreConfig::new(&self.data_dir)
        };

        Ok(StoreConfig {
            wal_sync,
            compression,
            compaction_interval_ms: self.compaction_interval_ms,
            compaction_threshold: self.compaction_threshold,
            ..base
        })
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Identity service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: u64,

    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

fn default_session_ttl() -> u64 {
    24 * 7
}

fn default_min_password_length() -> usize {
    6
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl(),
            min_password_length: default_min_password_length(),
        }
    }
}

impl AuthConfig {
    pub fn to_identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            session_ttl: Duration::from_secs(self.session_ttl_hours * 3600),
            min_password_length: self.min_password_length,
        }
    }
}

/// WebSocket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    1000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("corpsnet").join("config.toml")),
            Some(PathBuf::from("/etc/corpsnet/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(data_dir) = lookup("CORPSNET_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Some(in_memory) = lookup("CORPSNET_IN_MEMORY") {
            self.storage.in_memory = matches!(in_memory.as_str(), "1" | "true" | "yes");
        }
        if let Some(wal_sync) = lookup("CORPSNET_WAL_SYNC") {
            self.storage.wal_sync = wal_sync;
        }

        // API overrides
        if let Some(host) = lookup("CORPSNET_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("CORPSNET_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Auth overrides
        if let Some(ttl) = lookup("CORPSNET_SESSION_TTL_HOURS") {
            if let Ok(hours) = ttl.parse() {
                self.auth.session_ttl_hours = hours;
            }
        }

        // Logging overrides
        if let Some(level) = lookup("CORPSNET_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CORPSNET_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {key}: {error}")]
    Invalid { key: String, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Corpsnet Configuration
#
# Environment variables override these settings:
# - CORPSNET_DATA_DIR
# - CORPSNET_IN_MEMORY
# - CORPSNET_WAL_SYNC
# - CORPSNET_API_HOST
# - CORPSNET_API_PORT
# - CORPSNET_SESSION_TTL_HOURS
# - CORPSNET_LOG_LEVEL
# - CORPSNET_LOG_FORMAT

[storage]
# Directory for storing data files
data_dir = "~/.local/share/corpsnet"

# Keep all data in memory (nothing is persisted)
in_memory = false

# WAL sync strategy: every_write, batched or none
wal_sync = "batched"

# Snapshot compression: lz4 or none
compression = "lz4"

# How often to check whether the WAL should be compacted (ms)
compaction_interval_ms = 30000

# WAL entries that trigger a compaction
compaction_threshold = 1000

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8082

# Allowed CORS origins
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]

# Request timeout in seconds
request_timeout_secs = 30

[auth]
# Session lifetime (hours)
session_ttl_hours = 168

# Minimum password length
min_password_length = 6

[websocket]
# Maximum concurrent WebSocket connections
max_connections = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
