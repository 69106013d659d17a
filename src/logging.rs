//! Logging setup
//!
//! `RUST_LOG` wins over the configured level when set.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Build the env filter for a configured level
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("corpsnet={},tower_http=info", config.level))
    })
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_logging(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let result = if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}
