//! Corpsnet REST API
//!
//! HTTP API layer for Corpsnet, built with Axum. Routes under `/api/v1`
//! expect `Authorization: Bearer <token>` unless marked public.
//!
//! # Endpoints
//!
//! ## Auth
//! - `POST /api/v1/auth/signup` - Create account and profile (public)
//! - `POST /api/v1/auth/signin` - Sign in (public)
//! - `POST /api/v1/auth/signout` - Sign out
//! - `GET /api/v1/auth/session` - Current session
//!
//! ## Profile
//! - `GET /api/v1/profile` - Current profile
//! - `PATCH /api/v1/profile` - Update location and LGA
//!
//! ## Feed
//! - `GET /api/v1/posts` - All posts, newest first
//! - `POST /api/v1/posts` - Share a post
//!
//! ## Reminders
//! - `GET /api/v1/reminders` - List reminders
//! - `POST /api/v1/reminders` - Add a reminder
//! - `DELETE /api/v1/reminders/:id` - Delete a reminder
//!
//! ## Directory
//! - `GET /api/v1/ppas?q=&state=` - Search PPAs
//! - `GET /api/v1/ppas/states` - Selectable states
//!
//! ## Resources (public)
//! - `GET /api/v1/resources?kind=` - Letters and tips
//! - `GET /api/v1/resources/:kind/:id` - One resource
//! - `GET /api/v1/resources/:kind/:id/download` - Download as text
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /api/v1/ws?token=` - Live reminder and profile topics
//!
//! # Example
//!
//! ```rust,ignore
//! use corpsnet::api::{build_router, serve, ApiConfig, AppState};
//! use corpsnet::identity::{IdentityConfig, IdentityService};
//! use corpsnet::services::Services;
//! use corpsnet::storage::{LocalStore, StoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(LocalStore::open(StoreConfig::new("./data")).await?);
//!     let identity = Arc::new(IdentityService::new(store.clone(), IdentityConfig::default())?);
//!     let services = Services::new(store.clone(), identity);
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(store, services, config.clone());
//!     state.start_background_tasks();
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use auth::Authenticated;
pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::websocket::websocket_handler;

impl AppState {
    /// Start the sign-out watchers for the profile cache and WebSocket hub.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_background_tasks(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.services.start(),
            Arc::clone(&self.ws_hub).watch_sign_outs(self.services.identity.subscribe()),
        ]
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Auth routes
        .route("/auth/signup", post(routes::auth::signup))
        .route("/auth/signin", post(routes::auth::signin))
        .route("/auth/signout", post(routes::auth::signout))
        .route("/auth/session", get(routes::auth::current_session))
        // Profile routes
        .route(
            "/profile",
            get(routes::profile::get_profile).patch(routes::profile::update_profile),
        )
        // Feed routes
        .route(
            "/posts",
            get(routes::posts::list_posts).post(routes::posts::create_post),
        )
        // Reminder routes
        .route(
            "/reminders",
            get(routes::reminders::list_reminders).post(routes::reminders::create_reminder),
        )
        .route("/reminders/:id", delete(routes::reminders::delete_reminder))
        // Directory routes
        .route("/ppas", get(routes::ppas::search_ppas))
        .route("/ppas/states", get(routes::ppas::list_states))
        // Resource routes
        .route("/resources", get(routes::resources::list_resources))
        .route("/resources/:kind/:id", get(routes::resources::get_resource))
        .route(
            "/resources/:kind/:id/download",
            get(routes::resources::download_resource),
        )
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        // WebSocket route
        .route("/ws", get(websocket_handler));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config.cors_origins);
    let timeout = TimeoutLayer::new(state.config.request_timeout);

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Corpsnet API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Corpsnet API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
