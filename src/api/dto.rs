//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Session;
use crate::services::{DirectorySearch, Post, Ppa, Reminder, Resource, UserProfile};

// ============================================
// AUTH DTOs
// ============================================

/// Sign-in request
#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

/// An active session as returned to clients
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub uid: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            token: session.token.clone(),
            uid: session.user.uid.clone(),
            email: session.user.email.clone(),
            expires_at: session.expires_at,
        }
    }
}

/// Signup response: the new session and the created profile
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub session: SessionResponse,
    pub profile: UserProfile,
}

/// Sign-out response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOutResponse {
    pub signed_out: bool,
}

// ============================================
// FEED DTOs
// ============================================

/// New post request
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
}

/// The feed, newest first
#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub posts: Vec<Post>,
    pub total: usize,
}

// ============================================
// REMINDER DTOs
// ============================================

#[derive(Debug, Serialize)]
pub struct ReminderListResponse {
    pub reminders: Vec<Reminder>,
    pub total: usize,
}

// ============================================
// DIRECTORY DTOs
// ============================================

/// `GET /ppas?q=&state=`
#[derive(Debug, Default, Deserialize)]
pub struct PpaSearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub state: String,
}

impl From<PpaSearchParams> for DirectorySearch {
    fn from(params: PpaSearchParams) -> Self {
        DirectorySearch::new(params.q, params.state)
    }
}

#[derive(Debug, Serialize)]
pub struct PpaListResponse {
    pub ppas: Vec<Ppa>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct StateListResponse {
    pub states: &'static [&'static str],
}

// ============================================
// RESOURCE DTOs
// ============================================

/// `GET /resources?kind=`; without a kind both catalogues are listed
#[derive(Debug, Default, Deserialize)]
pub struct ResourceListParams {
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResourceListResponse {
    pub resources: Vec<Resource>,
    pub total: usize,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    /// Store status: "ok" or "closed"
    pub storage: String,
    pub documents: usize,
    pub collections: usize,
    pub wal_entries: u64,
    pub active_sessions: usize,
    pub websocket_connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
