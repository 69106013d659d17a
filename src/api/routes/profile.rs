//! Profile Routes
//!
//! - GET /api/v1/profile - The caller's profile, served from the session cache
//! - PATCH /api/v1/profile - Update location and LGA

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::auth::Authenticated;
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::services::{ProfileUpdate, UserProfile};

/// GET /api/v1/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> ApiResult<Json<UserProfile>> {
    let profile = state.services.profile_cache.get_or_load(&session).await?;
    Ok(Json(profile))
}

/// PATCH /api/v1/profile
///
/// The session's cache entry picks the new value up from its subscription.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<UserProfile>> {
    let profile = state
        .services
        .profiles
        .update(&session.user.uid, update)
        .await?;

    Ok(Json(profile))
}
