//! Feed Routes
//!
//! - GET /api/v1/posts - All posts, newest first
//! - POST /api/v1/posts - Share a post, returns the refreshed feed

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::auth::Authenticated;
use crate::api::dto::{CreatePostRequest, PostListResponse};
use crate::api::error::ApiResult;
use crate::api::state::AppState;

/// GET /api/v1/posts
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    _auth: Authenticated,
) -> ApiResult<Json<PostListResponse>> {
    let posts = state.services.feed.list().await?;
    Ok(Json(PostListResponse {
        total: posts.len(),
        posts,
    }))
}

/// POST /api/v1/posts
///
/// The post is stamped with the author's cached profile fields.
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<PostListResponse>)> {
    let profile = state.services.profile_cache.get_or_load(&session).await?;
    let posts = state
        .services
        .feed
        .create(&session.user, &profile, &req.content)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PostListResponse {
            total: posts.len(),
            posts,
        }),
    ))
}
