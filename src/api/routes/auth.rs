//! Auth Routes
//!
//! - POST /api/v1/auth/signup - Create an account and profile (public)
//! - POST /api/v1/auth/signin - Start a session (public)
//! - POST /api/v1/auth/signout - End the current session
//! - GET /api/v1/auth/session - Describe the current session

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::auth::Authenticated;
use crate::api::dto::{SessionResponse, SignOutResponse, SigninRequest, SignupResponse};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::services::SignupForm;

/// POST /api/v1/auth/signup
///
/// The new profile is cached for the session straight away.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(form): Json<SignupForm>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    let outcome = state.services.signup.sign_up(form).await?;

    let cache = &state.services.profile_cache;
    cache.put(&outcome.session, outcome.profile.clone()).await;
    cache.follow(&outcome.session).await;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            session: SessionResponse::from(&outcome.session),
            profile: outcome.profile,
        }),
    ))
}

/// POST /api/v1/auth/signin
pub async fn signin(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SigninRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state
        .services
        .identity
        .sign_in(&req.email, &req.password)
        .await?;

    state.services.profile_cache.follow(&session).await;

    Ok(Json(SessionResponse::from(&session)))
}

/// POST /api/v1/auth/signout
///
/// Ends the session. Its cache entry and WebSocket connections are torn
/// down by the sign-out watchers.
pub async fn signout(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> Json<SignOutResponse> {
    let signed_out = state.services.identity.sign_out(&session.token).await;
    Json(SignOutResponse { signed_out })
}

/// GET /api/v1/auth/session
pub async fn current_session(Authenticated(session): Authenticated) -> Json<SessionResponse> {
    Json(SessionResponse::from(&session))
}
