//! Bearer-token authentication
//!
//! Handlers that take [`Authenticated`] only run for a live session; anything
//! else is rejected with 401 before the handler body executes.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::identity::Session;

/// The caller's session, resolved from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct Authenticated(pub Session);

/// Extract the token from an `Authorization` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        state
            .services
            .identity
            .current_session(token)
            .await
            .map(Authenticated)
            .ok_or_else(|| ApiError::Unauthorized("Session expired or signed out".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("bearer  abc123 "), Some("abc123"));
        assert_eq!(bearer_token("Basic abc123"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc123"), None);
    }
}
