//! Directory Routes
//!
//! - GET /api/v1/ppas?q=&state= - Search PPAs by name prefix and state
//! - GET /api/v1/ppas/states - States offered by the search form

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::auth::Authenticated;
use crate::api::dto::{PpaListResponse, PpaSearchParams, StateListResponse};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::services::{DirectorySearch, STATES};

/// GET /api/v1/ppas
pub async fn search_ppas(
    State(state): State<Arc<AppState>>,
    _auth: Authenticated,
    Query(params): Query<PpaSearchParams>,
) -> ApiResult<Json<PpaListResponse>> {
    let search = DirectorySearch::from(params);
    let ppas = state.services.directory.search(&search).await?;
    Ok(Json(PpaListResponse {
        total: ppas.len(),
        ppas,
    }))
}

/// GET /api/v1/ppas/states
pub async fn list_states(_auth: Authenticated) -> Json<StateListResponse> {
    Json(StateListResponse { states: STATES })
}
