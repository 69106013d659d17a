//! Resource Routes (public)
//!
//! - GET /api/v1/resources?kind= - List letters and tips
//! - GET /api/v1/resources/:kind/:id - One resource
//! - GET /api/v1/resources/:kind/:id/download - The resource as a text file

use axum::{
    extract::{Path, Query},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::api::dto::{ResourceListParams, ResourceListResponse};
use crate::api::error::ApiResult;
use crate::services::{resources, Resource, ResourceKind};

/// GET /api/v1/resources
pub async fn list_resources(
    Query(params): Query<ResourceListParams>,
) -> ApiResult<Json<ResourceListResponse>> {
    let resources: Vec<Resource> = match params.kind.as_deref() {
        Some(kind) => resources::catalogue(kind.parse()?).to_vec(),
        None => [ResourceKind::Letter, ResourceKind::Tip]
            .into_iter()
            .flat_map(|kind| resources::catalogue(kind).iter().cloned())
            .collect(),
    };

    Ok(Json(ResourceListResponse {
        total: resources.len(),
        resources,
    }))
}

/// GET /api/v1/resources/:kind/:id
pub async fn get_resource(
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<Resource>> {
    let resource = resources::find(kind.parse()?, &id)?;
    Ok(Json(resource.clone()))
}

/// GET /api/v1/resources/:kind/:id/download
pub async fn download_resource(
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let file = resources::download(kind.parse()?, &id)?;
    let disposition = format!("attachment; filename=\"{}\"", file.filename);

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.body,
    ))
}
