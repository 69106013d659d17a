//! Reminder Routes
//!
//! - GET /api/v1/reminders - The caller's reminders, soonest first
//! - POST /api/v1/reminders - Add a reminder
//! - DELETE /api/v1/reminders/:id - Delete one of the caller's reminders

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::auth::Authenticated;
use crate::api::dto::ReminderListResponse;
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::services::{NewReminder, Reminder};

/// GET /api/v1/reminders
pub async fn list_reminders(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> ApiResult<Json<ReminderListResponse>> {
    let reminders = state.services.reminders.list(&session.user.uid).await?;
    Ok(Json(ReminderListResponse {
        total: reminders.len(),
        reminders,
    }))
}

/// POST /api/v1/reminders
pub async fn create_reminder(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Json(req): Json<NewReminder>,
) -> ApiResult<(StatusCode, Json<Reminder>)> {
    let reminder = state
        .services
        .reminders
        .add(&session.user.uid, req)
        .await?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

/// DELETE /api/v1/reminders/:id
pub async fn delete_reminder(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .services
        .reminders
        .delete(&session.user.uid, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
