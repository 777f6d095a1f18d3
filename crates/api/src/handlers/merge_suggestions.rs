//! Handlers for duplicate scans and merge suggestion review.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use fieldwatch_core::merge::SuggestionStatus;
use fieldwatch_core::types::DbId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::query::NotesParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SuggestionFilter {
    pub status: Option<SuggestionStatus>,
}

/// GET /api/v1/incidents/{id}/merge-suggestions?status=
pub async fn list_for_incident(
    user: AuthUser,
    State(state): State<AppState>,
    Path(incident_id): Path<DbId>,
    Query(filter): Query<SuggestionFilter>,
) -> AppResult<impl IntoResponse> {
    let suggestions = state
        .merges
        .suggestions(&user.actor(), incident_id, filter.status)
        .await?;
    Ok(Json(DataResponse { data: suggestions }))
}

/// POST /api/v1/incidents/{id}/check-duplicates
///
/// Returns the pending suggestion, or `null` when the scan found nothing.
pub async fn check_duplicates(
    user: AuthUser,
    State(state): State<AppState>,
    Path(incident_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let suggestion = state
        .merges
        .check_duplicates(&user.actor(), incident_id)
        .await?;
    Ok(Json(DataResponse { data: suggestion }))
}

/// POST /api/v1/merge-suggestions/{id}/approve
pub async fn approve(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let approval = state.merges.approve(&user.actor(), id).await?;
    Ok(Json(DataResponse { data: approval }))
}

/// POST /api/v1/merge-suggestions/{id}/reject?notes=
pub async fn reject(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<NotesParams>,
) -> AppResult<impl IntoResponse> {
    let suggestion = state.merges.reject(&user.actor(), id, params.notes).await?;
    Ok(Json(DataResponse { data: suggestion }))
}
