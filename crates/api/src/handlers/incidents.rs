//! Handlers for the `/incidents` resource.
//!
//! Every mutating handler accepts `?expected_version=` and returns the
//! updated incident, including its new `version`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use fieldwatch_core::incident::{IncidentFilter, NewIncident, NewMaintenance, ResolutionType};
use fieldwatch_core::roles::Permission;
use fieldwatch_core::transition::IncidentCommand;
use fieldwatch_core::types::DbId;
use fieldwatch_core::verification::AiAssessment;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::{NotesParams, VersionParams};
use crate::response::{DataResponse, IncidentResponse, MaintenanceResponse};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AssignParams {
    pub assigned_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub resolution_notes: Option<String>,
    pub resolution_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectParams {
    pub reason: Option<String>,
}

/// Request body for `POST /incidents/{id}/comments`.
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub comment: String,
    #[serde(default)]
    pub is_internal: bool,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /api/v1/incidents?status=&severity=&ai_verification_status=&limit=&offset=
pub async fn list(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<IncidentFilter>,
) -> AppResult<impl IntoResponse> {
    let incidents = state.lifecycle.list(&user.actor(), &filter).await?;
    let data: Vec<IncidentResponse> = incidents.into_iter().map(Into::into).collect();
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/incidents/hierarchy
///
/// Same filters as [`list`]; duplicates are nested under their primaries.
pub async fn hierarchy(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<IncidentFilter>,
) -> AppResult<impl IntoResponse> {
    let groups = state.lifecycle.hierarchy(&user.actor(), &filter).await?;
    Ok(Json(DataResponse { data: groups }))
}

/// GET /api/v1/incidents/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let incident = state.lifecycle.get(&user.actor(), id).await?;
    Ok(Json(DataResponse {
        data: IncidentResponse::from(incident),
    }))
}

/// GET /api/v1/incidents/{id}/maintenance
///
/// The linked maintenance record, or `null`.
pub async fn maintenance(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let record = state.lifecycle.maintenance(&user.actor(), id).await?;
    Ok(Json(DataResponse { data: record }))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// POST /api/v1/incidents
pub async fn report(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<NewIncident>,
) -> AppResult<impl IntoResponse> {
    let incident = state.lifecycle.report(&user.actor(), input).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: IncidentResponse::from(incident),
        }),
    ))
}

async fn run(
    state: &AppState,
    user: &AuthUser,
    id: DbId,
    version: VersionParams,
    command: IncidentCommand,
) -> AppResult<Json<DataResponse<IncidentResponse>>> {
    let incident = state
        .lifecycle
        .execute(&user.actor(), id, version.expected_version, command)
        .await?;
    Ok(Json(DataResponse {
        data: IncidentResponse::from(incident),
    }))
}

/// POST /api/v1/incidents/{id}/acknowledge
pub async fn acknowledge(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
) -> AppResult<impl IntoResponse> {
    run(&state, &user, id, version, IncidentCommand::Acknowledge).await
}

/// POST /api/v1/incidents/{id}/assign?assigned_to=
pub async fn assign(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
    Query(params): Query<AssignParams>,
) -> AppResult<impl IntoResponse> {
    let command = IncidentCommand::Assign {
        assigned_to: params.assigned_to.unwrap_or_default(),
    };
    run(&state, &user, id, version, command).await
}

/// POST /api/v1/incidents/{id}/resolve?resolution_notes=&resolution_type=
pub async fn resolve(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
    Query(params): Query<ResolveParams>,
) -> AppResult<impl IntoResponse> {
    // Role first, so unauthorized callers never learn about payload errors.
    user.actor().require(Permission::Resolve)?;
    let resolution_type: ResolutionType = params
        .resolution_type
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("resolution_type is required".into()))?
        .parse()?;
    let command = IncidentCommand::Resolve {
        notes: params.resolution_notes.unwrap_or_default(),
        resolution_type,
    };
    run(&state, &user, id, version, command).await
}

/// POST /api/v1/incidents/{id}/reject?reason=
pub async fn reject(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
    Query(params): Query<RejectParams>,
) -> AppResult<impl IntoResponse> {
    let command = IncidentCommand::Reject {
        reason: params.reason.unwrap_or_default(),
    };
    run(&state, &user, id, version, command).await
}

/// POST /api/v1/incidents/{id}/verify
pub async fn verify(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
) -> AppResult<impl IntoResponse> {
    run(&state, &user, id, version, IncidentCommand::Verify).await
}

/// POST /api/v1/incidents/{id}/close?notes=
pub async fn close(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
    Query(params): Query<NotesParams>,
) -> AppResult<impl IntoResponse> {
    let command = IncidentCommand::Close {
        notes: params.notes,
    };
    run(&state, &user, id, version, command).await
}

/// POST /api/v1/incidents/{id}/approve-cost
pub async fn approve_cost(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
) -> AppResult<impl IntoResponse> {
    run(&state, &user, id, version, IncidentCommand::ApproveCost).await
}

/// POST /api/v1/incidents/{id}/ai-assessment
pub async fn record_assessment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
    Json(assessment): Json<AiAssessment>,
) -> AppResult<impl IntoResponse> {
    run(
        &state,
        &user,
        id,
        version,
        IncidentCommand::RecordAssessment(assessment),
    )
    .await
}

/// POST /api/v1/incidents/{id}/comments
pub async fn add_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
    Json(input): Json<CommentRequest>,
) -> AppResult<impl IntoResponse> {
    let command = IncidentCommand::AddComment {
        comment: input.comment,
        is_internal: input.is_internal,
    };
    run(&state, &user, id, version, command).await
}

/// POST /api/v1/incidents/{id}/upvote
pub async fn upvote(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
) -> AppResult<impl IntoResponse> {
    run(&state, &user, id, version, IncidentCommand::Upvote).await
}

/// POST /api/v1/incidents/{id}/create-maintenance
pub async fn create_maintenance(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(version): Query<VersionParams>,
    Json(input): Json<NewMaintenance>,
) -> AppResult<impl IntoResponse> {
    let (incident, record) = state
        .lifecycle
        .open_maintenance(&user.actor(), id, version.expected_version, input)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: MaintenanceResponse {
                incident: incident.into(),
                maintenance_record: record,
            },
        }),
    ))
}
