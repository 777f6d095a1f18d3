//! Route definitions for duplicate detection and merge review.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::merge_suggestions;
use crate::state::AppState;

/// Incident-scoped routes, merged into `/incidents`.
///
/// ```text
/// GET    /{id}/merge-suggestions    -> list_for_incident
/// POST   /{id}/check-duplicates     -> check_duplicates
/// ```
pub fn incident_router() -> Router<AppState> {
    Router::new()
        .route(
            "/{id}/merge-suggestions",
            get(merge_suggestions::list_for_incident),
        )
        .route(
            "/{id}/check-duplicates",
            post(merge_suggestions::check_duplicates),
        )
}

/// Routes mounted at `/merge-suggestions`.
///
/// ```text
/// POST   /{id}/approve              -> approve
/// POST   /{id}/reject               -> reject
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/approve", post(merge_suggestions::approve))
        .route("/{id}/reject", post(merge_suggestions::reject))
}
