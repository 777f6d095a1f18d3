//! Route definitions for incidents.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::incidents;
use crate::state::AppState;

/// Routes mounted at `/incidents`.
///
/// ```text
/// GET    /                          -> list
/// POST   /                          -> report
/// GET    /hierarchy                 -> hierarchy
/// GET    /{id}                      -> get_by_id
/// POST   /{id}/acknowledge          -> acknowledge
/// POST   /{id}/assign               -> assign
/// POST   /{id}/resolve              -> resolve
/// POST   /{id}/reject               -> reject
/// POST   /{id}/verify               -> verify
/// POST   /{id}/close                -> close
/// POST   /{id}/approve-cost         -> approve_cost
/// POST   /{id}/ai-assessment        -> record_assessment
/// POST   /{id}/create-maintenance   -> create_maintenance
/// GET    /{id}/maintenance          -> maintenance
/// POST   /{id}/comments             -> add_comment
/// POST   /{id}/upvote               -> upvote
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(incidents::list).post(incidents::report))
        .route("/hierarchy", get(incidents::hierarchy))
        .route("/{id}", get(incidents::get_by_id))
        .route("/{id}/acknowledge", post(incidents::acknowledge))
        .route("/{id}/assign", post(incidents::assign))
        .route("/{id}/resolve", post(incidents::resolve))
        .route("/{id}/reject", post(incidents::reject))
        .route("/{id}/verify", post(incidents::verify))
        .route("/{id}/close", post(incidents::close))
        .route("/{id}/approve-cost", post(incidents::approve_cost))
        .route("/{id}/ai-assessment", post(incidents::record_assessment))
        .route("/{id}/create-maintenance", post(incidents::create_maintenance))
        .route("/{id}/maintenance", get(incidents::maintenance))
        .route("/{id}/comments", post(incidents::add_comment))
        .route("/{id}/upvote", post(incidents::upvote))
}
