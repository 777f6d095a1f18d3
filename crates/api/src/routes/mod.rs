pub mod health;
pub mod incidents;
pub mod merge_suggestions;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /incidents                                   list, report
/// /incidents/hierarchy                         grouped view
/// /incidents/{id}                              get
/// /incidents/{id}/acknowledge                  POST
/// /incidents/{id}/assign                       POST ?assigned_to=
/// /incidents/{id}/resolve                      POST ?resolution_notes=&resolution_type=
/// /incidents/{id}/reject                       POST ?reason=
/// /incidents/{id}/verify                       POST
/// /incidents/{id}/close                        POST ?notes=
/// /incidents/{id}/approve-cost                 POST
/// /incidents/{id}/ai-assessment                POST
/// /incidents/{id}/create-maintenance           POST
/// /incidents/{id}/maintenance                  GET
/// /incidents/{id}/comments                     POST
/// /incidents/{id}/upvote                       POST
/// /incidents/{id}/merge-suggestions            GET ?status=
/// /incidents/{id}/check-duplicates             POST
///
/// /merge-suggestions/{id}/approve              POST
/// /merge-suggestions/{id}/reject               POST ?notes=
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest(
            "/incidents",
            incidents::router().merge(merge_suggestions::incident_router()),
        )
        .nest("/merge-suggestions", merge_suggestions::router())
}
