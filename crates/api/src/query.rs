//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Optimistic concurrency guard accepted by every mutating endpoint
/// (`?expected_version=`).
#[derive(Debug, Default, Deserialize)]
pub struct VersionParams {
    pub expected_version: Option<i64>,
}

/// Optional free-text notes (`?notes=`).
#[derive(Debug, Default, Deserialize)]
pub struct NotesParams {
    pub notes: Option<String>,
}
