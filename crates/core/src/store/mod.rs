//! Persistence seam for incidents, merge suggestions and maintenance records.
//!
//! - [`memory::InMemoryIncidentStore`] -- process-local store for tests and
//!   local development.
//! - `fieldwatch_db::PgIncidentStore` -- PostgreSQL implementation.
//!
//! Every write is a compare-and-swap on the aggregate `version`; merge
//! approval is the only multi-aggregate write and must be atomic.

pub mod memory;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::incident::{Incident, IncidentDraft, IncidentFilter, MaintenanceRecord, NewMaintenance};
use crate::merge::{MergeApproval, MergeSuggestion, NewMergeSuggestion, SuggestionStatus};
use crate::types::{DbId, Timestamp};

#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Short backend name for health reporting.
    fn backend(&self) -> &'static str;

    /// Insert a new incident at version 1.
    async fn insert_incident(&self, draft: IncidentDraft) -> Result<Incident, CoreError>;

    /// Load an incident or fail with `NotFound`.
    async fn get_incident(&self, id: DbId) -> Result<Incident, CoreError>;

    /// List incidents matching `filter`, newest first.
    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, CoreError>;

    /// Persist `incident` if the stored version still equals
    /// `expected_version`. Returns the stored incident at `expected_version + 1`.
    async fn save_incident(
        &self,
        incident: &Incident,
        expected_version: i64,
    ) -> Result<Incident, CoreError>;

    /// Create a maintenance record and link it to `incident`, saved with the
    /// same compare-and-swap as [`IncidentStore::save_incident`]. Both or
    /// neither are written.
    async fn attach_maintenance(
        &self,
        incident: &Incident,
        expected_version: i64,
        request: &NewMaintenance,
    ) -> Result<(Incident, MaintenanceRecord), CoreError>;

    /// The maintenance record linked to an incident, if any.
    async fn get_maintenance(
        &self,
        incident_id: DbId,
    ) -> Result<Option<MaintenanceRecord>, CoreError>;

    /// Create a pending suggestion for the source incident, or replace the
    /// candidate set of the one already pending.
    async fn upsert_pending_suggestion(
        &self,
        suggestion: NewMergeSuggestion,
    ) -> Result<MergeSuggestion, CoreError>;

    /// Retire the pending suggestion for `source_incident_id`, if any, with
    /// [`crate::merge::supersede`]. Returns the retired suggestion.
    async fn retire_pending_suggestion(
        &self,
        source_incident_id: DbId,
        now: Timestamp,
    ) -> Result<Option<MergeSuggestion>, CoreError>;

    async fn get_suggestion(&self, id: DbId) -> Result<MergeSuggestion, CoreError>;

    /// Suggestions whose source is `incident_id`, newest first.
    async fn list_suggestions(
        &self,
        incident_id: DbId,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<MergeSuggestion>, CoreError>;

    /// Approve a pending suggestion and apply it to every incident it names
    /// in one transaction, using [`crate::merge::plan_merge`]. Concurrent
    /// calls for the same suggestion yield one success and `Conflict` for
    /// the rest.
    async fn approve_suggestion(
        &self,
        id: DbId,
        resolver: DbId,
        now: Timestamp,
    ) -> Result<MergeApproval, CoreError>;

    /// Reject a pending suggestion. `Conflict` if already resolved.
    async fn reject_suggestion(
        &self,
        id: DbId,
        notes: Option<String>,
        resolver: DbId,
        now: Timestamp,
    ) -> Result<MergeSuggestion, CoreError>;
}

/// `Conflict` for a stale expected version.
pub fn version_conflict(id: DbId, expected: i64, actual: i64) -> CoreError {
    CoreError::Conflict(format!(
        "Incident {id} was modified concurrently (expected version {expected}, found {actual})"
    ))
}
