//! Repository for the `merge_suggestions` table.

use fieldwatch_core::merge::{MergeSuggestion, NewMergeSuggestion, SuggestionStatus};
use fieldwatch_core::types::{DbId, Timestamp};
use sqlx::PgExecutor;

use crate::models::merge_suggestion::MergeSuggestionRow;

const COLUMNS: &str = "id, source_incident_id, duplicate_incident_ids, similarity_score, \
    match_reasons, status, created_at, updated_at, resolved_at, resolved_by, resolver_notes";

pub struct MergeSuggestionRepo;

impl MergeSuggestionRepo {
    /// Insert a pending suggestion, or replace the candidate set of the one
    /// already pending for the same source incident.
    pub async fn upsert_pending<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewMergeSuggestion,
    ) -> Result<MergeSuggestionRow, sqlx::Error> {
        let reasons: Vec<String> = input
            .match_reasons
            .iter()
            .map(|r| r.as_str().to_string())
            .collect();
        let query = format!(
            "INSERT INTO merge_suggestions
                (source_incident_id, duplicate_incident_ids, similarity_score, match_reasons,
                 status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'pending', $5, $5)
             ON CONFLICT (source_incident_id) WHERE status = 'pending'
             DO UPDATE SET
                duplicate_incident_ids = EXCLUDED.duplicate_incident_ids,
                similarity_score = EXCLUDED.similarity_score,
                match_reasons = EXCLUDED.match_reasons,
                updated_at = EXCLUDED.updated_at
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MergeSuggestionRow>(&query)
            .bind(input.source_incident_id)
            .bind(input.duplicate_incident_ids.as_slice())
            .bind(input.similarity_score)
            .bind(reasons)
            .bind(input.scanned_at)
            .fetch_one(executor)
            .await
    }

    /// Resolve the pending suggestion for a source incident as rejected
    /// with a system note. `None` when nothing was pending.
    pub async fn retire_pending<'e>(
        executor: impl PgExecutor<'e>,
        source_incident_id: DbId,
        notes: &str,
        now: Timestamp,
    ) -> Result<Option<MergeSuggestionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE merge_suggestions SET
                status = 'rejected',
                resolved_at = $3,
                resolved_by = NULL,
                resolver_notes = $2,
                updated_at = $3
             WHERE source_incident_id = $1 AND status = 'pending'
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MergeSuggestionRow>(&query)
            .bind(source_incident_id)
            .bind(notes)
            .bind(now)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<MergeSuggestionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM merge_suggestions WHERE id = $1");
        sqlx::query_as::<_, MergeSuggestionRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Load and lock a suggestion row for the rest of the transaction.
    pub async fn lock<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<MergeSuggestionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM merge_suggestions WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, MergeSuggestionRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Suggestions for a source incident, newest first.
    pub async fn list_for_incident<'e>(
        executor: impl PgExecutor<'e>,
        incident_id: DbId,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<MergeSuggestionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM merge_suggestions
             WHERE source_incident_id = $1
               AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, MergeSuggestionRow>(&query)
            .bind(incident_id)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(executor)
            .await
    }

    /// Persist a resolution. Only a row still `pending` is touched, so a
    /// concurrent resolver gets `None`.
    pub async fn resolve<'e>(
        executor: impl PgExecutor<'e>,
        resolved: &MergeSuggestion,
    ) -> Result<Option<MergeSuggestionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE merge_suggestions SET
                status = $2,
                resolved_at = $3,
                resolved_by = $4,
                resolver_notes = $5,
                updated_at = $6
             WHERE id = $1 AND status = 'pending'
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MergeSuggestionRow>(&query)
            .bind(resolved.id)
            .bind(resolved.status.as_str())
            .bind(resolved.resolved_at)
            .bind(resolved.resolved_by)
            .bind(&resolved.resolver_notes)
            .bind(resolved.updated_at)
            .fetch_optional(executor)
            .await
    }
}
