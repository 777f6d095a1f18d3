//! Repository for the `incidents` table.

use fieldwatch_core::incident::{Incident, IncidentDraft, IncidentFilter};
use fieldwatch_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::models::incident::IncidentRow;

/// Column list for incidents queries.
const COLUMNS: &str = "id, title, description, severity, status, resolution_type, \
    resolution_notes, ai_verification_status, ai_confidence_score, ai_verification_reason, \
    assigned_to, reporter_type, reported_by, asset_id, maintenance_record_id, cost_status, \
    merged_reporter_ids, related_incidents, upvotes, comments, created_at, updated_at, \
    resolved_at, closed_at, version";

pub struct IncidentRepo;

impl IncidentRepo {
    /// Insert a newly reported incident at version 1.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        draft: &IncidentDraft,
    ) -> Result<IncidentRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO incidents
                (title, description, severity, reporter_type, reported_by, asset_id,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IncidentRow>(&query)
            .bind(&draft.title)
            .bind(&draft.description)
            .bind(draft.severity.as_str())
            .bind(draft.reporter_type.as_str())
            .bind(draft.reported_by)
            .bind(draft.asset_id)
            .bind(draft.created_at)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<IncidentRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM incidents WHERE id = $1");
        sqlx::query_as::<_, IncidentRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Current version of an incident, if it exists.
    pub async fn version_of<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT version FROM incidents WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// List incidents matching every present filter, newest first.
    pub async fn list<'e>(
        executor: impl PgExecutor<'e>,
        filter: &IncidentFilter,
    ) -> Result<Vec<IncidentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM incidents
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR severity = $2)
               AND ($3::text IS NULL OR ai_verification_status = $3)
             ORDER BY created_at DESC, id DESC
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, IncidentRow>(&query)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.severity.map(|s| s.as_str()))
            .bind(filter.ai_verification_status.map(|s| s.as_str()))
            .bind(filter.effective_limit())
            .bind(filter.effective_offset())
            .fetch_all(executor)
            .await
    }

    /// Lock the given incidents for update, in id order.
    ///
    /// Locking in a fixed order keeps concurrent merge approvals that share
    /// incidents from deadlocking.
    pub async fn lock_many<'e>(
        executor: impl PgExecutor<'e>,
        ids: &[DbId],
    ) -> Result<Vec<IncidentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM incidents
             WHERE id = ANY($1)
             ORDER BY id
             FOR UPDATE"
        );
        sqlx::query_as::<_, IncidentRow>(&query)
            .bind(ids)
            .fetch_all(executor)
            .await
    }

    /// Ids from `candidates` already listed in `merged_reporter_ids` of an
    /// incident other than `primary_id`.
    pub async fn absorbed_elsewhere<'e>(
        executor: impl PgExecutor<'e>,
        primary_id: DbId,
        candidates: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT DISTINCT absorbed
             FROM incidents, unnest(merged_reporter_ids) AS absorbed
             WHERE id <> $1
               AND absorbed = ANY($2)",
        )
        .bind(primary_id)
        .bind(candidates)
        .fetch_all(executor)
        .await
    }

    /// Write every mutable column if the stored version still equals
    /// `expected_version`, bumping the version by one.
    ///
    /// Returns `None` when the row is missing or the version moved on.
    pub async fn update_if_version<'e>(
        executor: impl PgExecutor<'e>,
        incident: &Incident,
        expected_version: i64,
    ) -> Result<Option<IncidentRow>, sqlx::Error> {
        let query = format!(
            "UPDATE incidents SET
                title = $3,
                description = $4,
                severity = $5,
                status = $6,
                resolution_type = $7,
                resolution_notes = $8,
                ai_verification_status = $9,
                ai_confidence_score = $10,
                ai_verification_reason = $11,
                assigned_to = $12,
                asset_id = $13,
                maintenance_record_id = $14,
                cost_status = $15,
                merged_reporter_ids = $16,
                related_incidents = $17,
                upvotes = $18,
                comments = $19,
                updated_at = $20,
                resolved_at = $21,
                closed_at = $22,
                version = version + 1
             WHERE id = $1 AND version = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IncidentRow>(&query)
            .bind(incident.id)
            .bind(expected_version)
            .bind(&incident.title)
            .bind(&incident.description)
            .bind(incident.severity.as_str())
            .bind(incident.status.as_str())
            .bind(incident.resolution_type.map(|t| t.as_str()))
            .bind(&incident.resolution_notes)
            .bind(incident.ai_verification_status.as_str())
            .bind(incident.ai_confidence_score)
            .bind(&incident.ai_verification_reason)
            .bind(&incident.assigned_to)
            .bind(incident.asset_id)
            .bind(incident.maintenance_record_id)
            .bind(incident.cost_status.as_str())
            .bind(incident.merged_reporter_ids.as_slice())
            .bind(incident.related_incidents.as_slice())
            .bind(incident.upvotes)
            .bind(Json(&incident.comments))
            .bind(incident.updated_at)
            .bind(incident.resolved_at)
            .bind(incident.closed_at)
            .fetch_optional(executor)
            .await
    }
}
