//! PostgreSQL implementation of [`IncidentStore`].
//!
//! Single-incident writes are a compare-and-swap on `version`. Merge
//! approval locks the suggestion row and then every incident it names (in
//! id order) before applying [`merge::plan_merge`] in the same transaction.

use std::collections::HashSet;

use async_trait::async_trait;
use fieldwatch_core::error::CoreError;
use fieldwatch_core::incident::{
    Incident, IncidentDraft, IncidentFilter, MaintenanceRecord, NewMaintenance,
};
use fieldwatch_core::merge::{
    self, MergeApproval, MergeSuggestion, NewMergeSuggestion, SuggestionStatus,
};
use fieldwatch_core::store::{version_conflict, IncidentStore};
use fieldwatch_core::types::{DbId, Timestamp};
use sqlx::PgConnection;

use crate::models::incident::IncidentRow;
use crate::repositories::{IncidentRepo, MaintenanceRepo, MergeSuggestionRepo};
use crate::DbPool;

pub struct PgIncidentStore {
    pool: DbPool,
}

impl PgIncidentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Map a driver error into the domain taxonomy.
///
/// Unique violations mean a concurrent writer won; everything else is an
/// internal failure whose detail stays in the log.
pub(crate) fn db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return CoreError::Conflict(format!(
                "Concurrent write rejected by {}",
                db_err.constraint().unwrap_or("a unique constraint")
            ));
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Internal("database operation failed".into())
}

fn incident_not_found(id: DbId) -> CoreError {
    CoreError::NotFound {
        entity: "Incident",
        id,
    }
}

fn suggestion_not_found(id: DbId) -> CoreError {
    CoreError::NotFound {
        entity: "MergeSuggestion",
        id,
    }
}

/// Compare-and-swap write; distinguishes a missing row from a stale version.
async fn save_on(
    conn: &mut PgConnection,
    incident: &Incident,
    expected_version: i64,
) -> Result<Incident, CoreError> {
    let updated = IncidentRepo::update_if_version(&mut *conn, incident, expected_version)
        .await
        .map_err(db_error)?;
    match updated {
        Some(row) => Incident::try_from(row),
        None => match IncidentRepo::version_of(&mut *conn, incident.id)
            .await
            .map_err(db_error)?
        {
            Some(actual) => Err(version_conflict(incident.id, expected_version, actual)),
            None => Err(incident_not_found(incident.id)),
        },
    }
}

fn into_incidents(rows: Vec<IncidentRow>) -> Result<Vec<Incident>, CoreError> {
    rows.into_iter().map(Incident::try_from).collect()
}

#[async_trait]
impl IncidentStore for PgIncidentStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn insert_incident(&self, draft: IncidentDraft) -> Result<Incident, CoreError> {
        let row = IncidentRepo::create(&self.pool, &draft)
            .await
            .map_err(db_error)?;
        Incident::try_from(row)
    }

    async fn get_incident(&self, id: DbId) -> Result<Incident, CoreError> {
        IncidentRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_error)?
            .ok_or_else(|| incident_not_found(id))
            .and_then(Incident::try_from)
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, CoreError> {
        let rows = IncidentRepo::list(&self.pool, filter)
            .await
            .map_err(db_error)?;
        into_incidents(rows)
    }

    async fn save_incident(
        &self,
        incident: &Incident,
        expected_version: i64,
    ) -> Result<Incident, CoreError> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        save_on(&mut conn, incident, expected_version).await
    }

    async fn attach_maintenance(
        &self,
        incident: &Incident,
        expected_version: i64,
        request: &NewMaintenance,
    ) -> Result<(Incident, MaintenanceRecord), CoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let record =
            MaintenanceRepo::create(&mut *tx, incident.id, request, incident.updated_at)
                .await
                .map_err(db_error)?;

        let mut linked = incident.clone();
        linked.maintenance_record_id = Some(record.id);
        // Dropping `tx` on error rolls the record back.
        let saved = save_on(&mut tx, &linked, expected_version).await?;

        tx.commit().await.map_err(db_error)?;
        Ok((saved, record.into()))
    }

    async fn get_maintenance(
        &self,
        incident_id: DbId,
    ) -> Result<Option<MaintenanceRecord>, CoreError> {
        if IncidentRepo::version_of(&self.pool, incident_id)
            .await
            .map_err(db_error)?
            .is_none()
        {
            return Err(incident_not_found(incident_id));
        }
        let row = MaintenanceRepo::find_for_incident(&self.pool, incident_id)
            .await
            .map_err(db_error)?;
        Ok(row.map(MaintenanceRecord::from))
    }

    async fn upsert_pending_suggestion(
        &self,
        suggestion: NewMergeSuggestion,
    ) -> Result<MergeSuggestion, CoreError> {
        if IncidentRepo::version_of(&self.pool, suggestion.source_incident_id)
            .await
            .map_err(db_error)?
            .is_none()
        {
            return Err(incident_not_found(suggestion.source_incident_id));
        }
        let row = MergeSuggestionRepo::upsert_pending(&self.pool, &suggestion)
            .await
            .map_err(db_error)?;
        MergeSuggestion::try_from(row)
    }

    async fn retire_pending_suggestion(
        &self,
        source_incident_id: DbId,
        now: Timestamp,
    ) -> Result<Option<MergeSuggestion>, CoreError> {
        MergeSuggestionRepo::retire_pending(
            &self.pool,
            source_incident_id,
            merge::SUPERSEDED_NOTE,
            now,
        )
        .await
        .map_err(db_error)?
        .map(MergeSuggestion::try_from)
        .transpose()
    }

    async fn get_suggestion(&self, id: DbId) -> Result<MergeSuggestion, CoreError> {
        MergeSuggestionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_error)?
            .ok_or_else(|| suggestion_not_found(id))
            .and_then(MergeSuggestion::try_from)
    }

    async fn list_suggestions(
        &self,
        incident_id: DbId,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<MergeSuggestion>, CoreError> {
        MergeSuggestionRepo::list_for_incident(&self.pool, incident_id, status)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(MergeSuggestion::try_from)
            .collect()
    }

    async fn approve_suggestion(
        &self,
        id: DbId,
        resolver: DbId,
        now: Timestamp,
    ) -> Result<MergeApproval, CoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let suggestion = MergeSuggestionRepo::lock(&mut *tx, id)
            .await
            .map_err(db_error)?
            .ok_or_else(|| suggestion_not_found(id))
            .and_then(MergeSuggestion::try_from)?;
        suggestion.ensure_pending()?;

        let mut ids: Vec<DbId> = suggestion.duplicate_incident_ids.clone();
        ids.push(suggestion.source_incident_id);
        ids.sort_unstable();
        ids.dedup();
        let locked = into_incidents(
            IncidentRepo::lock_many(&mut *tx, &ids)
                .await
                .map_err(db_error)?,
        )?;

        let (primaries, duplicates): (Vec<Incident>, Vec<Incident>) = locked
            .into_iter()
            .partition(|i| i.id == suggestion.source_incident_id);
        let primary = primaries
            .into_iter()
            .next()
            .ok_or_else(|| incident_not_found(suggestion.source_incident_id))?;

        let absorbed_elsewhere: HashSet<DbId> = IncidentRepo::absorbed_elsewhere(
            &mut *tx,
            primary.id,
            &suggestion.duplicate_incident_ids,
        )
        .await
        .map_err(db_error)?
        .into_iter()
        .collect();

        let plan = merge::plan_merge(
            &suggestion,
            &primary,
            &duplicates,
            &absorbed_elsewhere,
            resolver,
            now,
        )?;

        let stored_primary = save_on(&mut tx, &plan.primary, plan.primary.version).await?;
        let mut stored_duplicates = Vec::with_capacity(plan.duplicates.len());
        for duplicate in &plan.duplicates {
            stored_duplicates.push(save_on(&mut tx, duplicate, duplicate.version).await?);
        }

        let resolved = MergeSuggestionRepo::resolve(&mut *tx, &plan.suggestion)
            .await
            .map_err(db_error)?
            .ok_or_else(|| {
                CoreError::Conflict(format!("Merge suggestion {id} is already resolved"))
            })
            .and_then(MergeSuggestion::try_from)?;

        tx.commit().await.map_err(db_error)?;

        Ok(MergeApproval {
            suggestion: resolved,
            primary: stored_primary,
            duplicates: stored_duplicates,
        })
    }

    async fn reject_suggestion(
        &self,
        id: DbId,
        notes: Option<String>,
        resolver: DbId,
        now: Timestamp,
    ) -> Result<MergeSuggestion, CoreError> {
        let mut suggestion = self.get_suggestion(id).await?;
        merge::reject(&mut suggestion, notes, resolver, now)?;

        MergeSuggestionRepo::resolve(&self.pool, &suggestion)
            .await
            .map_err(db_error)?
            .ok_or_else(|| {
                CoreError::Conflict(format!("Merge suggestion {id} is already resolved"))
            })
            .and_then(MergeSuggestion::try_from)
    }
}
