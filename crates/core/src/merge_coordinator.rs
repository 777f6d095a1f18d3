//! Duplicate scans and merge suggestion review.
//!
//! A scan calls the similarity oracle with no store lock held and writes
//! the resulting suggestion in one upsert, so a failed or timed-out scan
//! leaves nothing behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::CoreError;
use crate::incident::Incident;
use crate::lifecycle::log_rejection;
use crate::merge::{DuplicateCandidate, MergeApproval, MergeSuggestion, NewMergeSuggestion, SuggestionStatus};
use crate::oracle::{self, OracleError, SimilarityOracle};
use crate::roles::{Actor, Permission};
use crate::store::IncidentStore;
use crate::types::DbId;

/// Default upper bound for one oracle call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(20);

pub struct MergeCoordinator {
    store: Arc<dyn IncidentStore>,
    oracle: Arc<dyn SimilarityOracle>,
    oracle_timeout: Duration,
}

impl MergeCoordinator {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        oracle: Arc<dyn SimilarityOracle>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            oracle,
            oracle_timeout,
        }
    }

    /// Ask the oracle for duplicates of `incident_id` and record them.
    ///
    /// Returns `None` when no usable candidate came back; an existing
    /// pending suggestion is then left as it was.
    pub async fn check_duplicates(
        &self,
        actor: &Actor,
        incident_id: DbId,
    ) -> Result<Option<MergeSuggestion>, CoreError> {
        let result = self.scan(actor, incident_id).await;
        match &result {
            Ok(Some(suggestion)) => tracing::info!(
                incident_id,
                user_id = actor.user_id,
                suggestion_id = suggestion.id,
                candidates = suggestion.duplicate_incident_ids.len(),
                similarity_score = suggestion.similarity_score,
                "Duplicate scan recorded suggestion"
            ),
            Ok(None) => tracing::info!(
                incident_id,
                user_id = actor.user_id,
                "Duplicate scan found no candidates"
            ),
            Err(CoreError::ExternalService(msg)) => tracing::warn!(
                incident_id,
                error = %msg,
                "Similarity oracle call failed"
            ),
            Err(err) => log_rejection(actor, incident_id, "check_duplicates", err),
        }
        result
    }

    async fn scan(
        &self,
        actor: &Actor,
        incident_id: DbId,
    ) -> Result<Option<MergeSuggestion>, CoreError> {
        actor.require(Permission::Triage)?;

        let incident = self.store.get_incident(incident_id).await?;
        if incident.is_duplicate() {
            return Err(CoreError::Validation(format!(
                "Incident {incident_id} is already merged as a duplicate"
            )));
        }

        let candidates = self.ask_oracle(&incident).await?;
        let usable = self.usable_candidates(&incident, candidates).await?;

        let now = Utc::now();
        match NewMergeSuggestion::aggregate(incident_id, &usable, now) {
            Some(scan) => Ok(Some(self.store.upsert_pending_suggestion(scan).await?)),
            None => {
                let retired = self.store.retire_pending_suggestion(incident_id, now).await?;
                if let Some(retired) = retired {
                    tracing::info!(
                        incident_id,
                        suggestion_id = retired.id,
                        "Pending merge suggestion superseded by empty rescan"
                    );
                }
                Ok(None)
            }
        }
    }

    async fn ask_oracle(&self, incident: &Incident) -> Result<Vec<DuplicateCandidate>, OracleError> {
        let candidates = tokio::time::timeout(self.oracle_timeout, self.oracle.find_duplicates(incident))
            .await
            .map_err(|_| {
                OracleError::Request(format!(
                    "timed out after {}s",
                    self.oracle_timeout.as_secs_f64()
                ))
            })??;
        oracle::validate_candidates(&candidates)?;
        Ok(candidates)
    }

    /// Drop candidates that cannot be merged into `source`.
    async fn usable_candidates(
        &self,
        source: &Incident,
        candidates: Vec<DuplicateCandidate>,
    ) -> Result<Vec<DuplicateCandidate>, CoreError> {
        let mut usable = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.incident_id == source.id {
                continue;
            }
            let other = match self.store.get_incident(candidate.incident_id).await {
                Ok(other) => other,
                Err(CoreError::NotFound { .. }) => {
                    tracing::debug!(
                        incident_id = source.id,
                        candidate_id = candidate.incident_id,
                        "Dropping unknown duplicate candidate"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };
            if other.is_duplicate() || !other.merged_reporter_ids.is_empty() {
                continue;
            }
            usable.push(candidate);
        }
        Ok(usable)
    }

    /// Suggestions whose primary is `incident_id`, newest first.
    pub async fn suggestions(
        &self,
        actor: &Actor,
        incident_id: DbId,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<MergeSuggestion>, CoreError> {
        actor.require(Permission::InternalNotes)?;
        self.store.get_incident(incident_id).await?;
        self.store.list_suggestions(incident_id, status).await
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        suggestion_id: DbId,
    ) -> Result<MergeApproval, CoreError> {
        let result = async {
            actor.require(Permission::Triage)?;
            self.store
                .approve_suggestion(suggestion_id, actor.user_id, Utc::now())
                .await
        }
        .await;

        match &result {
            Ok(approval) => tracing::info!(
                suggestion_id,
                incident_id = approval.primary.id,
                user_id = actor.user_id,
                merged = approval.duplicates.len(),
                version = approval.primary.version,
                "Merge suggestion approved"
            ),
            Err(err) => log_review_rejection(actor, suggestion_id, "approve_merge", err),
        }
        result
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        suggestion_id: DbId,
        notes: Option<String>,
    ) -> Result<MergeSuggestion, CoreError> {
        let result = async {
            actor.require(Permission::Triage)?;
            self.store
                .reject_suggestion(suggestion_id, notes, actor.user_id, Utc::now())
                .await
        }
        .await;

        match &result {
            Ok(suggestion) => tracing::info!(
                suggestion_id,
                incident_id = suggestion.source_incident_id,
                user_id = actor.user_id,
                "Merge suggestion rejected"
            ),
            Err(err) => log_review_rejection(actor, suggestion_id, "reject_merge", err),
        }
        result
    }
}

fn log_review_rejection(actor: &Actor, suggestion_id: DbId, command: &str, err: &CoreError) {
    match err {
        CoreError::Conflict(_) | CoreError::PermissionDenied(_) => tracing::warn!(
            suggestion_id,
            user_id = actor.user_id,
            role = %actor.role,
            command,
            error = %err,
            "Merge review refused"
        ),
        CoreError::Internal(_) => tracing::error!(
            suggestion_id,
            command,
            error = %err,
            "Merge review failed"
        ),
        _ => tracing::debug!(
            suggestion_id,
            user_id = actor.user_id,
            command,
            error = %err,
            "Merge review rejected"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
