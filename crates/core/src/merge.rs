//! Merge suggestions and the pure merge plan.
//!
//! Stores call [`plan_merge`] inside their transaction after locking the
//! suggestion and every incident it names, then persist the plan as one
//! unit. Nothing here touches storage.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::incident::{Incident, ResolutionType};
use crate::types::{DbId, Timestamp};

define_text_enum! {
    /// Why the oracle considers two incidents the same.
    MatchReason {
        TextSimilarity = "text_similarity",
        LocationProximity = "location_proximity",
        AssetMatch = "asset_match",
        TimeProximity = "time_proximity",
        PossibleRecurrence = "possible_recurrence",
    }
}

define_text_enum! {
    /// Review state of a merge suggestion. Leaves `pending` exactly once.
    SuggestionStatus {
        Pending = "pending",
        Approved = "approved",
        Rejected = "rejected",
    }
}

/// A proposed grouping of a primary incident with its duplicate candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSuggestion {
    pub id: DbId,
    /// The primary incident.
    pub source_incident_id: DbId,
    pub duplicate_incident_ids: Vec<DbId>,
    pub similarity_score: f64,
    pub match_reasons: Vec<MatchReason>,
    pub status: SuggestionStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub resolved_by: Option<DbId>,
    pub resolver_notes: Option<String>,
}

impl MergeSuggestion {
    /// Fail with `Conflict` unless the suggestion is still pending.
    pub fn ensure_pending(&self) -> Result<(), CoreError> {
        if self.status == SuggestionStatus::Pending {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Merge suggestion {} is already resolved ({})",
                self.id, self.status
            )))
        }
    }
}

/// One duplicate candidate returned by the similarity oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub incident_id: DbId,
    pub score: f64,
    #[serde(default)]
    pub reasons: Vec<MatchReason>,
}

/// Candidate set produced by one duplicate scan, ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMergeSuggestion {
    pub source_incident_id: DbId,
    pub duplicate_incident_ids: Vec<DbId>,
    pub similarity_score: f64,
    pub match_reasons: Vec<MatchReason>,
    pub scanned_at: Timestamp,
}

impl NewMergeSuggestion {
    /// Aggregate a scan's candidates into one suggestion.
    ///
    /// Candidates are de-duplicated by incident id and sorted; the
    /// suggestion score is the best candidate score and the reasons are the
    /// union. Returns `None` when no candidate remains.
    pub fn aggregate(
        source_incident_id: DbId,
        candidates: &[DuplicateCandidate],
        scanned_at: Timestamp,
    ) -> Option<Self> {
        let mut best: BTreeMap<DbId, f64> = BTreeMap::new();
        let mut reasons: BTreeSet<MatchReason> = BTreeSet::new();
        for candidate in candidates {
            if candidate.incident_id == source_incident_id {
                continue;
            }
            let entry = best.entry(candidate.incident_id).or_insert(candidate.score);
            *entry = entry.max(candidate.score);
            reasons.extend(candidate.reasons.iter().copied());
        }
        let similarity_score = best.values().copied().reduce(f64::max)?;
        Some(Self {
            source_incident_id,
            duplicate_incident_ids: best.into_keys().collect(),
            similarity_score,
            match_reasons: reasons.into_iter().collect(),
            scanned_at,
        })
    }

    /// Build the stored row for a brand-new suggestion.
    pub fn into_suggestion(self, id: DbId) -> MergeSuggestion {
        MergeSuggestion {
            id,
            source_incident_id: self.source_incident_id,
            duplicate_incident_ids: self.duplicate_incident_ids,
            similarity_score: self.similarity_score,
            match_reasons: self.match_reasons,
            status: SuggestionStatus::Pending,
            created_at: self.scanned_at,
            updated_at: self.scanned_at,
            resolved_at: None,
            resolved_by: None,
            resolver_notes: None,
        }
    }

    /// Replace the candidate set of an existing pending suggestion.
    pub fn replace_candidates(self, existing: &mut MergeSuggestion) {
        existing.duplicate_incident_ids = self.duplicate_incident_ids;
        existing.similarity_score = self.similarity_score;
        existing.match_reasons = self.match_reasons;
        existing.updated_at = self.scanned_at;
    }
}

/// The fully computed effect of approving a suggestion.
///
/// Incident versions are unchanged; the store bumps each one on write.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub suggestion: MergeSuggestion,
    pub primary: Incident,
    pub duplicates: Vec<Incident>,
}

/// Result of a committed merge approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeApproval {
    pub suggestion: MergeSuggestion,
    pub primary: Incident,
    pub duplicates: Vec<Incident>,
}

/// Compute the merge of `duplicates` into `primary`.
///
/// `absorbed_elsewhere` holds duplicate ids already listed in the
/// `merged_reporter_ids` of an incident other than the primary.
///
/// Fails with `Conflict` when the suggestion is resolved or when the merge
/// would build a chain deeper than one level.
pub fn plan_merge(
    suggestion: &MergeSuggestion,
    primary: &Incident,
    duplicates: &[Incident],
    absorbed_elsewhere: &HashSet<DbId>,
    resolver: DbId,
    now: Timestamp,
) -> Result<MergePlan, CoreError> {
    suggestion.ensure_pending()?;

    if primary.id != suggestion.source_incident_id {
        return Err(CoreError::Internal(format!(
            "Merge suggestion {} loaded with primary {} instead of {}",
            suggestion.id, primary.id, suggestion.source_incident_id
        )));
    }
    if primary.is_duplicate() {
        return Err(CoreError::Conflict(format!(
            "Incident {} has itself been merged and cannot be a primary",
            primary.id
        )));
    }

    let loaded: HashSet<DbId> = duplicates.iter().map(|d| d.id).collect();
    if let Some(missing) = suggestion
        .duplicate_incident_ids
        .iter()
        .find(|id| !loaded.contains(id))
    {
        return Err(CoreError::NotFound {
            entity: "Incident",
            id: *missing,
        });
    }

    let mut next_primary = primary.clone();
    let mut next_duplicates = Vec::with_capacity(duplicates.len());
    for duplicate in duplicates {
        if duplicate.id == primary.id {
            return Err(CoreError::Conflict(format!(
                "Incident {} cannot be merged into itself",
                primary.id
            )));
        }
        if absorbed_elsewhere.contains(&duplicate.id) {
            return Err(CoreError::Conflict(format!(
                "Incident {} was already merged into another incident",
                duplicate.id
            )));
        }
        match duplicate.primary_id() {
            Some(existing) if existing != primary.id => {
                return Err(CoreError::Conflict(format!(
                    "Incident {} is already a duplicate of {existing}",
                    duplicate.id
                )));
            }
            _ => {}
        }
        if !duplicate.merged_reporter_ids.is_empty() {
            return Err(CoreError::Conflict(format!(
                "Incident {} is a primary for other incidents and cannot become a duplicate",
                duplicate.id
            )));
        }

        let mut next = duplicate.clone();
        next.resolution_type = Some(ResolutionType::Duplicate);
        next.related_incidents = vec![primary.id];
        next.updated_at = now;
        next_duplicates.push(next);

        if !next_primary.merged_reporter_ids.contains(&duplicate.id) {
            next_primary.merged_reporter_ids.push(duplicate.id);
        }
    }
    next_primary.updated_at = now;

    let mut next_suggestion = suggestion.clone();
    next_suggestion.status = SuggestionStatus::Approved;
    next_suggestion.resolved_at = Some(now);
    next_suggestion.resolved_by = Some(resolver);
    next_suggestion.updated_at = now;

    Ok(MergePlan {
        suggestion: next_suggestion,
        primary: next_primary,
        duplicates: next_duplicates,
    })
}

/// Resolve a pending suggestion as rejected. No incident changes.
pub fn reject(
    suggestion: &mut MergeSuggestion,
    notes: Option<String>,
    resolver: DbId,
    now: Timestamp,
) -> Result<(), CoreError> {
    suggestion.ensure_pending()?;
    suggestion.status = SuggestionStatus::Rejected;
    suggestion.resolver_notes = notes.filter(|n| !n.trim().is_empty());
    suggestion.resolved_at = Some(now);
    suggestion.resolved_by = Some(resolver);
    suggestion.updated_at = now;
    Ok(())
}

/// Resolver note left on a pending suggestion retired by an empty rescan.
pub const SUPERSEDED_NOTE: &str = "superseded by rescan";

/// Retire a pending suggestion whose candidates no longer hold. Recorded as
/// a rejection with no human resolver.
pub fn supersede(suggestion: &mut MergeSuggestion, now: Timestamp) -> Result<(), CoreError> {
    suggestion.ensure_pending()?;
    suggestion.status = SuggestionStatus::Rejected;
    suggestion.resolver_notes = Some(SUPERSEDED_NOTE.to_string());
    suggestion.resolved_at = Some(now);
    suggestion.resolved_by = None;
    suggestion.updated_at = now;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
