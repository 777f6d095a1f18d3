use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{version_conflict, IncidentStore};
use crate::error::CoreError;
use crate::incident::{Incident, IncidentDraft, IncidentFilter, MaintenanceRecord, NewMaintenance};
use crate::merge::{self, MergeApproval, MergeSuggestion, NewMergeSuggestion, SuggestionStatus};
use crate::types::{DbId, Timestamp};

#[derive(Default)]
struct State {
    incidents: BTreeMap<DbId, Incident>,
    suggestions: BTreeMap<DbId, MergeSuggestion>,
    maintenance: BTreeMap<DbId, MaintenanceRecord>,
    next_incident_id: DbId,
    next_suggestion_id: DbId,
    next_maintenance_id: DbId,
}

impl State {
    fn incident(&self, id: DbId) -> Result<&Incident, CoreError> {
        self.incidents.get(&id).ok_or(CoreError::NotFound {
            entity: "Incident",
            id,
        })
    }

    fn suggestion(&self, id: DbId) -> Result<&MergeSuggestion, CoreError> {
        self.suggestions.get(&id).ok_or(CoreError::NotFound {
            entity: "MergeSuggestion",
            id,
        })
    }

    /// Check the version and build the stored copy, without writing.
    fn prepare_save(&self, incident: &Incident, expected_version: i64) -> Result<Incident, CoreError> {
        let current = self.incident(incident.id)?;
        if current.version != expected_version {
            return Err(version_conflict(incident.id, expected_version, current.version));
        }
        let mut stored = incident.clone();
        stored.version = expected_version + 1;
        Ok(stored)
    }

    fn next_id(counter: &mut DbId) -> DbId {
        *counter += 1;
        *counter
    }
}

/// Process-local [`IncidentStore`].
///
/// One lock guards all aggregates, so every write (including multi-incident
/// merge approval) is serialized and trivially atomic.
#[derive(Default)]
pub struct InMemoryIncidentStore {
    state: RwLock<State>,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_incident(&self, draft: IncidentDraft) -> Result<Incident, CoreError> {
        let mut state = self.state.write().await;
        let id = State::next_id(&mut state.next_incident_id);
        let incident = draft.into_incident(id);
        state.incidents.insert(id, incident.clone());
        Ok(incident)
    }

    async fn get_incident(&self, id: DbId) -> Result<Incident, CoreError> {
        self.state.read().await.incident(id).cloned()
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, CoreError> {
        let state = self.state.read().await;
        let mut matching: Vec<&Incident> = state
            .incidents
            .values()
            .filter(|i| filter.matches(i))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .cloned()
            .collect())
    }

    async fn save_incident(
        &self,
        incident: &Incident,
        expected_version: i64,
    ) -> Result<Incident, CoreError> {
        let mut state = self.state.write().await;
        let stored = state.prepare_save(incident, expected_version)?;
        state.incidents.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn attach_maintenance(
        &self,
        incident: &Incident,
        expected_version: i64,
        request: &NewMaintenance,
    ) -> Result<(Incident, MaintenanceRecord), CoreError> {
        let mut state = self.state.write().await;
        let mut stored = state.prepare_save(incident, expected_version)?;

        let record_id = State::next_id(&mut state.next_maintenance_id);
        let record = MaintenanceRecord {
            id: record_id,
            incident_id: incident.id,
            description: request.description.trim().to_string(),
            estimated_cost: request.estimated_cost,
            created_at: incident.updated_at,
        };
        stored.maintenance_record_id = Some(record_id);

        state.maintenance.insert(record_id, record.clone());
        state.incidents.insert(stored.id, stored.clone());
        Ok((stored, record))
    }

    async fn get_maintenance(
        &self,
        incident_id: DbId,
    ) -> Result<Option<MaintenanceRecord>, CoreError> {
        let state = self.state.read().await;
        state.incident(incident_id)?;
        Ok(state
            .maintenance
            .values()
            .find(|m| m.incident_id == incident_id)
            .cloned())
    }

    async fn upsert_pending_suggestion(
        &self,
        suggestion: NewMergeSuggestion,
    ) -> Result<MergeSuggestion, CoreError> {
        let mut state = self.state.write().await;
        state.incident(suggestion.source_incident_id)?;

        let pending = state.suggestions.values_mut().find(|s| {
            s.source_incident_id == suggestion.source_incident_id
                && s.status == SuggestionStatus::Pending
        });
        if let Some(existing) = pending {
            suggestion.replace_candidates(existing);
            return Ok(existing.clone());
        }

        let id = State::next_id(&mut state.next_suggestion_id);
        let created = suggestion.into_suggestion(id);
        state.suggestions.insert(id, created.clone());
        Ok(created)
    }

    async fn retire_pending_suggestion(
        &self,
        source_incident_id: DbId,
        now: Timestamp,
    ) -> Result<Option<MergeSuggestion>, CoreError> {
        let mut state = self.state.write().await;
        let pending = state.suggestions.values_mut().find(|s| {
            s.source_incident_id == source_incident_id && s.status == SuggestionStatus::Pending
        });
        match pending {
            Some(existing) => {
                merge::supersede(existing, now)?;
                Ok(Some(existing.clone()))
            }
            None => Ok(None),
        }
    }

    async fn get_suggestion(&self, id: DbId) -> Result<MergeSuggestion, CoreError> {
        self.state.read().await.suggestion(id).cloned()
    }

    async fn list_suggestions(
        &self,
        incident_id: DbId,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<MergeSuggestion>, CoreError> {
        let state = self.state.read().await;
        Ok(state
            .suggestions
            .values()
            .rev()
            .filter(|s| s.source_incident_id == incident_id)
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect())
    }

    async fn approve_suggestion(
        &self,
        id: DbId,
        resolver: DbId,
        now: Timestamp,
    ) -> Result<MergeApproval, CoreError> {
        let mut state = self.state.write().await;
        let suggestion = state.suggestion(id)?.clone();
        suggestion.ensure_pending()?;

        let primary = state.incident(suggestion.source_incident_id)?.clone();
        let duplicates = suggestion
            .duplicate_incident_ids
            .iter()
            .map(|dup| state.incident(*dup).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        let wanted: HashSet<DbId> = suggestion.duplicate_incident_ids.iter().copied().collect();
        let absorbed_elsewhere: HashSet<DbId> = state
            .incidents
            .values()
            .filter(|i| i.id != primary.id)
            .flat_map(|i| i.merged_reporter_ids.iter().copied())
            .filter(|id| wanted.contains(id))
            .collect();

        let plan = merge::plan_merge(
            &suggestion,
            &primary,
            &duplicates,
            &absorbed_elsewhere,
            resolver,
            now,
        )?;

        // Nothing below can fail: the plan is applied in full under the lock.
        let mut stored_primary = plan.primary;
        stored_primary.version += 1;
        state.incidents.insert(stored_primary.id, stored_primary.clone());

        let mut stored_duplicates = Vec::with_capacity(plan.duplicates.len());
        for mut duplicate in plan.duplicates {
            duplicate.version += 1;
            state.incidents.insert(duplicate.id, duplicate.clone());
            stored_duplicates.push(duplicate);
        }
        state.suggestions.insert(id, plan.suggestion.clone());

        Ok(MergeApproval {
            suggestion: plan.suggestion,
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
        let mut state = self.state.write().await;
        let mut suggestion = state.suggestion(id)?.clone();
        merge::reject(&mut suggestion, notes, resolver, now)?;
        state.suggestions.insert(id, suggestion.clone());
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::incident::tests::ts;
    use crate::incident::{ReporterType, ResolutionType, Severity};
    use crate::merge::{DuplicateCandidate, MatchReason};
    use assert_matches::assert_matches;

    fn draft(title: &str, at: i64) -> IncidentDraft {
        IncidentDraft {
            title: title.into(),
            description: "reported via app".into(),
            severity: Severity::Medium,
            reporter_type: ReporterType::Citizen,
            reported_by: 1,
            asset_id: None,
            created_at: ts(at),
        }
    }

    async fn seeded(n: i64) -> InMemoryIncidentStore {
        let store = InMemoryIncidentStore::new();
        for i in 0..n {
            store
                .insert_incident(draft(&format!("Incident {i}"), i))
                .await
                .unwrap();
        }
        store
    }

    fn scan(source: DbId, duplicates: &[DbId], at: i64) -> NewMergeSuggestion {
        let candidates: Vec<_> = duplicates
            .iter()
            .map(|id| DuplicateCandidate {
                incident_id: *id,
                score: 0.82,
                reasons: vec![MatchReason::TextSimilarity],
            })
            .collect();
        NewMergeSuggestion::aggregate(source, &candidates, ts(at)).unwrap()
    }

    #[tokio::test]
    async fn save_bumps_version_and_detects_staleness() {
        let store = seeded(1).await;
        let mut incident = store.get_incident(1).await.unwrap();
        incident.upvotes = 3;

        let saved = store.save_incident(&incident, 1).await.unwrap();
        assert_eq!(saved.version, 2);

        assert_matches!(
            store.save_incident(&incident, 1).await,
            Err(CoreError::Conflict(_))
        );
        assert_eq!(store.get_incident(1).await.unwrap().upvotes, 3);
    }

    #[tokio::test]
    async fn unknown_incident_is_not_found() {
        let store = seeded(0).await;
        assert_matches!(
            store.get_incident(9).await,
            Err(CoreError::NotFound { entity: "Incident", id: 9 })
        );
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paginated() {
        let store = seeded(5).await;
        let filter = IncidentFilter {
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        };
        let ids: Vec<_> = store
            .list_incidents(&filter)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[tokio::test]
    async fn rescanning_replaces_pending_candidates() {
        let store = seeded(4).await;
        let first = store.upsert_pending_suggestion(scan(1, &[2], 10)).await.unwrap();
        let second = store.upsert_pending_suggestion(scan(1, &[3, 4], 11)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.duplicate_incident_ids, vec![3, 4]);
        assert_eq!(store.list_suggestions(1, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_scan_after_resolution_creates_new_suggestion() {
        let store = seeded(3).await;
        let first = store.upsert_pending_suggestion(scan(1, &[2], 10)).await.unwrap();
        store.reject_suggestion(first.id, None, 5, ts(12)).await.unwrap();
        let second = store.upsert_pending_suggestion(scan(1, &[3], 13)).await.unwrap();
        assert_ne!(first.id, second.id);

        let pending = store
            .list_suggestions(1, Some(SuggestionStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
    }

    #[tokio::test]
    async fn approve_applies_every_incident() {
        let store = seeded(3).await;
        let s = store.upsert_pending_suggestion(scan(1, &[2, 3], 10)).await.unwrap();
        let approval = store.approve_suggestion(s.id, 5, ts(20)).await.unwrap();

        assert_eq!(approval.suggestion.status, SuggestionStatus::Approved);
        let primary = store.get_incident(1).await.unwrap();
        assert_eq!(primary.merged_reporter_ids, vec![2, 3]);
        assert_eq!(primary.version, 2);
        let dup = store.get_incident(2).await.unwrap();
        assert_eq!(dup.resolution_type, Some(ResolutionType::Duplicate));
        assert_eq!(dup.related_incidents, vec![1]);
        assert_eq!(dup.version, 2);
    }

    #[tokio::test]
    async fn failed_approval_writes_nothing() {
        let store = seeded(3).await;
        let s = store.upsert_pending_suggestion(scan(1, &[2, 3], 10)).await.unwrap();

        // Incident 3 becomes a primary of its own in the meantime.
        let mut three = store.get_incident(3).await.unwrap();
        three.merged_reporter_ids = vec![99];
        store.save_incident(&three, 1).await.unwrap();

        assert_matches!(
            store.approve_suggestion(s.id, 5, ts(20)).await,
            Err(CoreError::Conflict(_))
        );
        assert_eq!(
            store.get_suggestion(s.id).await.unwrap().status,
            SuggestionStatus::Pending
        );
        let two = store.get_incident(2).await.unwrap();
        assert!(two.resolution_type.is_none());
        assert_eq!(two.version, 1);
        assert!(store.get_incident(1).await.unwrap().merged_reporter_ids.is_empty());
    }

    #[tokio::test]
    async fn concurrent_approvals_have_one_winner() {
        let store = Arc::new(seeded(3).await);
        let id = store
            .upsert_pending_suggestion(scan(1, &[2, 3], 10))
            .await
            .unwrap()
            .id;

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.approve_suggestion(id, 5, ts(20)).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.approve_suggestion(id, 6, ts(21)).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(CoreError::Conflict(_))))
                .count(),
            1
        );
        let primary = store.get_incident(1).await.unwrap();
        assert_eq!(primary.merged_reporter_ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn attach_maintenance_links_record() {
        let store = seeded(1).await;
        let incident = store.get_incident(1).await.unwrap();
        let request = NewMaintenance {
            description: "Replace valve".into(),
            estimated_cost: 250.0,
        };
        let (stored, record) = store.attach_maintenance(&incident, 1, &request).await.unwrap();
        assert_eq!(stored.maintenance_record_id, Some(record.id));
        assert_eq!(stored.version, 2);
        assert_eq!(record.incident_id, 1);

        assert_matches!(
            store.attach_maintenance(&incident, 1, &request).await,
            Err(CoreError::Conflict(_))
        );
    }
}
