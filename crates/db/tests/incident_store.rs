//! Integration tests for `PgIncidentStore` against a real database.
//!
//! Covers the parts the in-memory store cannot vouch for:
//! - compare-and-swap saves on `version`
//! - pending suggestion upsert (one pending row per source incident)
//! - merge approval in one locking transaction, including races
//! - rejection and rescan retirement of pending suggestions
//! - legacy status values in stored rows

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use fieldwatch_core::error::CoreError;
use fieldwatch_core::incident::{IncidentDraft, IncidentStatus, ReporterType, ResolutionType, Severity};
use fieldwatch_core::merge::{NewMergeSuggestion, MatchReason, SuggestionStatus, SUPERSEDED_NOTE};
use fieldwatch_core::store::IncidentStore;
use fieldwatch_core::types::{DbId, Timestamp};
use fieldwatch_db::PgIncidentStore;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ts(minute: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0).unwrap()
}

fn draft(title: &str) -> IncidentDraft {
    IncidentDraft {
        title: title.to_string(),
        description: "Reported near the library".to_string(),
        severity: Severity::Medium,
        reporter_type: ReporterType::Citizen,
        reported_by: 40,
        asset_id: Some(12),
        created_at: ts(0),
    }
}

fn scan(source: DbId, duplicates: &[DbId], score: f64, minute: u32) -> NewMergeSuggestion {
    NewMergeSuggestion {
        source_incident_id: source,
        duplicate_incident_ids: duplicates.to_vec(),
        similarity_score: score,
        match_reasons: vec![MatchReason::TextSimilarity],
        scanned_at: ts(minute),
    }
}

/// Insert `n` incidents and return their ids in insertion order.
async fn seed(store: &PgIncidentStore, n: usize) -> Vec<DbId> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let incident = store
            .insert_incident(draft(&format!("Broken streetlight {i}")))
            .await
            .unwrap();
        ids.push(incident.id);
    }
    ids
}

// ---------------------------------------------------------------------------
// Test: compare-and-swap saves
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn stale_version_save_is_conflict(pool: PgPool) {
    let store = PgIncidentStore::new(pool);
    let id = seed(&store, 1).await[0];

    let mut incident = store.get_incident(id).await.unwrap();
    assert_eq!(incident.version, 1);
    incident.assigned_to = Some("crew-4".to_string());
    let saved = store.save_incident(&incident, 1).await.unwrap();
    assert_eq!(saved.version, 2);
    assert_eq!(saved.assigned_to.as_deref(), Some("crew-4"));

    incident.assigned_to = Some("crew-9".to_string());
    assert_matches!(
        store.save_incident(&incident, 1).await,
        Err(CoreError::Conflict(_))
    );
    let stored = store.get_incident(id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.assigned_to.as_deref(), Some("crew-4"));
}

#[sqlx::test(migrations = "./migrations")]
async fn saving_unknown_incident_is_not_found(pool: PgPool) {
    let store = PgIncidentStore::new(pool);
    let id = seed(&store, 1).await[0];

    let mut ghost = store.get_incident(id).await.unwrap();
    ghost.id = id + 1000;
    assert_matches!(
        store.save_incident(&ghost, 1).await,
        Err(CoreError::NotFound { .. })
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn legacy_investigating_rows_read_as_assigned(pool: PgPool) {
    let store = PgIncidentStore::new(pool.clone());
    let id = seed(&store, 1).await[0];

    sqlx::query("UPDATE incidents SET status = 'investigating' WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();

    let incident = store.get_incident(id).await.unwrap();
    assert_eq!(incident.status, IncidentStatus::Assigned);
}

// ---------------------------------------------------------------------------
// Test: pending suggestion upsert
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn rescan_upsert_keeps_suggestion_id(pool: PgPool) {
    let store = PgIncidentStore::new(pool);
    let ids = seed(&store, 3).await;

    let first = store
        .upsert_pending_suggestion(scan(ids[0], &[ids[1]], 0.6, 1))
        .await
        .unwrap();
    let second = store
        .upsert_pending_suggestion(scan(ids[0], &[ids[1], ids[2]], 0.9, 2))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.duplicate_incident_ids, vec![ids[1], ids[2]]);
    assert_eq!(second.similarity_score, 0.9);
    assert_eq!(second.status, SuggestionStatus::Pending);

    let all = store.list_suggestions(ids[0], None).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn empty_rescan_retires_pending_suggestion(pool: PgPool) {
    let store = PgIncidentStore::new(pool);
    let ids = seed(&store, 2).await;
    let pending = store
        .upsert_pending_suggestion(scan(ids[0], &[ids[1]], 0.7, 1))
        .await
        .unwrap();

    let retired = store
        .retire_pending_suggestion(ids[0], ts(5))
        .await
        .unwrap()
        .expect("a pending suggestion to retire");
    assert_eq!(retired.id, pending.id);
    assert_eq!(retired.status, SuggestionStatus::Rejected);
    assert_eq!(retired.resolver_notes.as_deref(), Some(SUPERSEDED_NOTE));
    assert_eq!(retired.resolved_by, None);

    assert!(store
        .retire_pending_suggestion(ids[0], ts(6))
        .await
        .unwrap()
        .is_none());

    // A later scan opens a fresh suggestion.
    let fresh = store
        .upsert_pending_suggestion(scan(ids[0], &[ids[1]], 0.8, 7))
        .await
        .unwrap();
    assert_ne!(fresh.id, pending.id);
}

// ---------------------------------------------------------------------------
// Test: merge approval
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn approval_links_duplicates_in_one_transaction(pool: PgPool) {
    let store = PgIncidentStore::new(pool);
    let ids = seed(&store, 3).await;
    let suggestion = store
        .upsert_pending_suggestion(scan(ids[0], &[ids[1], ids[2]], 0.85, 1))
        .await
        .unwrap();

    let approval = store.approve_suggestion(suggestion.id, 2, ts(3)).await.unwrap();
    assert_eq!(approval.suggestion.status, SuggestionStatus::Approved);
    assert_eq!(approval.suggestion.resolved_by, Some(2));
    assert_eq!(approval.primary.merged_reporter_ids, vec![ids[1], ids[2]]);
    assert_eq!(approval.primary.version, 2);

    for id in &ids[1..] {
        let duplicate = store.get_incident(*id).await.unwrap();
        assert_eq!(duplicate.resolution_type, Some(ResolutionType::Duplicate));
        assert_eq!(duplicate.related_incidents, vec![ids[0]]);
        assert_eq!(duplicate.status, IncidentStatus::Reported);
        assert_eq!(duplicate.version, 2);
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_approvals_have_one_winner(pool: PgPool) {
    let store = PgIncidentStore::new(pool);
    let ids = seed(&store, 3).await;
    let suggestion = store
        .upsert_pending_suggestion(scan(ids[0], &[ids[1], ids[2]], 0.85, 1))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        store.approve_suggestion(suggestion.id, 2, ts(3)),
        store.approve_suggestion(suggestion.id, 1, ts(3)),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert_matches!(loser, Err(CoreError::Conflict(_)));

    let primary = store.get_incident(ids[0]).await.unwrap();
    assert_eq!(primary.merged_reporter_ids, vec![ids[1], ids[2]]);
    assert_eq!(primary.version, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn candidate_absorbed_elsewhere_blocks_approval(pool: PgPool) {
    let store = PgIncidentStore::new(pool);
    let ids = seed(&store, 3).await;
    let first = store
        .upsert_pending_suggestion(scan(ids[0], &[ids[1]], 0.8, 1))
        .await
        .unwrap();
    let second = store
        .upsert_pending_suggestion(scan(ids[2], &[ids[1]], 0.9, 2))
        .await
        .unwrap();

    store.approve_suggestion(second.id, 2, ts(3)).await.unwrap();
    assert_matches!(
        store.approve_suggestion(first.id, 2, ts(4)).await,
        Err(CoreError::Conflict(_))
    );

    // The failed approval left nothing behind.
    let primary = store.get_incident(ids[0]).await.unwrap();
    assert!(primary.merged_reporter_ids.is_empty());
    assert_eq!(primary.version, 1);
    let still_pending = store.get_suggestion(first.id).await.unwrap();
    assert_eq!(still_pending.status, SuggestionStatus::Pending);
}

#[sqlx::test(migrations = "./migrations")]
async fn approving_unknown_suggestion_is_not_found(pool: PgPool) {
    let store = PgIncidentStore::new(pool);
    assert_matches!(
        store.approve_suggestion(404, 2, ts(1)).await,
        Err(CoreError::NotFound { id: 404, .. })
    );
}

// ---------------------------------------------------------------------------
// Test: rejection
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn second_reject_is_conflict_and_keeps_notes(pool: PgPool) {
    let store = PgIncidentStore::new(pool);
    let ids = seed(&store, 2).await;
    let suggestion = store
        .upsert_pending_suggestion(scan(ids[0], &[ids[1]], 0.55, 1))
        .await
        .unwrap();

    let rejected = store
        .reject_suggestion(suggestion.id, Some("different streets".into()), 2, ts(2))
        .await
        .unwrap();
    assert_eq!(rejected.status, SuggestionStatus::Rejected);
    assert_eq!(rejected.resolver_notes.as_deref(), Some("different streets"));

    assert_matches!(
        store
            .reject_suggestion(suggestion.id, Some("second opinion".into()), 1, ts(3))
            .await,
        Err(CoreError::Conflict(_))
    );
    assert_matches!(
        store.approve_suggestion(suggestion.id, 1, ts(4)).await,
        Err(CoreError::Conflict(_))
    );

    let stored = store.get_suggestion(suggestion.id).await.unwrap();
    assert_eq!(stored.resolver_notes.as_deref(), Some("different streets"));
    assert_eq!(stored.resolved_by, Some(2));
    let duplicate = store.get_incident(ids[1]).await.unwrap();
    assert_eq!(duplicate.resolution_type, None);
}
