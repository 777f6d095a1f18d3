//! Maps to the `merge_suggestions` table.

use fieldwatch_core::error::CoreError;
use fieldwatch_core::merge::MergeSuggestion;
use fieldwatch_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::parse_column;

/// A row from the `merge_suggestions` table.
#[derive(Debug, Clone, FromRow)]
pub struct MergeSuggestionRow {
    pub id: DbId,
    pub source_incident_id: DbId,
    pub duplicate_incident_ids: Vec<DbId>,
    pub similarity_score: f64,
    pub match_reasons: Vec<String>,
    pub status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub resolved_by: Option<DbId>,
    pub resolver_notes: Option<String>,
}

impl TryFrom<MergeSuggestionRow> for MergeSuggestion {
    type Error = CoreError;

    fn try_from(row: MergeSuggestionRow) -> Result<Self, Self::Error> {
        const TABLE: &str = "merge_suggestions";
        let match_reasons = row
            .match_reasons
            .iter()
            .map(|raw| parse_column(TABLE, "match_reasons", raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MergeSuggestion {
            id: row.id,
            source_incident_id: row.source_incident_id,
            duplicate_incident_ids: row.duplicate_incident_ids,
            similarity_score: row.similarity_score,
            match_reasons,
            status: parse_column(TABLE, "status", &row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            resolver_notes: row.resolver_notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use fieldwatch_core::merge::{MatchReason, SuggestionStatus};

    fn row(reasons: &[&str]) -> MergeSuggestionRow {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        MergeSuggestionRow {
            id: 4,
            source_incident_id: 1,
            duplicate_incident_ids: vec![2, 3],
            similarity_score: 0.82,
            match_reasons: reasons.iter().map(|r| r.to_string()).collect(),
            status: "pending".into(),
            created_at: at,
            updated_at: at,
            resolved_at: None,
            resolved_by: None,
            resolver_notes: None,
        }
    }

    #[test]
    fn reasons_parse_into_tags() {
        let suggestion =
            MergeSuggestion::try_from(row(&["text_similarity", "asset_match"])).unwrap();
        assert_eq!(
            suggestion.match_reasons,
            vec![MatchReason::TextSimilarity, MatchReason::AssetMatch]
        );
        assert_eq!(suggestion.status, SuggestionStatus::Pending);
    }

    #[test]
    fn unknown_reason_is_rejected() {
        assert_matches!(
            MergeSuggestion::try_from(row(&["vibes"])),
            Err(CoreError::Internal(_))
        );
    }
}
