//! Maps to the `incidents` table.

use fieldwatch_core::error::CoreError;
use fieldwatch_core::incident::{Comment, Incident};
use fieldwatch_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use super::parse_column;

/// A row from the `incidents` table.
#[derive(Debug, Clone, FromRow)]
pub struct IncidentRow {
    pub id: DbId,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub resolution_type: Option<String>,
    pub resolution_notes: Option<String>,
    pub ai_verification_status: String,
    pub ai_confidence_score: Option<f64>,
    pub ai_verification_reason: Option<String>,
    pub assigned_to: Option<String>,
    pub reporter_type: String,
    pub reported_by: DbId,
    pub asset_id: Option<DbId>,
    pub maintenance_record_id: Option<DbId>,
    pub cost_status: String,
    pub merged_reporter_ids: Vec<DbId>,
    pub related_incidents: Vec<DbId>,
    pub upvotes: i64,
    pub comments: Json<Vec<Comment>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub version: i64,
}

impl TryFrom<IncidentRow> for Incident {
    type Error = CoreError;

    fn try_from(row: IncidentRow) -> Result<Self, Self::Error> {
        const TABLE: &str = "incidents";
        Ok(Incident {
            id: row.id,
            title: row.title,
            description: row.description,
            severity: parse_column(TABLE, "severity", &row.severity)?,
            status: parse_column(TABLE, "status", &row.status)?,
            resolution_type: row
                .resolution_type
                .as_deref()
                .map(|raw| parse_column(TABLE, "resolution_type", raw))
                .transpose()?,
            resolution_notes: row.resolution_notes,
            ai_verification_status: parse_column(
                TABLE,
                "ai_verification_status",
                &row.ai_verification_status,
            )?,
            ai_confidence_score: row.ai_confidence_score,
            ai_verification_reason: row.ai_verification_reason,
            assigned_to: row.assigned_to,
            reporter_type: parse_column(TABLE, "reporter_type", &row.reporter_type)?,
            reported_by: row.reported_by,
            asset_id: row.asset_id,
            maintenance_record_id: row.maintenance_record_id,
            cost_status: parse_column(TABLE, "cost_status", &row.cost_status)?,
            merged_reporter_ids: row.merged_reporter_ids,
            related_incidents: row.related_incidents,
            upvotes: row.upvotes,
            comments: row.comments.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
            closed_at: row.closed_at,
            version: row.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use fieldwatch_core::incident::{IncidentStatus, ResolutionType};

    fn row(id: DbId) -> IncidentRow {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        IncidentRow {
            id,
            title: "Streetlight out".into(),
            description: "Dark corner at 5th and Pine".into(),
            severity: "high".into(),
            status: "investigating".into(),
            resolution_type: Some("duplicate".into()),
            resolution_notes: None,
            ai_verification_status: "to_be_verified".into(),
            ai_confidence_score: Some(0.42),
            ai_verification_reason: Some("blurry photo".into()),
            assigned_to: Some("tech-3".into()),
            reporter_type: "citizen".into(),
            reported_by: 77,
            asset_id: None,
            maintenance_record_id: None,
            cost_status: "none".into(),
            merged_reporter_ids: vec![],
            related_incidents: vec![3],
            upvotes: 4,
            comments: Json(vec![]),
            created_at: at,
            updated_at: at,
            resolved_at: None,
            closed_at: None,
            version: 6,
        }
    }

    #[test]
    fn legacy_status_reads_as_assigned() {
        let incident = Incident::try_from(row(8)).unwrap();
        assert_eq!(incident.status, IncidentStatus::Assigned);
        assert_eq!(incident.resolution_type, Some(ResolutionType::Duplicate));
        assert_eq!(incident.primary_id(), Some(3));
        assert_eq!(incident.version, 6);
    }

    #[test]
    fn unknown_enum_value_is_internal_error() {
        let mut bad = row(8);
        bad.cost_status = "maybe".into();
        assert_matches!(
            Incident::try_from(bad),
            Err(CoreError::Internal(msg)) if msg.contains("incidents.cost_status")
        );
    }
}
