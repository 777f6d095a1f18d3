//! The Incident aggregate, its closed enums, and the DTOs that create it.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

define_text_enum! {
    /// Incident severity, ordered from least to most severe.
    Severity {
        Low = "low",
        Medium = "medium",
        High = "high",
        Critical = "critical",
    }
}

define_text_enum! {
    /// Lifecycle status of an incident.
    ///
    /// `investigating` is a legacy spelling of `assigned`; it is accepted on
    /// input and always written back as `assigned`.
    IncidentStatus {
        Reported = "reported",
        Acknowledged = "acknowledged",
        Assigned = "assigned" | "investigating",
        Resolved = "resolved",
        WaitingApproval = "waiting_approval",
        Closed = "closed",
        Rejected = "rejected",
    }
}

impl IncidentStatus {
    /// Closed and rejected incidents accept no further lifecycle commands.
    pub fn is_terminal(self) -> bool {
        matches!(self, IncidentStatus::Closed | IncidentStatus::Rejected)
    }
}

define_text_enum! {
    /// How an incident was resolved.
    ResolutionType {
        Fixed = "fixed",
        Duplicate = "duplicate",
        Invalid = "invalid",
        Deferred = "deferred",
    }
}

define_text_enum! {
    /// Trust signal from the external AI scorer.
    AiVerificationStatus {
        Pending = "pending",
        ToBeVerified = "to_be_verified",
        Verified = "verified",
        Failed = "failed",
    }
}

define_text_enum! {
    /// Who filed the report.
    ReporterType {
        Citizen = "citizen",
        Staff = "staff",
    }
}

define_text_enum! {
    /// Sign-off state of maintenance costs linked to the incident.
    CostStatus {
        None = "none",
        Pending = "pending",
        Approved = "approved",
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// A single append-only comment on an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: DbId,
    pub comment: String,
    pub user_name: String,
    pub is_internal: bool,
    pub posted_at: Timestamp,
}

/// The incident aggregate root.
///
/// Mutated only through the transition engine, the merge coordinator and
/// the cost approval gate. `version` increases by one on every persisted
/// change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: DbId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub resolution_type: Option<ResolutionType>,
    pub resolution_notes: Option<String>,
    pub ai_verification_status: AiVerificationStatus,
    pub ai_confidence_score: Option<f64>,
    pub ai_verification_reason: Option<String>,
    pub assigned_to: Option<String>,
    pub reporter_type: ReporterType,
    pub reported_by: DbId,
    pub asset_id: Option<DbId>,
    pub maintenance_record_id: Option<DbId>,
    pub cost_status: CostStatus,
    pub merged_reporter_ids: Vec<DbId>,
    pub related_incidents: Vec<DbId>,
    pub upvotes: i64,
    pub comments: Vec<Comment>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub version: i64,
}

impl Incident {
    /// Whether this incident has been merged into a primary.
    pub fn is_duplicate(&self) -> bool {
        self.resolution_type == Some(ResolutionType::Duplicate)
    }

    /// The primary this incident was merged into, if any.
    pub fn primary_id(&self) -> Option<DbId> {
        if self.is_duplicate() {
            self.related_incidents.first().copied()
        } else {
            None
        }
    }

    /// Drop internal comments for callers that may not read them.
    pub fn without_internal_comments(mut self) -> Self {
        self.comments.retain(|c| !c.is_internal);
        self
    }

    /// Next comment id, one past the highest present.
    pub(crate) fn next_comment_id(&self) -> DbId {
        self.comments.iter().map(|c| c.id).max().unwrap_or(0) + 1
    }
}

// ---------------------------------------------------------------------------
// Report submission
// ---------------------------------------------------------------------------

/// Request body for reporting a new incident.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewIncident {
    #[validate(length(min = 3, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    pub severity: Severity,
    pub asset_id: Option<DbId>,
}

/// A validated report ready for insertion. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentDraft {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub reporter_type: ReporterType,
    pub reported_by: DbId,
    pub asset_id: Option<DbId>,
    pub created_at: Timestamp,
}

impl IncidentDraft {
    /// Validate a submission and stamp it with the reporter.
    pub fn from_report(
        input: NewIncident,
        reporter_type: ReporterType,
        reported_by: DbId,
        now: Timestamp,
    ) -> Result<Self, CoreError> {
        input.validate()?;
        let title = input.title.trim().to_string();
        if title.len() < 3 {
            return Err(CoreError::Validation(
                "title must contain at least 3 non-blank characters".into(),
            ));
        }
        Ok(Self {
            title,
            description: input.description,
            severity: input.severity,
            reporter_type,
            reported_by,
            asset_id: input.asset_id,
            created_at: now,
        })
    }

    /// Materialize the initial aggregate state under the given id.
    pub fn into_incident(self, id: DbId) -> Incident {
        Incident {
            id,
            title: self.title,
            description: self.description,
            severity: self.severity,
            status: IncidentStatus::Reported,
            resolution_type: None,
            resolution_notes: None,
            ai_verification_status: AiVerificationStatus::Pending,
            ai_confidence_score: None,
            ai_verification_reason: None,
            assigned_to: None,
            reporter_type: self.reporter_type,
            reported_by: self.reported_by,
            asset_id: self.asset_id,
            maintenance_record_id: None,
            cost_status: CostStatus::None,
            merged_reporter_ids: Vec::new(),
            related_incidents: Vec::new(),
            upvotes: 0,
            comments: Vec::new(),
            created_at: self.created_at,
            updated_at: self.created_at,
            resolved_at: None,
            closed_at: None,
            version: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

/// A maintenance record opened from an incident. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: DbId,
    pub incident_id: DbId,
    pub description: String,
    pub estimated_cost: f64,
    pub created_at: Timestamp,
}

/// Request body for opening a maintenance record on an incident.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMaintenance {
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    #[validate(range(min = 0.0))]
    pub estimated_cost: f64,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

/// Clamp a user-provided limit to `[1, max]`, defaulting when absent.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).max(1).min(max)
}

/// Clamp a user-provided offset to non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Filters for listing incidents. All present filters must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub severity: Option<Severity>,
    pub ai_verification_status: Option<AiVerificationStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl IncidentFilter {
    pub fn matches(&self, incident: &Incident) -> bool {
        self.status.map_or(true, |s| incident.status == s)
            && self.severity.map_or(true, |s| incident.severity == s)
            && self
                .ai_verification_status
                .map_or(true, |s| incident.ai_verification_status == s)
    }

    pub fn effective_limit(&self) -> i64 {
        clamp_limit(self.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        clamp_offset(self.offset)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
