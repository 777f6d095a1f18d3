//! Incident status state machine.
//!
//! ```text
//! reported ──acknowledge──▶ acknowledged ──assign──▶ assigned ──resolve──▶ resolved ──close──▶ closed
//!    │                          │                        │                    ▲
//!    └──────reject──────────────┴──▶ rejected            └─resolve (costs)──▶ waiting_approval
//!                                                                      approve_cost ─┘
//! ```
//!
//! [`execute`] applies the checks in a fixed order: role, payload, status.
//! A caller without authority learns nothing about the incident's state.
//! Version checks belong to the caller holding the store.

use crate::cost_approval;
use crate::error::CoreError;
use crate::incident::{Comment, Incident, IncidentStatus, ResolutionType};
use crate::roles::{Actor, Permission};
use crate::types::Timestamp;
use crate::verification::{self, AiAssessment};

/// Maximum length of a comment body.
pub const MAX_COMMENT_LEN: usize = 2000;

/// A lifecycle command against a single incident.
#[derive(Debug, Clone, PartialEq)]
pub enum IncidentCommand {
    Acknowledge,
    Assign {
        assigned_to: String,
    },
    Resolve {
        notes: String,
        resolution_type: ResolutionType,
    },
    Reject {
        reason: String,
    },
    Close {
        notes: Option<String>,
    },
    Verify,
    ApproveCost,
    RecordAssessment(AiAssessment),
    AddComment {
        comment: String,
        is_internal: bool,
    },
    Upvote,
}

impl IncidentCommand {
    /// Short verb used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            IncidentCommand::Acknowledge => "acknowledge",
            IncidentCommand::Assign { .. } => "assign",
            IncidentCommand::Resolve { .. } => "resolve",
            IncidentCommand::Reject { .. } => "reject",
            IncidentCommand::Close { .. } => "close",
            IncidentCommand::Verify => "verify",
            IncidentCommand::ApproveCost => "approve_cost",
            IncidentCommand::RecordAssessment(_) => "record_assessment",
            IncidentCommand::AddComment { .. } => "comment",
            IncidentCommand::Upvote => "upvote",
        }
    }

    /// Authority the caller must hold.
    pub fn permission(&self) -> Permission {
        match self {
            IncidentCommand::Acknowledge
            | IncidentCommand::Assign { .. }
            | IncidentCommand::Reject { .. }
            | IncidentCommand::Close { .. }
            | IncidentCommand::Verify
            | IncidentCommand::ApproveCost => Permission::Triage,
            IncidentCommand::Resolve { .. } => Permission::Resolve,
            IncidentCommand::RecordAssessment(_) => Permission::RecordAssessment,
            IncidentCommand::AddComment {
                is_internal: true, ..
            } => Permission::InternalNotes,
            IncidentCommand::AddComment { .. } | IncidentCommand::Upvote => {
                Permission::Participate
            }
        }
    }

    /// Check the command's own payload, independent of incident state.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            IncidentCommand::Assign { assigned_to } => require_text("assigned_to", assigned_to),
            IncidentCommand::Resolve { notes, .. } => require_text("resolution_notes", notes),
            IncidentCommand::Reject { reason } => require_text("reason", reason),
            IncidentCommand::RecordAssessment(assessment) => assessment.validate(),
            IncidentCommand::AddComment { comment, .. } => {
                require_text("comment", comment)?;
                if comment.chars().count() > MAX_COMMENT_LEN {
                    return Err(CoreError::Validation(format!(
                        "comment must be at most {MAX_COMMENT_LEN} characters"
                    )));
                }
                Ok(())
            }
            IncidentCommand::Acknowledge
            | IncidentCommand::Close { .. }
            | IncidentCommand::Verify
            | IncidentCommand::ApproveCost
            | IncidentCommand::Upvote => Ok(()),
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        Err(CoreError::Validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

fn require_status(
    incident: &Incident,
    command: &IncidentCommand,
    allowed: &[IncidentStatus],
) -> Result<(), CoreError> {
    if allowed.contains(&incident.status) {
        Ok(())
    } else {
        Err(invalid(incident, command))
    }
}

fn invalid(incident: &Incident, command: &IncidentCommand) -> CoreError {
    CoreError::InvalidTransition {
        from: incident.status.to_string(),
        command: command.name(),
    }
}

/// Authorize, validate and apply a command, returning the next state.
///
/// The returned incident carries the same `version` as the input; the store
/// bumps it on save.
pub fn execute(
    incident: &Incident,
    actor: &Actor,
    command: &IncidentCommand,
    now: Timestamp,
) -> Result<Incident, CoreError> {
    actor.require(command.permission())?;
    command.validate()?;
    transition(incident, actor, command, now)
}

/// Apply a command that has already been authorized and validated.
pub fn transition(
    incident: &Incident,
    actor: &Actor,
    command: &IncidentCommand,
    now: Timestamp,
) -> Result<Incident, CoreError> {
    use IncidentStatus::{Acknowledged, Assigned, Closed, Reported, Resolved};

    let mut next = incident.clone();
    match command {
        IncidentCommand::Acknowledge => {
            require_status(incident, command, &[Reported])?;
            next.status = Acknowledged;
        }
        IncidentCommand::Assign { assigned_to } => {
            require_status(incident, command, &[Acknowledged])?;
            next.status = Assigned;
            next.assigned_to = Some(assigned_to.trim().to_string());
        }
        IncidentCommand::Reject { reason } => {
            require_status(incident, command, &[Reported, Acknowledged])?;
            next.status = IncidentStatus::Rejected;
            next.resolution_notes = Some(reason.trim().to_string());
        }
        IncidentCommand::Resolve {
            notes,
            resolution_type,
        } => {
            require_status(incident, command, &[Assigned])?;
            check_resolution_type(incident, *resolution_type)?;
            next.resolution_notes = Some(notes.trim().to_string());
            next.resolution_type = Some(*resolution_type);
            next.status = cost_approval::resolution_target(incident);
            if next.status == Resolved {
                next.resolved_at.get_or_insert(now);
            }
        }
        IncidentCommand::Close { notes } => {
            require_status(incident, command, &[Resolved])?;
            cost_approval::ensure_costs_settled(incident)?;
            if let Some(extra) = notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                next.resolution_notes = Some(match next.resolution_notes.take() {
                    Some(existing) => format!("{existing}\n{extra}"),
                    None => extra.to_string(),
                });
            }
            next.status = Closed;
            next.closed_at.get_or_insert(now);
        }
        IncidentCommand::Verify => verification::verify(&mut next, now)?,
        IncidentCommand::RecordAssessment(assessment) => {
            verification::record_assessment(&mut next, assessment, now)?
        }
        IncidentCommand::ApproveCost => cost_approval::approve_cost(&mut next, now)?,
        IncidentCommand::AddComment {
            comment,
            is_internal,
        } => {
            let id = next.next_comment_id();
            next.comments.push(Comment {
                id,
                comment: comment.trim().to_string(),
                user_name: actor.user_name.clone(),
                is_internal: *is_internal,
                posted_at: now,
            });
        }
        IncidentCommand::Upvote => {
            if incident.status.is_terminal() {
                return Err(invalid(incident, command));
            }
            next.upvotes += 1;
        }
    }
    next.updated_at = now;
    Ok(next)
}

/// A duplicate can only be resolved as a duplicate, and only a merged
/// incident can be resolved as one. Merges go through merge suggestions.
fn check_resolution_type(incident: &Incident, requested: ResolutionType) -> Result<(), CoreError> {
    match (incident.is_duplicate(), requested) {
        (true, ResolutionType::Duplicate) | (false, ResolutionType::Fixed)
        | (false, ResolutionType::Invalid) | (false, ResolutionType::Deferred) => Ok(()),
        (true, other) => Err(CoreError::Validation(format!(
            "Incident {} was merged as a duplicate and cannot be resolved as '{other}'",
            incident.id
        ))),
        (false, ResolutionType::Duplicate) => Err(CoreError::Validation(
            "Incidents are marked duplicate by approving a merge suggestion".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
