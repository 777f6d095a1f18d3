//! Maintenance cost gate.
//!
//! An incident carrying unapproved maintenance costs cannot reach `resolved`
//! or `closed`; resolving it parks it in `waiting_approval` until a manager
//! signs off the costs.

use crate::error::CoreError;
use crate::incident::{CostStatus, Incident, IncidentStatus, NewMaintenance};
use crate::types::Timestamp;

/// The status a successful `resolve` lands in.
pub fn resolution_target(incident: &Incident) -> IncidentStatus {
    match incident.cost_status {
        CostStatus::Pending => IncidentStatus::WaitingApproval,
        CostStatus::None | CostStatus::Approved => IncidentStatus::Resolved,
    }
}

/// Whether costs block closing the incident.
pub fn ensure_costs_settled(incident: &Incident) -> Result<(), CoreError> {
    if incident.cost_status == CostStatus::Pending {
        return Err(CoreError::InvalidTransition {
            from: format!("{} (maintenance costs pending approval)", incident.status),
            command: "close",
        });
    }
    Ok(())
}

/// Approve pending maintenance costs and release the incident to `resolved`.
///
/// Accepts `waiting_approval`, and `resolved` with pending costs for records
/// written before the gate existed.
pub fn approve_cost(incident: &mut Incident, now: Timestamp) -> Result<(), CoreError> {
    let eligible = match incident.status {
        IncidentStatus::WaitingApproval => true,
        IncidentStatus::Resolved => incident.cost_status == CostStatus::Pending,
        IncidentStatus::Reported
        | IncidentStatus::Acknowledged
        | IncidentStatus::Assigned
        | IncidentStatus::Closed
        | IncidentStatus::Rejected => false,
    };
    if !eligible {
        return Err(CoreError::InvalidTransition {
            from: format!("{} (cost {})", incident.status, incident.cost_status),
            command: "approve costs for",
        });
    }

    incident.cost_status = CostStatus::Approved;
    incident.status = IncidentStatus::Resolved;
    incident.resolved_at.get_or_insert(now);
    incident.updated_at = now;
    Ok(())
}

/// Prepare an incident for linking a new maintenance record.
///
/// The caller persists the record and sets `maintenance_record_id`
/// atomically with this change.
pub fn open_maintenance(
    incident: &mut Incident,
    request: &NewMaintenance,
    now: Timestamp,
) -> Result<(), CoreError> {
    if !request.estimated_cost.is_finite() || request.estimated_cost < 0.0 {
        return Err(CoreError::Validation(format!(
            "estimated_cost must be a non-negative number, got {}",
            request.estimated_cost
        )));
    }
    if request.description.trim().is_empty() {
        return Err(CoreError::Validation(
            "maintenance description must not be empty".into(),
        ));
    }
    if incident.status.is_terminal()
        || matches!(
            incident.status,
            IncidentStatus::Resolved | IncidentStatus::WaitingApproval
        )
    {
        return Err(CoreError::InvalidTransition {
            from: incident.status.to_string(),
            command: "open maintenance for",
        });
    }
    if let Some(existing) = incident.maintenance_record_id {
        return Err(CoreError::Conflict(format!(
            "Incident {} is already linked to maintenance record {existing}",
            incident.id
        )));
    }

    if request.estimated_cost > 0.0 {
        incident.cost_status = CostStatus::Pending;
    }
    incident.updated_at = now;
    Ok(())
}
