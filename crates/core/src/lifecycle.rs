//! Runs lifecycle commands against an [`IncidentStore`].
//!
//! Order of checks for every command: role, payload, existence, expected
//! version, status. The store's compare-and-swap catches writers that slip
//! in between the read and the write.

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::cost_approval;
use crate::error::CoreError;
use crate::hierarchy::{self, IncidentGroup};
use crate::incident::{
    Incident, IncidentDraft, IncidentFilter, MaintenanceRecord, NewIncident, NewMaintenance,
    ReporterType,
};
use crate::roles::{Actor, Permission};
use crate::store::{version_conflict, IncidentStore};
use crate::transition::{self, IncidentCommand};
use crate::types::DbId;

/// Command and query entry point for single incidents.
pub struct IncidentLifecycle {
    store: Arc<dyn IncidentStore>,
}

impl IncidentLifecycle {
    pub fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn IncidentStore> {
        &self.store
    }

    /// Submit a new report.
    pub async fn report(&self, actor: &Actor, input: NewIncident) -> Result<Incident, CoreError> {
        actor.require(Permission::Participate)?;
        let reporter_type = if actor.role.is_staff() {
            ReporterType::Staff
        } else {
            ReporterType::Citizen
        };
        let draft = IncidentDraft::from_report(input, reporter_type, actor.user_id, Utc::now())?;
        let incident = self.store.insert_incident(draft).await?;

        tracing::info!(
            incident_id = incident.id,
            user_id = actor.user_id,
            severity = %incident.severity,
            "Incident reported"
        );
        Ok(incident)
    }

    pub async fn get(&self, actor: &Actor, id: DbId) -> Result<Incident, CoreError> {
        actor.require(Permission::Participate)?;
        let incident = self.store.get_incident(id).await?;
        Ok(visible_to(actor, incident))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        filter: &IncidentFilter,
    ) -> Result<Vec<Incident>, CoreError> {
        actor.require(Permission::Participate)?;
        let incidents = self.store.list_incidents(filter).await?;
        Ok(incidents.into_iter().map(|i| visible_to(actor, i)).collect())
    }

    /// Incidents matching `filter`, grouped primary-first.
    pub async fn hierarchy(
        &self,
        actor: &Actor,
        filter: &IncidentFilter,
    ) -> Result<Vec<IncidentGroup>, CoreError> {
        let incidents = self.list(actor, filter).await?;
        Ok(hierarchy::build_hierarchy(&incidents))
    }

    /// Apply a lifecycle command.
    ///
    /// `expected_version`, when given, must match the stored version.
    pub async fn execute(
        &self,
        actor: &Actor,
        id: DbId,
        expected_version: Option<i64>,
        command: IncidentCommand,
    ) -> Result<Incident, CoreError> {
        let result = self
            .try_execute(actor, id, expected_version, &command)
            .await;
        match &result {
            Ok(incident) => tracing::info!(
                incident_id = id,
                user_id = actor.user_id,
                role = %actor.role,
                command = command.name(),
                status = %incident.status,
                version = incident.version,
                "Incident command applied"
            ),
            Err(err) => log_rejection(actor, id, command.name(), err),
        }
        result.map(|incident| visible_to(actor, incident))
    }

    async fn try_execute(
        &self,
        actor: &Actor,
        id: DbId,
        expected_version: Option<i64>,
        command: &IncidentCommand,
    ) -> Result<Incident, CoreError> {
        actor.require(command.permission())?;
        command.validate()?;

        let current = self.store.get_incident(id).await?;
        check_expected_version(&current, expected_version)?;

        let next = transition::transition(&current, actor, command, Utc::now())?;
        self.store.save_incident(&next, current.version).await
    }

    /// Open a maintenance record for the incident.
    pub async fn open_maintenance(
        &self,
        actor: &Actor,
        id: DbId,
        expected_version: Option<i64>,
        request: NewMaintenance,
    ) -> Result<(Incident, MaintenanceRecord), CoreError> {
        let result = self
            .try_open_maintenance(actor, id, expected_version, &request)
            .await;

        match &result {
            Ok((incident, record)) => tracing::info!(
                incident_id = id,
                user_id = actor.user_id,
                maintenance_record_id = record.id,
                cost_status = %incident.cost_status,
                version = incident.version,
                "Maintenance record opened"
            ),
            Err(err) => log_rejection(actor, id, "create_maintenance", err),
        }
        result.map(|(incident, record)| (visible_to(actor, incident), record))
    }

    async fn try_open_maintenance(
        &self,
        actor: &Actor,
        id: DbId,
        expected_version: Option<i64>,
        request: &NewMaintenance,
    ) -> Result<(Incident, MaintenanceRecord), CoreError> {
        actor.require(Permission::Triage)?;
        request.validate()?;

        let current = self.store.get_incident(id).await?;
        check_expected_version(&current, expected_version)?;

        let mut next = current.clone();
        cost_approval::open_maintenance(&mut next, request, Utc::now())?;
        self.store
            .attach_maintenance(&next, current.version, request)
            .await
    }

    /// The maintenance record linked to the incident, if any.
    pub async fn maintenance(
        &self,
        actor: &Actor,
        id: DbId,
    ) -> Result<Option<MaintenanceRecord>, CoreError> {
        actor.require(Permission::InternalNotes)?;
        self.store.get_maintenance(id).await
    }
}

fn check_expected_version(current: &Incident, expected: Option<i64>) -> Result<(), CoreError> {
    match expected {
        Some(expected) if expected != current.version => {
            Err(version_conflict(current.id, expected, current.version))
        }
        _ => Ok(()),
    }
}

fn visible_to(actor: &Actor, incident: Incident) -> Incident {
    if actor.role.can(Permission::InternalNotes) {
        incident
    } else {
        incident.without_internal_comments()
    }
}

/// Log a refused command at a level matching its cause.
pub(crate) fn log_rejection(actor: &Actor, id: DbId, command: &str, err: &CoreError) {
    match err {
        CoreError::Conflict(_) | CoreError::PermissionDenied(_) => tracing::warn!(
            incident_id = id,
            user_id = actor.user_id,
            role = %actor.role,
            command,
            error = %err,
            "Incident command refused"
        ),
        CoreError::Internal(_) => tracing::error!(
            incident_id = id,
            command,
            error = %err,
            "Incident command failed"
        ),
        _ => tracing::debug!(
            incident_id = id,
            user_id = actor.user_id,
            command,
            error = %err,
            "Incident command rejected"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
