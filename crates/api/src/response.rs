//! Shared response envelope types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope.

use fieldwatch_core::incident::{Incident, MaintenanceRecord};
use fieldwatch_core::verification::{self, TrustClass};
use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// An incident with its derived trust classification.
#[derive(Debug, Serialize)]
pub struct IncidentResponse {
    #[serde(flatten)]
    pub incident: Incident,
    pub trust: TrustClass,
    pub trust_label: &'static str,
}

impl From<Incident> for IncidentResponse {
    fn from(incident: Incident) -> Self {
        let trust = verification::classify_incident(&incident);
        Self {
            incident,
            trust,
            trust_label: trust.label(),
        }
    }
}

/// Result of opening a maintenance record.
#[derive(Debug, Serialize)]
pub struct MaintenanceResponse {
    pub incident: IncidentResponse,
    pub maintenance_record: MaintenanceRecord,
}
