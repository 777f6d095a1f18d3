//! Maps to the `maintenance_records` table.

use fieldwatch_core::incident::MaintenanceRecord;
use fieldwatch_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `maintenance_records` table.
#[derive(Debug, Clone, FromRow)]
pub struct MaintenanceRow {
    pub id: DbId,
    pub incident_id: DbId,
    pub description: String,
    pub estimated_cost: f64,
    pub created_at: Timestamp,
}

impl From<MaintenanceRow> for MaintenanceRecord {
    fn from(row: MaintenanceRow) -> Self {
        MaintenanceRecord {
            id: row.id,
            incident_id: row.incident_id,
            description: row.description,
            estimated_cost: row.estimated_cost,
            created_at: row.created_at,
        }
    }
}
