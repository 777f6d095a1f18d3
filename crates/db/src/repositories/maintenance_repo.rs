//! Repository for the `maintenance_records` table. Rows are insert-only.

use fieldwatch_core::incident::NewMaintenance;
use fieldwatch_core::types::{DbId, Timestamp};
use sqlx::PgExecutor;

use crate::models::maintenance::MaintenanceRow;

const COLUMNS: &str = "id, incident_id, description, estimated_cost, created_at";

pub struct MaintenanceRepo;

impl MaintenanceRepo {
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        incident_id: DbId,
        input: &NewMaintenance,
        created_at: Timestamp,
    ) -> Result<MaintenanceRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO maintenance_records (incident_id, description, estimated_cost, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MaintenanceRow>(&query)
            .bind(incident_id)
            .bind(input.description.trim())
            .bind(input.estimated_cost)
            .bind(created_at)
            .fetch_one(executor)
            .await
    }

    pub async fn find_for_incident<'e>(
        executor: impl PgExecutor<'e>,
        incident_id: DbId,
    ) -> Result<Option<MaintenanceRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM maintenance_records WHERE incident_id = $1");
        sqlx::query_as::<_, MaintenanceRow>(&query)
            .bind(incident_id)
            .fetch_optional(executor)
            .await
    }
}
