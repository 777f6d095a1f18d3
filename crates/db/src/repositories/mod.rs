//! Query layer. Each repository is a zero-sized struct whose functions take
//! any Postgres executor, so the same query runs on the pool or inside a
//! transaction.

mod incident_repo;
mod maintenance_repo;
mod merge_suggestion_repo;

pub use incident_repo::IncidentRepo;
pub use maintenance_repo::MaintenanceRepo;
pub use merge_suggestion_repo::MergeSuggestionRepo;
