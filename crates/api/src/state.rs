use std::sync::Arc;

use fieldwatch_core::lifecycle::IncidentLifecycle;
use fieldwatch_core::merge_coordinator::MergeCoordinator;
use fieldwatch_core::oracle::SimilarityOracle;
use fieldwatch_core::store::IncidentStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub lifecycle: Arc<IncidentLifecycle>,
    pub merges: Arc<MergeCoordinator>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn IncidentStore>,
        oracle: Arc<dyn SimilarityOracle>,
    ) -> Self {
        let merges = MergeCoordinator::new(
            Arc::clone(&store),
            oracle,
            config.similarity_oracle_timeout(),
        );
        Self {
            config: Arc::new(config),
            lifecycle: Arc::new(IncidentLifecycle::new(store)),
            merges: Arc::new(merges),
        }
    }

    /// Backend name of the configured store.
    pub fn store_backend(&self) -> &'static str {
        self.lifecycle.store().backend()
    }
}
