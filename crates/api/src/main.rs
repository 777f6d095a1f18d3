use std::net::SocketAddr;
use std::sync::Arc;

use fieldwatch_core::oracle::SimilarityOracle;
use fieldwatch_core::store::memory::InMemoryIncidentStore;
use fieldwatch_core::store::IncidentStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fieldwatch_api::config::{LogFormat, ServerConfig};
use fieldwatch_api::oracle::{DisabledSimilarityOracle, HttpSimilarityOracle};
use fieldwatch_api::router::build_app_router;
use fieldwatch_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store ---
    let store: Arc<dyn IncidentStore> = match &config.database_url {
        Some(database_url) => {
            let pool = fieldwatch_db::create_pool(database_url, config.database_max_connections)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            fieldwatch_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            fieldwatch_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(fieldwatch_db::PgIncidentStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
            Arc::new(InMemoryIncidentStore::new())
        }
    };

    // --- Similarity oracle ---
    let oracle: Arc<dyn SimilarityOracle> = match &config.similarity_oracle_url {
        Some(url) => {
            let oracle = HttpSimilarityOracle::new(url, config.similarity_oracle_timeout())
                .expect("Failed to build similarity oracle client");
            tracing::info!(url = %url, "Similarity oracle configured");
            Arc::new(oracle)
        }
        None => {
            tracing::warn!("SIMILARITY_ORACLE_URL not set; duplicate scans will fail");
            Arc::new(DisabledSimilarityOracle)
        }
    };

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );

    // --- Router ---
    let state = AppState::new(config, store, oracle);
    let app = build_app_router(state);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "fieldwatch_api=debug,fieldwatch_core=debug,fieldwatch_db=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
