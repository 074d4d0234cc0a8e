//! services/generator/src/bin/generator.rs

use devotional_core::ports::{SeriesRepository, SessionRepository};
use generator_lib::{
    adapters::{MemoryStore, ReqwestTransport, SqliteStore, TemplatePromptBuilder},
    config::Config,
    error::ServiceError,
    orchestrator::{
        AutoRetryPolicy, AutoRetryScheduler, BackendGateway, BatchExecutor, GenerationService, RetryPolicy,
    },
    web::{router, state::AppState},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open Storage & Run Migrations ---
    let (series_repo, session_repo): (Arc<dyn SeriesRepository>, Arc<dyn SessionRepository>) =
        if config.database_url == "memory" {
            warn!("Using in-memory storage; nothing will survive a restart");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        } else {
            info!("Connecting to database...");
            let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
            info!("Running database migrations...");
            store.run_migrations().await?;
            info!("Database migrations complete.");
            (store.clone(), store)
        };

    // --- 3. Initialize the Generation Pipeline ---
    let backend = &config.backend;
    let transport = Arc::new(ReqwestTransport::new(reqwest::Client::new(), backend.api_key.clone()));
    let gateway = BackendGateway::new(transport, backend.primary_url.clone(), backend.fallback_url.clone());
    info!(endpoints = ?gateway.endpoints(), "Generation backend configured");

    let executor = BatchExecutor::new(
        gateway,
        Arc::new(TemplatePromptBuilder::new(backend.model.clone(), backend.max_tokens)),
        backend.path.clone(),
        backend.request_timeout,
        RetryPolicy::from(&config.generation),
    );
    let service = GenerationService::new(executor, series_repo, session_repo, &config.generation);

    // The server cannot observe the client's network, so assume online until told otherwise.
    let (online, connectivity) = watch::channel(true);
    let scheduler = AutoRetryScheduler::new(
        Arc::new(service.clone()),
        connectivity,
        AutoRetryPolicy::new(config.auto_retry_base_delay, config.generation.job_timeout),
    );
    let app_state = Arc::new(AppState::new(service.clone(), scheduler, online));

    // --- 4. Recover Jobs Interrupted by the Last Shutdown ---
    let recovered = service.recover_interrupted().await?;
    if !recovered.is_empty() {
        info!(count = recovered.len(), "Handing interrupted generations to auto-retry");
    }
    for series_id in recovered {
        app_state.ensure_watcher(series_id, None);
    }

    // --- 5. Start the Server ---
    let app = router(app_state);
    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
