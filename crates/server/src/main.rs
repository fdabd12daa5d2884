mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotnik_core::{
    load_config, validate_config, CredentialProvider, CredentialRefresh, EnvCredentialProvider,
    GenerationClient, HttpGenerationClient, InMemoryJobStore, JobStore, LoggingCredentialRefresh,
    ProductionOrchestrator,
};

use api::create_router;
use state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SPOTNIK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Generation service: {}", config.generation.base_url);

    // Credentials are snapshotted per remote call; a rotated SPOTNIK_API_KEY
    // is picked up without a restart.
    let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentialProvider::new(
        "SPOTNIK_API_KEY",
        config.generation.api_key.clone(),
    ));

    let client: Arc<dyn GenerationClient> = Arc::new(HttpGenerationClient::new(
        config.generation.clone(),
        credentials,
    ));
    info!("Generation client initialized");

    let credential_refresh: Arc<dyn CredentialRefresh> = Arc::new(LoggingCredentialRefresh);

    // Create the in-memory job store
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    info!("Job store initialized");

    // Create the orchestrator
    let orchestrator = Arc::new(ProductionOrchestrator::new(
        config.orchestrator.clone(),
        Arc::clone(&store),
        client,
        credential_refresh,
    ));

    if config.orchestrator.enabled {
        orchestrator.start().await;
        info!("Production orchestrator started");
    } else {
        info!("Orchestrator disabled in config; submitted jobs will queue");
    }

    // Create app state and router
    let app_state = Arc::new(AppState::new(
        config.clone(),
        store,
        Arc::clone(&orchestrator),
    ));
    let app = create_router(app_state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop orchestrator if running
    info!("Server shutting down...");
    if config.orchestrator.enabled {
        orchestrator.stop().await;
        info!("Orchestrator stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
