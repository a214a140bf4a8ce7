mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use groundstation_core::{
    ddns::HttpExternalIp,
    load_config,
    observation::ObservationContext,
    satellite::ScheduledPasses,
    task::Invocable,
    validate_config, CommandDsp, DecoderRegistry, NoIpClient, NoIpTask, ObservationPlanner,
    ResilientTask, SamplePipelineAdapter, Scheduler, SqliteResultStore, SqliteStateStore,
};

use api::create_router;
use state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("GROUNDSTATION_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Storage directory: {:?}", config.storage.base_dir);

    // Task state (fatal latches, backoff deadlines, last DDNS address)
    let state_store = Arc::new(
        SqliteStateStore::new(&config.database.path).context("Failed to create state store")?,
    );
    info!("State store initialized");

    // Captured and decoded observations
    let result_store = Arc::new(
        SqliteResultStore::new(&config.database.path, config.storage.base_dir.clone())
            .context("Failed to create result store")?,
    );
    info!("Result store initialized");

    let predictor = if config.satellites.is_empty() {
        info!("No satellites configured");
        ScheduledPasses::from_entries(Vec::new())
    } else {
        ScheduledPasses::load(&config.predictor.schedule_path).with_context(|| {
            format!(
                "Failed to load pass schedule from {:?}",
                config.predictor.schedule_path
            )
        })?
    };

    let registry = DecoderRegistry::with_defaults();
    info!("Decoders registered for modes: {:?}", registry.modes());
    let decoder = SamplePipelineAdapter::new(
        Arc::new(registry),
        Arc::new(CommandDsp::new(config.dsp.clone())),
    );

    let context = ObservationContext {
        capture: config.capture.clone(),
        store: result_store,
        decoder,
    };

    let planner = Arc::new(
        ResilientTask::new(
            ObservationPlanner::new(
                config.satellites.clone(),
                config.station.observer(),
                Arc::new(predictor),
                context,
            ),
            state_store.clone(),
        )
        .context("Failed to restore planner state")?,
    );

    let scheduler = Scheduler::new();
    scheduler
        .spawn_periodic(
            planner.clone() as Arc<dyn Invocable>,
            Duration::from_secs(config.scheduler.planner_interval_secs),
        )
        .await;
    info!(
        "Observation planner started for {} satellites",
        config.satellites.len()
    );

    // Create DDNS updater if configured
    let ddns = match &config.ddns {
        Some(ddns_config) => {
            let client = NoIpClient::new(ddns_config).context("Failed to create DDNS client")?;
            let resolver =
                HttpExternalIp::new(ddns_config).context("Failed to create IP resolver")?;
            let task = Arc::new(
                ResilientTask::new(
                    NoIpTask::new(
                        ddns_config.domain.clone(),
                        Arc::new(client),
                        Arc::new(resolver),
                    ),
                    state_store.clone(),
                )
                .context("Failed to restore DDNS state")?,
            );
            scheduler
                .spawn_periodic(
                    task.clone() as Arc<dyn Invocable>,
                    Duration::from_secs(ddns_config.interval_secs),
                )
                .await;
            info!("DDNS updater started for {}", ddns_config.domain);
            Some(task)
        }
        None => {
            info!("DDNS not configured");
            None
        }
    };

    // Create app state
    let state = Arc::new(AppState::new(planner.clone(), ddns));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting status server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");
    scheduler.shutdown().await;
    info!("Task loops stopped");

    // Running captures are torn down before the process exits.
    planner.work().shutdown().await;
    info!("Pass lanes stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
