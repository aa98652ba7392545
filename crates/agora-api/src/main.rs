//! Agora API server entry point.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_api::config::ServerConfig;
use agora_api::error::AppError;
use agora_api::routes::engine::run_tick;
use agora_api::state::AppState;
use agora_api::telemetry;
use agora_catalog::ScenarioCatalog;
use agora_core::clock::{Clock, SystemClock};
use agora_core::rng::{DeterministicRng, StdRandom};
use agora_narrator::HttpNarrator;
use agora_store::pg_agent_directory::PgAgentDirectory;
use agora_store::pg_session_repository::PgSessionRepository;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let telemetry = telemetry::init()?;
    let result = run().await;
    if let Err(e) = &result {
        error!(error = %e, "server exited with error");
    }
    telemetry.shutdown();
    result
}

async fn run() -> Result<(), AppError> {
    info!("Starting Agora API server");

    let config = ServerConfig::from_env()?;

    let catalog = match &config.scenario_dir {
        Some(dir) => ScenarioCatalog::from_dir(dir)?,
        None => ScenarioCatalog::builtin()?,
    };
    info!(
        scenarios = catalog.scenarios().len(),
        version = %catalog.version(),
        "scenario catalog loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let narrator = HttpNarrator::new(config.narrator.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(StdRandom::from_os()));

    let app_state = AppState::new(
        Arc::new(PgSessionRepository::new(pool.clone())),
        Arc::new(PgAgentDirectory::new(pool)),
        Arc::new(narrator),
        Arc::new(catalog),
        clock,
        rng,
        config.engine.clone(),
    );

    if let Some(interval) = config.tick_interval {
        tokio::spawn(tick_loop(app_state.clone(), interval));
    }

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = agora_api::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Runs matchmaking and the deadline sweep every `interval`.
async fn tick_loop(state: AppState, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "engine tick loop enabled");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match run_tick(&state).await {
            Ok(report) => info!(
                cancelled = report.matchmaking.cancelled,
                started = report.matchmaking.started,
                due = report.sweep.due,
                advanced = report.sweep.advanced,
                completed = report.sweep.completed,
                deferred = report.sweep.deferred,
                "engine tick finished"
            ),
            Err(e) => error!(error = %e, "engine tick failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
