//! # Caption Queue - Main Application Entry Point
//!
//! HTTP server that turns uploaded media into word-level subtitle files.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **captions**: SRT/ASS rendering from word timestamps
//! - **audio**: Audio extraction from uploaded media
//! - **transcription**: Speech-to-text engine interface
//! - **jobs**: Job registry, work queue and the single worker thread
//! - **state**: Shared application state and request metrics
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request logging and metrics collection
//! - **handlers**: HTTP request handlers for the job API
//! - **error**: Error types and HTTP error responses
//!
//! ## Startup sequence:
//! 1. Load `.env`, set up tracing, load and validate configuration
//! 2. Create storage directories, clear files left by a previous run, and
//!    start the job manager's worker
//! 3. Start the periodic retention sweep
//! 4. Serve HTTP until SIGINT/SIGTERM, then stop the server and the worker

mod audio;
mod captions;
mod config;
mod error;
mod handlers;
mod health;
mod jobs;
mod middleware;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::jobs::{spawn_retention_sweep, JobManager};
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting caption-queue v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        max_jobs = config.jobs.max_jobs_in_memory,
        model = %config.transcription.model,
        "Configuration loaded"
    );

    let manager = JobManager::from_config(&config);
    manager
        .paths()
        .ensure_dirs()
        .context("failed to create storage directories")?;
    match manager.paths().purge_leftovers() {
        Ok(0) => {}
        Ok(removed) => info!(removed, "Removed files left by a previous run"),
        Err(e) => warn!("Failed to clear leftover job files: {}", e),
    }
    let manager = Arc::new(manager);
    manager.start()?;

    let sweep = if config.jobs.cleanup_interval_minutes > 0 {
        Some(spawn_retention_sweep(
            Arc::clone(&manager),
            Duration::from_secs(config.jobs.cleanup_interval_minutes * 60),
            config.jobs.max_job_age_hours,
        ))
    } else {
        None
    };

    let app_state = AppState::new(config.clone(), Arc::clone(&manager));
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware runs outermost-last: TracingLogger assigns the request id first.
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .wrap(TracingLogger::default())
            .configure(handlers::configure_routes)
            .service(web::scope("/api/v1").configure(handlers::configure_routes))
    })
    .shutdown_timeout(30)
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        signal = wait_for_shutdown() => {
            info!(signal, "Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    if let Some(sweep) = sweep {
        sweep.abort();
    }

    info!("Stopping job worker...");
    let worker = Arc::clone(&manager);
    match tokio::task::spawn_blocking(move || worker.stop()).await {
        Ok(true) => info!("Job worker stopped"),
        Ok(false) => warn!("Job worker still busy at exit; the in-flight job is abandoned"),
        Err(e) => error!("Failed to stop job worker: {}", e),
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "info", "caption_queue=debug")
/// - If not set, defaults to "caption_queue=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caption_queue=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

/// Resolve on SIGINT or SIGTERM, returning the signal's name.
#[cfg(unix)]
async fn wait_for_shutdown() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install signal handlers: {}", e);
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
