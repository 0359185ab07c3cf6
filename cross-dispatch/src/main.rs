//! cross-dispatch - Dispatch trigger server
//!
//! Serves the HTTP trigger that turns due scheduled posts into published
//! ones. Designed to sit behind an external scheduler (cron, a cloud
//! scheduler) that hits GET /dispatch on its tick.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use libcrosscast::logging::{LogFormat, LoggingConfig};
use libcrosscast::{build_registry, Config, CrosscastError, Database, Dispatcher, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "cross-dispatch")]
#[command(version)]
#[command(about = "Dispatch trigger server for Crosscast scheduled posts")]
#[command(long_about = "\
cross-dispatch - Dispatch trigger server for Crosscast scheduled posts

DESCRIPTION:
    cross-dispatch serves GET /dispatch, which runs one dispatch batch:
    every scheduled post whose time has passed is published to its linked
    platform account and marked posted. Failures are isolated per post and
    reported in the JSON response.

    The endpoint is meant to be hit by an external scheduler (cron, a cloud
    scheduler) on a regular tick. Requests must carry the configured shared
    secret as a bearer token; without a configured secret the endpoint is
    open, which is only acceptable for local development.

USAGE:
    # Serve on the configured bind address
    cross-dispatch

    # Serve on a specific address
    cross-dispatch --bind 0.0.0.0:9000

    # Run one batch and print the JSON report, no server
    cross-dispatch --once

ENDPOINTS:
    GET /dispatch - run one batch (Authorization: Bearer <secret>)
    GET /healthz  - liveness probe, no authentication

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (in-flight batch finishes)

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml

    [server]
    bind = \"127.0.0.1:8787\"
    dispatch_secret = \"...\"   # or CROSSCAST_DISPATCH_SECRET

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    3 - Invalid input

For more information, visit: https://github.com/crosscast/crosscast
")]
struct Cli {
    /// Bind address (overrides config)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Run one dispatch batch, print the JSON report, and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct TriggerResponse {
    success: bool,
    message: String,
    processed: usize,
    successful: usize,
    failed: usize,
    errors: Vec<String>,
}

#[derive(Serialize)]
struct TriggerError {
    success: bool,
    error: String,
}

struct AppState {
    dispatcher: Dispatcher,
    secret: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    LoggingConfig::new(LogFormat::Text, "info".to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let registry = build_registry(&config)?;
    if registry.is_empty() {
        warn!("no providers configured; every dispatch will fail per post");
    }
    let dispatcher = Dispatcher::new(db, registry);

    if cli.once {
        let report = dispatcher.run_once().await?;
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        return Ok(());
    }

    let secret = config.server.dispatch_secret.clone();
    if secret.is_none() {
        warn!("no dispatch secret configured; the trigger endpoint accepts unauthenticated requests");
    }

    let state = Arc::new(AppState { dispatcher, secret });
    let app = router(state);

    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| CrosscastError::InvalidInput(format!("Failed to bind {}: {}", bind, e)))?;
    info!("cross-dispatch listening on {}", bind);

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
        .map_err(|e| CrosscastError::Database(libcrosscast::error::DbError::IoError(e)))?;

    info!("cross-dispatch stopped");
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/dispatch", get(trigger))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Bearer comparison against the configured secret. No secret means open.
fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret)
}

async fn trigger(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    // Rejected before any database or provider work happens
    if !authorized(&headers, state.secret.as_deref()) {
        warn!("rejected dispatch trigger with missing or wrong bearer token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(TriggerError {
                success: false,
                error: "unauthorized".to_string(),
            }),
        )
            .into_response();
    }

    match state.dispatcher.run_once().await {
        Ok(report) => (
            StatusCode::OK,
            Json(TriggerResponse {
                success: true,
                message: report.message(),
                processed: report.processed,
                successful: report.successful,
                failed: report.failed,
                errors: report.errors,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("dispatch batch failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TriggerError {
                    success: false,
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn wait_for_shutdown(shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        sleep(Duration::from_millis(250)).await;
    }
    info!("shutdown requested");
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| CrosscastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            info!("received signal {}, shutting down", sig);
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}
