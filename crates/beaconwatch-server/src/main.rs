//! # beaconwatch-server
//!
//! HTTP host for the beaconwatch proximity engine.
//!
//! This binary provides:
//! - REST API for the scanner lifecycle, reference data, geofence entries,
//!   notifications and audit batches
//! - OpenAPI document at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, using the in-process backend
//! BEACONWATCH__SCANNER__BACKEND=mock cargo run --package beaconwatch-server
//!
//! # Production
//! ./beaconwatch-server
//! ```
//!
//! The configuration file is read from `BEACONWATCH_CONFIG` when set,
//! otherwise from the platform default.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use beaconwatch_core::{default_config_path, Config, StartRequest};
use beaconwatch_server::state::{spawn_notification_recorder, AppState};
use beaconwatch_server::{api, logging};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var_os("BEACONWATCH_CONFIG").map_or_else(default_config_path, PathBuf::from);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    logging::init(config.server.production)?;
    info!(
        config = %config_path.display(),
        backend = ?config.scanner.backend,
        "Starting beaconwatch-server"
    );

    let backend = config.scanner.backend.create_backend()?;
    let bind = config.server.bind.clone();
    let auto_start = config.scanner.auto_start.then(|| StartRequest {
        network_id: config.scanner.network_id,
        behavior: config.scanner.behavior,
    });

    let state = Arc::new(AppState::new(config, backend)?);
    let recorder = spawn_notification_recorder(Arc::clone(&state));

    if let Some(request) = auto_start {
        let status = state.scanner.start(request).await;
        if status.success {
            info!(message = %status.message, "scanner auto-started");
        } else {
            warn!(message = %status.message, "scanner did not auto-start");
        }
    }

    let app = api::create_router(Arc::clone(&state)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive()),
    );

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    state.scanner.stop().await;
    recorder.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
