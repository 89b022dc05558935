//! # World Freight Sync Server
//!
//! Runs the dashboard's data synchronisation layer as a standalone process:
//! a `SyncController` fed by the upstream push feed (or by REST snapshots in
//! poll mode), exposed to dashboard clients as a small JSON API.
//!
//! Configuration is layered defaults -> `server_freight.conf` (JSON) ->
//! environment (`FREIGHT_*`, `.env` honoured) -> command line.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use lib_freight::configs::ClientConfig;
use lib_freight::core::SyncController;
use lib_freight::ingestors::HttpSnapshotSource;
use lib_freight::loggers::setup_logging;
use lib_freight::retrieve::{ClassifierClient, RequestClient};
use tokio::signal;

mod freight_logic;
use freight_logic::config::{self, Config};
use freight_logic::routes::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config(Config::parse())?;
    let log_file = setup_logging(&config.log_dir(), "server_freight", config.log_level())?;
    log::info!("Logging to {}", log_file.display());

    let settings = config.settings()?;
    let mode = config.sync_mode()?;
    log::info!("{}", settings);

    let api = Arc::new(RequestClient::new(settings.client.clone())?);
    let classifier = Arc::new(ClassifierClient::new(ClientConfig {
        base_url: config.classifier_base_url(&settings),
        ..settings.client.clone()
    })?);

    let source = Arc::new(HttpSnapshotSource::new(
        Arc::clone(&api),
        settings.sync.snapshot_endpoint.clone(),
    ));
    let controller = SyncController::builder(settings.sync.clone(), settings.socket.clone())
        .source(source)
        .build();
    controller.start(mode).await?;

    let app = routes::router(AppState {
        controller: controller.clone(),
        api,
        classifier,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    log::info!("Starting HTTP server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.stop().await;
    log::info!("Shutdown complete.");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Ctrl-C received, initiating shutdown."),
        _ = terminate => log::info!("SIGTERM received, initiating shutdown."),
    }
}
