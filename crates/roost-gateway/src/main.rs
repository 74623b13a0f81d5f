// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Roost Gateway - Instance Orchestration Server
//!
//! An HTTP server responsible for:
//! - Message routing (deliver to, queue for, or launch an instance)
//! - Instance launches via the machines API
//! - Watchdog sweeps (reap instances that died or went idle)
//! - Prewarming (keep one spare instance warm between sweeps)

use std::sync::Arc;

use tracing::{error, info, warn};

use roost_core::metrics::Metrics;
use roost_core::store::SqliteStore;
use roost_gateway::config::Config;
use roost_gateway::delivery::BridgeDelivery;
use roost_gateway::launcher::{Launcher, MachinesLauncher};
use roost_gateway::prewarmer::{Prewarmer, PrewarmerConfig};
use roost_gateway::router::MessageRouter;
use roost_gateway::server::{self, AppState};
use roost_gateway::watchdog::{Watchdog, WatchdogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roost_gateway=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        listen_addr = %config.listen_addr,
        database_path = %config.database_path,
        machines_api = %config.machines_api_url,
        "Starting Roost Gateway"
    );

    // Open the state store; this runs migrations
    let store = Arc::new(SqliteStore::from_path(&config.database_path).await?);
    info!("State store ready");

    let launcher = Arc::new(MachinesLauncher::new(
        &config.machines_api_url,
        &config.machines_api_token,
        &config.machines_image,
        config.machines_region.clone(),
    )?);
    info!(
        launcher_type = launcher.launcher_type(),
        image = %config.machines_image,
        "Launcher initialized"
    );

    let delivery = BridgeDelivery::new(&config.bridge_auth_token)?;
    let metrics = Metrics::new(config.metrics_enabled);

    let router = Arc::new(MessageRouter::new(
        store.clone(),
        launcher.clone(),
        delivery,
        metrics.clone(),
        &config.bridge_auth_token,
        &config.callback_url,
    ));

    // Start the watchdog
    let watchdog = Watchdog::new(
        store.clone(),
        launcher.clone(),
        WatchdogConfig {
            poll_interval: config.watchdog_interval,
        },
    );
    let watchdog_shutdown = watchdog.shutdown_handle();
    let watchdog_handle = tokio::spawn(async move {
        watchdog.run().await;
    });

    // Start the prewarmer
    let prewarmer = Prewarmer::new(
        store.clone(),
        launcher.clone(),
        metrics,
        PrewarmerConfig {
            poll_interval: config.prewarm_interval,
            warm_duration: config.prewarm_duration,
        },
        &config.bridge_auth_token,
        &config.callback_url,
    );
    let prewarm_shutdown = prewarmer.shutdown_handle();
    let prewarm_handle = tokio::spawn(async move {
        prewarmer.run().await;
    });

    // Start the ingress server
    let app = server::app(AppState {
        router,
        store: store.clone(),
    });
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Gateway ready");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Ingress server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    // Cancel the server task, then stop the background workers
    server_handle.abort();
    watchdog_shutdown.notify_one();
    prewarm_shutdown.notify_one();

    watchdog_handle.await?;
    prewarm_handle.await?;

    info!("Shutdown complete");

    Ok(())
}
