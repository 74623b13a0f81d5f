// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Roost Bridge - In-Instance Sidecar
//!
//! A per-instance process responsible for:
//! - The HTTP surface the gateway delivers messages to
//! - Streaming turns through the agent's control socket
//! - Workspace restore on boot and periodic backup
//! - Draining messages queued while the instance was starting

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use roost_bridge::callback::CallbackSender;
use roost_bridge::config::Config;
use roost_bridge::drain;
use roost_bridge::history::ContextPrefix;
use roost_bridge::lifecycle::{self, BackupWorker, BackupWorkerConfig, Lifecycle};
use roost_bridge::processing::MessageProcessor;
use roost_bridge::server::{self, BridgeState};
use roost_bridge::startup::{self, AddressResolver, MachinesAddressResolver, StartupTimings};
use roost_bridge::sync::DirSync;
use roost_core::metrics::Metrics;
use roost_core::store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roost_bridge=info".into()),
        )
        .init();

    let boot = Instant::now();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        user_key = %config.user_key,
        instance_handle = %config.instance_handle,
        bridge_port = config.bridge_port,
        "Starting Roost Bridge"
    );

    // Open the state store; this runs migrations
    let store = Arc::new(SqliteStore::from_path(&config.database_path).await?);
    info!("State store ready");

    let metrics = Metrics::new(config.metrics_enabled);
    let sync = DirSync::new(&config.workspace_dir, &config.backup_dir);
    let lifecycle = Arc::new(Lifecycle::new(
        store.clone(),
        &config.user_key,
        &config.instance_handle,
    ));

    // Restore the workspace and load conversation history in parallel
    let context = startup::run_restore_phase(&sync, store.as_ref(), &config.user_key).await;
    let restore_ms = boot.elapsed().as_millis() as u64;

    // Wait for the agent's control port, then connect the streaming client
    let wait_started = Instant::now();
    startup::wait_for_agent_port(&config.agent_ws_url).await?;
    let agent_wait_ms = wait_started.elapsed().as_millis() as u64;

    let connect_started = Instant::now();
    let client = Arc::new(startup::connect_agent(&config).await?);
    let client_ready_ms = connect_started.elapsed().as_millis() as u64;
    info!("Agent client ready");

    // Stand up the HTTP surface so the gateway can deliver directly
    let callback = CallbackSender::new(&config.callback_url)?;
    let processor = Arc::new(MessageProcessor::new(
        client.clone(),
        callback,
        store.clone(),
        Arc::new(ContextPrefix::new(context)),
    ));
    let shutdown = Arc::new(Notify::new());

    let app = server::app(BridgeState {
        lifecycle: lifecycle.clone(),
        processor: processor.clone(),
        auth_token: config.bridge_auth_token.clone(),
        shutdown: shutdown.clone(),
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.bridge_port)).await?;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Bridge server error: {}", e);
        }
    });

    lifecycle.mark_running().await?;
    info!(port = config.bridge_port, "Bridge ready");

    // Publish the instance address in the background
    let resolver: Option<Arc<dyn AddressResolver>> =
        match (&config.machines_api_url, &config.machines_api_token) {
            (Some(url), Some(token)) => Some(Arc::new(MachinesAddressResolver::new(url, token)?)),
            _ => None,
        };
    startup::spawn_address_discovery(resolver, lifecycle.clone());

    // Replay whatever queued up while this instance was booting
    let pending_consumed =
        match drain::drain_pending(store.as_ref(), &processor, &metrics, &config.user_key).await {
            Ok(consumed) => consumed,
            Err(e) => {
                error!(error = %e, "Queue drain aborted, remaining messages stay queued");
                0
            }
        };

    let timings = StartupTimings {
        restore_ms,
        agent_wait_ms,
        client_ready_ms,
        total_ms: boot.elapsed().as_millis() as u64,
        pending_consumed,
    };
    startup::publish_startup_metrics(&metrics, &timings, &config.channel);
    info!(
        total_ms = timings.total_ms,
        restore_ms = timings.restore_ms,
        agent_wait_ms = timings.agent_wait_ms,
        client_ready_ms = timings.client_ready_ms,
        pending_consumed = timings.pending_consumed,
        "Startup complete"
    );

    // Start the periodic backup worker
    let backup_worker = BackupWorker::new(sync.clone(), BackupWorkerConfig::default());
    let backup_shutdown = backup_worker.shutdown_handle();
    let backup_handle = tokio::spawn(async move {
        backup_worker.run().await;
    });

    wait_for_stop(&shutdown).await?;

    // Stop taking traffic, then flush state
    server_handle.abort();
    lifecycle::graceful_shutdown(&lifecycle, &sync, &backup_shutdown).await;
    backup_handle.await?;
    client.close();

    info!("Shutdown complete");

    Ok(())
}

/// Block until ctrl-c, SIGTERM, or an HTTP shutdown request.
async fn wait_for_stop(shutdown: &Notify) -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = async move {
        terminate.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Interrupt received, shutting down...");
        }
        _ = terminate => {
            info!("Termination signal received, shutting down...");
        }
        _ = shutdown.notified() => {
            info!("Shutdown requested, shutting down...");
        }
    }

    Ok(())
}
