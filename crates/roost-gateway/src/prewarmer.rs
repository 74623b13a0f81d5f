// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that keeps one instance warm.
//!
//! Cold launches dominate perceived latency, so the prewarmer keeps a
//! single spare instance running under a sentinel user key. The router
//! hands the spare to the first user without a record; this worker
//! replaces it on the next sweep. At most one instance is ever warm: if
//! any record (real user or sentinel) is active, the sweep only extends
//! its freshness horizon.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use roost_core::metrics::Metrics;
use roost_core::model::{PREWARM_USER_KEY, TaskState, TaskStatus};
use roost_core::store::StateStore;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::error::{GatewayError, Result};
use crate::launcher::{LaunchSpec, Launcher};

/// Configuration for the prewarmer.
#[derive(Debug, Clone)]
pub struct PrewarmerConfig {
    /// How often to check whether a warm instance exists.
    pub poll_interval: Duration,
    /// How long a prewarmed instance stays claimable.
    pub warm_duration: Duration,
}

impl Default for PrewarmerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1800),
            warm_duration: Duration::from_secs(3600),
        }
    }
}

/// Background worker that keeps one spare instance running.
pub struct Prewarmer {
    store: Arc<dyn StateStore>,
    launcher: Arc<dyn Launcher>,
    metrics: Metrics,
    config: PrewarmerConfig,
    bridge_auth_token: String,
    callback_url: String,
    shutdown: Arc<Notify>,
}

impl Prewarmer {
    /// Create a new prewarmer.
    pub fn new(
        store: Arc<dyn StateStore>,
        launcher: Arc<dyn Launcher>,
        metrics: Metrics,
        config: PrewarmerConfig,
        bridge_auth_token: &str,
        callback_url: &str,
    ) -> Self {
        Self {
            store,
            launcher,
            metrics,
            config,
            bridge_auth_token: bridge_auth_token.to_string(),
            callback_url: callback_url.to_string(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the prewarmer loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            warm_duration_secs = self.config.warm_duration.as_secs(),
            "Prewarmer started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Prewarmer received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Prewarm sweep failed");
                    }
                }
            }
        }

        info!("Prewarmer stopped");
    }

    /// Ensure exactly one instance is warm: extend the active one, or
    /// launch a fresh spare under the sentinel key.
    pub async fn sweep(&self) -> Result<()> {
        let warm_duration = chrono::Duration::from_std(self.config.warm_duration)
            .map_err(|e| GatewayError::Other(format!("Invalid duration: {}", e)))?;
        let active = self.store.active_task_states().await?;

        if let Some(state) = active.first() {
            let now = Utc::now();
            self.store
                .refresh_activity(&state.user_key, now, Some(now + warm_duration))
                .await?;
            self.metrics
                .count_dimensioned("PrewarmSkipped", 1, "reason", "already_running");
            debug!(
                user_key = %state.user_key,
                "Instance already active, extended instead of launching"
            );
            return Ok(());
        }

        let spec = LaunchSpec::for_user(
            PREWARM_USER_KEY,
            &self.bridge_auth_token,
            &self.callback_url,
        );
        let launched = self.launcher.launch(&spec).await?;
        let now = Utc::now();
        self.store
            .put_task_state(&TaskState {
                user_key: PREWARM_USER_KEY.to_string(),
                instance_handle: launched.handle.clone(),
                status: TaskStatus::Starting,
                address: None,
                started_at: launched.started_at,
                last_activity: now,
                expire_at: None,
                prewarm_until: Some(now + warm_duration),
            })
            .await?;
        self.metrics.count("PrewarmTriggered", 1);
        info!(handle = %launched.handle, "Prewarmed instance launched");
        Ok(())
    }
}
