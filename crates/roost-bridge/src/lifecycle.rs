// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle bookkeeping.
//!
//! The bridge owns this instance's TaskState record while the process is
//! alive: it writes `Running` once the HTTP surface is up, patches the
//! address in when discovery finds one, and leaves an expiring `Idle`
//! record behind on shutdown. Activity is tracked in-process and written
//! out with every state update, the watchdog reads it to decide when the
//! instance has gone quiet.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use roost_core::model::{IDLE_RECORD_TTL_SECS, TaskState, TaskStatus};
use roost_core::store::StateStore;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::sync::DirSync;

/// Tracks activity and writes this instance's TaskState record.
pub struct Lifecycle {
    store: Arc<dyn StateStore>,
    user_key: String,
    instance_handle: String,
    started_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    address: Mutex<Option<String>>,
}

impl Lifecycle {
    /// Create lifecycle bookkeeping for this instance. The construction
    /// time counts as the first activity.
    pub fn new(store: Arc<dyn StateStore>, user_key: &str, instance_handle: &str) -> Self {
        let now = Utc::now();
        Self {
            store,
            user_key: user_key.to_string(),
            instance_handle: instance_handle.to_string(),
            started_at: now,
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            address: Mutex::new(None),
        }
    }

    /// The compute handle this instance runs under.
    pub fn instance_handle(&self) -> &str {
        &self.instance_handle
    }

    /// Record activity now.
    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// When this instance last saw a message.
    pub fn last_activity(&self) -> DateTime<Utc> {
        let ms = self.last_activity_ms.load(Ordering::Relaxed);
        DateTime::from_timestamp_millis(ms).unwrap_or(self.started_at)
    }

    /// Seconds since the process started.
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Write a `Running` record for this instance.
    pub async fn mark_running(&self) -> Result<()> {
        let address = self.address.lock().await.clone();
        self.put_state(TaskStatus::Running, address, None).await
    }

    /// Record the discovered address and patch it into the `Running`
    /// record.
    pub async fn set_address(&self, address: String) -> Result<()> {
        let mut slot = self.address.lock().await;
        *slot = Some(address.clone());
        drop(slot);
        self.put_state(TaskStatus::Running, Some(address), None)
            .await
    }

    /// Write an expiring `Idle` record. The address is dropped, nothing
    /// is listening there anymore.
    pub async fn mark_idle(&self) -> Result<()> {
        let expire_at = Utc::now() + chrono::Duration::seconds(IDLE_RECORD_TTL_SECS);
        self.put_state(TaskStatus::Idle, None, Some(expire_at)).await
    }

    async fn put_state(
        &self,
        status: TaskStatus,
        address: Option<String>,
        expire_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let state = TaskState {
            user_key: self.user_key.clone(),
            instance_handle: self.instance_handle.clone(),
            status,
            address,
            started_at: self.started_at,
            last_activity: self.last_activity(),
            expire_at,
            prewarm_until: None,
        };
        self.store.put_task_state(&state).await?;
        Ok(())
    }
}

/// Configuration for the backup worker.
#[derive(Debug, Clone)]
pub struct BackupWorkerConfig {
    /// How often the workspace is backed up.
    pub interval: Duration,
}

impl Default for BackupWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Background worker that periodically backs up the workspace.
pub struct BackupWorker {
    sync: DirSync,
    config: BackupWorkerConfig,
    shutdown: Arc<Notify>,
}

impl BackupWorker {
    /// Create a new backup worker.
    pub fn new(sync: DirSync, config: BackupWorkerConfig) -> Self {
        Self {
            sync,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the backup loop until shutdown is signalled. Backup failures
    /// are logged and the loop keeps going.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Backup worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Backup worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    match self.sync.backup().await {
                        Ok(files) => debug!(files, "Periodic backup complete"),
                        Err(e) => error!(error = %e, "Periodic backup failed"),
                    }
                }
            }
        }

        info!("Backup worker stopped");
    }
}

/// Run the ordered shutdown sequence: stop the backup timer, take one
/// final backup, leave an `Idle` record behind.
///
/// Every step is best-effort. A failed backup still lets the Idle record
/// be written, and a failed write still lets the process exit.
pub async fn graceful_shutdown(lifecycle: &Lifecycle, sync: &DirSync, backup_shutdown: &Notify) {
    backup_shutdown.notify_one();

    match sync.backup().await {
        Ok(files) => info!(files, "Final backup complete"),
        Err(e) => warn!(error = %e, "Final backup failed"),
    }

    if let Err(e) = lifecycle.mark_idle().await {
        error!(error = %e, "Failed to write the Idle record");
    }
}
