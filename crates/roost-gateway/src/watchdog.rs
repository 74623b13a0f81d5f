// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker for reclaiming dead and idle instances.
//!
//! Instances cost money while they run, and their TaskState records go
//! stale whenever a launch fails or a bridge dies without marking itself
//! Idle. Each sweep cross-checks the records against the compute backend:
//! - `Starting` records past the launch window whose instance never came
//!   up are deleted (failed-launch cleanup).
//! - `Running` records whose instance is gone are deleted immediately.
//! - `Running` instances idle past the inactivity timeout are stopped and
//!   their records deleted.
//!
//! The inactivity timeout adapts to traffic: during hours that saw
//! messages on enough distinct days of the lookback window, instances get
//! a longer leash than during historically quiet hours.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use roost_core::model::{TaskState, TaskStatus, VOLUME_RETENTION_DAYS, VolumeDatapoint};
use roost_core::store::StateStore;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::launcher::Launcher;

/// How long a Starting record may sit before the launch is considered
/// failed, in seconds.
const STARTING_STALE_SECS: i64 = 600;

/// Instances younger than this are never evicted for inactivity, in
/// seconds.
const MIN_UPTIME_SECS: i64 = 300;

/// Inactivity timeout during historically busy hours, in seconds.
const ACTIVE_TIMEOUT_SECS: i64 = 1800;

/// Inactivity timeout during historically quiet hours, in seconds.
const INACTIVE_TIMEOUT_SECS: i64 = 600;

/// Inactivity timeout when no volume data is available, in seconds.
const DEFAULT_TIMEOUT_SECS: i64 = 900;

/// How many distinct days must have traffic in the current hour for it to
/// count as busy.
const ACTIVE_HOUR_THRESHOLD: usize = 2;

/// Reason passed to the launcher when evicting an idle instance.
const INACTIVITY_STOP_REASON: &str = "Watchdog: inactivity timeout";

/// Configuration for the watchdog.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How often to sweep the active records.
    pub poll_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
        }
    }
}

/// Background worker that reclaims dead and idle instances.
pub struct Watchdog {
    store: Arc<dyn StateStore>,
    launcher: Arc<dyn Launcher>,
    config: WatchdogConfig,
    shutdown: Arc<Notify>,
}

impl Watchdog {
    /// Create a new watchdog.
    pub fn new(
        store: Arc<dyn StateStore>,
        launcher: Arc<dyn Launcher>,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            store,
            launcher,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the watchdog loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Watchdog started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Watchdog received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Watchdog sweep failed");
                    }
                }
            }
        }

        info!("Watchdog stopped");
    }

    /// One sweep over all active records. Per-record failures are logged
    /// and never abort the rest of the sweep.
    pub async fn sweep(&self) -> Result<()> {
        let states = self.store.active_task_states().await?;
        let now = Utc::now();

        for state in states {
            let result = match state.status {
                TaskStatus::Starting => self.check_starting(&state, now).await,
                TaskStatus::Running => self.check_running(&state, now).await,
                // The active scan never returns Idle records.
                TaskStatus::Idle => Ok(()),
            };
            if let Err(e) = result {
                error!(
                    user_key = %state.user_key,
                    handle = %state.instance_handle,
                    error = %e,
                    "Failed to check instance"
                );
            }
        }

        match self.store.purge_expired(now).await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged expired rows"),
            Err(e) => error!(error = %e, "Failed to purge expired rows"),
        }

        Ok(())
    }

    /// A Starting record past the launch window belongs to a launch that
    /// failed, unless the backend says the instance is actually up.
    async fn check_starting(&self, state: &TaskState, now: DateTime<Utc>) -> Result<()> {
        if now - state.started_at < chrono::Duration::seconds(STARTING_STALE_SECS) {
            return Ok(());
        }
        if self.launcher.is_running(&state.instance_handle).await? {
            debug!(
                user_key = %state.user_key,
                handle = %state.instance_handle,
                "Instance still coming up, retaining Starting record"
            );
            return Ok(());
        }

        warn!(
            user_key = %state.user_key,
            handle = %state.instance_handle,
            "Removing Starting record for an instance that never came up"
        );
        self.store.delete_task_state(&state.user_key).await?;
        Ok(())
    }

    async fn check_running(&self, state: &TaskState, now: DateTime<Utc>) -> Result<()> {
        // Liveness first: a record whose instance is gone is pure garbage.
        if !self.launcher.is_running(&state.instance_handle).await? {
            warn!(
                user_key = %state.user_key,
                handle = %state.instance_handle,
                "Removing Running record for a dead instance"
            );
            self.store.delete_task_state(&state.user_key).await?;
            return Ok(());
        }

        // Fresh instances get a grace period regardless of activity.
        if now - state.started_at < chrono::Duration::seconds(MIN_UPTIME_SECS) {
            return Ok(());
        }

        let lookback = now - chrono::Duration::days(VOLUME_RETENTION_DAYS);
        let timeout = match self.store.message_volume_since(lookback).await {
            Ok(datapoints) => choose_timeout(&datapoints, now),
            Err(e) => {
                warn!(error = %e, "Volume query failed, using default inactivity timeout");
                chrono::Duration::seconds(DEFAULT_TIMEOUT_SECS)
            }
        };

        let idle_for = now - state.last_activity;
        if idle_for <= timeout {
            return Ok(());
        }

        info!(
            user_key = %state.user_key,
            handle = %state.instance_handle,
            idle_secs = idle_for.num_seconds(),
            timeout_secs = timeout.num_seconds(),
            "Stopping idle instance"
        );
        self.launcher
            .stop(&state.instance_handle, INACTIVITY_STOP_REASON)
            .await?;
        self.store.delete_task_state(&state.user_key).await?;
        Ok(())
    }
}

/// Pick the inactivity timeout for the current hour from the volume
/// datapoints of the lookback window.
///
/// The hour counts as busy when datapoints exist for it (any channel) on
/// at least [`ACTIVE_HOUR_THRESHOLD`] distinct days. An empty dataset
/// falls back to the fixed default.
fn choose_timeout(datapoints: &[VolumeDatapoint], now: DateTime<Utc>) -> chrono::Duration {
    if datapoints.is_empty() {
        return chrono::Duration::seconds(DEFAULT_TIMEOUT_SECS);
    }

    let hour = now.hour();
    let busy_days: HashSet<NaiveDate> = datapoints
        .iter()
        .filter(|d| d.hour == hour && d.count > 0)
        .map(|d| d.day)
        .collect();

    if busy_days.len() >= ACTIVE_HOUR_THRESHOLD {
        chrono::Duration::seconds(ACTIVE_TIMEOUT_SECS)
    } else {
        chrono::Duration::seconds(INACTIVE_TIMEOUT_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn datapoint(day: &str, hour: u32, channel: &str, count: i64) -> VolumeDatapoint {
        VolumeDatapoint {
            day: day.parse().unwrap(),
            hour,
            channel: channel.to_string(),
            count,
        }
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_choose_timeout_empty_dataset_is_default() {
        let timeout = choose_timeout(&[], at_hour(14));
        assert_eq!(timeout.num_seconds(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_choose_timeout_busy_hour() {
        let datapoints = vec![
            datapoint("2025-06-08", 14, "web", 3),
            datapoint("2025-06-09", 14, "web", 1),
            datapoint("2025-06-09", 9, "web", 12),
        ];
        let timeout = choose_timeout(&datapoints, at_hour(14));
        assert_eq!(timeout.num_seconds(), ACTIVE_TIMEOUT_SECS);
    }

    #[test]
    fn test_choose_timeout_single_busy_day_is_quiet() {
        let datapoints = vec![
            datapoint("2025-06-09", 14, "web", 5),
            datapoint("2025-06-09", 8, "web", 2),
        ];
        let timeout = choose_timeout(&datapoints, at_hour(14));
        assert_eq!(timeout.num_seconds(), INACTIVE_TIMEOUT_SECS);
    }

    #[test]
    fn test_choose_timeout_other_hours_do_not_count() {
        let datapoints = vec![
            datapoint("2025-06-07", 9, "web", 4),
            datapoint("2025-06-08", 9, "web", 4),
            datapoint("2025-06-09", 9, "web", 4),
        ];
        let timeout = choose_timeout(&datapoints, at_hour(14));
        assert_eq!(timeout.num_seconds(), INACTIVE_TIMEOUT_SECS);
    }

    #[test]
    fn test_choose_timeout_channels_share_one_day() {
        // Two channels on the same day are still one busy day.
        let datapoints = vec![
            datapoint("2025-06-09", 14, "web", 1),
            datapoint("2025-06-09", 14, "sms", 1),
        ];
        let timeout = choose_timeout(&datapoints, at_hour(14));
        assert_eq!(timeout.num_seconds(), INACTIVE_TIMEOUT_SECS);

        let datapoints = vec![
            datapoint("2025-06-08", 14, "web", 1),
            datapoint("2025-06-09", 14, "sms", 1),
        ];
        let timeout = choose_timeout(&datapoints, at_hour(14));
        assert_eq!(timeout.num_seconds(), ACTIVE_TIMEOUT_SECS);
    }

    #[test]
    fn test_choose_timeout_zero_counts_do_not_count() {
        let datapoints = vec![
            datapoint("2025-06-08", 14, "web", 0),
            datapoint("2025-06-09", 14, "web", 0),
        ];
        let timeout = choose_timeout(&datapoints, at_hour(14));
        assert_eq!(timeout.num_seconds(), INACTIVE_TIMEOUT_SECS);
    }

    #[test]
    fn test_watchdog_config_default() {
        let config = WatchdogConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(300));
    }
}
