// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock launcher for testing.
//!
//! Keeps launched machines in memory and counts calls, so router and
//! watchdog tests can assert exactly what was asked of the backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::traits::*;

#[derive(Debug, Clone)]
struct MockMachine {
    running: bool,
    address: Option<String>,
    stop_reason: Option<String>,
}

/// Mock launcher for testing.
pub struct MockLauncher {
    machines: Arc<Mutex<HashMap<String, MockMachine>>>,
    launched: Arc<Mutex<Vec<LaunchSpec>>>,
    launch_calls: AtomicUsize,
    is_running_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    /// If true, launch calls fail.
    pub fail_launches: bool,
    /// Address every launched machine immediately reports.
    pub auto_address: Option<String>,
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLauncher {
    /// Create a new mock launcher.
    pub fn new() -> Self {
        Self {
            machines: Arc::new(Mutex::new(HashMap::new())),
            launched: Arc::new(Mutex::new(Vec::new())),
            launch_calls: AtomicUsize::new(0),
            is_running_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            fail_launches: false,
            auto_address: None,
        }
    }

    /// Create a mock launcher whose launch calls fail.
    pub fn failing() -> Self {
        Self {
            fail_launches: true,
            ..Self::new()
        }
    }

    /// Preload a machine, for tests that start from existing state.
    pub async fn register(&self, handle: &str, running: bool, address: Option<&str>) {
        self.machines.lock().await.insert(
            handle.to_string(),
            MockMachine {
                running,
                address: address.map(str::to_string),
                stop_reason: None,
            },
        );
    }

    /// Flip a machine's running flag.
    pub async fn set_running(&self, handle: &str, running: bool) {
        if let Some(machine) = self.machines.lock().await.get_mut(handle) {
            machine.running = running;
        }
    }

    /// The reason passed to `stop`, if the machine was stopped.
    pub async fn stop_reason_for(&self, handle: &str) -> Option<String> {
        self.machines
            .lock()
            .await
            .get(handle)
            .and_then(|m| m.stop_reason.clone())
    }

    /// Every spec passed to `launch`, in call order.
    pub async fn launched_specs(&self) -> Vec<LaunchSpec> {
        self.launched.lock().await.clone()
    }

    /// How many times `launch` was called.
    pub fn launch_count(&self) -> usize {
        self.launch_calls.load(Ordering::SeqCst)
    }

    /// How many times `is_running` was called.
    pub fn is_running_count(&self) -> usize {
        self.is_running_calls.load(Ordering::SeqCst)
    }

    /// How many times `stop` was called.
    pub fn stop_count(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    fn launcher_type(&self) -> &'static str {
        "mock"
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedInstance> {
        let call = self.launch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_launches {
            return Err(LauncherError::Other("Mock launch failure".to_string()));
        }

        let handle = format!("mock-{call}");
        self.machines.lock().await.insert(
            handle.clone(),
            MockMachine {
                running: true,
                address: self.auto_address.clone(),
                stop_reason: None,
            },
        );
        self.launched.lock().await.push(spec.clone());

        Ok(LaunchedInstance {
            handle,
            started_at: Utc::now(),
        })
    }

    async fn is_running(&self, handle: &str) -> Result<bool> {
        self.is_running_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .machines
            .lock()
            .await
            .get(handle)
            .map(|m| m.running)
            .unwrap_or(false))
    }

    async fn stop(&self, handle: &str, reason: &str) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(machine) = self.machines.lock().await.get_mut(handle) {
            machine.running = false;
            machine.stop_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn resolve_address(&self, handle: &str) -> Result<Option<String>> {
        Ok(self
            .machines
            .lock()
            .await
            .get(handle)
            .and_then(|m| m.address.clone()))
    }
}
