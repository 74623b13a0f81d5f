// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Machines API launcher.
//!
//! Talks to a machines-style compute API over HTTP: create a machine from
//! an image, query its state, stop it by handle. All calls carry bearer
//! auth and a bounded timeout.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{LaunchSpec, LaunchedInstance, Launcher, LauncherError, Result};

/// Machine states the API reports while an instance is usable.
const LIVE_STATES: &[&str] = &["created", "starting", "started"];

#[derive(Debug, Serialize)]
struct CreateMachineRequest {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,
    config: MachineConfig,
}

#[derive(Debug, Serialize)]
struct MachineConfig {
    image: String,
    env: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MachineInfo {
    id: String,
    state: String,
    #[serde(default)]
    public_ip: Option<String>,
}

#[derive(Debug, Serialize)]
struct StopMachineRequest {
    reason: String,
}

/// Launcher backed by a machines-style HTTP API.
pub struct MachinesLauncher {
    http: reqwest::Client,
    base_url: String,
    token: String,
    image: String,
    region: Option<String>,
}

impl MachinesLauncher {
    /// Create a launcher for the given API endpoint and image.
    pub fn new(
        base_url: &str,
        token: &str,
        image: &str,
        region: Option<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            image: image.to_string(),
            region,
        })
    }

    fn machines_url(&self) -> String {
        format!("{}/machines", self.base_url)
    }

    fn machine_url(&self, handle: &str) -> String {
        format!("{}/machines/{}", self.base_url, handle)
    }

    /// GET one machine; `Ok(None)` when the API has no such machine.
    async fn get_machine(&self, handle: &str) -> Result<Option<MachineInfo>> {
        let response = self
            .http
            .get(self.machine_url(handle))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let info = response
            .json::<MachineInfo>()
            .await
            .map_err(|e| LauncherError::MalformedResponse(e.to_string()))?;
        Ok(Some(info))
    }
}

#[async_trait]
impl Launcher for MachinesLauncher {
    fn launcher_type(&self) -> &'static str {
        "machines"
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedInstance> {
        let request = CreateMachineRequest {
            name: format!("roost-{}", Uuid::new_v4()),
            region: self.region.clone(),
            config: MachineConfig {
                image: self.image.clone(),
                env: spec.env.iter().cloned().collect(),
            },
        };

        let response = self
            .http
            .post(self.machines_url())
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let info = response
            .json::<MachineInfo>()
            .await
            .map_err(|e| LauncherError::MalformedResponse(e.to_string()))?;

        info!(
            user_key = %spec.user_key,
            handle = %info.id,
            state = %info.state,
            "Machine launched"
        );

        Ok(LaunchedInstance {
            handle: info.id,
            started_at: Utc::now(),
        })
    }

    async fn is_running(&self, handle: &str) -> Result<bool> {
        match self.get_machine(handle).await? {
            Some(info) => Ok(LIVE_STATES.contains(&info.state.as_str())),
            None => Ok(false),
        }
    }

    async fn stop(&self, handle: &str, reason: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/stop", self.machine_url(handle)))
            .bearer_auth(&self.token)
            .json(&StopMachineRequest {
                reason: reason.to_string(),
            })
            .send()
            .await?;

        // Already gone counts as stopped.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(handle = %handle, "Machine already gone on stop");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        info!(handle = %handle, reason = %reason, "Machine stopped");
        Ok(())
    }

    async fn resolve_address(&self, handle: &str) -> Result<Option<String>> {
        Ok(self
            .get_machine(handle)
            .await?
            .and_then(|info| info.public_ip))
    }
}

async fn api_error(response: reqwest::Response) -> LauncherError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    LauncherError::Api { status, body }
}
