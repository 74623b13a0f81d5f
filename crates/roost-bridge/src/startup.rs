// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Boot sequence pieces.
//!
//! The bridge comes up in ordered phases: restore the workspace and load
//! history in parallel, wait out the agent's control port, connect the
//! streaming client, then serve. Address discovery runs detached, a slow
//! or broken machines API must never hold up message processing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roost_core::metrics::Metrics;
use roost_core::store::StateStore;
use roost_protocol::client::{AgentClient, AgentClientConfig};
use serde::Deserialize;
use tokio::net::TcpStream;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::history;
use crate::lifecycle::Lifecycle;
use crate::sync::DirSync;

/// Total time the agent control port may take to accept connections.
pub const AGENT_WAIT_CEILING: Duration = Duration::from_secs(120);

/// Pause between port probes.
const AGENT_WAIT_RETRY: Duration = Duration::from_millis(500);

/// Per-phase boot timings, published as one batch once the drain is done.
#[derive(Debug, Default)]
pub struct StartupTimings {
    /// Workspace restore and history load.
    pub restore_ms: u64,
    /// Waiting for the agent control port.
    pub agent_wait_ms: u64,
    /// Connecting and handshaking the streaming client.
    pub client_ready_ms: u64,
    /// Process start to drain completion.
    pub total_ms: u64,
    /// Queued messages replayed during the drain.
    pub pending_consumed: u64,
}

/// Emit the startup metrics batch, dimensioned by delivery channel.
pub fn publish_startup_metrics(metrics: &Metrics, timings: &StartupTimings, channel: &str) {
    metrics.duration_ms_dimensioned("StartupTotal", timings.total_ms, "channel", channel);
    metrics.duration_ms_dimensioned("StartupRestore", timings.restore_ms, "channel", channel);
    metrics.duration_ms_dimensioned("StartupAgentWait", timings.agent_wait_ms, "channel", channel);
    metrics.duration_ms_dimensioned(
        "StartupClientReady",
        timings.client_ready_ms,
        "channel",
        channel,
    );
    metrics.count_dimensioned(
        "PendingMessagesConsumed",
        timings.pending_consumed,
        "channel",
        channel,
    );
}

/// Restore the workspace and load conversation history, in parallel.
///
/// Returns the context block for the first message, if any history
/// survived. Neither failure is fatal; a fresh instance with no context
/// still serves.
pub async fn run_restore_phase(
    sync: &DirSync,
    store: &dyn StateStore,
    user_key: &str,
) -> Option<String> {
    let (restored, loaded) = tokio::join!(
        sync.restore(),
        history::load_context_block(store, user_key)
    );

    match restored {
        Ok(files) => info!(files, "Workspace restored"),
        Err(e) => warn!(error = %e, "Workspace restore failed, starting fresh"),
    }

    match loaded {
        Ok(Some(block)) => {
            info!("Loaded conversation history for context");
            Some(block)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Could not load conversation history");
            None
        }
    }
}

/// Wait for the agent's control port to accept TCP connections.
pub async fn wait_for_agent_port(agent_ws_url: &str) -> Result<()> {
    wait_for_port(&probe_addr(agent_ws_url), AGENT_WAIT_CEILING).await
}

async fn wait_for_port(addr: &str, ceiling: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + ceiling;
    loop {
        match TcpStream::connect(addr).await {
            Ok(_) => return Ok(()),
            Err(_) if tokio::time::Instant::now() >= deadline => {
                return Err(BridgeError::AgentUnavailable {
                    waited_secs: ceiling.as_secs(),
                });
            }
            Err(_) => tokio::time::sleep(AGENT_WAIT_RETRY).await,
        }
    }
}

/// Reduce a `ws://` or `wss://` URL to the host:port a TCP probe reaches.
fn probe_addr(url: &str) -> String {
    let trimmed = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .unwrap_or(url);
    trimmed.split('/').next().unwrap_or(trimmed).to_string()
}

/// Connect the streaming client and wait out its handshake.
pub async fn connect_agent(config: &Config) -> Result<AgentClient> {
    let client = AgentClient::connect(AgentClientConfig {
        url: config.agent_ws_url.clone(),
        token: config.agent_token.clone(),
        ..AgentClientConfig::default()
    })
    .await?;
    client.wait_ready().await?;
    Ok(client)
}

/// Resolves this instance's externally reachable address.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Look up the public address for an instance handle. `None` means
    /// the backend knows no address for it yet.
    async fn resolve(&self, handle: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct MachineAddress {
    #[serde(default)]
    public_ip: Option<String>,
}

/// Address lookup against the machines API.
pub struct MachinesAddressResolver {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MachinesAddressResolver {
    /// Create a resolver over the machines API.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl AddressResolver for MachinesAddressResolver {
    async fn resolve(&self, handle: &str) -> Result<Option<String>> {
        let response = self
            .http
            .get(format!("{}/machines/{}", self.base_url, handle))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let machine: MachineAddress = response.error_for_status()?.json().await?;
        Ok(machine.public_ip)
    }
}

/// Spawn the detached address-discovery task.
///
/// Whatever happens in here is logged and goes no further; startup never
/// waits on it and messages flow with or without a discovered address.
pub fn spawn_address_discovery(
    resolver: Option<Arc<dyn AddressResolver>>,
    lifecycle: Arc<Lifecycle>,
) {
    let Some(resolver) = resolver else {
        warn!("No machines API credentials, skipping address discovery");
        return;
    };

    tokio::spawn(async move {
        match resolver.resolve(lifecycle.instance_handle()).await {
            Ok(Some(address)) => {
                info!(address = %address, "Instance address discovered");
                if let Err(e) = lifecycle.set_address(address).await {
                    error!(error = %e, "Failed to record the discovered address");
                }
            }
            Ok(None) => warn!("No address assigned to this instance yet"),
            Err(e) => error!(error = %e, "Address discovery failed"),
        }
    });
}
