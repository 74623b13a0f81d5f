// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;

use roost_core::model::BRIDGE_PORT;

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// User this instance is dedicated to
    pub user_key: String,
    /// Compute handle of this instance
    pub instance_handle: String,
    /// Shared secret expected on the bridge HTTP surface
    pub bridge_auth_token: String,
    /// Bridge HTTP listen port
    pub bridge_port: u16,
    /// Path to the SQLite state database
    pub database_path: String,
    /// WebSocket URL of the local agent control port
    pub agent_ws_url: String,
    /// Token for the agent handshake
    pub agent_token: String,
    /// Base URL callback events are pushed to
    pub callback_url: String,
    /// Agent working directory restored on boot and backed up on shutdown
    pub workspace_dir: PathBuf,
    /// Directory workspace backups are written to
    pub backup_dir: PathBuf,
    /// Channel recorded for conversation turns started in this instance
    pub channel: String,
    /// Whether count/duration metrics are emitted
    pub metrics_enabled: bool,
    /// Machines API base URL, when address discovery is available
    pub machines_api_url: Option<String>,
    /// Machines API bearer token
    pub machines_api_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `USER_KEY`: user this instance serves
    /// - `INSTANCE_HANDLE`: compute handle (falls back to `HOSTNAME`)
    /// - `BRIDGE_AUTH_TOKEN`: shared secret for bridge HTTP calls
    /// - `CALLBACK_URL`: base URL for callback event pushes
    ///
    /// Optional (with defaults):
    /// - `BRIDGE_PORT`: HTTP listen port (default: 8080)
    /// - `DATABASE_PATH`: state db file (default: /data/roost.db)
    /// - `AGENT_WS_URL`: agent control port (default: ws://127.0.0.1:18789)
    /// - `AGENT_TOKEN`: agent handshake token (default: empty)
    /// - `WORKSPACE_DIR`: agent workspace (default: /data/workspace)
    /// - `BACKUP_DIR`: backup target (default: /data/backup)
    /// - `CHANNEL`: channel for locally started turns (default: web)
    /// - `METRICS_ENABLED`: "true" to emit metrics (default: false)
    /// - `MACHINES_API_URL` / `MACHINES_API_TOKEN`: enable address discovery
    pub fn from_env() -> Result<Self, ConfigError> {
        let user_key = std::env::var("USER_KEY").map_err(|_| ConfigError::Missing("USER_KEY"))?;

        let instance_handle = std::env::var("INSTANCE_HANDLE")
            .or_else(|_| std::env::var("HOSTNAME"))
            .map_err(|_| ConfigError::Missing("INSTANCE_HANDLE"))?;

        let bridge_auth_token = std::env::var("BRIDGE_AUTH_TOKEN")
            .map_err(|_| ConfigError::Missing("BRIDGE_AUTH_TOKEN"))?;

        let bridge_port: u16 = match std::env::var("BRIDGE_PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid("BRIDGE_PORT", "must be a port number"))?,
            Err(_) => BRIDGE_PORT,
        };

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "/data/roost.db".to_string());

        let agent_ws_url =
            std::env::var("AGENT_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:18789".to_string());

        let agent_token = std::env::var("AGENT_TOKEN").unwrap_or_default();

        let callback_url =
            std::env::var("CALLBACK_URL").map_err(|_| ConfigError::Missing("CALLBACK_URL"))?;

        let workspace_dir = PathBuf::from(
            std::env::var("WORKSPACE_DIR").unwrap_or_else(|_| "/data/workspace".to_string()),
        );

        let backup_dir = PathBuf::from(
            std::env::var("BACKUP_DIR").unwrap_or_else(|_| "/data/backup".to_string()),
        );

        let channel = std::env::var("CHANNEL").unwrap_or_else(|_| "web".to_string());

        let metrics_enabled = std::env::var("METRICS_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let machines_api_url = std::env::var("MACHINES_API_URL").ok();
        let machines_api_token = std::env::var("MACHINES_API_TOKEN").ok();

        Ok(Self {
            user_key,
            instance_handle,
            bridge_auth_token,
            bridge_port,
            database_path,
            agent_ws_url,
            agent_token,
            callback_url,
            workspace_dir,
            backup_dir,
            channel,
            metrics_enabled,
            machines_api_url,
            machines_api_token,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
