// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite state database
    pub database_path: String,
    /// Ingress API listen address
    pub listen_addr: SocketAddr,
    /// Machines API base URL
    pub machines_api_url: String,
    /// Machines API bearer token
    pub machines_api_token: String,
    /// Image launched for every instance
    pub machines_image: String,
    /// Preferred region for new instances
    pub machines_region: Option<String>,
    /// Shared secret the bridge expects on its local HTTP surface
    pub bridge_auth_token: String,
    /// Base URL bridges push callback events to
    pub callback_url: String,
    /// Whether count/duration metrics are emitted
    pub metrics_enabled: bool,
    /// Watchdog sweep interval
    pub watchdog_interval: Duration,
    /// Prewarmer sweep interval
    pub prewarm_interval: Duration,
    /// How long a prewarmed instance is kept warm
    pub prewarm_duration: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `MACHINES_API_URL`: base URL of the machines API
    /// - `MACHINES_API_TOKEN`: bearer token for the machines API
    /// - `MACHINES_IMAGE`: image to launch instances from
    /// - `BRIDGE_AUTH_TOKEN`: shared secret for bridge HTTP calls
    /// - `CALLBACK_URL`: base URL for callback event pushes
    ///
    /// Optional (with defaults):
    /// - `DATABASE_PATH`: state db file (default: ./data/roost.db)
    /// - `LISTEN_ADDR`: ingress listen address (default: 0.0.0.0:8787)
    /// - `MACHINES_REGION`: preferred launch region
    /// - `METRICS_ENABLED`: "true" to emit metrics (default: false)
    /// - `WATCHDOG_INTERVAL_SECS`: sweep interval (default: 300)
    /// - `PREWARM_INTERVAL_SECS`: sweep interval (default: 1800)
    /// - `PREWARM_DURATION_MIN`: warm window length (default: 60)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/roost.db".to_string());

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8787".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("LISTEN_ADDR", "must be a socket address"))?;

        let machines_api_url = std::env::var("MACHINES_API_URL")
            .map_err(|_| ConfigError::Missing("MACHINES_API_URL"))?;

        let machines_api_token = std::env::var("MACHINES_API_TOKEN")
            .map_err(|_| ConfigError::Missing("MACHINES_API_TOKEN"))?;

        let machines_image =
            std::env::var("MACHINES_IMAGE").map_err(|_| ConfigError::Missing("MACHINES_IMAGE"))?;

        let machines_region = std::env::var("MACHINES_REGION").ok();

        let bridge_auth_token = std::env::var("BRIDGE_AUTH_TOKEN")
            .map_err(|_| ConfigError::Missing("BRIDGE_AUTH_TOKEN"))?;

        let callback_url =
            std::env::var("CALLBACK_URL").map_err(|_| ConfigError::Missing("CALLBACK_URL"))?;

        let metrics_enabled = std::env::var("METRICS_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let watchdog_secs: u64 = std::env::var("WATCHDOG_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("WATCHDOG_INTERVAL_SECS", "must be a positive integer")
            })?;

        let prewarm_secs: u64 = std::env::var("PREWARM_INTERVAL_SECS")
            .unwrap_or_else(|_| "1800".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("PREWARM_INTERVAL_SECS", "must be a positive integer")
            })?;

        let prewarm_duration_min: u64 = std::env::var("PREWARM_DURATION_MIN")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("PREWARM_DURATION_MIN", "must be a positive integer")
            })?;

        Ok(Self {
            database_path,
            listen_addr,
            machines_api_url,
            machines_api_token,
            machines_image,
            machines_region,
            bridge_auth_token,
            callback_url,
            metrics_enabled,
            watchdog_interval: Duration::from_secs(watchdog_secs),
            prewarm_interval: Duration::from_secs(prewarm_secs),
            prewarm_duration: Duration::from_secs(prewarm_duration_min * 60),
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
