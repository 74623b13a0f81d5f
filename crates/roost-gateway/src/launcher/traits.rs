// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Launcher trait definitions.
//!
//! Defines the abstract interface for compute backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from launcher operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LauncherError {
    /// The compute API answered with a non-success status.
    #[error("Machines API returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, for the logs.
        body: String,
    },

    /// The compute API answered with a body we could not interpret.
    #[error("Malformed machines API response: {0}")]
    MalformedResponse(String),

    /// The request never completed.
    #[error("Machines API request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for launcher operations.
pub type Result<T> = std::result::Result<T, LauncherError>;

/// What a new instance is launched with.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// User key the instance serves (or the prewarm sentinel).
    pub user_key: String,
    /// Environment variables handed to the instance.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Build the standard spec for a user instance: the bridge inside the
    /// instance learns its identity, auth secret, and callback target from
    /// these variables.
    pub fn for_user(user_key: &str, bridge_auth_token: &str, callback_url: &str) -> Self {
        Self {
            user_key: user_key.to_string(),
            env: vec![
                ("USER_KEY".to_string(), user_key.to_string()),
                ("BRIDGE_AUTH_TOKEN".to_string(), bridge_auth_token.to_string()),
                ("CALLBACK_URL".to_string(), callback_url.to_string()),
            ],
        }
    }
}

/// Handle for a launched instance.
#[derive(Debug, Clone)]
pub struct LaunchedInstance {
    /// Backend-issued id of the instance.
    pub handle: String,
    /// When the launch call was accepted.
    pub started_at: DateTime<Utc>,
}

/// Trait for compute backends.
///
/// Launchers are PURE compute plumbing - they do NOT touch the state store.
/// Bookkeeping (TaskState writes, queue entries) is handled by the caller.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launcher type identifier (e.g., "machines", "mock")
    fn launcher_type(&self) -> &'static str;

    /// Launch a new instance.
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedInstance>;

    /// Whether the backend still considers the instance alive.
    ///
    /// An instance the backend no longer knows about is simply not running;
    /// only transport or API failures surface as errors.
    async fn is_running(&self, handle: &str) -> Result<bool>;

    /// Stop a running instance. Stopping an instance the backend no longer
    /// knows about is a no-op.
    async fn stop(&self, handle: &str, reason: &str) -> Result<()>;

    /// The externally reachable address of the instance, once it has one.
    async fn resolve_address(&self, handle: &str) -> Result<Option<String>>;
}
