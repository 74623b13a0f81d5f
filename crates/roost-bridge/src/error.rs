// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for roost-bridge.

use thiserror::Error;

/// Errors from bridge operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// State store operation failed.
    #[error("State store error: {0}")]
    Store(#[from] roost_core::error::CoreError),

    /// Agent streaming client failed.
    #[error("Agent protocol error: {0}")]
    Protocol(#[from] roost_protocol::client::ProtocolError),

    /// Push to the callback endpoint failed.
    #[error("Callback error: {0}")]
    Callback(#[from] crate::callback::CallbackError),

    /// HTTP request to the machines API failed.
    #[error("Machines API error: {0}")]
    Request(#[from] reqwest::Error),

    /// The agent never opened its control port.
    #[error("Agent did not open its control port within {waited_secs}s")]
    AgentUnavailable {
        /// Seconds spent probing before giving up.
        waited_secs: u64,
    },
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
