// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for roost-gateway.

use thiserror::Error;

/// Errors from gateway operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// State store operation failed.
    #[error("State store error: {0}")]
    Store(#[from] roost_core::error::CoreError),

    /// Compute launcher operation failed.
    #[error("Launcher error: {0}")]
    Launcher(#[from] crate::launcher::LauncherError),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
