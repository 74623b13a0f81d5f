// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for roost core operations.

use std::fmt;

/// Core error type for state store operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// A stored task status column holds an unrecognized value.
    InvalidStatus {
        /// The raw column value.
        value: String,
    },
    /// A stored conversation role column holds an unrecognized value.
    InvalidRole {
        /// The raw column value.
        value: String,
    },
    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Details of the failure.
        details: String,
    },
}

impl CoreError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidStatus { .. } => "INVALID_STATUS",
            CoreError::InvalidRole { .. } => "INVALID_ROLE",
            CoreError::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidStatus { value } => {
                write!(f, "Invalid task status: {}", value)
            }
            CoreError::InvalidRole { value } => {
                write!(f, "Invalid conversation role: {}", value)
            }
            CoreError::DatabaseError { operation, details } => {
                write!(f, "Database error during {}: {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
