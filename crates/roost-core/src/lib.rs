// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Roost Core
//!
//! Shared state model for the roost lifecycle orchestrator. Each user gets
//! at most one single-tenant compute instance running their agent; this
//! crate holds the records both sides of that arrangement read and write.
//!
//! ## Architecture
//!
//! ```text
//!   callers                 orchestrator                  instance
//!  ┌────────┐   HTTP    ┌───────────────┐    launch    ┌────────────┐
//!  │ client │ ────────▶ │ roost-gateway │ ───────────▶ │roost-bridge│
//!  └────────┘           │ router        │   deliver    │  agent     │
//!      ▲                │ watchdog      │ ───────────▶ │            │
//!      │ callbacks      │ prewarmer     │              └─────┬──────┘
//!      └────────────────┴───────┬───────┘                    │
//!                               │        ┌────────────┐      │
//!                               └──────▶ │ state store│ ◀────┘
//!                                        │  (SQLite)  │
//!                                        └────────────┘
//! ```
//!
//! ## Records
//!
//! | Record             | Keyed by                  | Holds                              |
//! |--------------------|---------------------------|------------------------------------|
//! | `TaskState`        | user key                  | instance handle, status, address   |
//! | `PendingMessage`   | user key + sort key       | queued message awaiting delivery   |
//! | `ConversationTurn` | user key + conversation   | one side of a recorded exchange    |
//! | `VolumeDatapoint`  | day + hour + channel      | message count for that bucket      |
//!
//! ## Task status state machine
//!
//! ```text
//!   (absent) ──launch──▶ Starting ──bridge up──▶ Running ──shutdown──▶ Idle
//!       ▲                    │                      │                    │
//!       │                    │ never came up        │ evicted            │ TTL
//!       └────────────────────┴──────────────────────┴────────────────────┘
//! ```
//!
//! Idle records carry a TTL and read as absent everywhere; they only exist
//! so that a crash between "stopped" and "cleaned up" leaves a trace.
//!
//! ## Modules
//!
//! - [`model`]: domain records, wire types, and shared constants
//! - [`store`]: the [`store::StateStore`] trait and its SQLite backend
//! - [`migrations`]: embedded schema migrations
//! - [`metrics`]: metric emission as structured tracing events
//! - [`error`]: the [`error::CoreError`] type

#![deny(missing_docs)]

/// Error types for core operations.
pub mod error;
/// Operational metric emission.
pub mod metrics;
/// Embedded database migrations.
pub mod migrations;
/// Domain records and wire types.
pub mod model;
/// State store trait and backends.
pub mod store;
