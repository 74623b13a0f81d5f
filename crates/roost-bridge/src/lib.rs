// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Roost Bridge - In-Instance Sidecar
//!
//! This crate is the process that runs next to the agent inside every
//! compute instance. It boots the instance into service, relays user
//! messages to the agent over the streaming control protocol, pushes the
//! response stream to the callback endpoint, and keeps the instance's
//! TaskState record honest from boot to shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        roost-gateway                                     │
//! │              (delivers messages, launches instances)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ POST /message
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     roost-bridge (This Crate)                            │
//! │                           Port 8080                                      │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │    HTTP     │  │   Message   │  │   Backup    │  │   Startup   │     │
//! │  │   Surface   │  │  Processor  │  │   Worker    │  │  Sequencer  │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                 │                              │
//!           │ Stream events   │ chat over ws                 │ TaskState,
//!           ▼                 ▼                              ▼ turns, queue
//! ┌───────────────────┐  ┌───────────────────┐  ┌─────────────────────────┐
//! │ Callback endpoint │  │  Agent process    │  │         SQLite          │
//! │ (push transport)  │  │  Port 18789       │  │                         │
//! └───────────────────┘  └───────────────────┘  └─────────────────────────┘
//! ```
//!
//! # Boot Phases
//!
//! Startup is strictly ordered; a phase starts only when the previous one
//! is done:
//!
//! 1. Restore the workspace and load conversation history, in parallel.
//! 2. Wait for the agent's control port, then handshake the streaming
//!    client.
//! 3. Bind the HTTP surface and write a `Running` TaskState record.
//! 4. Spawn detached address discovery (never awaited, never fatal).
//! 5. Drain the pending queue in arrival order, one message at a time.
//! 6. Start the periodic backup worker and wait for a stop signal.
//!
//! # HTTP Surface
//!
//! | Route | Auth | Behavior |
//! |-------|------|----------|
//! | `GET /health` | none | `{"status":"ok"}` |
//! | `POST /message` | bearer | `202` immediately, streams via callback |
//! | `GET /status` | bearer | uptime and last activity |
//! | `POST /shutdown` | bearer | replies, then runs the shutdown sequence |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `USER_KEY` | Yes | - | User this instance is dedicated to |
//! | `INSTANCE_HANDLE` | No | `$HOSTNAME` | Compute handle of this instance |
//! | `BRIDGE_AUTH_TOKEN` | Yes | - | Shared secret for the HTTP surface |
//! | `BRIDGE_PORT` | No | `8080` | HTTP listen port |
//! | `DATABASE_PATH` | No | `/data/roost.db` | SQLite database file |
//! | `AGENT_WS_URL` | No | `ws://127.0.0.1:18789` | Agent control port |
//! | `AGENT_TOKEN` | No | empty | Agent handshake token |
//! | `CALLBACK_URL` | Yes | - | Base URL for stream event pushes |
//! | `WORKSPACE_DIR` | No | `/data/workspace` | Agent working directory |
//! | `BACKUP_DIR` | No | `/data/backup` | Workspace backup target |
//! | `CHANNEL` | No | `web` | Channel recorded for local turns |
//! | `METRICS_ENABLED` | No | `false` | Emit counter/timer log events |
//! | `MACHINES_API_URL` | No | - | Enables address discovery |
//! | `MACHINES_API_TOKEN` | No | - | Machines API bearer token |
//!
//! # Modules
//!
//! - [`callback`]: Event push to the callback endpoint
//! - [`config`]: Bridge configuration from environment variables
//! - [`drain`]: Pending-queue replay on startup
//! - [`error`]: Error types for bridge operations
//! - [`history`]: Conversation context carried across generations
//! - [`lifecycle`]: TaskState writes, activity tracking, backup worker
//! - [`processing`]: One message through the agent and out as a stream
//! - [`server`]: Axum surface (health, message, status, shutdown)
//! - [`startup`]: Boot phases, port wait, address discovery
//! - [`sync`]: Workspace restore and backup

#![deny(missing_docs)]

/// Event push to the callback endpoint.
pub mod callback;

/// Bridge configuration loaded from environment variables.
pub mod config;

/// Pending-queue replay on startup.
pub mod drain;

/// Error types for bridge operations.
pub mod error;

/// Conversation history carried across instance generations.
pub mod history;

/// TaskState bookkeeping, activity tracking, and the backup worker.
pub mod lifecycle;

/// Message processing through the agent and out to the callback.
pub mod processing;

/// The bridge's instance-local HTTP surface.
pub mod server;

/// Boot sequence pieces: restore, port wait, client connect, discovery.
pub mod startup;

/// Workspace restore and backup.
pub mod sync;

pub use config::Config;
pub use error::BridgeError;
