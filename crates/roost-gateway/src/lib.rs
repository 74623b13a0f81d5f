// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Roost Gateway - Instance Lifecycle Orchestration
//!
//! This crate provides the control plane for single-tenant agent instances.
//! It routes inbound user messages to the right instance, launches instances
//! on demand, reaps idle or wedged instances, and keeps a warm spare ready
//! during quiet periods.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Channel Frontends                                 │
//! │                  (chat widgets, messaging webhooks)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     roost-gateway (This Crate)                           │
//! │                           Port 8787                                      │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │   Message   │  │  Watchdog   │  │  Prewarmer  │  │   Machines  │     │
//! │  │   Router    │  │   Sweep     │  │   Sweep     │  │   Launcher  │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                 │                              │
//!           │ Deliver         │ Stop idle                    │ Launch
//!           ▼                 ▼                              ▼
//! ┌───────────────────┐                          ┌─────────────────────────┐
//! │    roost-bridge   │◄─────────────────────────│    Agent Instances      │
//! │    Port 8080      │                          │    (one VM per user)    │
//! └───────────────────┘                          └─────────────────────────┘
//!           │
//!           ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                             SQLite                                     │
//! │            (Task state, pending queue, message volume)                │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Routing Outcomes
//!
//! Every message POSTed to `/v1/messages` resolves to one of three outcomes:
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | `sent` | Delivered to a running instance over its bridge endpoint |
//! | `queued` | Instance is booting; message parked in the pending queue |
//! | `started` | A fresh instance was launched; message parked for it |
//!
//! # Instance State Machine
//!
//! ```text
//!                   ┌──────────┐
//!        launch ───►│ STARTING │
//!                   └────┬─────┘
//!                        │ bridge ready
//!                        ▼
//!                   ┌──────────┐
//!                   │ RUNNING  │◄──── prewarm claim
//!                   └────┬─────┘
//!                        │ shutdown / watchdog stop
//!                        ▼
//!                   ┌──────────┐
//!                   │   IDLE   │  (record expires after 24h)
//!                   └──────────┘
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DATABASE_PATH` | No | `./data/roost.db` | SQLite database file |
//! | `LISTEN_ADDR` | No | `0.0.0.0:8787` | Ingress listen address |
//! | `MACHINES_API_URL` | Yes | - | Machines API base URL |
//! | `MACHINES_API_TOKEN` | Yes | - | Machines API bearer token |
//! | `MACHINES_IMAGE` | Yes | - | Image to launch instances from |
//! | `MACHINES_REGION` | No | - | Preferred placement region |
//! | `BRIDGE_AUTH_TOKEN` | Yes | - | Shared secret for bridge endpoints |
//! | `CALLBACK_URL` | Yes | - | Base URL instances push responses to |
//! | `METRICS_ENABLED` | No | `false` | Emit counter/timer log events |
//! | `WATCHDOG_INTERVAL_SECS` | No | `300` | Watchdog sweep interval |
//! | `PREWARM_INTERVAL_SECS` | No | `1800` | Prewarmer sweep interval |
//! | `PREWARM_DURATION_MIN` | No | `60` | How long a warm spare stays up |
//!
//! # Modules
//!
//! - [`config`]: Gateway configuration from environment variables
//! - [`delivery`]: HTTP delivery of messages to bridge endpoints
//! - [`error`]: Error types for gateway operations
//! - [`launcher`]: Compute backends for launching and stopping instances
//! - [`prewarmer`]: Background worker keeping a warm spare instance
//! - [`router`]: Message routing and instance lifecycle decisions
//! - [`server`]: Axum ingress (health, messages, status)
//! - [`watchdog`]: Background worker reaping idle and wedged instances

#![deny(missing_docs)]

/// Gateway configuration loaded from environment variables.
pub mod config;

/// HTTP delivery of messages to a running instance's bridge endpoint.
pub mod delivery;

/// Error types for gateway operations.
pub mod error;

/// Compute backends for launching, probing, and stopping instances.
pub mod launcher;

/// Background worker keeping a warm spare instance during quiet hours.
pub mod prewarmer;

/// Message routing and instance lifecycle decisions.
pub mod router;

/// Axum ingress for health, message submission, and status queries.
pub mod server;

/// Background worker reaping idle and wedged instances.
pub mod watchdog;

pub use config::Config;
pub use error::GatewayError;
