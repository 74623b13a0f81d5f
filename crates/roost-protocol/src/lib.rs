// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Roost Protocol
//!
//! The wire protocol between the roost bridge and its local agent: JSON
//! envelope frames over a WebSocket, with a challenge/connect handshake and
//! streaming chat runs.
//!
//! ```text
//!   agent                                bridge
//!     │ ── event connect.challenge ──────▶ │
//!     │ ◀─────────────── req connect ───── │
//!     │ ── res ok {type: hello-ok} ──────▶ │
//!     │                                    │
//!     │ ◀─────────────── req chat.send ─── │
//!     │ ── res ok {runId} ───────────────▶ │
//!     │ ── event chat {state: delta} ────▶ │  (cumulative snapshots)
//!     │ ── event chat {state: final} ────▶ │
//! ```

pub mod client;
pub mod envelope;

pub use client::{AgentClient, AgentClientConfig, ChatTurn, ProtocolError};
