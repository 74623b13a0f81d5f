// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Domain records shared by the gateway and the bridge.
//!
//! Everything here maps one-to-one onto the state store tables, plus the two
//! wire types that cross process boundaries: [`BridgeMessage`] (gateway to
//! bridge) and [`ServerMessage`] (bridge to the caller's connection
//! endpoint).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Reserved user key under which the prewarmed spare instance is tracked.
pub const PREWARM_USER_KEY: &str = "system:prewarm";

/// Conversation key for the per-user short-term history.
pub const DEFAULT_CONVERSATION: &str = "default";

/// How long a queued message stays deliverable, in seconds.
pub const PENDING_MESSAGE_TTL_SECS: i64 = 300;

/// How long conversation turns are retained, in seconds.
pub const CONVERSATION_TTL_SECS: i64 = 7 * 24 * 3600;

/// How long an Idle marker record lingers before it is purged, in seconds.
pub const IDLE_RECORD_TTL_SECS: i64 = 24 * 3600;

/// How many days of message volume datapoints are kept and consulted.
pub const VOLUME_RETENTION_DAYS: i64 = 7;

/// TCP port every bridge listens on inside its instance.
pub const BRIDGE_PORT: u16 = 8080;

/// Lifecycle status of a user's compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Launch was requested; the bridge has not reported in yet.
    Starting,
    /// The bridge is up and serving.
    Running,
    /// The instance shut down cleanly; the record only lingers for its TTL.
    Idle,
}

impl TaskStatus {
    /// Stored column form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Starting => "Starting",
            TaskStatus::Running => "Running",
            TaskStatus::Idle => "Idle",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Starting" => Ok(TaskStatus::Starting),
            "Running" => Ok(TaskStatus::Running),
            "Idle" => Ok(TaskStatus::Idle),
            other => Err(CoreError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// Where (if anywhere) a user's instance currently is.
///
/// One record per user key. An absent record means "no instance"; readers
/// treat Idle and expired records the same way.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskState {
    /// The user this instance serves, or [`PREWARM_USER_KEY`].
    pub user_key: String,
    /// Provider-issued handle of the compute instance.
    pub instance_handle: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Externally reachable address, once the instance has one.
    pub address: Option<String>,
    /// When the instance was launched.
    pub started_at: DateTime<Utc>,
    /// Last activity the record owner knows about.
    pub last_activity: DateTime<Utc>,
    /// When the record stops being meaningful; only set on Idle records.
    pub expire_at: Option<DateTime<Utc>>,
    /// Freshness horizon for a prewarmed spare.
    pub prewarm_until: Option<DateTime<Utc>>,
}

/// A message parked in the queue until an instance can take it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PendingMessage {
    /// The user the message is for.
    pub user_key: String,
    /// Creation-ordered key; see [`pending_sort_key`].
    pub sort_key: String,
    /// The message text.
    pub message: String,
    /// Channel the message arrived on.
    pub channel: String,
    /// Caller connection awaiting the response.
    pub connection_id: String,
    /// When the message was queued.
    pub created_at: DateTime<Utc>,
    /// After this instant the message is dropped undelivered.
    pub expire_at: DateTime<Utc>,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    /// The human side of the exchange.
    User,
    /// The agent's reply.
    Assistant,
}

impl TurnRole {
    /// Stored column form of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            other => Err(CoreError::InvalidRole {
                value: other.to_string(),
            }),
        }
    }
}

/// One message of a recorded conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    /// The user the conversation belongs to.
    pub user_key: String,
    /// Which conversation within the user's history.
    pub conversation_key: String,
    /// Store-assigned, strictly increasing within a conversation.
    pub sequence: i64,
    /// Who produced the turn.
    pub role: TurnRole,
    /// The turn text.
    pub content: String,
    /// Channel the exchange happened on.
    pub channel: String,
    /// Retention horizon.
    pub expire_at: DateTime<Utc>,
}

/// Message count for one (day, hour, channel) bucket.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct VolumeDatapoint {
    /// UTC day of the bucket.
    pub day: NaiveDate,
    /// UTC hour of the bucket (0-23).
    pub hour: u32,
    /// Channel the messages arrived on.
    pub channel: String,
    /// Messages counted in the bucket.
    pub count: i64,
}

/// Push events delivered to the caller's connection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Incremental fragment of the agent's reply.
    StreamChunk {
        /// The new text fragment.
        content: String,
    },
    /// The reply is complete.
    StreamEnd,
    /// Processing failed.
    Error {
        /// Readable description of the failure.
        error: String,
    },
    /// Lifecycle notice, e.g. that an instance is starting.
    Status {
        /// The notice text.
        status: String,
    },
}

/// Body of the bridge's `/message` endpoint, as the gateway sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    /// The user the message is from.
    pub user_id: String,
    /// The message text.
    pub message: String,
    /// Channel the message arrived on.
    pub channel: String,
    /// Caller connection awaiting the response.
    pub connection_id: String,
    /// Base URL the bridge pushes [`ServerMessage`] events to.
    pub callback_url: String,
}

/// Sort key for pending messages.
///
/// Millisecond RFC 3339 timestamp plus a random suffix: lexicographic order
/// is arrival order, and same-instant messages never collide.
pub fn pending_sort_key(created_at: DateTime<Utc>) -> String {
    format!(
        "{}#{}",
        created_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        Uuid::new_v4()
    )
}
