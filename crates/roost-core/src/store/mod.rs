// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! State store interface and backends.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{ConversationTurn, PendingMessage, TaskState, VolumeDatapoint};

/// Persistence interface shared by the gateway and the bridge.
///
/// All methods treat expiry uniformly: a record whose `expire_at` has passed
/// is indistinguishable from one that was deleted, regardless of whether the
/// purge has physically removed it yet.
#[async_trait]
pub trait StateStore: Send + Sync {
    // ===== Task states =====

    /// Look up the task state for a user key.
    ///
    /// Idle and expired records read as absent; callers never see them.
    async fn get_task_state(&self, user_key: &str) -> Result<Option<TaskState>>;

    /// Write a task state, replacing any existing record for the user key.
    async fn put_task_state(&self, state: &TaskState) -> Result<()>;

    /// Remove the task state for a user key. Removing an absent record is
    /// not an error.
    async fn delete_task_state(&self, user_key: &str) -> Result<()>;

    /// All Starting and Running records, for lifecycle sweeps.
    async fn active_task_states(&self) -> Result<Vec<TaskState>>;

    /// Update the activity timestamp of an existing record without touching
    /// the rest of it. `prewarm_until` is only overwritten when given.
    async fn refresh_activity(
        &self,
        user_key: &str,
        last_activity: DateTime<Utc>,
        prewarm_until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    // ===== Pending message queue =====

    /// Park a message until an instance can take it.
    async fn enqueue_pending(&self, message: &PendingMessage) -> Result<()>;

    /// All live queued messages for a user, oldest first.
    async fn pending_for(&self, user_key: &str) -> Result<Vec<PendingMessage>>;

    /// Remove one queued message after it was processed.
    async fn delete_pending(&self, user_key: &str, sort_key: &str) -> Result<()>;

    // ===== Conversation history =====

    /// Append one user/assistant exchange as two consecutive turns.
    ///
    /// Both turns get the standard conversation retention TTL.
    async fn record_exchange(
        &self,
        user_key: &str,
        conversation_key: &str,
        user_content: &str,
        assistant_content: &str,
        channel: &str,
    ) -> Result<()>;

    /// The last `limit` live turns of a conversation, in chronological
    /// order.
    async fn recent_turns(
        &self,
        user_key: &str,
        conversation_key: &str,
        limit: i64,
    ) -> Result<Vec<ConversationTurn>>;

    // ===== Message volume =====

    /// Count one message into its (day, hour, channel) bucket.
    async fn record_message_volume(&self, channel: &str, at: DateTime<Utc>) -> Result<()>;

    /// All datapoints from `since` onward (by bucket day).
    async fn message_volume_since(&self, since: DateTime<Utc>) -> Result<Vec<VolumeDatapoint>>;

    // ===== Expiry =====

    /// Physically remove expired rows of every kind. Returns how many rows
    /// went away.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
