// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-backed state store.
//!
//! A single file holds the whole store. Deployments point every process that
//! shares state at the same file (or mount); the [`StateStore`] trait is the
//! seam for swapping in a networked backend.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::{CoreError, Result};
use crate::model::{
    CONVERSATION_TTL_SECS, ConversationTurn, PendingMessage, TaskState, TaskStatus, TurnRole,
    VOLUME_RETENTION_DAYS, VolumeDatapoint,
};
use crate::store::StateStore;

/// Raw task_states row before the status column is parsed.
type TaskStateRow = (
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

/// Raw conversation_turns row before the role column is parsed.
type TurnRow = (
    String,
    String,
    i64,
    String,
    String,
    String,
    DateTime<Utc>,
);

/// SQLite implementation of [`StateStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. Migrations must already have run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn from_path(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: e.to_string(),
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;

        crate::migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    /// The underlying pool, for callers that need raw queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn task_state_from_row(row: TaskStateRow) -> Result<TaskState> {
    let (
        user_key,
        instance_handle,
        status,
        address,
        started_at,
        last_activity,
        expire_at,
        prewarm_until,
    ) = row;
    Ok(TaskState {
        user_key,
        instance_handle,
        status: TaskStatus::from_str(&status)?,
        address,
        started_at,
        last_activity,
        expire_at,
        prewarm_until,
    })
}

fn turn_from_row(row: TurnRow) -> Result<ConversationTurn> {
    let (user_key, conversation_key, sequence, role, content, channel, expire_at) = row;
    Ok(ConversationTurn {
        user_key,
        conversation_key,
        sequence,
        role: TurnRole::from_str(&role)?,
        content,
        channel,
        expire_at,
    })
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get_task_state(&self, user_key: &str) -> Result<Option<TaskState>> {
        let row: Option<TaskStateRow> = sqlx::query_as(
            r#"
            SELECT user_key, instance_handle, status, address,
                   started_at, last_activity, expire_at, prewarm_until
            FROM task_states
            WHERE user_key = ?1
              AND status != 'Idle'
              AND (expire_at IS NULL OR expire_at > ?2)
            "#,
        )
        .bind(user_key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(task_state_from_row).transpose()
    }

    async fn put_task_state(&self, state: &TaskState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO task_states
                (user_key, instance_handle, status, address,
                 started_at, last_activity, expire_at, prewarm_until)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&state.user_key)
        .bind(&state.instance_handle)
        .bind(state.status.as_str())
        .bind(&state.address)
        .bind(state.started_at)
        .bind(state.last_activity)
        .bind(state.expire_at)
        .bind(state.prewarm_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_task_state(&self, user_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM task_states WHERE user_key = ?1")
            .bind(user_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_task_states(&self) -> Result<Vec<TaskState>> {
        let rows: Vec<TaskStateRow> = sqlx::query_as(
            r#"
            SELECT user_key, instance_handle, status, address,
                   started_at, last_activity, expire_at, prewarm_until
            FROM task_states
            WHERE status IN ('Starting', 'Running')
              AND (expire_at IS NULL OR expire_at > ?1)
            ORDER BY user_key
            "#,
        )
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(task_state_from_row).collect()
    }

    async fn refresh_activity(
        &self,
        user_key: &str,
        last_activity: DateTime<Utc>,
        prewarm_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE task_states
            SET last_activity = ?2,
                prewarm_until = COALESCE(?3, prewarm_until)
            WHERE user_key = ?1
            "#,
        )
        .bind(user_key)
        .bind(last_activity)
        .bind(prewarm_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn enqueue_pending(&self, message: &PendingMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_messages
                (user_key, sort_key, message, channel, connection_id, created_at, expire_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&message.user_key)
        .bind(&message.sort_key)
        .bind(&message.message)
        .bind(&message.channel)
        .bind(&message.connection_id)
        .bind(message.created_at)
        .bind(message.expire_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_for(&self, user_key: &str) -> Result<Vec<PendingMessage>> {
        let rows: Vec<PendingMessage> = sqlx::query_as(
            r#"
            SELECT user_key, sort_key, message, channel, connection_id, created_at, expire_at
            FROM pending_messages
            WHERE user_key = ?1 AND expire_at > ?2
            ORDER BY sort_key ASC
            "#,
        )
        .bind(user_key)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_pending(&self, user_key: &str, sort_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_messages WHERE user_key = ?1 AND sort_key = ?2")
            .bind(user_key)
            .bind(sort_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_exchange(
        &self,
        user_key: &str,
        conversation_key: &str,
        user_content: &str,
        assistant_content: &str,
        channel: &str,
    ) -> Result<()> {
        let expire_at = Utc::now() + Duration::seconds(CONVERSATION_TTL_SECS);
        let mut tx = self.pool.begin().await?;

        for (role, content) in [
            (TurnRole::User, user_content),
            (TurnRole::Assistant, assistant_content),
        ] {
            sqlx::query(
                r#"
                INSERT INTO conversation_turns
                    (user_key, conversation_key, role, content, channel, expire_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(user_key)
            .bind(conversation_key)
            .bind(role.as_str())
            .bind(content)
            .bind(channel)
            .bind(expire_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recent_turns(
        &self,
        user_key: &str,
        conversation_key: &str,
        limit: i64,
    ) -> Result<Vec<ConversationTurn>> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            r#"
            SELECT user_key, conversation_key, sequence, role, content, channel, expire_at
            FROM conversation_turns
            WHERE user_key = ?1 AND conversation_key = ?2 AND expire_at > ?3
            ORDER BY sequence DESC
            LIMIT ?4
            "#,
        )
        .bind(user_key)
        .bind(conversation_key)
        .bind(Utc::now())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = rows
            .into_iter()
            .map(turn_from_row)
            .collect::<Result<Vec<_>>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn record_message_volume(&self, channel: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO message_volume (day, hour, channel, count)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT (day, hour, channel) DO UPDATE SET count = count + 1
            "#,
        )
        .bind(at.date_naive())
        .bind(at.hour())
        .bind(channel)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn message_volume_since(&self, since: DateTime<Utc>) -> Result<Vec<VolumeDatapoint>> {
        let rows: Vec<VolumeDatapoint> = sqlx::query_as(
            r#"
            SELECT day, hour, channel, count
            FROM message_volume
            WHERE day >= ?1
            ORDER BY day, hour, channel
            "#,
        )
        .bind(since.date_naive())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut purged = 0u64;

        purged += sqlx::query("DELETE FROM pending_messages WHERE expire_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        purged += sqlx::query(
            "DELETE FROM task_states WHERE expire_at IS NOT NULL AND expire_at <= ?1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        purged += sqlx::query("DELETE FROM conversation_turns WHERE expire_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let volume_cutoff = (now - Duration::days(VOLUME_RETENTION_DAYS)).date_naive();
        purged += sqlx::query("DELETE FROM message_volume WHERE day < ?1")
            .bind(volume_cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(purged)
    }
}
