// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Embedded database migrations.
//!
//! Migrations are compiled into the binary so deployments never depend on
//! migration files being shipped alongside it.

/// SQLite migrations for the state store schema.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Apply all pending SQLite migrations to the given pool.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    SQLITE.run(pool).await
}
