// Polyglot Reader - Sentence-Synchronized Multilingual Audiobook Engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Database migrations
//!
//! Runtime SQL migrations tracked in the `_migrations` table, so the store
//! works the same on desktop and mobile without build-time databases.

use crate::error::Result;
use sqlx::{Executor, SqlitePool};
use tracing::info;

/// Run all database migrations
///
/// Migrations are tracked in the `_migrations` table and applied at most once.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    create_migrations_table(pool).await?;

    run_migration(pool, 1, "listening_progress", create_progress_table(pool)).await?;

    Ok(())
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

/// Run a single migration if it hasn't been applied yet
async fn run_migration(
    pool: &SqlitePool,
    id: i32,
    name: &str,
    migration_fn: impl std::future::Future<Output = Result<()>>,
) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    migration_fn.await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    info!(id, name, "Applied database migration");

    Ok(())
}

/// One row per book: where the listener stopped
async fn create_progress_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
CREATE TABLE IF NOT EXISTS ListeningProgress (
    book_id TEXT PRIMARY KEY NOT NULL,
    book_title TEXT NOT NULL DEFAULT '',

    -- Hierarchy coordinates
    subdivision_index INTEGER NOT NULL DEFAULT 0,
    chapter_index INTEGER NOT NULL DEFAULT 0,
    global_position INTEGER NOT NULL DEFAULT 0,
    slider_fraction REAL NOT NULL DEFAULT 0,

    -- Listener settings
    playback_mode TEXT NOT NULL DEFAULT 'sentence',
    language_slots TEXT,                       -- JSON LanguageSlots
    language_speeds TEXT NOT NULL DEFAULT '{}', -- JSON language -> rate

    updated_at TEXT NOT NULL                   -- RFC 3339
);

CREATE INDEX IF NOT EXISTS idx_progress_updated_at ON ListeningProgress(updated_at DESC);
        "#,
    )
    .await?;

    Ok(())
}
