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


//! Database query functions
//!
//! Plain async functions over a `SqlitePool`, one per statement.

use crate::error::Result;
use crate::storage::models::ProgressRow;
use sqlx::SqlitePool;

// ============================================================================
// PROGRESS QUERIES
// ============================================================================

/// Insert or replace the progress row of a book
pub async fn upsert_progress(pool: &SqlitePool, row: &ProgressRow) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ListeningProgress (
            book_id, book_title, subdivision_index, chapter_index, global_position,
            slider_fraction, playback_mode, language_slots, language_speeds, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(book_id) DO UPDATE SET
            book_title = excluded.book_title,
            subdivision_index = excluded.subdivision_index,
            chapter_index = excluded.chapter_index,
            global_position = excluded.global_position,
            slider_fraction = excluded.slider_fraction,
            playback_mode = excluded.playback_mode,
            language_slots = excluded.language_slots,
            language_speeds = excluded.language_speeds,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&row.book_id)
    .bind(&row.book_title)
    .bind(row.subdivision_index)
    .bind(row.chapter_index)
    .bind(row.global_position)
    .bind(row.slider_fraction)
    .bind(&row.playback_mode)
    .bind(&row.language_slots)
    .bind(&row.language_speeds)
    .bind(row.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find the progress row of a book
pub async fn find_progress(pool: &SqlitePool, book_id: &str) -> Result<Option<ProgressRow>> {
    let row = sqlx::query_as::<_, ProgressRow>(
        r#"
        SELECT book_id, book_title, subdivision_index, chapter_index, global_position,
               slider_fraction, playback_mode, language_slots, language_speeds, updated_at
        FROM ListeningProgress WHERE book_id = ?
        "#,
    )
    .bind(book_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Delete the progress row of a book
///
/// Returns whether a row existed.
pub async fn delete_progress(pool: &SqlitePool, book_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM ListeningProgress WHERE book_id = ?")
        .bind(book_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Most recently played books first
pub async fn list_recent_progress(pool: &SqlitePool, limit: i64) -> Result<Vec<ProgressRow>> {
    let rows = sqlx::query_as::<_, ProgressRow>(
        r#"
        SELECT book_id, book_title, subdivision_index, chapter_index, global_position,
               slider_fraction, playback_mode, language_slots, language_speeds, updated_at
        FROM ListeningProgress
        ORDER BY updated_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
