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


//! Database storage
//!
//! SQLite persistence for listening progress, using sqlx.
//!
//! # Database Schema
//! - ListeningProgress: one row per book (position, chapter, mode, languages)
//! - _migrations: applied schema migrations
//!
//! # Usage Example
//! ```no_run
//! use polyglot_core::storage::{queries, Database};
//!
//! # async fn example() -> polyglot_core::error::Result<()> {
//! let db = Database::new("./progress.db").await?;
//! let recent = queries::list_recent_progress(db.pool(), 10).await?;
//! for row in recent {
//!     println!("{} at position {}", row.book_id, row.global_position);
//! }
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

// Re-export commonly used types
pub use database::Database;
pub use models::ProgressRow;
