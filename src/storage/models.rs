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


//! Database row types
//!
//! # Type Mappings
//! - Indices stored as INTEGER (i64), converted to `usize` on the way out
//! - DateTime stored as TEXT in RFC 3339 format
//! - Language slots and speeds stored as JSON TEXT

use crate::content::language::{Language, LanguageSlots};
use crate::content::models::ChapterAddress;
use crate::error::Result;
use crate::playback::cursor::PlaybackMode;
use crate::progress::ProgressSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use tracing::warn;

/// One row of `ListeningProgress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProgressRow {
    pub book_id: String,
    pub book_title: String,
    pub subdivision_index: i64,
    pub chapter_index: i64,
    pub global_position: i64,
    pub slider_fraction: f64,
    pub playback_mode: String,
    pub language_slots: Option<String>,
    pub language_speeds: String,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRow {
    pub fn from_snapshot(snapshot: &ProgressSnapshot) -> Result<Self> {
        let language_slots = snapshot
            .languages
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(Self {
            book_id: snapshot.book_id.clone(),
            book_title: snapshot.book_title.clone(),
            subdivision_index: snapshot.chapter.subdivision as i64,
            chapter_index: snapshot.chapter.chapter as i64,
            global_position: snapshot.position as i64,
            slider_fraction: snapshot.slider_fraction,
            playback_mode: snapshot.mode.as_str().to_string(),
            language_slots,
            language_speeds: serde_json::to_string(&snapshot.speeds)?,
            updated_at: snapshot.updated_at,
        })
    }

    pub fn into_snapshot(self) -> Result<ProgressSnapshot> {
        let mode = PlaybackMode::parse(&self.playback_mode).unwrap_or_else(|| {
            warn!(book_id = %self.book_id, mode = %self.playback_mode, "Unknown stored playback mode, using default");
            PlaybackMode::default()
        });
        let languages: Option<LanguageSlots> = self
            .language_slots
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let speeds: BTreeMap<Language, f32> = serde_json::from_str(&self.language_speeds)?;

        Ok(ProgressSnapshot {
            book_id: self.book_id,
            book_title: self.book_title,
            chapter: ChapterAddress::new(
                self.subdivision_index.max(0) as usize,
                self.chapter_index.max(0) as usize,
            ),
            position: self.global_position.max(0) as usize,
            slider_fraction: self.slider_fraction.clamp(0.0, 1.0),
            mode,
            languages,
            speeds,
            updated_at: self.updated_at,
        })
    }
}
