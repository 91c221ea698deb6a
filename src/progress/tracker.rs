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


//! Resume/progress tracker
//!
//! Thin layer between the engine and a [`ProgressStore`]: turns cursor
//! snapshots into persisted records, skips writes that would store the same
//! record again, and checks restored records against the book before they
//! become a cursor.

use crate::config::EngineConfig;
use crate::content::language::{Language, LanguageSlots};
use crate::content::models::ChapterAddress;
use crate::content::provider::ContentProvider;
use crate::error::Result;
use crate::playback::cursor::{CursorSnapshot, PlaybackCursor, PlaybackMode};
use crate::playback::state_machine::load_layout;
use crate::progress::store::ProgressStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Persisted resume state of one book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub book_id: String,
    #[serde(default)]
    pub book_title: String,
    pub chapter: ChapterAddress,
    pub position: usize,
    /// Position as a 0..=1 slider value inside the chapter
    pub slider_fraction: f64,
    pub mode: PlaybackMode,
    /// Absent for records written before languages were stored
    #[serde(default)]
    pub languages: Option<LanguageSlots>,
    #[serde(default)]
    pub speeds: BTreeMap<Language, f32>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn from_cursor(snapshot: &CursorSnapshot, book_title: &str) -> Self {
        Self {
            book_id: snapshot.book_id.clone(),
            book_title: book_title.to_string(),
            chapter: snapshot.chapter,
            position: snapshot.position,
            slider_fraction: snapshot.slider_fraction(),
            mode: snapshot.mode,
            languages: Some(snapshot.languages.clone()),
            speeds: snapshot.speeds.clone(),
            updated_at: Utc::now(),
        }
    }

    /// Same resume state, ignoring when it was written
    pub fn same_state(&self, other: &ProgressSnapshot) -> bool {
        self.book_id == other.book_id
            && self.chapter == other.chapter
            && self.position == other.position
            && self.mode == other.mode
            && self.languages == other.languages
            && self.speeds == other.speeds
    }
}

/// Records and restores resume state for one store
pub struct ProgressTracker<S: ProgressStore> {
    store: S,
    last_saved: Option<ProgressSnapshot>,
    writes: u64,
}

impl<S: ProgressStore> ProgressTracker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            last_saved: None,
            writes: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of records actually written
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Persist a committed cursor state
    ///
    /// Returns `false` when the state equals the last one written.
    pub async fn record(&mut self, snapshot: &CursorSnapshot, book_title: &str) -> Result<bool> {
        let progress = ProgressSnapshot::from_cursor(snapshot, book_title);
        if self
            .last_saved
            .as_ref()
            .is_some_and(|last| last.same_state(&progress))
        {
            return Ok(false);
        }
        self.store.save(&progress).await?;
        self.last_saved = Some(progress);
        self.writes += 1;
        Ok(true)
    }

    /// Load the saved cursor of a book, validated against its content
    ///
    /// Unknown chapters fall back to the start of the book, positions past
    /// the end of a chapter are clamped. The cursor always starts at stage 1.
    /// Without saved state the configured defaults are used.
    pub async fn restore<P: ContentProvider + ?Sized>(
        &mut self,
        content: &P,
        config: &EngineConfig,
    ) -> Result<Option<PlaybackCursor>> {
        let book = content.book_structure();
        let Some(saved) = self.store.load(&book.book_id).await? else {
            return Ok(None);
        };

        let Some(first) = book.first_chapter() else {
            return Ok(None);
        };
        let (chapter, mut position) = if book.contains(saved.chapter) {
            (saved.chapter, saved.position)
        } else {
            warn!(
                book_id = %book.book_id,
                subdivision = saved.chapter.subdivision,
                chapter = saved.chapter.chapter,
                "Saved chapter no longer exists, restarting book"
            );
            (first, 0)
        };

        let sentence_count = load_layout(content, chapter)?.sentence_count();
        if position >= sentence_count {
            warn!(
                book_id = %book.book_id,
                position,
                sentence_count,
                "Saved position beyond chapter end, clamping"
            );
            position = sentence_count.saturating_sub(1);
        }

        let languages = saved
            .languages
            .clone()
            .unwrap_or_else(|| config.languages.clone());
        let mut cursor = PlaybackCursor::new(chapter, languages, saved.mode);
        cursor.position = position;
        cursor.speeds = saved
            .speeds
            .iter()
            .map(|(language, speed)| (language.clone(), config.clamp_speed(*speed)))
            .collect();

        info!(
            book_id = %book.book_id,
            subdivision = chapter.subdivision,
            chapter = chapter.chapter,
            position,
            "Restored listening progress"
        );
        self.last_saved = Some(saved);
        Ok(Some(cursor))
    }

    /// Forget the saved state of a book
    pub async fn reset(&mut self, book_id: &str) -> Result<bool> {
        if self
            .last_saved
            .as_ref()
            .is_some_and(|last| last.book_id == book_id)
        {
            self.last_saved = None;
        }
        self.store.delete(book_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{BookBuilder, Stage, StaticContentProvider};
    use crate::playback::PlaybackState;
    use crate::progress::MemoryProgressStore;

    fn book() -> StaticContentProvider {
        BookBuilder::new("book-1", "en")
            .title("Test Book")
            .chapter("One", &[3])
            .chapter("Two", &[2, 2])
            .build()
            .unwrap()
    }

    fn cursor_snapshot(chapter: ChapterAddress, position: usize) -> CursorSnapshot {
        CursorSnapshot {
            book_id: "book-1".to_string(),
            chapter,
            position,
            chapter_sentence_count: 4,
            sentence_id: None,
            stage: Stage::Second,
            language: None,
            mode: PlaybackMode::Paragraph,
            state: PlaybackState::Playing(Stage::Second),
            languages: LanguageSlots::from_codes(&["en", "es"]).unwrap(),
            speeds: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_identical_snapshots_written_once() {
        let mut tracker = ProgressTracker::new(MemoryProgressStore::new());
        let snapshot = cursor_snapshot(ChapterAddress::new(0, 1), 2);

        assert!(tracker.record(&snapshot, "Test Book").await.unwrap());
        let mut same_place_other_stage = snapshot.clone();
        same_place_other_stage.stage = Stage::First;
        assert!(!tracker.record(&same_place_other_stage, "Test Book").await.unwrap());

        let mut moved = snapshot.clone();
        moved.position = 3;
        assert!(tracker.record(&moved, "Test Book").await.unwrap());
        assert_eq!(tracker.writes(), 2);

        let saved = tracker.store().load("book-1").await.unwrap().unwrap();
        assert_eq!(saved.position, 3);
        assert_eq!(saved.slider_fraction, 1.0);
        assert_eq!(saved.book_title, "Test Book");
    }

    #[tokio::test]
    async fn test_restore_roundtrip_starts_at_stage_one() {
        let content = book();
        let config = EngineConfig::default();
        let mut tracker = ProgressTracker::new(MemoryProgressStore::new());
        tracker
            .record(&cursor_snapshot(ChapterAddress::new(0, 1), 2), "")
            .await
            .unwrap();

        let cursor = tracker.restore(&content, &config).await.unwrap().unwrap();
        assert_eq!(cursor.chapter, ChapterAddress::new(0, 1));
        assert_eq!(cursor.position, 2);
        assert_eq!(cursor.stage, Stage::First);
        assert_eq!(cursor.mode, PlaybackMode::Paragraph);
        assert_eq!(cursor.languages.configured_count(), 2);
    }

    #[tokio::test]
    async fn test_restore_without_saved_state() {
        let mut tracker = ProgressTracker::new(MemoryProgressStore::new());
        let restored = tracker.restore(&book(), &EngineConfig::default()).await.unwrap();
        assert!(restored.is_none());
    }

    #[tokio::test]
    async fn test_restore_repairs_stale_records() {
        let content = book();
        let config = EngineConfig::default();
        let store = MemoryProgressStore::new();
        let mut tracker = ProgressTracker::new(store.clone());

        let mut speeds = BTreeMap::new();
        speeds.insert(Language::new("en"), 8.0);
        let mut stale = ProgressSnapshot {
            book_id: "book-1".to_string(),
            book_title: String::new(),
            chapter: ChapterAddress::new(3, 0),
            position: 2,
            slider_fraction: 0.5,
            mode: PlaybackMode::Sentence,
            languages: None,
            speeds,
            updated_at: Utc::now(),
        };
        store.save(&stale).await.unwrap();

        let cursor = tracker.restore(&content, &config).await.unwrap().unwrap();
        assert_eq!(cursor.chapter, ChapterAddress::new(0, 0));
        assert_eq!(cursor.position, 0);
        assert_eq!(cursor.speeds[&Language::new("en")], 3.0);
        assert_eq!(cursor.languages, config.languages);

        stale.chapter = ChapterAddress::new(0, 1);
        stale.position = 99;
        store.save(&stale).await.unwrap();
        let cursor = tracker.restore(&content, &config).await.unwrap().unwrap();
        assert_eq!(cursor.position, 3);
    }

    #[tokio::test]
    async fn test_reset_forgets_book() {
        let mut tracker = ProgressTracker::new(MemoryProgressStore::new());
        let snapshot = cursor_snapshot(ChapterAddress::new(0, 0), 1);
        tracker.record(&snapshot, "").await.unwrap();

        assert!(tracker.reset("book-1").await.unwrap());
        assert!(tracker.store().is_empty().await);
        // Same state is written again after a reset
        assert!(tracker.record(&snapshot, "").await.unwrap());
    }
}
