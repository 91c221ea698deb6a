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


//! Playback cursor and its immutable snapshots

use crate::content::language::{Language, LanguageSlots, Stage};
use crate::content::models::ChapterAddress;
use crate::playback::events::PlaybackState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the language cycle interleaves with sentences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Every language for a sentence, then the next sentence
    #[default]
    Sentence,
    /// A whole paragraph per language, then the next paragraph
    Paragraph,
}

impl PlaybackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackMode::Sentence => "sentence",
            PlaybackMode::Paragraph => "paragraph",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sentence" => Some(PlaybackMode::Sentence),
            "paragraph" => Some(PlaybackMode::Paragraph),
            _ => None,
        }
    }
}

/// Mutable playback position, owned by the state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackCursor {
    pub chapter: ChapterAddress,
    /// Sentence position inside the chapter (resets to 0 per chapter)
    pub position: usize,
    pub stage: Stage,
    pub mode: PlaybackMode,
    pub languages: LanguageSlots,
    /// Per-language playback rate; missing entries use the default speed
    #[serde(default)]
    pub speeds: BTreeMap<Language, f32>,
}

impl PlaybackCursor {
    pub fn new(chapter: ChapterAddress, languages: LanguageSlots, mode: PlaybackMode) -> Self {
        Self {
            chapter,
            position: 0,
            stage: Stage::First,
            mode,
            languages,
            speeds: BTreeMap::new(),
        }
    }

    /// Language of the current stage, `None` if that slot is empty
    pub fn language(&self) -> Option<&Language> {
        self.languages.language_for(self.stage)
    }

    pub fn speed_for(&self, language: &Language, default_speed: f32) -> f32 {
        self.speeds.get(language).copied().unwrap_or(default_speed)
    }

    /// Move to the start of another chapter
    pub(crate) fn enter_chapter(&mut self, chapter: ChapterAddress) {
        self.chapter = chapter;
        self.position = 0;
        self.stage = Stage::First;
    }
}

/// Read-only view of the cursor handed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorSnapshot {
    pub book_id: String,
    pub chapter: ChapterAddress,
    pub position: usize,
    pub chapter_sentence_count: usize,
    /// Sentence at `position`, absent only for an empty chapter
    pub sentence_id: Option<String>,
    pub stage: Stage,
    pub language: Option<Language>,
    pub mode: PlaybackMode,
    pub state: PlaybackState,
    pub languages: LanguageSlots,
    pub speeds: BTreeMap<Language, f32>,
}

impl CursorSnapshot {
    /// Position as a 0..=1 slider value, the inverse of seek
    pub fn slider_fraction(&self) -> f64 {
        slider_fraction(self.position, self.chapter_sentence_count)
    }
}

pub(crate) fn slider_fraction(position: usize, sentence_count: usize) -> f64 {
    if sentence_count <= 1 {
        return 0.0;
    }
    (position.min(sentence_count - 1) as f64) / ((sentence_count - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(PlaybackMode::parse(" Paragraph"), Some(PlaybackMode::Paragraph));
        assert_eq!(PlaybackMode::parse("sentence"), Some(PlaybackMode::Sentence));
        assert_eq!(PlaybackMode::parse("chapter"), None);
        assert_eq!(
            serde_json::to_string(&PlaybackMode::Paragraph).unwrap(),
            "\"paragraph\""
        );
    }

    #[test]
    fn test_slider_fraction() {
        assert_eq!(slider_fraction(0, 0), 0.0);
        assert_eq!(slider_fraction(0, 1), 0.0);
        assert_eq!(slider_fraction(5, 11), 0.5);
        assert_eq!(slider_fraction(10, 11), 1.0);
        assert_eq!(slider_fraction(50, 11), 1.0);
    }

    #[test]
    fn test_speed_defaults_per_language() {
        let mut cursor = PlaybackCursor::new(
            ChapterAddress::default(),
            LanguageSlots::default(),
            PlaybackMode::Sentence,
        );
        cursor.speeds.insert(Language::new("es"), 0.75);
        assert_eq!(cursor.speed_for(&Language::new("es"), 1.0), 0.75);
        assert_eq!(cursor.speed_for(&Language::new("en"), 1.0), 1.0);
        assert_eq!(cursor.language().unwrap().as_str(), "en");
    }
}
