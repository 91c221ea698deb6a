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


//! Content index: sentence id -> language -> audio metadata
//!
//! The index is the per-sentence view of the audio. It names the audio file
//! a sentence lives in and its offset there, independently of the playback
//! map's chunk lists. The resolver cross-checks the two.

use crate::content::language::Language;
use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

fn default_sample_rate() -> u32 {
    44_100
}

/// Audio metadata for one sentence in one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Audio file reference (relative to the book's audio root)
    pub audio_path: String,

    /// Offset of the sentence inside `audio_path`
    pub offset_ms: f64,

    pub duration_ms: f64,

    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,
}

/// Sentence id -> language -> [`IndexEntry`]
///
/// Read-only after load; share it behind an `Arc`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ContentIndex {
    entries: HashMap<String, HashMap<Language, IndexEntry>>,
}

impl ContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON form, normalizing locale-qualified language keys
    ///
    /// Two keys that normalize to the same base language (`es-ES`, `es-MX`)
    /// with different entries are rejected.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, HashMap<String, IndexEntry>> = serde_json::from_str(json)?;
        let mut index = Self::new();
        for (sentence_id, by_code) in raw {
            for (code, entry) in by_code {
                index.insert_checked(&sentence_id, Language::new(&code), entry)?;
            }
        }
        Ok(index)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Insert or replace an entry
    pub fn insert<S: Into<String>>(&mut self, sentence_id: S, language: Language, entry: IndexEntry) {
        self.entries
            .entry(sentence_id.into())
            .or_default()
            .insert(language, entry);
    }

    fn insert_checked(&mut self, sentence_id: &str, language: Language, entry: IndexEntry) -> Result<()> {
        let by_lang = self.entries.entry(sentence_id.to_string()).or_default();
        if let Some(existing) = by_lang.get(&language) {
            if *existing != entry {
                return Err(PlaybackError::inconsistent(
                    sentence_id,
                    language.as_str(),
                    "content index lists two different entries for the same base language",
                ));
            }
            return Ok(());
        }
        by_lang.insert(language, entry);
        Ok(())
    }

    pub fn get(&self, sentence_id: &str, language: &Language) -> Option<&IndexEntry> {
        self.entries
            .get(sentence_id)
            .and_then(|by_lang| by_lang.get(language))
    }

    /// Languages with audio for a sentence, sorted
    pub fn languages_for(&self, sentence_id: &str) -> Vec<Language> {
        let mut languages: Vec<Language> = self
            .entries
            .get(sentence_id)
            .map(|by_lang| by_lang.keys().cloned().collect())
            .unwrap_or_default();
        languages.sort();
        languages
    }

    /// Number of sentences indexed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_keys_are_normalized() {
        let json = r#"{
            "s000001": {
                "en-US": { "audio_path": "c0_en.mp3", "offset_ms": 0, "duration_ms": 900 },
                "es-ES": { "audio_path": "c0_es.mp3", "offset_ms": 0, "duration_ms": 1100, "sample_rate_hz": 22050 }
            }
        }"#;
        let index = ContentIndex::from_json_str(json).unwrap();
        let es = index.get("s000001", &Language::new("es")).unwrap();
        assert_eq!(es.sample_rate_hz, 22_050);
        assert_eq!(index.get("s000001", &Language::new("EN")).unwrap().sample_rate_hz, 44_100);
        assert_eq!(index.languages_for("s000001").len(), 2);
    }

    #[test]
    fn test_conflicting_locale_variants_rejected() {
        let json = r#"{
            "s1": {
                "es-ES": { "audio_path": "a.mp3", "offset_ms": 0, "duration_ms": 900 },
                "es-MX": { "audio_path": "b.mp3", "offset_ms": 0, "duration_ms": 900 }
            }
        }"#;
        let err = ContentIndex::from_json_str(json).unwrap_err();
        assert!(err.is_data_integrity());
    }
}
