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


//! Playback map: chunk id -> language -> ordered sentence timings
//!
//! A chunk is a merged audio file per language holding several consecutive
//! sentences, possibly spanning paragraphs. Timings are relative to the
//! chunk's own audio file.
//!
//! On load a `(language, sentence id)` index is built so lookups are O(1)
//! instead of a scan over every chunk.

use crate::content::language::Language;
use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Tolerance used when the same sentence is listed twice in the map
const DUPLICATE_TOLERANCE_MS: f64 = 0.5;

/// Timing of one sentence inside a chunk's audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceTiming {
    pub sentence_id: String,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl SentenceTiming {
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }

    fn agrees_with(&self, other: &SentenceTiming) -> bool {
        (self.start_ms - other.start_ms).abs() <= DUPLICATE_TOLERANCE_MS
            && (self.duration_ms - other.duration_ms).abs() <= DUPLICATE_TOLERANCE_MS
    }
}

/// Sentence timings grouped by paragraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphTiming {
    pub paragraph_id: String,
    #[serde(default)]
    pub sentences: Vec<SentenceTiming>,
}

/// One language's audio file for a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTrack {
    pub audio_path: String,
    #[serde(default)]
    pub sentences: Vec<SentenceTiming>,
    #[serde(default)]
    pub paragraphs: Vec<ParagraphTiming>,
}

impl ChunkTrack {
    /// Every timing listed by this track, flat list first
    fn all_timings(&self) -> impl Iterator<Item = &SentenceTiming> {
        self.sentences
            .iter()
            .chain(self.paragraphs.iter().flat_map(|p| p.sentences.iter()))
    }

    /// Total audio covered by the track's sentences
    pub fn covered_ms(&self) -> f64 {
        self.sentences.iter().map(|s| s.end_ms()).fold(0.0, f64::max)
    }
}

/// Where a sentence lives in the playback map
#[derive(Debug, Clone, Copy)]
pub struct ChunkHit<'a> {
    pub chunk_id: &'a str,
    pub track: &'a ChunkTrack,
    pub timing: &'a SentenceTiming,
}

#[derive(Debug, Clone)]
struct IndexedTiming {
    chunk_id: String,
    timing: SentenceTiming,
}

/// Chunk id -> language -> [`ChunkTrack`], plus the reverse sentence index
#[derive(Debug, Clone, Default)]
pub struct PlaybackMap {
    chunks: BTreeMap<String, BTreeMap<Language, ChunkTrack>>,
    by_sentence: HashMap<(Language, String), IndexedTiming>,
}

impl PlaybackMap {
    /// Build the map and its sentence index
    ///
    /// A sentence listed in two chunks of the same language, or listed
    /// twice with different timings, is an `InconsistentMapping`.
    pub fn from_chunks(chunks: BTreeMap<String, BTreeMap<Language, ChunkTrack>>) -> Result<Self> {
        let mut by_sentence: HashMap<(Language, String), IndexedTiming> = HashMap::new();

        for (chunk_id, tracks) in &chunks {
            for (language, track) in tracks {
                for timing in track.all_timings() {
                    let key = (language.clone(), timing.sentence_id.clone());
                    match by_sentence.get(&key) {
                        Some(existing) if existing.chunk_id != *chunk_id => {
                            return Err(PlaybackError::inconsistent(
                                &timing.sentence_id,
                                language.as_str(),
                                format!(
                                    "listed in chunks '{}' and '{}'",
                                    existing.chunk_id, chunk_id
                                ),
                            ));
                        }
                        Some(existing) if !existing.timing.agrees_with(timing) => {
                            return Err(PlaybackError::inconsistent(
                                &timing.sentence_id,
                                language.as_str(),
                                format!("listed twice in chunk '{}' with different timings", chunk_id),
                            ));
                        }
                        Some(_) => {}
                        None => {
                            by_sentence.insert(
                                key,
                                IndexedTiming {
                                    chunk_id: chunk_id.clone(),
                                    timing: timing.clone(),
                                },
                            );
                        }
                    }
                }
            }
        }

        Ok(Self {
            chunks,
            by_sentence,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, ChunkTrack>> = serde_json::from_str(json)?;
        let mut chunks = BTreeMap::new();
        for (chunk_id, by_code) in raw {
            let mut tracks = BTreeMap::new();
            for (code, track) in by_code {
                let language = Language::new(&code);
                if tracks.insert(language.clone(), track).is_some() {
                    return Err(PlaybackError::invalid_content(format!(
                        "Chunk '{}' has two tracks for language '{}'",
                        chunk_id, language
                    )));
                }
            }
            chunks.insert(chunk_id, tracks);
        }
        Self::from_chunks(chunks)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Find the chunk containing a sentence for a language
    pub fn locate(&self, sentence_id: &str, language: &Language) -> Option<ChunkHit<'_>> {
        let indexed = self
            .by_sentence
            .get(&(language.clone(), sentence_id.to_string()))?;
        let track = self.chunks.get(&indexed.chunk_id)?.get(language)?;
        Some(ChunkHit {
            chunk_id: &indexed.chunk_id,
            track,
            timing: &indexed.timing,
        })
    }

    pub fn track(&self, chunk_id: &str, language: &Language) -> Option<&ChunkTrack> {
        self.chunks.get(chunk_id).and_then(|tracks| tracks.get(language))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}
