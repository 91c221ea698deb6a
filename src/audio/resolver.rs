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


//! Audio resolver
//!
//! Turns (sentence id, language) into the exact time range to play inside a
//! chunk's audio file by composing the content index and the playback map.
//! Both sources are looked up independently and must agree; a disagreement
//! is reported, never silently resolved in favour of one side.

use crate::audio::index::ContentIndex;
use crate::audio::playback_map::PlaybackMap;
use crate::audio::sources::AudioMapSource;
use crate::content::language::Language;
use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Allowed drift between content index and playback map offsets
pub const DEFAULT_OFFSET_TOLERANCE_MS: f64 = 2.0;

/// Exact audio range for one sentence in one language
///
/// Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    pub sentence_id: String,
    pub language: Language,
    pub chunk_id: String,
    /// Audio file of the chunk for this language
    pub audio_path: String,
    /// Offset inside `audio_path`
    pub start_ms: f64,
    pub duration_ms: f64,
    pub sample_rate_hz: u32,
}

impl AudioSegment {
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }

    /// Whether both segments play from the same audio file
    pub fn shares_file_with(&self, other: &AudioSegment) -> bool {
        same_audio_file(&self.audio_path, &other.audio_path)
    }
}

/// Compare two audio file references
///
/// References may differ in separator style or directory prefix depending on
/// which tool produced them; the file names must match.
pub fn same_audio_file(a: &str, b: &str) -> bool {
    fn file_name(path: &str) -> &str {
        path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path)
    }
    let a = a.trim();
    let b = b.trim();
    a == b || file_name(a) == file_name(b)
}

/// Resolves sentences to audio segments
///
/// Pure queries over maps that are read-only after load; clones share the
/// same maps.
#[derive(Debug, Clone)]
pub struct AudioResolver {
    index: Arc<ContentIndex>,
    map: Arc<PlaybackMap>,
    tolerance_ms: f64,
}

impl AudioResolver {
    pub fn new(index: Arc<ContentIndex>, map: Arc<PlaybackMap>) -> Self {
        Self {
            index,
            map,
            tolerance_ms: DEFAULT_OFFSET_TOLERANCE_MS,
        }
    }

    /// Load both maps from a source once and keep them for the session
    pub fn from_source<S: AudioMapSource + ?Sized>(source: &S) -> Result<Self> {
        Ok(Self::new(
            Arc::new(source.content_index()?),
            Arc::new(source.playback_map()?),
        ))
    }

    pub fn with_tolerance(mut self, tolerance_ms: f64) -> Self {
        self.tolerance_ms = tolerance_ms.abs();
        self
    }

    pub fn content_index(&self) -> &ContentIndex {
        &self.index
    }

    pub fn playback_map(&self) -> &PlaybackMap {
        &self.map
    }

    /// Resolve with a raw language code (normalized here)
    pub fn resolve_code(&self, sentence_id: &str, language_code: &str) -> Result<AudioSegment> {
        self.resolve(sentence_id, &Language::new(language_code))
    }

    /// Resolve a sentence to its segment inside a chunk
    ///
    /// # Errors
    /// - `SentenceNotFound` when the content index has no entry
    /// - `ChunkNotFound` when no chunk lists the sentence for this language
    /// - `InconsistentMapping` when the two sources name different files or
    ///   offsets further apart than the tolerance
    pub fn resolve(&self, sentence_id: &str, language: &Language) -> Result<AudioSegment> {
        let entry = self
            .index
            .get(sentence_id, language)
            .ok_or_else(|| PlaybackError::SentenceNotFound {
                sentence_id: sentence_id.to_string(),
                language: language.to_string(),
            })?;

        let hit = self
            .map
            .locate(sentence_id, language)
            .ok_or_else(|| PlaybackError::ChunkNotFound {
                sentence_id: sentence_id.to_string(),
                language: language.to_string(),
            })?;

        if !same_audio_file(&entry.audio_path, &hit.track.audio_path) {
            let err = PlaybackError::inconsistent(
                sentence_id,
                language.as_str(),
                format!(
                    "content index names '{}' but chunk '{}' plays '{}'",
                    entry.audio_path, hit.chunk_id, hit.track.audio_path
                ),
            );
            error!(sentence_id, language = %language, chunk_id = hit.chunk_id, "{}", err);
            return Err(err);
        }

        let offset_drift = (entry.offset_ms - hit.timing.start_ms).abs();
        let duration_drift = (entry.duration_ms - hit.timing.duration_ms).abs();
        if offset_drift > self.tolerance_ms || duration_drift > self.tolerance_ms {
            let err = PlaybackError::inconsistent(
                sentence_id,
                language.as_str(),
                format!(
                    "content index has {}ms+{}ms but chunk '{}' has {}ms+{}ms",
                    entry.offset_ms,
                    entry.duration_ms,
                    hit.chunk_id,
                    hit.timing.start_ms,
                    hit.timing.duration_ms
                ),
            );
            error!(sentence_id, language = %language, chunk_id = hit.chunk_id, "{}", err);
            return Err(err);
        }

        Ok(AudioSegment {
            sentence_id: sentence_id.to_string(),
            language: language.clone(),
            chunk_id: hit.chunk_id.to_string(),
            audio_path: hit.track.audio_path.clone(),
            start_ms: hit.timing.start_ms,
            duration_ms: hit.timing.duration_ms,
            sample_rate_hz: entry.sample_rate_hz,
        })
    }

    /// Whether a sentence has resolvable audio in a language
    pub fn has_audio(&self, sentence_id: &str, language: &Language) -> bool {
        self.index.get(sentence_id, language).is_some()
            && self.map.locate(sentence_id, language).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::index::IndexEntry;
    use crate::audio::playback_map::{ChunkTrack, SentenceTiming};
    use std::collections::BTreeMap;

    fn map_with(audio_path: &str, sentence_id: &str, start_ms: f64, duration_ms: f64) -> PlaybackMap {
        let mut tracks = BTreeMap::new();
        tracks.insert(
            Language::new("es"),
            ChunkTrack {
                audio_path: audio_path.to_string(),
                sentences: vec![SentenceTiming {
                    sentence_id: sentence_id.to_string(),
                    start_ms,
                    duration_ms,
                }],
                paragraphs: vec![],
            },
        );
        let mut chunks = BTreeMap::new();
        chunks.insert("chunk-003".to_string(), tracks);
        PlaybackMap::from_chunks(chunks).unwrap()
    }

    fn index_with(audio_path: &str, sentence_id: &str, offset_ms: f64, duration_ms: f64) -> ContentIndex {
        let mut index = ContentIndex::new();
        index.insert(
            sentence_id,
            Language::new("es"),
            IndexEntry {
                audio_path: audio_path.to_string(),
                offset_ms,
                duration_ms,
                sample_rate_hz: 24_000,
            },
        );
        index
    }

    fn resolver(index: ContentIndex, map: PlaybackMap) -> AudioResolver {
        AudioResolver::new(Arc::new(index), Arc::new(map))
    }

    #[test]
    fn test_resolve_locale_qualified_language() {
        let r = resolver(
            index_with("chunks/A.mp3", "s000007", 1200.0, 800.0),
            map_with("A.mp3", "s000007", 1200.4, 800.0),
        );
        let segment = r.resolve_code("s000007", "es-ES").unwrap();
        assert_eq!(segment.chunk_id, "chunk-003");
        assert_eq!(segment.start_ms, 1200.4);
        assert_eq!(segment.sample_rate_hz, 24_000);
        assert_eq!(segment.language.as_str(), "es");
    }

    #[test]
    fn test_different_audio_file_is_inconsistent() {
        let r = resolver(
            index_with("A", "s000007", 1200.0, 800.0),
            map_with("B", "s000007", 1200.0, 800.0),
        );
        let err = r.resolve_code("s000007", "es-ES").unwrap_err();
        assert!(matches!(err, PlaybackError::InconsistentMapping { .. }));
    }

    #[test]
    fn test_offset_drift_is_inconsistent() {
        let r = resolver(
            index_with("A", "s000007", 1200.0, 800.0),
            map_with("A", "s000007", 1300.0, 800.0),
        );
        assert!(r.resolve_code("s000007", "es").unwrap_err().is_data_integrity());
    }

    #[test]
    fn test_missing_entries() {
        let r = resolver(
            index_with("A", "s000007", 0.0, 800.0),
            map_with("A", "s000008", 0.0, 800.0),
        );
        assert!(matches!(
            r.resolve_code("s000009", "es"),
            Err(PlaybackError::SentenceNotFound { .. })
        ));
        assert!(matches!(
            r.resolve_code("s000007", "es"),
            Err(PlaybackError::ChunkNotFound { .. })
        ));
        assert!(!r.has_audio("s000007", &Language::new("es")));
    }

    #[test]
    fn test_same_audio_file() {
        assert!(same_audio_file("audio/c1_en.mp3", "c1_en.mp3"));
        assert!(same_audio_file("audio\\c1_en.mp3", "other/c1_en.mp3"));
        assert!(!same_audio_file("c1_en.mp3", "c2_en.mp3"));
    }
}
