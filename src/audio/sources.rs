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


//! Sources for the content index and playback map
//!
//! Where the maps live on disk is not the core's concern. A source only has
//! to hand over fully materialized maps; the resolver loads them once per
//! book and keeps them.

use crate::audio::index::{ContentIndex, IndexEntry};
use crate::audio::playback_map::{ChunkTrack, ParagraphTiming, PlaybackMap, SentenceTiming};
use crate::content::{ContentProvider, Language, Sentence};
use crate::error::Result;
use crate::navigation::ChapterLayout;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Provides the two audio maps of a book
pub trait AudioMapSource {
    fn content_index(&self) -> Result<ContentIndex>;
    fn playback_map(&self) -> Result<PlaybackMap>;
}

/// Maps stored as two JSON documents
#[derive(Debug, Clone)]
pub struct JsonAudioMapSource {
    index_path: PathBuf,
    map_path: PathBuf,
}

impl JsonAudioMapSource {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(index_path: P, map_path: Q) -> Self {
        Self {
            index_path: index_path.into(),
            map_path: map_path.into(),
        }
    }
}

impl AudioMapSource for JsonAudioMapSource {
    fn content_index(&self) -> Result<ContentIndex> {
        let index = ContentIndex::from_json_file(&self.index_path)?;
        info!(path = %self.index_path.display(), sentences = index.len(), "Loaded content index");
        Ok(index)
    }

    fn playback_map(&self) -> Result<PlaybackMap> {
        let map = PlaybackMap::from_json_file(&self.map_path)?;
        info!(path = %self.map_path.display(), chunks = map.chunk_count(), "Loaded playback map");
        Ok(map)
    }
}

/// Maps already held in memory
#[derive(Debug, Clone)]
pub struct InMemoryAudioMaps {
    pub index: ContentIndex,
    pub map: PlaybackMap,
}

impl InMemoryAudioMaps {
    /// Synthesize maps where every sentence lasts `sentence_ms`
    ///
    /// One chunk per chapter and language, sentences laid out back to back
    /// in reading order. Used for dry runs over text-only bundles.
    pub fn uniform<P: ContentProvider + ?Sized>(
        content: &P,
        languages: &[Language],
        sentence_ms: f64,
    ) -> Result<Self> {
        Self::uniform_with(content, languages, sentence_ms, |_, _| true)
    }

    /// Like [`InMemoryAudioMaps::uniform`], leaving out every
    /// (sentence, language) pair rejected by `include`
    pub fn uniform_with<P, F>(
        content: &P,
        languages: &[Language],
        sentence_ms: f64,
        include: F,
    ) -> Result<Self>
    where
        P: ContentProvider + ?Sized,
        F: Fn(&Sentence, &Language) -> bool,
    {
        let book = content.book_structure();
        let mut index = ContentIndex::new();
        let mut chunks = BTreeMap::new();

        for address in book.chapter_addresses() {
            let Some(chapter) = book.chapter(address) else {
                continue;
            };
            let layout = ChapterLayout::build(
                chapter.content_index,
                content.paragraphs_for_chapter(chapter.content_index)?,
                content.sentences_for_chapter(chapter.content_index)?,
            )?;
            let chunk_id = format!("chunk-{:03}", chapter.content_index);
            let mut tracks = BTreeMap::new();

            for language in languages {
                let audio_path = format!("{}_{}.mp3", chunk_id, language);
                let mut cursor_ms = 0.0;
                let mut track = ChunkTrack {
                    audio_path: audio_path.clone(),
                    sentences: Vec::new(),
                    paragraphs: Vec::new(),
                };
                for span in layout.paragraphs() {
                    let mut paragraph = ParagraphTiming {
                        paragraph_id: span.paragraph_id.clone(),
                        sentences: Vec::new(),
                    };
                    for sentence in &layout.sentences()[span.start..span.end()] {
                        if !include(sentence, language) {
                            continue;
                        }
                        let timing = SentenceTiming {
                            sentence_id: sentence.id.clone(),
                            start_ms: cursor_ms,
                            duration_ms: sentence_ms,
                        };
                        index.insert(
                            sentence.id.clone(),
                            language.clone(),
                            IndexEntry {
                                audio_path: audio_path.clone(),
                                offset_ms: cursor_ms,
                                duration_ms: sentence_ms,
                                sample_rate_hz: 44_100,
                            },
                        );
                        cursor_ms += sentence_ms;
                        paragraph.sentences.push(timing.clone());
                        track.sentences.push(timing);
                    }
                    if !paragraph.sentences.is_empty() {
                        track.paragraphs.push(paragraph);
                    }
                }
                if !track.sentences.is_empty() {
                    tracks.insert(language.clone(), track);
                }
            }
            chunks.insert(chunk_id, tracks);
        }

        Ok(Self {
            index,
            map: PlaybackMap::from_chunks(chunks)?,
        })
    }
}

impl AudioMapSource for InMemoryAudioMaps {
    fn content_index(&self) -> Result<ContentIndex> {
        Ok(self.index.clone())
    }

    fn playback_map(&self) -> Result<PlaybackMap> {
        Ok(self.map.clone())
    }
}
