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


//! Navigation engine
//!
//! Maps a chapter-scoped global position onto paragraph coordinates and
//! computes paragraph boundaries. Everything here is a pure function of a
//! [`ChapterLayout`]; there is no mutable state.
//!
//! "Global position" is zero-based, dense and scoped to one chapter. It
//! resets to 0 at every chapter.

use crate::content::models::{BookStructure, ChapterAddress, Paragraph, ParagraphType, Sentence};
use crate::error::{PlaybackError, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Paragraph coordinates of a sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Index of the paragraph within the chapter
    pub paragraph_index: usize,
    /// Index of the sentence within its paragraph
    pub local_index: usize,
}

/// Contiguous run of positions belonging to one paragraph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphSpan {
    pub paragraph_id: String,
    pub paragraph_type: ParagraphType,
    /// Global position of the first sentence
    pub start: usize,
    /// Number of sentences
    pub len: usize,
}

impl ParagraphSpan {
    /// Global position one past the last sentence
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn last(&self) -> usize {
        self.end() - 1
    }
}

/// Ordered sentence sequence of one chapter with its paragraph boundaries
///
/// Built from raw feed data. Paragraphs are ordered by `index_in_chapter`,
/// sentences by `index_in_paragraph`; array order of the feed is ignored.
#[derive(Debug, Clone)]
pub struct ChapterLayout {
    chapter_index: usize,
    sentences: Vec<Sentence>,
    paragraphs: Vec<ParagraphSpan>,
    /// position -> paragraph index
    owner: Vec<usize>,
}

impl ChapterLayout {
    pub fn build(
        chapter_index: usize,
        mut paragraphs: Vec<Paragraph>,
        sentences: Vec<Sentence>,
    ) -> Result<Self> {
        paragraphs.sort_by_key(|p| p.index_in_chapter);

        let mut seen_paragraphs = HashSet::with_capacity(paragraphs.len());
        for paragraph in &paragraphs {
            if !seen_paragraphs.insert(paragraph.id.as_str()) {
                return Err(PlaybackError::invalid_content(format!(
                    "Paragraph '{}' appears twice in chapter {}",
                    paragraph.id, chapter_index
                )));
            }
        }

        let mut by_paragraph: HashMap<&str, Vec<Sentence>> = HashMap::new();
        let mut seen_sentences = HashSet::with_capacity(sentences.len());
        for sentence in sentences {
            if !seen_sentences.insert(sentence.id.clone()) {
                return Err(PlaybackError::invalid_content(format!(
                    "Sentence '{}' appears twice in chapter {}",
                    sentence.id, chapter_index
                )));
            }
            let Some(owner) = paragraphs.iter().find(|p| p.id == sentence.paragraph_id) else {
                return Err(PlaybackError::invalid_content(format!(
                    "Sentence '{}' references unknown paragraph '{}'",
                    sentence.id, sentence.paragraph_id
                )));
            };
            by_paragraph.entry(owner.id.as_str()).or_default().push(sentence);
        }

        let mut ordered = Vec::with_capacity(seen_sentences.len());
        let mut spans = Vec::with_capacity(paragraphs.len());
        let mut owner = Vec::with_capacity(seen_sentences.len());

        for paragraph in &paragraphs {
            let Some(mut members) = by_paragraph.remove(paragraph.id.as_str()) else {
                // Empty paragraphs carry no positions
                continue;
            };
            members.sort_by_key(|s| s.index_in_paragraph);

            let span = ParagraphSpan {
                paragraph_id: paragraph.id.clone(),
                paragraph_type: paragraph.paragraph_type,
                start: ordered.len(),
                len: members.len(),
            };
            for sentence in members {
                if let Some(declared) = sentence.global_position {
                    if declared != ordered.len() {
                        debug!(
                            sentence_id = %sentence.id,
                            declared,
                            derived = ordered.len(),
                            "Feed position disagrees with index fields, using derived order"
                        );
                    }
                }
                owner.push(spans.len());
                ordered.push(sentence);
            }
            spans.push(span);
        }

        Ok(Self {
            chapter_index,
            sentences: ordered,
            paragraphs: spans,
            owner,
        })
    }

    pub fn chapter_index(&self) -> usize {
        self.chapter_index
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn paragraphs(&self) -> &[ParagraphSpan] {
        &self.paragraphs
    }

    pub fn sentence_at(&self, position: usize) -> Result<&Sentence> {
        self.sentences.get(position).ok_or(PlaybackError::PositionOutOfRange {
            position,
            sentence_count: self.sentences.len(),
        })
    }

    /// Clamp any position into `[0, sentence_count - 1]`
    pub fn clamp(&self, position: i64) -> Option<usize> {
        if self.sentences.is_empty() {
            return None;
        }
        let last = (self.sentences.len() - 1) as i64;
        Some(position.clamp(0, last) as usize)
    }

    fn span_for(&self, position: usize) -> Result<&ParagraphSpan> {
        let index = *self.owner.get(position).ok_or(PlaybackError::PositionOutOfRange {
            position,
            sentence_count: self.sentences.len(),
        })?;
        Ok(&self.paragraphs[index])
    }
}

/// Paragraph coordinates of `position`
pub fn locate(position: usize, chapter: &ChapterLayout) -> Result<Location> {
    let span = chapter.span_for(position)?;
    Ok(Location {
        paragraph_index: chapter.owner[position],
        local_index: position - span.start,
    })
}

/// Inverse of [`locate`]
pub fn position_of(location: Location, chapter: &ChapterLayout) -> Result<usize> {
    let span = chapter.paragraphs.get(location.paragraph_index).ok_or_else(|| {
        PlaybackError::invalid_input(format!(
            "Paragraph {} does not exist in chapter {}",
            location.paragraph_index, chapter.chapter_index
        ))
    })?;
    if location.local_index >= span.len {
        return Err(PlaybackError::invalid_input(format!(
            "Paragraph {} has only {} sentences",
            location.paragraph_index, span.len
        )));
    }
    Ok(span.start + location.local_index)
}

/// Position of the first sentence in the paragraph containing `position`
pub fn paragraph_start(position: usize, chapter: &ChapterLayout) -> Result<usize> {
    Ok(chapter.span_for(position)?.start)
}

/// Whether `position` is the final sentence of its paragraph
pub fn is_paragraph_end(position: usize, chapter: &ChapterLayout) -> Result<bool> {
    Ok(chapter.span_for(position)?.last() == position)
}

/// Start of the following paragraph, `None` in the chapter's last paragraph
pub fn next_paragraph_start(position: usize, chapter: &ChapterLayout) -> Result<Option<usize>> {
    let index = chapter.owner.get(position).copied().ok_or(PlaybackError::PositionOutOfRange {
        position,
        sentence_count: chapter.sentence_count(),
    })?;
    Ok(chapter.paragraphs.get(index + 1).map(|span| span.start))
}

/// Start of the preceding paragraph, `None` in the chapter's first paragraph
pub fn previous_paragraph_start(
    position: usize,
    chapter: &ChapterLayout,
) -> Result<Option<usize>> {
    let index = chapter.owner.get(position).copied().ok_or(PlaybackError::PositionOutOfRange {
        position,
        sentence_count: chapter.sentence_count(),
    })?;
    Ok(index
        .checked_sub(1)
        .and_then(|prev| chapter.paragraphs.get(prev))
        .map(|span| span.start))
}

/// True only for the last sentence of the last paragraph of the last
/// chapter of the last subdivision
pub fn is_last_sentence_of_book(
    position: usize,
    chapter: &ChapterLayout,
    subdivision_index: usize,
    chapter_index: usize,
    book: &BookStructure,
) -> bool {
    !chapter.is_empty()
        && position + 1 == chapter.sentence_count()
        && book.is_last_chapter(ChapterAddress::new(subdivision_index, chapter_index))
}
