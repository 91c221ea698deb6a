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


//! Content records and book structure
//!
//! Sentences and paragraphs are immutable content records. The engine only
//! reads them by id or by position; ordering is derived from the declared
//! index fields (see `navigation::ChapterLayout`), never from array order.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};

/// A single sentence in the primary language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    /// Stable sentence identifier (e.g. "s000007")
    pub id: String,

    /// Owning paragraph
    pub paragraph_id: String,

    /// Authoritative order inside the paragraph
    pub index_in_paragraph: u32,

    /// Provider-level chapter index this sentence belongs to
    pub chapter_index: usize,

    /// Primary-language text
    pub text: String,

    /// Position as declared by the content feed
    ///
    /// Informational only. The layout recomputes positions from the index
    /// fields and logs when the feed disagrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_position: Option<usize>,
}

/// Presentation tag for paragraphs; never used for navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParagraphType {
    #[default]
    Text,
    Heading,
    Quote,
    Dialogue,
    Other,
}

/// A paragraph, referencing its sentences by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: String,

    /// Authoritative order inside the chapter
    pub index_in_chapter: u32,

    pub chapter_index: usize,

    #[serde(default)]
    pub paragraph_type: ParagraphType,

    /// Sentence ids as listed by the feed (order not trusted)
    #[serde(default)]
    pub sentence_ids: Vec<String>,
}

/// Chapter entry in the book outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub id: String,
    pub number: u32,
    pub title: String,

    /// Key used with `ContentProvider::sentences_for_chapter`
    pub content_index: usize,
}

/// Book subsection holding an ordered list of chapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subdivision {
    pub id: String,
    pub number: u32,
    #[serde(default)]
    pub title: String,
    pub chapters: Vec<ChapterRef>,
}

/// Subdivision/chapter coordinates inside a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChapterAddress {
    pub subdivision: usize,
    pub chapter: usize,
}

impl ChapterAddress {
    pub fn new(subdivision: usize, chapter: usize) -> Self {
        Self {
            subdivision,
            chapter,
        }
    }
}

/// Book outline: Book 1-* Subdivision 1-* Chapter
///
/// A flat book uses exactly one subdivision holding all chapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookStructure {
    pub book_id: String,
    #[serde(default)]
    pub title: String,
    pub subdivisions: Vec<Subdivision>,
}

impl BookStructure {
    /// Wrap a flat chapter list in a single subdivision
    pub fn flat(book_id: String, title: String, chapters: Vec<ChapterRef>) -> Self {
        Self {
            book_id,
            title,
            subdivisions: vec![Subdivision {
                id: "main".to_string(),
                number: 1,
                title: String::new(),
                chapters,
            }],
        }
    }

    /// Check the outline invariants
    pub fn validate(&self) -> Result<()> {
        if self.book_id.trim().is_empty() {
            return Err(PlaybackError::MissingRequiredField("book_id".to_string()));
        }
        if self.subdivisions.is_empty() {
            return Err(PlaybackError::invalid_content(format!(
                "Book '{}' has no subdivisions",
                self.book_id
            )));
        }
        if self.subdivisions.iter().all(|s| s.chapters.is_empty()) {
            return Err(PlaybackError::invalid_content(format!(
                "Book '{}' has no chapters",
                self.book_id
            )));
        }
        Ok(())
    }

    pub fn subdivision_count(&self) -> usize {
        self.subdivisions.len()
    }

    pub fn chapter_count(&self, subdivision: usize) -> usize {
        self.subdivisions
            .get(subdivision)
            .map(|s| s.chapters.len())
            .unwrap_or(0)
    }

    pub fn chapter(&self, address: ChapterAddress) -> Option<&ChapterRef> {
        self.subdivisions
            .get(address.subdivision)
            .and_then(|s| s.chapters.get(address.chapter))
    }

    pub fn contains(&self, address: ChapterAddress) -> bool {
        self.chapter(address).is_some()
    }

    /// First chapter of the book (skips leading empty subdivisions)
    pub fn first_chapter(&self) -> Option<ChapterAddress> {
        self.subdivisions
            .iter()
            .position(|s| !s.chapters.is_empty())
            .map(|subdivision| ChapterAddress::new(subdivision, 0))
    }

    /// Chapter following `address`: next chapter in the subdivision, else
    /// first chapter of the next non-empty subdivision
    pub fn next_chapter(&self, address: ChapterAddress) -> Option<ChapterAddress> {
        if address.chapter + 1 < self.chapter_count(address.subdivision) {
            return Some(ChapterAddress::new(address.subdivision, address.chapter + 1));
        }
        (address.subdivision + 1..self.subdivisions.len())
            .find(|&s| !self.subdivisions[s].chapters.is_empty())
            .map(|subdivision| ChapterAddress::new(subdivision, 0))
    }

    /// Whether `address` is the last chapter of the last subdivision
    pub fn is_last_chapter(&self, address: ChapterAddress) -> bool {
        self.contains(address) && self.next_chapter(address).is_none()
    }

    /// All chapter addresses in reading order
    pub fn chapter_addresses(&self) -> Vec<ChapterAddress> {
        self.subdivisions
            .iter()
            .enumerate()
            .flat_map(|(s, sub)| (0..sub.chapters.len()).map(move |c| ChapterAddress::new(s, c)))
            .collect()
    }
}
