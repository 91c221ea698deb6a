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


//! Content provider capability
//!
//! The playback state machine is written once against this trait. Whether
//! chapters come from a legacy per-language feed or from chunk-based
//! universal content is the provider's business.

use crate::content::language::Language;
use crate::content::models::{BookStructure, Paragraph, Sentence};
use crate::error::Result;

/// Resolves book structure, chapter text and translations
///
/// Implementations hold already-materialized content; calls are expected
/// to be cheap and synchronous.
pub trait ContentProvider: Send + Sync {
    /// Book outline (subdivisions and chapters)
    fn book_structure(&self) -> &BookStructure;

    /// Primary language of the sentence records
    fn primary_language(&self) -> &Language;

    /// Sentences of a chapter, in whatever order the feed delivers them
    fn sentences_for_chapter(&self, chapter_index: usize) -> Result<Vec<Sentence>>;

    /// Paragraphs of a chapter, in whatever order the feed delivers them
    fn paragraphs_for_chapter(&self, chapter_index: usize) -> Result<Vec<Paragraph>>;

    /// Translated text for a sentence
    fn translation(&self, sentence_id: &str, language: &Language) -> Option<String>;

    /// Display text of a sentence in `language`
    fn sentence_text(&self, sentence: &Sentence, language: &Language) -> Option<String> {
        if language == self.primary_language() {
            Some(sentence.text.clone())
        } else {
            self.translation(&sentence.id, language)
        }
    }
}
