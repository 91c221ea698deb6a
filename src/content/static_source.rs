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


//! In-memory content provider
//!
//! Holds a whole book in memory. It can be loaded from a JSON bundle
//! document or assembled with [`BookBuilder`].
//!
//! # Bundle format
//! ```json
//! {
//!   "book": { "book_id": "b1", "title": "...", "subdivisions": [ ... ] },
//!   "primary_language": "en",
//!   "chapters": [ { "content_index": 0, "paragraphs": [ ... ], "sentences": [ ... ] } ],
//!   "translations": { "s000000": { "es": "..." } }
//! }
//! ```

use crate::content::language::Language;
use crate::content::models::{
    BookStructure, ChapterRef, Paragraph, ParagraphType, Sentence, Subdivision,
};
use crate::content::provider::ContentProvider;
use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Raw paragraphs and sentences of one chapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterContent {
    pub content_index: usize,
    pub paragraphs: Vec<Paragraph>,
    pub sentences: Vec<Sentence>,
}

/// Serialized form of a whole book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBundle {
    pub book: BookStructure,
    pub primary_language: Language,
    pub chapters: Vec<ChapterContent>,
    /// sentence id -> language -> text
    #[serde(default)]
    pub translations: HashMap<String, HashMap<Language, String>>,
}

/// Content provider backed by in-memory maps
#[derive(Debug, Clone)]
pub struct StaticContentProvider {
    book: BookStructure,
    primary_language: Language,
    chapters: HashMap<usize, ChapterContent>,
    translations: HashMap<String, HashMap<Language, String>>,
}

impl StaticContentProvider {
    /// Build a provider from a bundle, checking that every chapter in the
    /// outline has content
    pub fn from_bundle(bundle: ContentBundle) -> Result<Self> {
        bundle.book.validate()?;

        let mut chapters = HashMap::with_capacity(bundle.chapters.len());
        for chapter in bundle.chapters {
            if let Some(stray) = chapter
                .sentences
                .iter()
                .find(|s| s.chapter_index != chapter.content_index)
            {
                return Err(PlaybackError::invalid_content(format!(
                    "Sentence '{}' declares chapter {} but is stored under chapter {}",
                    stray.id, stray.chapter_index, chapter.content_index
                )));
            }
            let index = chapter.content_index;
            if chapters.insert(index, chapter).is_some() {
                return Err(PlaybackError::invalid_content(format!(
                    "Chapter content index {} appears twice",
                    index
                )));
            }
        }

        for address in bundle.book.chapter_addresses() {
            let chapter_ref = bundle
                .book
                .chapter(address)
                .ok_or_else(|| PlaybackError::invalid_content("Outline changed during validation"))?;
            if !chapters.contains_key(&chapter_ref.content_index) {
                return Err(PlaybackError::invalid_content(format!(
                    "Chapter '{}' references missing content index {}",
                    chapter_ref.id, chapter_ref.content_index
                )));
            }
        }

        Ok(Self {
            book: bundle.book,
            primary_language: bundle.primary_language,
            chapters,
            translations: bundle.translations,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let bundle: ContentBundle = serde_json::from_str(json)?;
        Self::from_bundle(bundle)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Languages that have at least one translation, plus the primary one
    pub fn available_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self
            .translations
            .values()
            .flat_map(|by_lang| by_lang.keys().cloned())
            .collect();
        languages.push(self.primary_language.clone());
        languages.sort();
        languages.dedup();
        languages
    }

    fn chapter_content(&self, chapter_index: usize) -> Result<&ChapterContent> {
        self.chapters.get(&chapter_index).ok_or_else(|| {
            PlaybackError::invalid_input(format!("Unknown chapter content index {}", chapter_index))
        })
    }
}

impl ContentProvider for StaticContentProvider {
    fn book_structure(&self) -> &BookStructure {
        &self.book
    }

    fn primary_language(&self) -> &Language {
        &self.primary_language
    }

    fn sentences_for_chapter(&self, chapter_index: usize) -> Result<Vec<Sentence>> {
        Ok(self.chapter_content(chapter_index)?.sentences.clone())
    }

    fn paragraphs_for_chapter(&self, chapter_index: usize) -> Result<Vec<Paragraph>> {
        Ok(self.chapter_content(chapter_index)?.paragraphs.clone())
    }

    fn translation(&self, sentence_id: &str, language: &Language) -> Option<String> {
        self.translations
            .get(sentence_id)
            .and_then(|by_lang| by_lang.get(language))
            .cloned()
    }
}

/// Programmatic book assembly
///
/// Sentence ids are numbered across the whole book (`s000000`, `s000001`,
/// ...), paragraph ids likewise (`p0000`, ...). Every sentence gets a
/// generated translation for each language passed to [`BookBuilder::translations`].
#[derive(Debug)]
pub struct BookBuilder {
    book_id: String,
    title: String,
    primary_language: Language,
    translation_languages: Vec<Language>,
    subdivisions: Vec<(String, Vec<(String, Vec<usize>)>)>,
}

impl BookBuilder {
    pub fn new<S: Into<String>>(book_id: S, primary_language: &str) -> Self {
        Self {
            book_id: book_id.into(),
            title: String::new(),
            primary_language: Language::new(primary_language),
            translation_languages: Vec::new(),
            subdivisions: Vec::new(),
        }
    }

    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = title.into();
        self
    }

    /// Start a new subdivision; following chapters go into it
    pub fn subdivision<S: Into<String>>(mut self, title: S) -> Self {
        self.subdivisions.push((title.into(), Vec::new()));
        self
    }

    /// Add a chapter with the given paragraph sizes (sentences per paragraph)
    pub fn chapter<S: Into<String>>(mut self, title: S, paragraph_sizes: &[usize]) -> Self {
        if self.subdivisions.is_empty() {
            self.subdivisions.push((String::new(), Vec::new()));
        }
        if let Some((_, chapters)) = self.subdivisions.last_mut() {
            chapters.push((title.into(), paragraph_sizes.to_vec()));
        }
        self
    }

    pub fn translations(mut self, languages: &[&str]) -> Self {
        self.translation_languages = languages.iter().map(|l| Language::new(l)).collect();
        self
    }

    pub fn build_bundle(self) -> ContentBundle {
        let mut subdivisions = Vec::new();
        let mut chapters = Vec::new();
        let mut translations: HashMap<String, HashMap<Language, String>> = HashMap::new();
        let mut content_index = 0usize;
        let mut sentence_counter = 0usize;
        let mut paragraph_counter = 0usize;

        for (sub_idx, (sub_title, chapter_specs)) in self.subdivisions.into_iter().enumerate() {
            let mut refs = Vec::new();
            for (ch_idx, (title, sizes)) in chapter_specs.into_iter().enumerate() {
                let mut paragraphs = Vec::new();
                let mut sentences = Vec::new();
                let mut position = 0usize;

                for (p_idx, size) in sizes.into_iter().enumerate() {
                    let paragraph_id = format!("p{:04}", paragraph_counter);
                    paragraph_counter += 1;
                    let mut sentence_ids = Vec::with_capacity(size);

                    for s_idx in 0..size {
                        let id = format!("s{:06}", sentence_counter);
                        let text = format!("Sentence {} of paragraph {}.", s_idx + 1, paragraph_id);
                        for lang in &self.translation_languages {
                            translations
                                .entry(id.clone())
                                .or_default()
                                .insert(lang.clone(), format!("[{}] {}", lang, text));
                        }
                        sentences.push(Sentence {
                            id: id.clone(),
                            paragraph_id: paragraph_id.clone(),
                            index_in_paragraph: s_idx as u32,
                            chapter_index: content_index,
                            text,
                            global_position: Some(position),
                        });
                        sentence_ids.push(id);
                        sentence_counter += 1;
                        position += 1;
                    }

                    paragraphs.push(Paragraph {
                        id: paragraph_id,
                        index_in_chapter: p_idx as u32,
                        chapter_index: content_index,
                        paragraph_type: ParagraphType::Text,
                        sentence_ids,
                    });
                }

                refs.push(ChapterRef {
                    id: format!("ch-{}", content_index),
                    number: (ch_idx + 1) as u32,
                    title,
                    content_index,
                });
                chapters.push(ChapterContent {
                    content_index,
                    paragraphs,
                    sentences,
                });
                content_index += 1;
            }
            subdivisions.push(Subdivision {
                id: format!("sub-{}", sub_idx),
                number: (sub_idx + 1) as u32,
                title: sub_title,
                chapters: refs,
            });
        }

        ContentBundle {
            book: BookStructure {
                book_id: self.book_id,
                title: self.title,
                subdivisions,
            },
            primary_language: self.primary_language,
            chapters,
            translations,
        }
    }

    pub fn build(self) -> Result<StaticContentProvider> {
        StaticContentProvider::from_bundle(self.build_bundle())
    }
}
