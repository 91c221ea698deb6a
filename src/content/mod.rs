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


//! Book content: records, languages and the provider capability
//!
//! ## models
//! - `Sentence`, `Paragraph` - immutable content records
//! - `BookStructure`, `Subdivision`, `ChapterRef` - book outline
//! - `ChapterAddress` - subdivision/chapter coordinates
//!
//! ## language
//! - `Language` - normalized language code
//! - `Stage`, `LanguageSlots` - the up-to-three language cycle
//!
//! ## provider / static_source
//! - `ContentProvider` - capability the state machine is written against
//! - `StaticContentProvider`, `BookBuilder` - in-memory implementation

pub mod language;
pub mod models;
pub mod provider;
pub mod static_source;

// Re-export commonly used types for convenience
pub use language::{normalize_language_code, Language, LanguageSlots, Stage};
pub use models::{
    BookStructure, ChapterAddress, ChapterRef, Paragraph, ParagraphType, Sentence, Subdivision,
};
pub use provider::ContentProvider;
pub use static_source::{BookBuilder, ChapterContent, ContentBundle, StaticContentProvider};
