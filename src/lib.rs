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


//! Polyglot playback core
//!
//! Plays a book sentence by sentence in up to three languages, with audio
//! for each sentence cut out of larger per-language chunk files.
//!
//! ## Layers
//! - `content` - book outline, sentences, paragraphs, translations
//! - `navigation` - position ↔ (paragraph, sentence) arithmetic
//! - `audio` - content index, playback map, resolver, output backends
//! - `playback` - state machine and the engine task around it
//! - `progress` / `storage` - resume state in SQLite
//! - `config` - languages, speeds, fade, database location

pub mod audio;
pub mod config;
pub mod content;
pub mod error;
pub mod navigation;
pub mod playback;
pub mod progress;
pub mod storage;

pub use config::EngineConfig;
pub use error::{PlaybackError, Result};
pub use playback::{EngineHandle, PlaybackEngine, PlaybackNotification, UserCommand};
