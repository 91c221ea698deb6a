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


//! Audio mapping, resolution and output
//!
//! Sentence audio lives inside larger "chunk" files, one per language. Two
//! independently produced maps describe where: the content index (per
//! sentence) and the playback map (per chunk). The resolver composes them.
//!
//! # Module Organization
//!
//! ## index
//! - `ContentIndex` - sentence id → language → file, offset, duration
//! - `IndexEntry` - one sentence's audio metadata
//!
//! ## playback_map
//! - `PlaybackMap` - chunk id → language → ordered sentence timings
//! - `ChunkTrack`, `SentenceTiming`, `ParagraphTiming`
//!
//! ## resolver
//! - `AudioResolver` - (sentence, language) → `AudioSegment`
//!
//! ## sources
//! - `AudioMapSource` - where the two maps come from
//! - `JsonAudioMapSource` - JSON documents on disk
//!
//! ## output
//! - `AudioOutput` - load / play range / set rate / stop with fade
//! - `SimulatedOutput` - timer-driven output for the CLI and tests

pub mod index;
pub mod output;
pub mod playback_map;
pub mod resolver;
pub mod sources;

// Re-export commonly used types for convenience
pub use index::{ContentIndex, IndexEntry};
pub use output::{AudioHandle, AudioOutput, FinishCallback, OutputEvent, OutputLog, SimulatedOutput};
pub use playback_map::{ChunkHit, ChunkTrack, ParagraphTiming, PlaybackMap, SentenceTiming};
pub use resolver::{same_audio_file, AudioResolver, AudioSegment, DEFAULT_OFFSET_TOLERANCE_MS};
pub use sources::{AudioMapSource, InMemoryAudioMaps, JsonAudioMapSource};
