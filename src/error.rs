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


//! Error types for the playback core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by domain (navigation, resolution, content, storage)
//! so the engine can decide locally whether to clamp, skip, stop or surface.
//!
//! ## Recovery policy
//!
//! - `PositionOutOfRange` is recovered by clamping in skip/seek and is a no-op
//!   everywhere else.
//! - `SentenceNotFound` / `ChunkNotFound` mean "no audio available". They never
//!   advance playback by themselves; the engine stops at that position and
//!   waits for the listener. For stage 2 and 3 they mean the slot is absent
//!   and the stage is skipped.
//! - `InconsistentMapping` is always surfaced. It signals content data that
//!   disagrees with itself and cannot be fixed by the engine.
//! - Running off the end of the book is not an error at all, it is the
//!   `AtEndOfBook` state.

use thiserror::Error;

/// Result type alias using our PlaybackError type
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Main error type for the playback core
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ===== Navigation Errors =====

    /// Requested global position is not inside the chapter
    #[error("Position {position} out of range for chapter with {sentence_count} sentences")]
    PositionOutOfRange {
        position: usize,
        sentence_count: usize,
    },

    /// Subdivision/chapter pair does not exist in the book
    #[error("Chapter {chapter} of subdivision {subdivision} does not exist")]
    ChapterOutOfRange {
        subdivision: usize,
        chapter: usize,
    },

    /// Chapter has no sentences, nothing can be located in it
    #[error("Chapter {0} has no sentences")]
    EmptyChapter(usize),

    // ===== Audio Resolution Errors =====

    /// Content index has no entry for this sentence in this language
    #[error("No audio indexed for sentence '{sentence_id}' in language '{language}'")]
    SentenceNotFound {
        sentence_id: String,
        language: String,
    },

    /// No chunk in the playback map contains this sentence for this language
    #[error("No chunk contains sentence '{sentence_id}' for language '{language}'")]
    ChunkNotFound {
        sentence_id: String,
        language: String,
    },

    /// Content index and playback map disagree about where a sentence lives
    #[error("Inconsistent audio mapping for sentence '{sentence_id}' ({language}): {detail}")]
    InconsistentMapping {
        sentence_id: String,
        language: String,
        /// Human readable description of the disagreement
        detail: String,
    },

    // ===== Content Errors =====

    /// Content data is malformed (unknown paragraph, duplicate ids, ...)
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// Required field is missing from content or configuration
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    // ===== Engine/State Errors =====

    /// Operation is not valid in the current engine state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Engine task has stopped and no longer accepts commands
    #[error("Playback engine is closed")]
    EngineClosed,

    /// Audio output backend failure
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    // ===== Database Errors =====

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    // ===== External Library Errors =====

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// Helper methods for creating common errors
impl PlaybackError {
    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        PlaybackError::InvalidInput(message.into())
    }

    /// Create an InvalidContent error with a message
    pub fn invalid_content<S: Into<String>>(message: S) -> Self {
        PlaybackError::InvalidContent(message.into())
    }

    /// Create an InconsistentMapping error
    pub fn inconsistent<S, L, D>(sentence_id: S, language: L, detail: D) -> Self
    where
        S: Into<String>,
        L: Into<String>,
        D: Into<String>,
    {
        PlaybackError::InconsistentMapping {
            sentence_id: sentence_id.into(),
            language: language.into(),
            detail: detail.into(),
        }
    }

    /// Check if the error means "there is no audio for this sentence/language"
    ///
    /// These are reported to the listener and stop playback at the current
    /// position, or mark a secondary language stage as absent.
    pub fn is_audio_unavailable(&self) -> bool {
        matches!(
            self,
            PlaybackError::SentenceNotFound { .. } | PlaybackError::ChunkNotFound { .. }
        )
    }

    /// Check if the error can be handled locally by clamping, skipping or stopping
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlaybackError::PositionOutOfRange { .. }
                | PlaybackError::ChapterOutOfRange { .. }
                | PlaybackError::EmptyChapter(_)
                | PlaybackError::SentenceNotFound { .. }
                | PlaybackError::ChunkNotFound { .. }
                | PlaybackError::InvalidInput(_)
        )
    }

    /// Check if the error signals corrupted or mismatched content data
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            PlaybackError::InconsistentMapping { .. } | PlaybackError::InvalidContent(_)
        )
    }

    /// Check if error is related to progress persistence
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::MigrationFailed(_) | PlaybackError::SqlxError(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::SentenceNotFound { language, .. }
            | PlaybackError::ChunkNotFound { language, .. } => {
                format!("No audio is available for this sentence in '{}'.", language)
            }
            PlaybackError::InconsistentMapping { .. } => {
                "The audio for this book does not match its text. Please re-download the book.".to_string()
            }
            PlaybackError::InvalidContent(_) => {
                "This book's content is damaged. Please re-download the book.".to_string()
            }
            PlaybackError::EngineClosed => "Playback has been shut down.".to_string(),
            PlaybackError::ChapterOutOfRange { .. } => "That chapter does not exist.".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_unavailable_is_recoverable() {
        let err = PlaybackError::SentenceNotFound {
            sentence_id: "s000001".to_string(),
            language: "es".to_string(),
        };
        assert!(err.is_audio_unavailable());
        assert!(err.is_recoverable());
        assert!(!err.is_data_integrity());
    }

    #[test]
    fn test_inconsistent_mapping_is_hard_failure() {
        let err = PlaybackError::inconsistent("s000007", "es", "audio path differs");
        assert!(err.is_data_integrity());
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("s000007"));
        assert!(err.user_message().contains("re-download"));
    }

    #[test]
    fn test_sqlx_error_is_storage_error() {
        let err: PlaybackError = sqlx::Error::RowNotFound.into();
        assert!(err.is_storage_error());
    }
}
