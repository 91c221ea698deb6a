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


//! Events in, actions out
//!
//! The state machine consumes [`PlaybackEvent`]s one at a time and answers
//! each with a [`Transition`]: the actions the engine must carry out and
//! the origin of the change. Observers read the origin off the transition
//! itself; nothing is inferred from timing.

use crate::audio::resolver::AudioSegment;
use crate::content::language::{Language, Stage};
use crate::content::models::ChapterAddress;
use crate::playback::cursor::PlaybackMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally visible playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing(Stage),
    Paused,
    AtEndOfBook,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => f.write_str("idle"),
            PlaybackState::Playing(stage) => write!(f, "playing (stage {})", stage),
            PlaybackState::Paused => f.write_str("paused"),
            PlaybackState::AtEndOfBook => f.write_str("end of book"),
        }
    }
}

/// Who caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOrigin {
    /// Direct listener command
    UserInitiated,
    /// Engine moving on by itself after a segment finished
    InternalAdvance,
}

/// Identifies one resolved segment
///
/// A `SegmentFinished` carrying anything other than the in-flight ticket
/// is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentTicket(pub u64);

impl fmt::Display for SegmentTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Listener commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UserCommand {
    Play,
    Pause,
    /// Halt and rewind the language cycle to stage 1
    Stop,
    /// Move by whole sentences, clamped to the chapter
    Skip { sentences: i64 },
    /// Move by whole paragraphs, clamped to the chapter
    SkipParagraph { paragraphs: i64 },
    /// Jump to a fraction (0..=1) of the chapter
    Seek { fraction: f64 },
    SelectChapter { chapter: ChapterAddress },
    SelectLanguageSlot { stage: Stage, language: Option<Language> },
    SetMode { mode: PlaybackMode },
    SetSpeed { language: Language, speed: f32 },
    /// Restart the current segment
    Replay,
}

impl UserCommand {
    pub fn skip(sentences: i64) -> Self {
        UserCommand::Skip { sentences }
    }

    pub fn seek(fraction: f64) -> Self {
        UserCommand::Seek { fraction }
    }

    pub fn select_chapter(subdivision: usize, chapter: usize) -> Self {
        UserCommand::SelectChapter {
            chapter: ChapterAddress::new(subdivision, chapter),
        }
    }
}

/// Everything the state machine reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    User(UserCommand),
    /// Audio output reached the end of a segment
    SegmentFinished(SegmentTicket),
}

impl From<UserCommand> for PlaybackEvent {
    fn from(command: UserCommand) -> Self {
        PlaybackEvent::User(command)
    }
}

/// Work for the engine resulting from one transition
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackAction {
    /// Play a resolved segment (replaces whatever is playing)
    PlaySegment {
        ticket: SegmentTicket,
        segment: AudioSegment,
        rate: f32,
    },
    /// Halt audio output; nothing is in flight any more
    StopAudio,
    /// Change the rate of the segment currently playing
    SetRate { rate: f32 },
    ChapterChanged {
        chapter: ChapterAddress,
        origin: TransitionOrigin,
    },
    /// No audio at the current position; playback halted there
    AudioUnavailable {
        sentence_id: String,
        language: Language,
        reason: String,
    },
    ReachedEndOfBook,
}

/// Outcome of handling one event
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub origin: TransitionOrigin,
    pub actions: Vec<PlaybackAction>,
    /// Cursor changed and should be persisted
    pub committed: bool,
}

impl Transition {
    pub(crate) fn new(origin: TransitionOrigin) -> Self {
        Self {
            origin,
            actions: Vec::new(),
            committed: false,
        }
    }

    pub(crate) fn push(&mut self, action: PlaybackAction) {
        self.actions.push(action);
    }

    /// Nothing to do
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty() && !self.committed
    }

    /// Segment started by this transition, if any
    pub fn played_segment(&self) -> Option<(&SegmentTicket, &AudioSegment)> {
        self.actions.iter().rev().find_map(|action| match action {
            PlaybackAction::PlaySegment { ticket, segment, .. } => Some((ticket, segment)),
            _ => None,
        })
    }
}
