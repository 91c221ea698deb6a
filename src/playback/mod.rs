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


//! Sentence-synchronized playback
//!
//! # Module Organization
//!
//! ## cursor
//! - `PlaybackCursor` - chapter, position, stage, mode, languages, speeds
//! - `CursorSnapshot` - read-only copy published to observers
//!
//! ## events
//! - `UserCommand`, `PlaybackEvent` - inputs to the state machine
//! - `PlaybackAction`, `Transition` - what a handled event asks for
//! - `PlaybackState`, `TransitionOrigin`, `SegmentTicket`
//!
//! ## state_machine
//! - `PlaybackStateMachine` - synchronous transition table for both modes
//!
//! ## engine
//! - `PlaybackEngine` - tokio task driving the machine against audio output
//! - `EngineHandle` - command/observe handle
//! - `PlaybackNotification` - broadcast to observers

pub mod cursor;
pub mod engine;
pub mod events;
pub mod state_machine;

pub use cursor::{CursorSnapshot, PlaybackCursor, PlaybackMode};
pub use engine::{EngineHandle, PlaybackEngine, PlaybackNotification};
pub use events::{
    PlaybackAction, PlaybackEvent, PlaybackState, SegmentTicket, Transition, TransitionOrigin,
    UserCommand,
};
pub use state_machine::{load_layout, PlaybackStateMachine};
