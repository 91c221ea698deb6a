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


//! Playback state machine
//!
//! One transition table for both modes, written against [`ContentProvider`].
//! Every event is handled to completion before the next one; the machine is
//! plain synchronous code and never waits on audio.
//!
//! ## Segment finished
//!
//! - Sentence mode: next configured stage at the same position, else stage 1
//!   at the next sentence, else the next chapter.
//! - Paragraph mode: next sentence in the paragraph at the same stage, else
//!   back to the paragraph start at the next configured stage, else stage 1
//!   at the next paragraph, else the next chapter.
//! - Past the last chapter of the last subdivision: `AtEndOfBook`.
//!
//! Stages 2 and 3 without audio for a sentence are skipped as if they had
//! finished. Stage 1 without audio halts at that position.

use crate::audio::resolver::{AudioResolver, AudioSegment};
use crate::config::EngineConfig;
use crate::content::language::{Language, Stage};
use crate::content::models::{BookStructure, ChapterAddress};
use crate::content::provider::ContentProvider;
use crate::error::{PlaybackError, Result};
use crate::navigation::{self, ChapterLayout};
use crate::playback::cursor::{slider_fraction, CursorSnapshot, PlaybackCursor, PlaybackMode};
use crate::playback::events::{
    PlaybackAction, PlaybackEvent, PlaybackState, SegmentTicket, Transition, TransitionOrigin,
    UserCommand,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct InFlight {
    ticket: SegmentTicket,
    segment: AudioSegment,
}

/// Result of trying to start audio at the cursor
enum StartOutcome {
    Started,
    /// Stage 2/3 has no language or no audio here
    StageAbsent,
    /// Stage 1 has no audio here; halted
    Unavailable,
}

/// Result of moving the cursor past a finished segment
enum Step {
    Moved,
    EndOfBook,
}

/// Sentence/paragraph playback over a book
pub struct PlaybackStateMachine<P: ContentProvider + ?Sized> {
    content: Arc<P>,
    resolver: AudioResolver,
    config: EngineConfig,
    cursor: PlaybackCursor,
    state: PlaybackState,
    layout: ChapterLayout,
    next_ticket: u64,
    in_flight: Option<InFlight>,
    interrupted: Option<Transition>,
}

impl<P: ContentProvider + ?Sized> PlaybackStateMachine<P> {
    /// Start at the first sentence of the book with the configured languages
    pub fn new(content: Arc<P>, resolver: AudioResolver, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let book = content.book_structure();
        let start = book
            .first_chapter()
            .ok_or_else(|| PlaybackError::invalid_content(format!("Book '{}' has no chapters", book.book_id)))?;
        let (first, layout) = first_playable_chapter(content.as_ref(), start)?;
        let cursor = PlaybackCursor::new(first, config.languages.clone(), config.default_mode);
        let resolver = resolver.with_tolerance(config.offset_tolerance_ms);

        Ok(Self {
            content,
            resolver,
            config,
            cursor,
            state: PlaybackState::Idle,
            layout,
            next_ticket: 0,
            in_flight: None,
            interrupted: None,
        })
    }

    /// Replace the cursor with a restored one
    ///
    /// The chapter must exist; the position is clamped into it. Playback
    /// always resumes at stage 1.
    pub fn restore(&mut self, mut cursor: PlaybackCursor) -> Result<()> {
        let (chapter, layout) = first_playable_chapter(self.content.as_ref(), cursor.chapter)?;
        if chapter != cursor.chapter {
            cursor.chapter = chapter;
            cursor.position = 0;
        }
        cursor.position = layout
            .clamp(cursor.position as i64)
            .unwrap_or(0);
        cursor.stage = Stage::First;
        for speed in cursor.speeds.values_mut() {
            *speed = self.config.clamp_speed(*speed);
        }

        info!(
            book_id = %self.book().book_id,
            subdivision = cursor.chapter.subdivision,
            chapter = cursor.chapter.chapter,
            position = cursor.position,
            mode = cursor.mode.as_str(),
            "Restored playback cursor"
        );
        self.layout = layout;
        self.cursor = cursor;
        self.in_flight = None;
        self.state = PlaybackState::Idle;
        Ok(())
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn layout(&self) -> &ChapterLayout {
        &self.layout
    }

    pub fn book(&self) -> &BookStructure {
        self.content.book_structure()
    }

    pub fn content(&self) -> &Arc<P> {
        &self.content
    }

    pub fn resolver(&self) -> &AudioResolver {
        &self.resolver
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ticket of the segment currently expected to finish
    pub fn in_flight_ticket(&self) -> Option<SegmentTicket> {
        self.in_flight.as_ref().map(|f| f.ticket)
    }

    pub fn current_segment(&self) -> Option<&AudioSegment> {
        self.in_flight.as_ref().map(|f| &f.segment)
    }

    pub fn snapshot(&self) -> CursorSnapshot {
        CursorSnapshot {
            book_id: self.book().book_id.clone(),
            chapter: self.cursor.chapter,
            position: self.cursor.position,
            chapter_sentence_count: self.layout.sentence_count(),
            sentence_id: self
                .layout
                .sentences()
                .get(self.cursor.position)
                .map(|s| s.id.clone()),
            stage: self.cursor.stage,
            language: self.cursor.language().cloned(),
            mode: self.cursor.mode,
            state: self.state,
            languages: self.cursor.languages.clone(),
            speeds: self.cursor.speeds.clone(),
        }
    }

    /// Current position as a slider value
    pub fn slider_fraction(&self) -> f64 {
        slider_fraction(self.cursor.position, self.layout.sentence_count())
    }

    /// Handle one event to completion
    ///
    /// # Errors
    /// `InconsistentMapping` is returned as is, after halting playback at
    /// the offending position; actions emitted before the failure are kept
    /// for [`PlaybackStateMachine::take_interrupted`]. Invalid commands
    /// (unknown chapter, non-finite seek or speed) leave the machine
    /// unchanged.
    pub fn handle(&mut self, event: PlaybackEvent) -> Result<Transition> {
        let before = self.cursor.clone();
        let state_before = self.state;
        self.interrupted = None;

        let (mut transition, outcome) = match event {
            PlaybackEvent::SegmentFinished(ticket) => {
                let mut transition = Transition::new(TransitionOrigin::InternalAdvance);
                let outcome = self.on_segment_finished(ticket, &mut transition);
                (transition, outcome)
            }
            PlaybackEvent::User(command) => {
                let mut transition = Transition::new(TransitionOrigin::UserInitiated);
                let outcome = self.on_command(command, &mut transition);
                (transition, outcome)
            }
        };
        transition.committed = self.cursor != before;
        if let Err(err) = outcome {
            self.interrupted = Some(transition);
            return Err(err);
        }

        if transition.committed || self.state != state_before {
            debug!(
                origin = ?transition.origin,
                subdivision = self.cursor.chapter.subdivision,
                chapter = self.cursor.chapter.chapter,
                position = self.cursor.position,
                stage = self.cursor.stage.ordinal(),
                state = %self.state,
                "Playback transition"
            );
        }
        Ok(transition)
    }

    /// Actions of the last event that failed part way, e.g. a chapter
    /// change whose first sentence could not be resolved
    pub fn take_interrupted(&mut self) -> Option<Transition> {
        self.interrupted.take()
    }

    fn on_segment_finished(&mut self, ticket: SegmentTicket, transition: &mut Transition) -> Result<()> {
        match &self.in_flight {
            Some(current) if current.ticket == ticket && self.state.is_playing() => {}
            _ => {
                debug!(%ticket, expected = ?self.in_flight_ticket(), "Ignoring stale segment completion");
                return Ok(());
            }
        }
        self.in_flight = None;

        if let Step::Moved = self.step_forward(transition)? {
            self.play_from_cursor(transition)?;
        }
        Ok(())
    }

    fn on_command(&mut self, command: UserCommand, transition: &mut Transition) -> Result<()> {
        match command {
            UserCommand::Play => {
                if matches!(self.state, PlaybackState::Idle | PlaybackState::Paused) {
                    self.play_from_cursor(transition)?;
                }
            }
            UserCommand::Pause => {
                if self.state.is_playing() {
                    self.halt(PlaybackState::Paused, transition);
                }
            }
            UserCommand::Stop => {
                if self.state != PlaybackState::AtEndOfBook {
                    self.halt(PlaybackState::Idle, transition);
                    self.cursor.stage = Stage::First;
                }
            }
            UserCommand::Skip { sentences } => {
                let target = (self.cursor.position as i64).saturating_add(sentences);
                if let Some(target) = self.layout.clamp(target) {
                    self.move_within_chapter(target, transition)?;
                }
            }
            UserCommand::SkipParagraph { paragraphs } => {
                if let Some(target) = self.paragraph_target(paragraphs)? {
                    self.move_within_chapter(target, transition)?;
                }
            }
            UserCommand::Seek { fraction } => {
                if !fraction.is_finite() {
                    return Err(PlaybackError::invalid_input(format!(
                        "Seek fraction must be finite, got {}",
                        fraction
                    )));
                }
                if !self.layout.is_empty() {
                    let last = self.layout.sentence_count() - 1;
                    let target = (fraction.clamp(0.0, 1.0) * last as f64).round() as usize;
                    self.move_within_chapter(target.min(last), transition)?;
                }
            }
            UserCommand::SelectChapter { chapter } => {
                self.select_chapter(chapter, transition)?;
            }
            UserCommand::SelectLanguageSlot { stage, language } => {
                self.cursor.languages.set(stage, language)?;
            }
            UserCommand::SetMode { mode } => {
                self.cursor.mode = mode;
            }
            UserCommand::SetSpeed { language, speed } => {
                self.set_speed(language, speed, transition)?;
            }
            UserCommand::Replay => {
                if self.state != PlaybackState::AtEndOfBook {
                    self.play_from_cursor(transition)?;
                }
            }
        }
        Ok(())
    }

    fn halt(&mut self, state: PlaybackState, transition: &mut Transition) {
        let was_playing = self.state.is_playing() || self.in_flight.is_some();
        self.in_flight = None;
        self.state = state;
        if was_playing {
            transition.push(PlaybackAction::StopAudio);
        }
    }

    /// Skip/seek target handling shared by all in-chapter moves
    fn move_within_chapter(&mut self, target: usize, transition: &mut Transition) -> Result<()> {
        self.cursor.position = target;
        match self.state {
            PlaybackState::Playing(_) => self.play_from_cursor(transition),
            PlaybackState::AtEndOfBook => {
                self.state = PlaybackState::Paused;
                Ok(())
            }
            PlaybackState::Idle | PlaybackState::Paused => Ok(()),
        }
    }

    fn paragraph_target(&self, paragraphs: i64) -> Result<Option<usize>> {
        if self.layout.is_empty() {
            return Ok(None);
        }
        let location = navigation::locate(self.cursor.position, &self.layout)?;
        let last = self.layout.paragraphs().len() as i64 - 1;
        let index = (location.paragraph_index as i64)
            .saturating_add(paragraphs)
            .clamp(0, last) as usize;
        Ok(self.layout.paragraphs().get(index).map(|span| span.start))
    }

    fn select_chapter(&mut self, chapter: ChapterAddress, transition: &mut Transition) -> Result<()> {
        if !self.book().contains(chapter) {
            return Err(PlaybackError::ChapterOutOfRange {
                subdivision: chapter.subdivision,
                chapter: chapter.chapter,
            });
        }
        let layout = load_layout(self.content.as_ref(), chapter)?;
        if layout.is_empty() {
            return Err(PlaybackError::EmptyChapter(layout.chapter_index()));
        }

        self.halt(PlaybackState::Paused, transition);
        self.layout = layout;
        self.cursor.enter_chapter(chapter);
        info!(
            subdivision = chapter.subdivision,
            chapter = chapter.chapter,
            origin = ?TransitionOrigin::UserInitiated,
            "Chapter selected"
        );
        transition.push(PlaybackAction::ChapterChanged {
            chapter,
            origin: TransitionOrigin::UserInitiated,
        });
        Ok(())
    }

    fn set_speed(&mut self, language: Language, speed: f32, transition: &mut Transition) -> Result<()> {
        if !speed.is_finite() {
            return Err(PlaybackError::invalid_input(format!(
                "Speed must be finite, got {}",
                speed
            )));
        }
        let rate = self.config.clamp_speed(speed);
        let applies_now = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.segment.language == language);
        self.cursor.speeds.insert(language, rate);
        if applies_now {
            transition.push(PlaybackAction::SetRate { rate });
        }
        Ok(())
    }

    /// Resolve and start audio at the cursor, walking past absent stages
    ///
    /// Terminates: every `StageAbsent` step moves the cursor strictly
    /// forward in (chapter, paragraph, stage, position) order.
    fn play_from_cursor(&mut self, transition: &mut Transition) -> Result<()> {
        loop {
            match self.start_segment(transition)? {
                StartOutcome::Started | StartOutcome::Unavailable => return Ok(()),
                StartOutcome::StageAbsent => {
                    if let Step::EndOfBook = self.step_forward(transition)? {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn start_segment(&mut self, transition: &mut Transition) -> Result<StartOutcome> {
        let stage = self.cursor.stage;
        let sentence_id = self.layout.sentence_at(self.cursor.position)?.id.clone();

        let Some(language) = self.cursor.language().cloned() else {
            if stage == Stage::First {
                return Err(PlaybackError::InvalidState(
                    "Stage 1 has no language".to_string(),
                ));
            }
            return Ok(StartOutcome::StageAbsent);
        };

        match self.resolver.resolve(&sentence_id, &language) {
            Ok(segment) => {
                self.next_ticket += 1;
                let ticket = SegmentTicket(self.next_ticket);
                let rate = self.cursor.speed_for(&language, self.config.default_speed);
                self.in_flight = Some(InFlight {
                    ticket,
                    segment: segment.clone(),
                });
                self.state = PlaybackState::Playing(stage);
                transition.push(PlaybackAction::PlaySegment {
                    ticket,
                    segment,
                    rate,
                });
                Ok(StartOutcome::Started)
            }
            Err(err) if err.is_audio_unavailable() && stage != Stage::First => {
                debug!(sentence_id = %sentence_id, language = %language, stage = stage.ordinal(), "No audio for stage, skipping");
                Ok(StartOutcome::StageAbsent)
            }
            Err(err) if err.is_audio_unavailable() => {
                warn!(sentence_id = %sentence_id, language = %language, "No audio available, halting");
                self.halt(PlaybackState::Paused, transition);
                transition.push(PlaybackAction::AudioUnavailable {
                    sentence_id,
                    language,
                    reason: err.to_string(),
                });
                Ok(StartOutcome::Unavailable)
            }
            Err(err) => {
                self.halt(PlaybackState::Paused, transition);
                Err(err)
            }
        }
    }

    /// Advance the cursor past the segment at the current cursor
    fn step_forward(&mut self, transition: &mut Transition) -> Result<Step> {
        let position = self.cursor.position;
        let stage = self.cursor.stage;
        let next_stage = self.cursor.languages.next_stage(stage);

        match self.cursor.mode {
            PlaybackMode::Sentence => {
                if let Some(next) = next_stage {
                    self.cursor.stage = next;
                    return Ok(Step::Moved);
                }
                self.cursor.stage = Stage::First;
                if position + 1 < self.layout.sentence_count() {
                    self.cursor.position = position + 1;
                    return Ok(Step::Moved);
                }
                self.cross_boundary(transition)
            }
            PlaybackMode::Paragraph => {
                if !navigation::is_paragraph_end(position, &self.layout)? {
                    self.cursor.position = position + 1;
                    return Ok(Step::Moved);
                }
                if let Some(next) = next_stage {
                    self.cursor.position = navigation::paragraph_start(position, &self.layout)?;
                    self.cursor.stage = next;
                    return Ok(Step::Moved);
                }
                self.cursor.stage = Stage::First;
                match navigation::next_paragraph_start(position, &self.layout)? {
                    Some(start) => {
                        self.cursor.position = start;
                        Ok(Step::Moved)
                    }
                    None => self.cross_boundary(transition),
                }
            }
        }
    }

    /// Next chapter, else next subdivision, else end of book
    fn cross_boundary(&mut self, transition: &mut Transition) -> Result<Step> {
        let mut address = self.cursor.chapter;
        while let Some(next) = self.book().next_chapter(address) {
            let layout = load_layout(self.content.as_ref(), next)?;
            if layout.is_empty() {
                debug!(subdivision = next.subdivision, chapter = next.chapter, "Skipping empty chapter");
                address = next;
                continue;
            }
            info!(
                subdivision = next.subdivision,
                chapter = next.chapter,
                origin = ?TransitionOrigin::InternalAdvance,
                "Advancing to next chapter"
            );
            self.layout = layout;
            self.cursor.enter_chapter(next);
            transition.push(PlaybackAction::ChapterChanged {
                chapter: next,
                origin: TransitionOrigin::InternalAdvance,
            });
            return Ok(Step::Moved);
        }

        info!(book_id = %self.book().book_id, "Reached end of book");
        self.cursor.stage = Stage::First;
        self.halt(PlaybackState::AtEndOfBook, transition);
        transition.push(PlaybackAction::ReachedEndOfBook);
        Ok(Step::EndOfBook)
    }
}

/// `start` or the first chapter after it that has sentences
fn first_playable_chapter<P: ContentProvider + ?Sized>(
    content: &P,
    start: ChapterAddress,
) -> Result<(ChapterAddress, ChapterLayout)> {
    let mut address = start;
    loop {
        let layout = load_layout(content, address)?;
        if !layout.is_empty() {
            return Ok((address, layout));
        }
        address = content.book_structure().next_chapter(address).ok_or_else(|| {
            PlaybackError::invalid_content(format!(
                "Book '{}' has no sentences from chapter {} of subdivision {} onwards",
                content.book_structure().book_id,
                start.chapter,
                start.subdivision
            ))
        })?;
    }
}

/// Build the layout of a chapter from provider data
pub fn load_layout<P: ContentProvider + ?Sized>(
    content: &P,
    address: ChapterAddress,
) -> Result<ChapterLayout> {
    let chapter = content
        .book_structure()
        .chapter(address)
        .ok_or(PlaybackError::ChapterOutOfRange {
            subdivision: address.subdivision,
            chapter: address.chapter,
        })?;
    ChapterLayout::build(
        chapter.content_index,
        content.paragraphs_for_chapter(chapter.content_index)?,
        content.sentences_for_chapter(chapter.content_index)?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::index::IndexEntry;
    use crate::audio::sources::InMemoryAudioMaps;
    use crate::content::{BookBuilder, LanguageSlots, StaticContentProvider};

    type Machine = PlaybackStateMachine<StaticContentProvider>;

    fn config(languages: &[&str], mode: PlaybackMode) -> EngineConfig {
        EngineConfig::builder()
            .languages(LanguageSlots::from_codes(languages).unwrap())
            .default_mode(mode)
            .build()
            .unwrap()
    }

    fn machine_with_maps(content: StaticContentProvider, maps: &InMemoryAudioMaps, languages: &[&str], mode: PlaybackMode) -> Machine {
        let resolver = AudioResolver::from_source(maps).unwrap();
        PlaybackStateMachine::new(Arc::new(content), resolver, config(languages, mode)).unwrap()
    }

    fn machine(builder: BookBuilder, languages: &[&str], mode: PlaybackMode) -> Machine {
        let content = builder.build().unwrap();
        let langs: Vec<Language> = languages.iter().map(|l| Language::new(l)).collect();
        let maps = InMemoryAudioMaps::uniform(&content, &langs, 1000.0).unwrap();
        machine_with_maps(content, &maps, languages, mode)
    }

    fn finish(m: &mut Machine, t: &Transition) -> Option<Transition> {
        let (ticket, _) = t.played_segment()?;
        Some(m.handle(PlaybackEvent::SegmentFinished(*ticket)).unwrap())
    }

    /// Play and let every segment finish; returns (sentence id, language)
    fn drain(m: &mut Machine, limit: usize) -> Vec<(String, String)> {
        let mut played = Vec::new();
        let mut t = m.handle(UserCommand::Play.into()).unwrap();
        for _ in 0..limit {
            let Some((ticket, segment)) = t.played_segment().map(|(t, s)| (*t, s.clone())) else {
                break;
            };
            played.push((segment.sentence_id.clone(), segment.language.to_string()));
            t = m.handle(PlaybackEvent::SegmentFinished(ticket)).unwrap();
        }
        played
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(s, l)| (s.to_string(), l.to_string()))
            .collect()
    }

    #[test]
    fn test_sentence_mode_cycles_three_languages_per_sentence() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2, 1]),
            &["en", "es", "fr"],
            PlaybackMode::Sentence,
        );
        let played = drain(&mut m, 100);
        assert_eq!(
            played,
            pairs(&[
                ("s000000", "en"),
                ("s000000", "es"),
                ("s000000", "fr"),
                ("s000001", "en"),
                ("s000001", "es"),
                ("s000001", "fr"),
                ("s000002", "en"),
                ("s000002", "es"),
                ("s000002", "fr"),
            ])
        );
        assert_eq!(m.state(), PlaybackState::AtEndOfBook);
    }

    #[test]
    fn test_single_language_always_advances() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[3]),
            &["en"],
            PlaybackMode::Sentence,
        );
        let played: Vec<String> = drain(&mut m, 100).into_iter().map(|(s, _)| s).collect();
        assert_eq!(played, vec!["s000000", "s000001", "s000002"]);
    }

    #[test]
    fn test_paragraph_mode_two_languages_plays_2n_events() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[3, 1]),
            &["en", "es"],
            PlaybackMode::Paragraph,
        );
        let played = drain(&mut m, 100);
        assert_eq!(
            played,
            pairs(&[
                ("s000000", "en"),
                ("s000001", "en"),
                ("s000002", "en"),
                ("s000000", "es"),
                ("s000001", "es"),
                ("s000002", "es"),
                ("s000003", "en"),
                ("s000003", "es"),
            ])
        );
    }

    #[test]
    fn test_paragraph_mode_single_language_order() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2, 3, 1]),
            &["en"],
            PlaybackMode::Paragraph,
        );
        let mut positions = Vec::new();
        let mut t = m.handle(UserCommand::Play.into()).unwrap();
        while t.played_segment().is_some() {
            positions.push(m.cursor().position);
            t = finish(&mut m, &t).unwrap();
        }
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(m.state(), PlaybackState::AtEndOfBook);
    }

    #[test]
    fn test_skip_clamps_within_chapter() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[4, 4]).chapter("Two", &[2]),
            &["en"],
            PlaybackMode::Sentence,
        );
        m.handle(UserCommand::skip(1).into()).unwrap();
        assert_eq!(m.cursor().position, 1);
        m.handle(UserCommand::skip(5).into()).unwrap();
        assert_eq!(m.cursor().position, 6);
        m.handle(UserCommand::skip(5).into()).unwrap();
        assert_eq!(m.cursor().position, 7);
        assert_eq!(m.cursor().chapter, ChapterAddress::new(0, 0));
        m.handle(UserCommand::skip(-5).into()).unwrap();
        assert_eq!(m.cursor().position, 2);
        m.handle(UserCommand::skip(-5).into()).unwrap();
        assert_eq!(m.cursor().position, 0);
        // Not playing, so nothing starts
        assert_eq!(m.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_skip_while_playing_keeps_playing_at_new_position() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[10]),
            &["en", "es"],
            PlaybackMode::Sentence,
        );
        let first = m.handle(UserCommand::Play.into()).unwrap();
        let t = finish(&mut m, &first).unwrap();
        assert_eq!(m.state(), PlaybackState::Playing(Stage::Second));
        let old_ticket = *t.played_segment().unwrap().0;

        let skipped = m.handle(UserCommand::skip(3).into()).unwrap();
        let (ticket, segment) = skipped.played_segment().unwrap();
        assert_eq!(segment.sentence_id, "s000003");
        assert_eq!(segment.language.as_str(), "es");
        assert_ne!(*ticket, old_ticket);
        assert!(m.state().is_playing());

        // Completion of the replaced segment is stale
        let stale = m.handle(PlaybackEvent::SegmentFinished(old_ticket)).unwrap();
        assert!(stale.is_noop());
        assert_eq!(m.cursor().position, 3);
    }

    #[test]
    fn test_skip_paragraph() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2, 3, 1]),
            &["en"],
            PlaybackMode::Paragraph,
        );
        m.handle(UserCommand::SkipParagraph { paragraphs: 1 }.into()).unwrap();
        assert_eq!(m.cursor().position, 2);
        m.handle(UserCommand::skip(1).into()).unwrap();
        m.handle(UserCommand::SkipParagraph { paragraphs: 5 }.into()).unwrap();
        assert_eq!(m.cursor().position, 5);
        m.handle(UserCommand::SkipParagraph { paragraphs: -1 }.into()).unwrap();
        assert_eq!(m.cursor().position, 2);
        m.handle(UserCommand::SkipParagraph { paragraphs: -9 }.into()).unwrap();
        assert_eq!(m.cursor().position, 0);
    }

    #[test]
    fn test_skip_by_extreme_counts_clamps() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2, 3]),
            &["en"],
            PlaybackMode::Sentence,
        );
        m.handle(UserCommand::skip(1).into()).unwrap();
        m.handle(UserCommand::skip(i64::MAX).into()).unwrap();
        assert_eq!(m.cursor().position, 4);
        m.handle(UserCommand::skip(i64::MIN).into()).unwrap();
        assert_eq!(m.cursor().position, 0);

        m.handle(UserCommand::skip(1).into()).unwrap();
        m.handle(UserCommand::SkipParagraph { paragraphs: i64::MAX }.into()).unwrap();
        assert_eq!(m.cursor().position, 2);
        m.handle(UserCommand::SkipParagraph { paragraphs: i64::MIN }.into()).unwrap();
        assert_eq!(m.cursor().position, 0);
    }

    #[test]
    fn test_seek() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[11]),
            &["en"],
            PlaybackMode::Sentence,
        );
        m.handle(UserCommand::seek(0.5).into()).unwrap();
        assert_eq!(m.cursor().position, 5);
        assert_eq!(m.slider_fraction(), 0.5);
        m.handle(UserCommand::seek(7.0).into()).unwrap();
        assert_eq!(m.cursor().position, 10);
        m.handle(UserCommand::seek(-1.0).into()).unwrap();
        assert_eq!(m.cursor().position, 0);
        let err = m.handle(UserCommand::seek(f64::NAN).into()).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidInput(_)));
    }

    #[test]
    fn test_crosses_chapters_and_subdivisions_internally() {
        let mut m = machine(
            BookBuilder::new("b", "en")
                .subdivision("Part I")
                .chapter("One", &[1])
                .subdivision("Part II")
                .chapter("Two", &[1]),
            &["en"],
            PlaybackMode::Sentence,
        );
        let first = m.handle(UserCommand::Play.into()).unwrap();
        let crossed = finish(&mut m, &first).unwrap();

        assert_eq!(crossed.origin, TransitionOrigin::InternalAdvance);
        assert!(crossed.actions.contains(&PlaybackAction::ChapterChanged {
            chapter: ChapterAddress::new(1, 0),
            origin: TransitionOrigin::InternalAdvance,
        }));
        assert!(!crossed.actions.contains(&PlaybackAction::StopAudio));
        assert_eq!(m.state(), PlaybackState::Playing(Stage::First));
        assert_eq!(m.cursor().position, 0);
        assert_eq!(crossed.played_segment().unwrap().1.sentence_id, "s000001");

        let end = finish(&mut m, &crossed).unwrap();
        assert!(end.actions.contains(&PlaybackAction::ReachedEndOfBook));
        assert_eq!(m.state(), PlaybackState::AtEndOfBook);
        assert_eq!(m.cursor().chapter, ChapterAddress::new(1, 0));

        // Play is a no-op at the end of the book
        let again = m.handle(UserCommand::Play.into()).unwrap();
        assert!(again.is_noop());
        assert_eq!(m.state(), PlaybackState::AtEndOfBook);
    }

    #[test]
    fn test_end_of_book_in_paragraph_mode_mid_cycle() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2]),
            &["en", "es"],
            PlaybackMode::Paragraph,
        );
        m.handle(UserCommand::skip(1).into()).unwrap();
        let played = drain(&mut m, 100);
        assert_eq!(
            played,
            pairs(&[("s000001", "en"), ("s000000", "es"), ("s000001", "es")])
        );
        assert_eq!(m.state(), PlaybackState::AtEndOfBook);

        // Moving away from the end re-enables playback
        m.handle(UserCommand::skip(-1).into()).unwrap();
        assert_eq!(m.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_user_chapter_selection_stops_and_resets_stage() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2]).chapter("Two", &[2]),
            &["en", "es"],
            PlaybackMode::Sentence,
        );
        let first = m.handle(UserCommand::Play.into()).unwrap();
        finish(&mut m, &first).unwrap();
        assert_eq!(m.cursor().stage, Stage::Second);

        let t = m.handle(UserCommand::select_chapter(0, 1).into()).unwrap();
        assert_eq!(t.origin, TransitionOrigin::UserInitiated);
        assert_eq!(
            t.actions,
            vec![
                PlaybackAction::StopAudio,
                PlaybackAction::ChapterChanged {
                    chapter: ChapterAddress::new(0, 1),
                    origin: TransitionOrigin::UserInitiated,
                },
            ]
        );
        assert_eq!(m.state(), PlaybackState::Paused);
        assert_eq!(m.cursor().stage, Stage::First);
        assert_eq!(m.cursor().position, 0);
        assert!(t.committed);

        let err = m.handle(UserCommand::select_chapter(0, 9).into()).unwrap_err();
        assert!(matches!(err, PlaybackError::ChapterOutOfRange { .. }));
        assert_eq!(m.cursor().chapter, ChapterAddress::new(0, 1));
    }

    #[test]
    fn test_missing_secondary_audio_is_skipped() {
        let content = BookBuilder::new("b", "en").chapter("One", &[2]).build().unwrap();
        let langs = [Language::new("en"), Language::new("es"), Language::new("fr")];
        let maps = InMemoryAudioMaps::uniform_with(&content, &langs, 1000.0, |s, l| {
            !(s.id == "s000000" && l.as_str() == "es")
        })
        .unwrap();
        let mut m = machine_with_maps(content, &maps, &["en", "es", "fr"], PlaybackMode::Sentence);
        let played = drain(&mut m, 100);
        assert_eq!(
            played,
            pairs(&[
                ("s000000", "en"),
                ("s000000", "fr"),
                ("s000001", "en"),
                ("s000001", "es"),
                ("s000001", "fr"),
            ])
        );
    }

    #[test]
    fn test_empty_secondary_slot_goes_to_tertiary() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[1]),
            &["en", "es", "fr"],
            PlaybackMode::Sentence,
        );
        m.handle(
            UserCommand::SelectLanguageSlot {
                stage: Stage::Second,
                language: None,
            }
            .into(),
        )
        .unwrap();
        let played = drain(&mut m, 10);
        assert_eq!(played, pairs(&[("s000000", "en"), ("s000000", "fr")]));
    }

    #[test]
    fn test_missing_primary_audio_halts_without_advancing() {
        let content = BookBuilder::new("b", "en").chapter("One", &[3]).build().unwrap();
        let langs = [Language::new("en")];
        let maps = InMemoryAudioMaps::uniform_with(&content, &langs, 1000.0, |s, _| s.id != "s000001").unwrap();
        let mut m = machine_with_maps(content, &maps, &["en"], PlaybackMode::Sentence);

        let first = m.handle(UserCommand::Play.into()).unwrap();
        let t = finish(&mut m, &first).unwrap();
        assert!(t.played_segment().is_none());
        assert!(t
            .actions
            .iter()
            .any(|a| matches!(a, PlaybackAction::AudioUnavailable { sentence_id, .. } if sentence_id == "s000001")));
        assert_eq!(m.state(), PlaybackState::Paused);
        assert_eq!(m.cursor().position, 1);

        // Listener moves on by hand
        m.handle(UserCommand::skip(1).into()).unwrap();
        let resumed = m.handle(UserCommand::Play.into()).unwrap();
        assert_eq!(resumed.played_segment().unwrap().1.sentence_id, "s000002");
    }

    #[test]
    fn test_inconsistent_mapping_is_surfaced() {
        let content = BookBuilder::new("b", "en").chapter("One", &[2]).build().unwrap();
        let mut maps = InMemoryAudioMaps::uniform(&content, &[Language::new("en")], 1000.0).unwrap();
        maps.index.insert(
            "s000001",
            Language::new("en"),
            IndexEntry {
                audio_path: "somewhere_else.mp3".to_string(),
                offset_ms: 1000.0,
                duration_ms: 1000.0,
                sample_rate_hz: 44_100,
            },
        );
        let mut m = machine_with_maps(content, &maps, &["en"], PlaybackMode::Sentence);

        let first = m.handle(UserCommand::Play.into()).unwrap();
        let ticket = *first.played_segment().unwrap().0;
        let err = m.handle(PlaybackEvent::SegmentFinished(ticket)).unwrap_err();
        assert!(matches!(err, PlaybackError::InconsistentMapping { .. }));
        assert_eq!(m.state(), PlaybackState::Paused);
        assert_eq!(m.cursor().position, 1);
        assert!(m.in_flight_ticket().is_none());
    }

    #[test]
    fn test_failed_chapter_start_keeps_chapter_change() {
        let content = BookBuilder::new("b", "en")
            .chapter("One", &[1])
            .chapter("Two", &[2])
            .build()
            .unwrap();
        let mut maps = InMemoryAudioMaps::uniform(&content, &[Language::new("en")], 1000.0).unwrap();
        maps.index.insert(
            "s000001",
            Language::new("en"),
            IndexEntry {
                audio_path: "chunk-001_en.mp3".to_string(),
                offset_ms: 500.0,
                duration_ms: 1000.0,
                sample_rate_hz: 44_100,
            },
        );
        let mut m = machine_with_maps(content, &maps, &["en"], PlaybackMode::Sentence);

        let first = m.handle(UserCommand::Play.into()).unwrap();
        let ticket = *first.played_segment().unwrap().0;
        let err = m.handle(PlaybackEvent::SegmentFinished(ticket)).unwrap_err();
        assert!(matches!(err, PlaybackError::InconsistentMapping { .. }));
        assert_eq!(m.cursor().chapter, ChapterAddress::new(0, 1));

        let partial = m.take_interrupted().unwrap();
        assert_eq!(partial.origin, TransitionOrigin::InternalAdvance);
        assert!(partial.committed);
        assert!(partial.actions.contains(&PlaybackAction::ChapterChanged {
            chapter: ChapterAddress::new(0, 1),
            origin: TransitionOrigin::InternalAdvance,
        }));
        assert!(partial.played_segment().is_none());
        assert!(m.take_interrupted().is_none());

        // A successful event clears it
        m.handle(UserCommand::Pause.into()).unwrap();
        assert!(m.take_interrupted().is_none());
    }

    #[test]
    fn test_pause_cancels_in_flight_segment() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[3]),
            &["en"],
            PlaybackMode::Sentence,
        );
        let first = m.handle(UserCommand::Play.into()).unwrap();
        let ticket = *first.played_segment().unwrap().0;

        let paused = m.handle(UserCommand::Pause.into()).unwrap();
        assert_eq!(paused.actions, vec![PlaybackAction::StopAudio]);
        assert!(m.handle(PlaybackEvent::SegmentFinished(ticket)).unwrap().is_noop());
        assert_eq!(m.cursor().position, 0);

        let resumed = m.handle(UserCommand::Play.into()).unwrap();
        let (new_ticket, segment) = resumed.played_segment().unwrap();
        assert_ne!(*new_ticket, ticket);
        assert_eq!(segment.sentence_id, "s000000");
    }

    #[test]
    fn test_stop_resets_stage_and_goes_idle() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[3]),
            &["en", "es"],
            PlaybackMode::Sentence,
        );
        let first = m.handle(UserCommand::Play.into()).unwrap();
        finish(&mut m, &first).unwrap();
        m.handle(UserCommand::Stop.into()).unwrap();
        assert_eq!(m.state(), PlaybackState::Idle);
        assert_eq!(m.cursor().stage, Stage::First);
        assert_eq!(m.cursor().position, 0);
    }

    #[test]
    fn test_speed_applies_to_matching_segment_only() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2]),
            &["en", "es"],
            PlaybackMode::Sentence,
        );
        m.handle(UserCommand::Play.into()).unwrap();

        let t = m
            .handle(
                UserCommand::SetSpeed {
                    language: Language::new("en-US"),
                    speed: 9.0,
                }
                .into(),
            )
            .unwrap();
        assert_eq!(t.actions, vec![PlaybackAction::SetRate { rate: 3.0 }]);

        let t = m
            .handle(
                UserCommand::SetSpeed {
                    language: Language::new("es"),
                    speed: 0.75,
                }
                .into(),
            )
            .unwrap();
        assert!(t.actions.is_empty());
        assert!(t.committed);

        let next = m
            .handle(PlaybackEvent::SegmentFinished(m.in_flight_ticket().unwrap()))
            .unwrap();
        assert!(matches!(
            next.actions.last(),
            Some(PlaybackAction::PlaySegment { rate, .. }) if *rate == 0.75
        ));
    }

    #[test]
    fn test_mode_change_applies_to_next_segment() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2]),
            &["en", "es"],
            PlaybackMode::Sentence,
        );
        let first = m.handle(UserCommand::Play.into()).unwrap();
        let t = m
            .handle(UserCommand::SetMode { mode: PlaybackMode::Paragraph }.into())
            .unwrap();
        assert!(t.actions.is_empty());
        let next = finish(&mut m, &first).unwrap();
        // Paragraph mode: same stage, next sentence
        assert_eq!(next.played_segment().unwrap().1.sentence_id, "s000001");
        assert_eq!(next.played_segment().unwrap().1.language.as_str(), "en");
    }

    #[test]
    fn test_restore_clamps_and_resets_stage() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2]).chapter("Two", &[3]),
            &["en", "es"],
            PlaybackMode::Sentence,
        );
        let mut cursor = m.cursor().clone();
        cursor.chapter = ChapterAddress::new(0, 1);
        cursor.position = 42;
        cursor.stage = Stage::Second;
        cursor.mode = PlaybackMode::Paragraph;
        m.restore(cursor).unwrap();

        assert_eq!(m.cursor().position, 2);
        assert_eq!(m.cursor().stage, Stage::First);
        assert_eq!(m.cursor().mode, PlaybackMode::Paragraph);
        let snapshot = m.snapshot();
        assert_eq!(snapshot.sentence_id.as_deref(), Some("s000004"));
        assert_eq!(snapshot.slider_fraction(), 1.0);
    }

    #[test]
    fn test_replay_restarts_current_segment() {
        let mut m = machine(
            BookBuilder::new("b", "en").chapter("One", &[2]),
            &["en"],
            PlaybackMode::Sentence,
        );
        let first = m.handle(UserCommand::Play.into()).unwrap();
        let replay = m.handle(UserCommand::Replay.into()).unwrap();
        let (a, seg_a) = first.played_segment().unwrap();
        let (b, seg_b) = replay.played_segment().unwrap();
        assert_eq!(seg_a, seg_b);
        assert!(b > a);
        assert!(!replay.committed);
    }
}
