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


//! Playback engine runtime
//!
//! A single tokio task owns the state machine, the audio output and the
//! progress tracker. User commands and segment completions travel through
//! one queue and are handled strictly one after another, so a skip can
//! never race a completion.
//!
//! Observers never touch the cursor: they read [`CursorSnapshot`]s from a
//! watch channel and origin-tagged [`PlaybackNotification`]s from a
//! broadcast channel.

use crate::audio::output::{AudioHandle, AudioOutput, FinishCallback};
use crate::audio::resolver::{same_audio_file, AudioResolver, AudioSegment};
use crate::config::EngineConfig;
use crate::content::language::Language;
use crate::content::models::ChapterAddress;
use crate::content::provider::ContentProvider;
use crate::error::{PlaybackError, Result};
use crate::playback::cursor::{CursorSnapshot, PlaybackMode};
use crate::playback::events::{
    PlaybackAction, PlaybackEvent, PlaybackState, SegmentTicket, Transition, TransitionOrigin,
    UserCommand,
};
use crate::playback::state_machine::PlaybackStateMachine;
use crate::progress::{ProgressStore, ProgressTracker};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the notification channel; slow subscribers lag
const NOTIFICATION_CAPACITY: usize = 256;

/// Something observers may want to react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackNotification {
    StateChanged {
        state: PlaybackState,
        origin: TransitionOrigin,
    },
    SegmentStarted {
        ticket: SegmentTicket,
        sentence_id: String,
        language: Language,
        chunk_id: String,
        origin: TransitionOrigin,
    },
    /// Internal advances keep playing; user selections have stopped playback
    ChapterChanged {
        chapter: ChapterAddress,
        origin: TransitionOrigin,
    },
    AudioUnavailable {
        sentence_id: String,
        language: Language,
        reason: String,
    },
    /// Content data disagrees with itself; playback halted
    MappingError { message: String },
    EndOfBook,
}

enum EngineMessage {
    Command {
        command: UserCommand,
        reply: oneshot::Sender<Result<()>>,
    },
    SegmentFinished(SegmentTicket),
    Shutdown {
        reply: oneshot::Sender<Result<CursorSnapshot>>,
    },
}

/// Cloneable handle to a running engine
///
/// The engine stops (and saves its final state) when the last handle is
/// dropped or [`EngineHandle::shutdown`] is called.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
    snapshots: watch::Receiver<CursorSnapshot>,
    notifications: broadcast::Sender<PlaybackNotification>,
}

impl EngineHandle {
    /// Queue a command and wait until it has been handled
    pub async fn send(&self, command: UserCommand) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMessage::Command { command, reply })
            .map_err(|_| PlaybackError::EngineClosed)?;
        rx.await.map_err(|_| PlaybackError::EngineClosed)?
    }

    pub async fn play(&self) -> Result<()> {
        self.send(UserCommand::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(UserCommand::Pause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(UserCommand::Stop).await
    }

    pub async fn skip(&self, sentences: i64) -> Result<()> {
        self.send(UserCommand::Skip { sentences }).await
    }

    pub async fn seek(&self, fraction: f64) -> Result<()> {
        self.send(UserCommand::Seek { fraction }).await
    }

    pub async fn select_chapter(&self, chapter: ChapterAddress) -> Result<()> {
        self.send(UserCommand::SelectChapter { chapter }).await
    }

    pub async fn set_mode(&self, mode: PlaybackMode) -> Result<()> {
        self.send(UserCommand::SetMode { mode }).await
    }

    /// Latest published cursor state
    pub fn snapshot(&self) -> CursorSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<CursorSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackNotification> {
        self.notifications.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stop audio, persist the final state and end the engine task
    pub async fn shutdown(self) -> Result<CursorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMessage::Shutdown { reply })
            .map_err(|_| PlaybackError::EngineClosed)?;
        rx.await.map_err(|_| PlaybackError::EngineClosed)?
    }
}

/// Actor driving a [`PlaybackStateMachine`] against real audio
pub struct PlaybackEngine<P, O, S>
where
    P: ContentProvider + ?Sized + 'static,
    O: AudioOutput,
    S: ProgressStore,
{
    machine: PlaybackStateMachine<P>,
    output: O,
    tracker: ProgressTracker<S>,
    current: Option<AudioHandle>,
    fade: Duration,
    // Weak so that dropping every handle ends the task
    completions: mpsc::WeakUnboundedSender<EngineMessage>,
    snapshots: watch::Sender<CursorSnapshot>,
    notifications: broadcast::Sender<PlaybackNotification>,
}

impl<P, O, S> PlaybackEngine<P, O, S>
where
    P: ContentProvider + ?Sized + 'static,
    O: AudioOutput,
    S: ProgressStore,
{
    /// Build the state machine, restore saved progress and spawn the engine
    pub async fn start(
        content: Arc<P>,
        resolver: AudioResolver,
        output: O,
        store: S,
        config: EngineConfig,
    ) -> Result<(EngineHandle, JoinHandle<()>)> {
        let mut machine = PlaybackStateMachine::new(content, resolver, config)?;
        let mut tracker = ProgressTracker::new(store);
        if let Some(cursor) = tracker
            .restore(machine.content().as_ref(), machine.config())
            .await?
        {
            machine.restore(cursor)?;
        }
        Ok(Self::spawn(machine, output, tracker))
    }

    /// Spawn the engine task around an already positioned state machine
    pub fn spawn(
        machine: PlaybackStateMachine<P>,
        output: O,
        tracker: ProgressTracker<S>,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(machine.snapshot());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let engine = Self {
            fade: machine.config().fade_out(),
            machine,
            output,
            tracker,
            current: None,
            completions: tx.downgrade(),
            snapshots,
            notifications: notifications.clone(),
        };

        info!(book_id = %engine.machine.book().book_id, "Starting playback engine");
        let task = tokio::spawn(engine.run(rx));

        (
            EngineHandle {
                tx,
                snapshots: snapshot_rx,
                notifications,
            },
            task,
        )
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                EngineMessage::Command { command, reply } => {
                    let result = self.dispatch(PlaybackEvent::User(command)).await;
                    let _ = reply.send(result);
                }
                EngineMessage::SegmentFinished(ticket) => {
                    if let Err(err) = self.dispatch(PlaybackEvent::SegmentFinished(ticket)).await {
                        warn!(error = %err, "Automatic advance failed");
                    }
                }
                EngineMessage::Shutdown { reply } => {
                    let _ = reply.send(self.finish().await);
                    return;
                }
            }
        }

        if let Err(err) = self.finish().await {
            warn!(error = %err, "Failed to persist final playback state");
        }
    }

    async fn dispatch(&mut self, event: PlaybackEvent) -> Result<()> {
        let origin = match event {
            PlaybackEvent::User(_) => TransitionOrigin::UserInitiated,
            PlaybackEvent::SegmentFinished(_) => TransitionOrigin::InternalAdvance,
        };
        let state_before = self.machine.state();

        match self.machine.handle(event) {
            Ok(transition) => {
                let applied = self.apply(&transition).await;
                if let Err(err) = &applied {
                    error!(error = %err, "Audio output failed, pausing");
                    // A segment that never started will never finish
                    if self.machine.state().is_playing() {
                        self.machine.handle(PlaybackEvent::User(UserCommand::Pause))?;
                    }
                    self.release_audio().await;
                }
                self.publish(state_before, transition.origin, transition.committed)
                    .await;
                applied
            }
            Err(err) => {
                if let Some(partial) = self.machine.take_interrupted() {
                    for action in &partial.actions {
                        self.announce(action);
                    }
                }
                if err.is_data_integrity() {
                    error!(error = %err, "Playback halted on inconsistent content");
                    self.notify(PlaybackNotification::MappingError {
                        message: err.to_string(),
                    });
                }
                if !self.machine.state().is_playing() {
                    self.release_audio().await;
                }
                self.publish(state_before, origin, true).await;
                Err(err)
            }
        }
    }

    async fn apply(&mut self, transition: &Transition) -> Result<()> {
        for action in &transition.actions {
            match action {
                PlaybackAction::PlaySegment {
                    ticket,
                    segment,
                    rate,
                } => {
                    self.play_segment(*ticket, segment, *rate).await?;
                    self.notify(PlaybackNotification::SegmentStarted {
                        ticket: *ticket,
                        sentence_id: segment.sentence_id.clone(),
                        language: segment.language.clone(),
                        chunk_id: segment.chunk_id.clone(),
                        origin: transition.origin,
                    });
                }
                PlaybackAction::StopAudio => self.release_audio().await,
                PlaybackAction::SetRate { rate } => {
                    if let Some(handle) = &self.current {
                        self.output.set_rate(handle, *rate)?;
                    }
                }
                _ => self.announce(action),
            }
        }
        Ok(())
    }

    /// Broadcast the actions that only inform observers
    fn announce(&self, action: &PlaybackAction) {
        match action {
            PlaybackAction::ChapterChanged { chapter, origin } => {
                self.notify(PlaybackNotification::ChapterChanged {
                    chapter: *chapter,
                    origin: *origin,
                });
            }
            PlaybackAction::AudioUnavailable {
                sentence_id,
                language,
                reason,
            } => {
                self.notify(PlaybackNotification::AudioUnavailable {
                    sentence_id: sentence_id.clone(),
                    language: language.clone(),
                    reason: reason.clone(),
                });
            }
            PlaybackAction::ReachedEndOfBook => self.notify(PlaybackNotification::EndOfBook),
            PlaybackAction::PlaySegment { .. }
            | PlaybackAction::StopAudio
            | PlaybackAction::SetRate { .. } => {}
        }
    }

    /// Start a segment, reusing the loaded file when it is the same chunk
    ///
    /// A different file is only loaded after the old one has faded out and
    /// been released.
    async fn play_segment(&mut self, ticket: SegmentTicket, segment: &AudioSegment, rate: f32) -> Result<()> {
        let handle = match self.current.take() {
            Some(handle) if same_audio_file(&handle.audio_path, &segment.audio_path) => handle,
            Some(handle) => {
                debug!(from = %handle.audio_path, to = %segment.audio_path, "Switching chunk file");
                self.output.stop(handle, self.fade).await?;
                self.output.load(&segment.audio_path)?
            }
            None => self.output.load(&segment.audio_path)?,
        };

        let completions = self.completions.clone();
        let on_finished: FinishCallback = Box::new(move || {
            if let Some(tx) = completions.upgrade() {
                let _ = tx.send(EngineMessage::SegmentFinished(ticket));
            }
        });
        let started = self.output.play_range(
            &handle,
            segment.start_ms,
            segment.duration_ms,
            rate,
            on_finished,
        );
        self.current = Some(handle);
        started
    }

    async fn release_audio(&mut self) {
        if let Some(handle) = self.current.take() {
            if let Err(err) = self.output.stop(handle, self.fade).await {
                warn!(error = %err, "Failed to stop audio output");
            }
        }
    }

    fn notify(&self, notification: PlaybackNotification) {
        // No subscribers is fine
        let _ = self.notifications.send(notification);
    }

    async fn publish(&mut self, state_before: PlaybackState, origin: TransitionOrigin, committed: bool) {
        let snapshot = self.machine.snapshot();
        self.snapshots.send_replace(snapshot.clone());

        let state_changed = snapshot.state != state_before;
        if state_changed {
            self.notify(PlaybackNotification::StateChanged {
                state: snapshot.state,
                origin,
            });
        }
        if committed || state_changed {
            self.persist(&snapshot).await;
        }
    }

    async fn persist(&mut self, snapshot: &CursorSnapshot) {
        let title = self.machine.book().title.clone();
        if let Err(err) = self.tracker.record(snapshot, &title).await {
            warn!(book_id = %snapshot.book_id, error = %err, "Failed to save listening progress");
        }
    }

    async fn finish(&mut self) -> Result<CursorSnapshot> {
        let state_before = self.machine.state();
        if state_before.is_playing() {
            self.machine.handle(PlaybackEvent::User(UserCommand::Pause))?;
        }
        self.release_audio().await;

        let snapshot = self.machine.snapshot();
        self.snapshots.send_replace(snapshot.clone());
        let title = self.machine.book().title.clone();
        self.tracker.record(&snapshot, &title).await?;
        info!(
            book_id = %snapshot.book_id,
            position = snapshot.position,
            writes = self.tracker.writes(),
            "Playback engine stopped"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::index::IndexEntry;
    use crate::audio::output::{OutputEvent, OutputLog, SimulatedOutput};
    use crate::audio::sources::InMemoryAudioMaps;
    use crate::content::{BookBuilder, LanguageSlots, Sentence, StaticContentProvider};
    use crate::progress::MemoryProgressStore;

    type Engine = PlaybackEngine<StaticContentProvider, SimulatedOutput, MemoryProgressStore>;

    async fn start_with<F>(
        builder: BookBuilder,
        languages: &[&str],
        store: MemoryProgressStore,
        include: F,
    ) -> (EngineHandle, OutputLog)
    where
        F: Fn(&Sentence, &Language) -> bool,
    {
        let content = builder.build().unwrap();
        let langs: Vec<Language> = languages.iter().map(|l| Language::new(l)).collect();
        let maps = InMemoryAudioMaps::uniform_with(&content, &langs, 1000.0, include).unwrap();
        launch(content, &maps, languages, store).await
    }

    async fn launch(
        content: StaticContentProvider,
        maps: &InMemoryAudioMaps,
        languages: &[&str],
        store: MemoryProgressStore,
    ) -> (EngineHandle, OutputLog) {
        let resolver = AudioResolver::from_source(maps).unwrap();
        let config = EngineConfig::builder()
            .languages(LanguageSlots::from_codes(languages).unwrap())
            .build()
            .unwrap();
        let output = SimulatedOutput::new();
        let log = output.log();
        let (handle, _task) = Engine::start(Arc::new(content), resolver, output, store, config)
            .await
            .unwrap();
        (handle, log)
    }

    async fn start(builder: BookBuilder, languages: &[&str], store: MemoryProgressStore) -> (EngineHandle, OutputLog) {
        start_with(builder, languages, store, |_, _| true).await
    }

    /// Collect notifications until one matches
    async fn collect_until<F>(rx: &mut broadcast::Receiver<PlaybackNotification>, done: F) -> Vec<PlaybackNotification>
    where
        F: Fn(&PlaybackNotification) -> bool,
    {
        let mut seen = Vec::new();
        loop {
            let notification = rx.recv().await.unwrap();
            let stop = done(&notification);
            seen.push(notification);
            if stop {
                return seen;
            }
        }
    }

    fn started(notifications: &[PlaybackNotification]) -> Vec<String> {
        notifications
            .iter()
            .filter_map(|n| match n {
                PlaybackNotification::SegmentStarted { sentence_id, .. } => Some(sentence_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_to_end_of_book_and_persists() {
        let store = MemoryProgressStore::new();
        let (handle, log) = start(
            BookBuilder::new("b", "en").chapter("One", &[2]).chapter("Two", &[1]),
            &["en"],
            store.clone(),
        )
        .await;
        let mut rx = handle.subscribe();

        handle.play().await.unwrap();
        let seen = collect_until(&mut rx, |n| *n == PlaybackNotification::EndOfBook).await;

        assert_eq!(started(&seen), vec!["s000000", "s000001", "s000002"]);
        assert!(seen.contains(&PlaybackNotification::ChapterChanged {
            chapter: ChapterAddress::new(0, 1),
            origin: TransitionOrigin::InternalAdvance,
        }));

        let mut watch = handle.watch();
        watch
            .wait_for(|s| s.state == PlaybackState::AtEndOfBook)
            .await
            .unwrap();

        // The first chunk is released before the second one is loaded
        let events = log.events();
        let first_stop = events
            .iter()
            .position(|e| matches!(e, OutputEvent::Stopped { .. }))
            .unwrap();
        let second_load = events
            .iter()
            .position(|e| matches!(e, OutputEvent::Loaded { audio_path, .. } if audio_path.starts_with("chunk-001")))
            .unwrap();
        assert!(first_stop < second_load);

        handle.shutdown().await.unwrap();
        let saved = store.load("b").await.unwrap().unwrap();
        assert_eq!(saved.chapter, ChapterAddress::new(0, 1));
        assert_eq!(saved.position, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_while_playing_restarts_at_target() {
        let (handle, _log) = start(
            BookBuilder::new("b", "en").chapter("One", &[4]),
            &["en"],
            MemoryProgressStore::new(),
        )
        .await;
        let mut rx = handle.subscribe();

        handle.play().await.unwrap();
        collect_until(&mut rx, |n| matches!(n, PlaybackNotification::SegmentStarted { .. })).await;

        handle.skip(2).await.unwrap();
        let seen = collect_until(&mut rx, |n| {
            matches!(n, PlaybackNotification::SegmentStarted { sentence_id, .. } if sentence_id == "s000003")
        })
        .await;

        // s000001 never plays; s000002 starts on the user's behalf
        assert_eq!(started(&seen), vec!["s000002", "s000003"]);
        let first_started = seen
            .iter()
            .find(|n| matches!(n, PlaybackNotification::SegmentStarted { .. }))
            .unwrap();
        assert!(matches!(
            first_started,
            PlaybackNotification::SegmentStarted { origin: TransitionOrigin::UserInitiated, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_primary_audio_pauses_with_notification() {
        let (handle, _log) = start_with(
            BookBuilder::new("b", "en").chapter("One", &[3]),
            &["en"],
            MemoryProgressStore::new(),
            |s, _| s.id != "s000001",
        )
        .await;
        let mut rx = handle.subscribe();

        handle.play().await.unwrap();
        let seen = collect_until(&mut rx, |n| matches!(n, PlaybackNotification::AudioUnavailable { .. })).await;
        assert_eq!(started(&seen), vec!["s000000"]);

        let mut watch = handle.watch();
        let snapshot = watch
            .wait_for(|s| s.state == PlaybackState::Paused)
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.position, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chapter_change_announced_when_next_chapter_fails() {
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
        let (handle, _log) = launch(content, &maps, &["en"], MemoryProgressStore::new()).await;
        let mut rx = handle.subscribe();

        handle.play().await.unwrap();
        let seen = collect_until(&mut rx, |n| matches!(n, PlaybackNotification::MappingError { .. })).await;

        let chapter_changed = seen
            .iter()
            .position(|n| {
                *n == PlaybackNotification::ChapterChanged {
                    chapter: ChapterAddress::new(0, 1),
                    origin: TransitionOrigin::InternalAdvance,
                }
            })
            .unwrap();
        assert!(chapter_changed < seen.len() - 1);

        let mut watch = handle.watch();
        let snapshot = watch
            .wait_for(|s| s.state == PlaybackState::Paused)
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.chapter, ChapterAddress::new(0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_saves_and_next_start_resumes() {
        let store = MemoryProgressStore::new();
        let book = || BookBuilder::new("b", "en").chapter("One", &[3]);

        let (handle, _log) = start(book(), &["en"], store.clone()).await;
        let mut rx = handle.subscribe();
        handle.play().await.unwrap();
        collect_until(&mut rx, |n| {
            matches!(n, PlaybackNotification::SegmentStarted { sentence_id, .. } if sentence_id == "s000001")
        })
        .await;

        let other = handle.clone();
        let last = handle.shutdown().await.unwrap();
        assert_eq!(last.position, 1);
        assert_eq!(last.state, PlaybackState::Paused);
        assert!(matches!(other.play().await, Err(PlaybackError::EngineClosed)));

        let (resumed, _log) = start(book(), &["en"], store).await;
        let snapshot = resumed.snapshot();
        assert_eq!(snapshot.position, 1);
        assert_eq!(snapshot.state, PlaybackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_change_reaches_output() {
        let (handle, log) = start(
            BookBuilder::new("b", "en").chapter("One", &[3]),
            &["en"],
            MemoryProgressStore::new(),
        )
        .await;
        let mut rx = handle.subscribe();
        handle.play().await.unwrap();
        collect_until(&mut rx, |n| matches!(n, PlaybackNotification::SegmentStarted { .. })).await;

        handle
            .send(UserCommand::SetSpeed {
                language: Language::new("en"),
                speed: 1.5,
            })
            .await
            .unwrap();

        assert!(log
            .events()
            .iter()
            .any(|e| matches!(e, OutputEvent::RateChanged { rate, .. } if (*rate - 1.5).abs() < f32::EPSILON)));
        assert_eq!(handle.snapshot().speeds.get(&Language::new("en")), Some(&1.5));
    }
}
