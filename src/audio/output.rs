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


//! Audio output boundary
//!
//! The engine drives an [`AudioOutput`]: load a chunk file, play a range of
//! it at a rate, stop it with a fade. When a range finishes (or the file
//! ends first) the output invokes the completion callback exactly once;
//! that callback is the only way audio talks back to the engine.
//!
//! [`SimulatedOutput`] implements the boundary with tokio timers. It keeps
//! an event log so callers can check ordering (stop-old before start-new).

use crate::error::{PlaybackError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Called once when a played range has elapsed
pub type FinishCallback = Box<dyn FnOnce() + Send + 'static>;

/// Loaded audio file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    pub id: u64,
    pub audio_path: String,
}

/// Audio playback backend
pub trait AudioOutput: Send + 'static {
    /// Open an audio file for playback
    fn load(&mut self, audio_path: &str) -> Result<AudioHandle>;

    /// Play `[start_ms, start_ms + duration_ms)` of a loaded file
    ///
    /// Replaces any range still playing on the handle; the replaced range's
    /// callback is dropped without being called.
    fn play_range(
        &mut self,
        handle: &AudioHandle,
        start_ms: f64,
        duration_ms: f64,
        rate: f32,
        on_finished: FinishCallback,
    ) -> Result<()>;

    /// Change the rate of the range currently playing on the handle
    fn set_rate(&mut self, handle: &AudioHandle, rate: f32) -> Result<()>;

    /// Fade out, stop and release a handle
    ///
    /// The returned future completes only after the fade is over and the
    /// decoder is released.
    fn stop(&mut self, handle: AudioHandle, fade: Duration) -> impl Future<Output = Result<()>> + Send;
}

/// Entry in the simulated output's event log
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Loaded { handle: u64, audio_path: String },
    PlayRange { handle: u64, start_ms: f64, duration_ms: f64, rate: f32 },
    RateChanged { handle: u64, rate: f32 },
    Stopped { handle: u64 },
}

/// Shared view of the simulated output's log
#[derive(Debug, Clone, Default)]
pub struct OutputLog(Arc<Mutex<Vec<OutputEvent>>>);

impl OutputLog {
    fn push(&self, event: OutputEvent) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

struct ActiveRange {
    task: JoinHandle<()>,
    rate_tx: watch::Sender<f32>,
}

/// Timer-driven output that plays nothing but keeps real timing
///
/// `time_scale` > 1 runs the clock faster (a 2 s segment at scale 4 takes
/// 500 ms of wall time).
pub struct SimulatedOutput {
    next_id: u64,
    time_scale: f64,
    loaded: HashMap<u64, Option<ActiveRange>>,
    log: OutputLog,
}

impl SimulatedOutput {
    pub fn new() -> Self {
        Self::with_time_scale(1.0)
    }

    pub fn with_time_scale(time_scale: f64) -> Self {
        Self {
            next_id: 1,
            time_scale: if time_scale > 0.0 { time_scale } else { 1.0 },
            loaded: HashMap::new(),
            log: OutputLog::default(),
        }
    }

    pub fn log(&self) -> OutputLog {
        self.log.clone()
    }

    /// Number of handles currently loaded
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    fn active_slot(&mut self, handle: &AudioHandle) -> Result<&mut Option<ActiveRange>> {
        self.loaded
            .get_mut(&handle.id)
            .ok_or_else(|| PlaybackError::AudioOutput(format!("Handle {} is not loaded", handle.id)))
    }

    fn wall_time(media_ms: f64, rate: f32, time_scale: f64) -> Duration {
        let rate = if rate > 0.0 { rate as f64 } else { 1.0 };
        Duration::from_secs_f64((media_ms / rate / time_scale).max(0.0) / 1000.0)
    }
}

impl Default for SimulatedOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait out a range, following rate changes, then fire the callback
async fn run_range(
    duration_ms: f64,
    mut rate_rx: watch::Receiver<f32>,
    time_scale: f64,
    on_finished: FinishCallback,
) {
    let mut remaining_ms = duration_ms;
    let mut rate = *rate_rx.borrow();
    loop {
        let started = Instant::now();
        let wait = SimulatedOutput::wall_time(remaining_ms, rate, time_scale);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                on_finished();
                return;
            }
            changed = rate_rx.changed() => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                remaining_ms = (remaining_ms - elapsed_ms * rate as f64 * time_scale).max(0.0);
                if changed.is_err() {
                    tokio::time::sleep(SimulatedOutput::wall_time(remaining_ms, rate, time_scale)).await;
                    on_finished();
                    return;
                }
                rate = *rate_rx.borrow();
            }
        }
    }
}

impl AudioOutput for SimulatedOutput {
    fn load(&mut self, audio_path: &str) -> Result<AudioHandle> {
        let id = self.next_id;
        self.next_id += 1;
        self.loaded.insert(id, None);
        self.log.push(OutputEvent::Loaded {
            handle: id,
            audio_path: audio_path.to_string(),
        });
        debug!(handle = id, audio_path, "Simulated output loaded file");
        Ok(AudioHandle {
            id,
            audio_path: audio_path.to_string(),
        })
    }

    fn play_range(
        &mut self,
        handle: &AudioHandle,
        start_ms: f64,
        duration_ms: f64,
        rate: f32,
        on_finished: FinishCallback,
    ) -> Result<()> {
        let time_scale = self.time_scale;
        let slot = self.active_slot(handle)?;
        if let Some(previous) = slot.take() {
            previous.task.abort();
        }

        let (rate_tx, rate_rx) = watch::channel(rate);
        let task = tokio::spawn(run_range(duration_ms, rate_rx, time_scale, on_finished));
        *slot = Some(ActiveRange { task, rate_tx });

        self.log.push(OutputEvent::PlayRange {
            handle: handle.id,
            start_ms,
            duration_ms,
            rate,
        });
        Ok(())
    }

    fn set_rate(&mut self, handle: &AudioHandle, rate: f32) -> Result<()> {
        let slot = self.active_slot(handle)?;
        if let Some(active) = slot.as_ref() {
            // Receiver is gone once the range has finished
            let _ = active.rate_tx.send(rate);
        }
        self.log.push(OutputEvent::RateChanged {
            handle: handle.id,
            rate,
        });
        Ok(())
    }

    async fn stop(&mut self, handle: AudioHandle, fade: Duration) -> Result<()> {
        let Some(slot) = self.loaded.remove(&handle.id) else {
            return Ok(());
        };
        if let Some(active) = slot {
            if !fade.is_zero() && !active.task.is_finished() {
                tokio::time::sleep(fade.div_f64(self.time_scale)).await;
            }
            active.task.abort();
        }
        self.log.push(OutputEvent::Stopped { handle: handle.id });
        debug!(handle = handle.id, "Simulated output stopped file");
        Ok(())
    }
}
