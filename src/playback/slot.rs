//! Playback slots
//!
//! A slot holds at most one active playback per channel. Every start and stop
//! bumps the slot generation; timers and end watchers are tagged with the
//! generation they were created for, so anything they report after the slot
//! moved on is recognised as stale.

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::audio::output::{halt, AudioHandle};
use crate::library::ClipSettings;
use crate::protocol::Channel;

/// Background task owned by a playback
///
/// Aborted when cancelled or dropped.
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// What a channel is currently playing
pub struct ActivePlayback {
    pub generation: u64,
    /// Sound name on the main channel, file label on the preview channel
    pub label: String,
    pub handle: Arc<dyn AudioHandle>,
    pub settings: ClipSettings,
    tasks: Vec<ScheduledTask>,
}

impl ActivePlayback {
    pub fn new(
        generation: u64,
        label: impl Into<String>,
        handle: Arc<dyn AudioHandle>,
        settings: ClipSettings,
    ) -> Self {
        Self {
            generation,
            label: label.into(),
            handle,
            settings,
            tasks: Vec::new(),
        }
    }

    /// Tie a timer or watcher to this playback's lifetime
    pub fn attach(&mut self, task: ScheduledTask) {
        self.tasks.push(task);
    }

    #[cfg(test)]
    fn task_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    fn cancel_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.cancel();
        }
    }
}

/// One playback channel
pub struct PlaybackSlot {
    channel: Channel,
    generation: u64,
    active: Option<ActivePlayback>,
}

impl PlaybackSlot {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            generation: 0,
            active: None,
        }
    }

    /// Start a new generation, invalidating everything tagged with older ones
    pub fn next_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    #[cfg(test)]
    fn active(&self) -> Option<&ActivePlayback> {
        self.active.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none()
    }

    /// Label of the active playback
    pub fn label(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.label.as_str())
    }

    /// Whether `label` is active and still audible
    pub fn is_playing(&self, label: &str) -> bool {
        self.active
            .as_ref()
            .map(|a| a.label == label && a.handle.is_audible())
            .unwrap_or(false)
    }

    /// Whether `generation` is the one currently held
    pub fn holds(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .map(|a| a.generation == generation)
            .unwrap_or(false)
    }

    /// Make `playback` the active one
    ///
    /// Only the current generation can be installed; anything older is halted
    /// and handed back.
    pub fn install(&mut self, playback: ActivePlayback) -> Result<(), ActivePlayback> {
        if playback.generation != self.generation {
            halt(playback.handle.as_ref());
            return Err(playback);
        }
        if let Some(previous) = self.active.take() {
            release(previous);
        }
        tracing::debug!("{} channel now holds \"{}\"", self.channel, playback.label);
        self.active = Some(playback);
        Ok(())
    }

    /// Stop the active playback
    ///
    /// Pauses, rewinds and releases the handle, cancels its tasks and moves to
    /// a new generation. Returns the label of what was stopped.
    pub fn stop(&mut self) -> Option<String> {
        let playback = self.active.take()?;
        self.next_generation();
        let label = playback.label.clone();
        release(playback);
        tracing::debug!("{} channel stopped \"{}\"", self.channel, label);
        Some(label)
    }

    /// Drop the active playback if it is `generation`, without touching the handle
    ///
    /// Used when the clip finished on its own.
    pub fn finish(&mut self, generation: u64) -> Option<ActivePlayback> {
        if !self.holds(generation) {
            return None;
        }
        self.next_generation();
        let mut playback = self.active.take()?;
        playback.cancel_tasks();
        Some(playback)
    }
}

fn release(mut playback: ActivePlayback) {
    playback.cancel_tasks();
    halt(playback.handle.as_ref());
}
