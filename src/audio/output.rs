//! Playable audio handles
//!
//! The playback core only talks to audio through these traits. A handle is one
//! opened clip: it is configured, optionally bound to an output device, started,
//! and then either reaches its natural end or gets paused and cleared.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AudioError;
use crate::library::ClipSettings;

/// Factory for audio handles
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Open a clip for playback
    async fn open(&self, path: &Path) -> Result<Arc<dyn AudioHandle>, AudioError>;
}

/// One opened clip
#[async_trait]
pub trait AudioHandle: Send + Sync {
    /// Clip gain (0.0 - 1.0)
    fn set_volume(&self, volume: f32);

    /// Playback rate
    fn set_speed(&self, speed: f32);

    /// Restart from the beginning at the natural end
    fn set_looping(&self, looping: bool);

    /// Move the playback position
    fn seek(&self, position: Duration) -> Result<(), AudioError>;

    /// Current playback position
    fn position(&self) -> Duration;

    /// Route the clip to an output device
    async fn bind_output(&self, device_id: &str) -> Result<(), AudioError>;

    /// Start playback, resolving once the device accepted it
    async fn play(&self) -> Result<(), AudioError>;

    fn pause(&self);

    /// Release the source; the handle is finished afterwards
    fn clear(&self);

    fn is_paused(&self) -> bool;

    /// The source has been exhausted or cleared
    fn is_finished(&self) -> bool;

    /// Resolves when the clip reaches its natural end
    async fn ended(&self);

    /// Playing and not yet finished
    fn is_audible(&self) -> bool {
        !self.is_paused() && !self.is_finished()
    }
}

/// Apply per-clip settings to a freshly opened handle
pub fn configure(handle: &dyn AudioHandle, settings: &ClipSettings) -> Result<(), AudioError> {
    handle.set_volume(settings.volume.clamp(0.0, 1.0));
    handle.set_speed(settings.speed);
    handle.set_looping(settings.looping);
    handle.seek(settings.start_offset())
}

/// Pause, rewind and release a handle
pub fn halt(handle: &dyn AudioHandle) {
    handle.pause();
    if let Err(e) = handle.seek(Duration::ZERO) {
        tracing::debug!("Rewind on halt failed: {}", e);
    }
    handle.clear();
}
