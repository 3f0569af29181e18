//! Test doubles for the soundboard's external collaborators

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::audio::output::{AudioHandle, AudioOutput};
use crate::audio::volume::SystemVolume;
use crate::config::{AppConfig, ConfigStore};
use crate::error::{AudioError, Error, LibraryError, NetworkError, Result, VolumeError};
use crate::library::AudioFileStore;
use crate::network::Transport;
use crate::protocol::MuteMessage;

/// System volume kept in memory
pub struct MockVolume {
    level: Mutex<u8>,
    writes: Mutex<Vec<u8>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockVolume {
    pub fn new(level: u8) -> Arc<Self> {
        Arc::new(Self {
            level: Mutex::new(level),
            writes: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn level(&self) -> u8 {
        *self.level.lock()
    }

    /// Successful writes in order
    pub fn writes(&self) -> Vec<u8> {
        self.writes.lock().clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SystemVolume for MockVolume {
    async fn get_volume(&self) -> std::result::Result<u8, VolumeError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(VolumeError::ReadFailed("mock".to_string()));
        }
        Ok(self.level())
    }

    async fn set_volume(&self, level: u8) -> std::result::Result<(), VolumeError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VolumeError::WriteFailed {
                level,
                reason: "mock".to_string(),
            });
        }
        *self.level.lock() = level;
        self.writes.lock().push(level);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct HandleState {
    volume: f32,
    speed: f32,
    looping: bool,
    position: Duration,
    seeks: Vec<Duration>,
    device: Option<String>,
    paused: bool,
    cleared: bool,
    finished: bool,
}

/// Audio handle whose lifecycle is driven by the test
pub struct MockHandle {
    path: PathBuf,
    state: Mutex<HandleState>,
    end: Notify,
    fail_play: AtomicBool,
    fail_bind: AtomicBool,
}

impl MockHandle {
    pub fn new() -> Arc<Self> {
        Self::with_path("mock.wav")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            state: Mutex::new(HandleState {
                volume: 1.0,
                speed: 1.0,
                looping: false,
                position: Duration::ZERO,
                seeks: Vec::new(),
                device: None,
                paused: true,
                cleared: false,
                finished: false,
            }),
            end: Notify::new(),
            fail_play: AtomicBool::new(false),
            fail_bind: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark as playing without going through `play`
    pub fn start(&self) {
        self.state.lock().paused = false;
    }

    /// Simulate the clip reaching its natural end
    pub fn finish(&self) {
        {
            let mut state = self.state.lock();
            state.finished = true;
            state.paused = true;
        }
        self.end.notify_waiters();
    }

    /// Simulate playback progress
    pub fn set_position(&self, position: Duration) {
        self.state.lock().position = position;
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn speed(&self) -> f32 {
        self.state.lock().speed
    }

    pub fn looping(&self) -> bool {
        self.state.lock().looping
    }

    pub fn seeks(&self) -> Vec<Duration> {
        self.state.lock().seeks.clone()
    }

    pub fn device(&self) -> Option<String> {
        self.state.lock().device.clone()
    }

    pub fn is_cleared(&self) -> bool {
        self.state.lock().cleared
    }
}

#[async_trait]
impl AudioHandle for MockHandle {
    fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume;
    }

    fn set_speed(&self, speed: f32) {
        self.state.lock().speed = speed;
    }

    fn set_looping(&self, looping: bool) {
        self.state.lock().looping = looping;
    }

    fn seek(&self, position: Duration) -> std::result::Result<(), AudioError> {
        let mut state = self.state.lock();
        state.position = position;
        state.seeks.push(position);
        Ok(())
    }

    fn position(&self) -> Duration {
        self.state.lock().position
    }

    async fn bind_output(&self, device_id: &str) -> std::result::Result<(), AudioError> {
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceNotFound(device_id.to_string()));
        }
        self.state.lock().device = Some(device_id.to_string());
        Ok(())
    }

    async fn play(&self) -> std::result::Result<(), AudioError> {
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(AudioError::PlaybackRejected("mock".to_string()));
        }
        self.state.lock().paused = false;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.cleared = true;
        state.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn is_finished(&self) -> bool {
        let state = self.state.lock();
        state.finished || state.cleared
    }

    async fn ended(&self) {
        loop {
            let notified = self.end.notified();
            if self.state.lock().finished {
                return;
            }
            notified.await;
        }
    }
}

/// Audio output handing out [`MockHandle`]s
#[derive(Default)]
pub struct MockOutput {
    handles: Mutex<Vec<Arc<MockHandle>>>,
    fail_open: AtomicBool,
    fail_play: AtomicBool,
    fail_bind: AtomicBool,
}

impl MockOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every handle opened so far
    pub fn handles(&self) -> Vec<Arc<MockHandle>> {
        self.handles.lock().clone()
    }

    pub fn last(&self) -> Option<Arc<MockHandle>> {
        self.handles.lock().last().cloned()
    }

    pub fn open_count(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Handles opened from now on reject `play`
    pub fn fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    /// Handles opened from now on reject `bind_output`
    pub fn fail_bind(&self, fail: bool) {
        self.fail_bind.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioOutput for MockOutput {
    async fn open(&self, path: &Path) -> std::result::Result<Arc<dyn AudioHandle>, AudioError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(AudioError::OpenFailed {
                path: path.display().to_string(),
                reason: "mock".to_string(),
            });
        }
        let handle = MockHandle::with_path(path);
        handle
            .fail_play
            .store(self.fail_play.load(Ordering::SeqCst), Ordering::SeqCst);
        handle
            .fail_bind
            .store(self.fail_bind.load(Ordering::SeqCst), Ordering::SeqCst);
        self.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

/// Transport recording what was sent
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<MuteMessage>>,
    fail: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<MuteMessage> {
        self.sent.lock().clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: &MuteMessage) -> std::result::Result<(), NetworkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NetworkError::SendFailed("mock".to_string()));
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Config store kept in memory
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    saved: Arc<Mutex<Option<AppConfig>>>,
    saves: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Option<AppConfig> {
        self.saved.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<AppConfig> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, config: &AppConfig) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Config("mock save failure".to_string()));
        }
        *self.saved.lock() = Some(config.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// File store that only records what it was asked to do
#[derive(Default)]
pub struct MemoryFileStore {
    imported: Mutex<Vec<PathBuf>>,
    deleted: Mutex<Vec<PathBuf>>,
}

impl MemoryFileStore {
    pub fn imported(&self) -> Vec<PathBuf> {
        self.imported.lock().clone()
    }

    pub fn deleted(&self) -> Vec<PathBuf> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl AudioFileStore for MemoryFileStore {
    async fn import(&self, source: &Path) -> std::result::Result<PathBuf, LibraryError> {
        let mut imported = self.imported.lock();
        let stored = PathBuf::from("store").join(format!(
            "{}-{}",
            imported.len(),
            source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        ));
        imported.push(source.to_path_buf());
        Ok(stored)
    }

    async fn delete(&self, path: &Path) -> std::result::Result<(), LibraryError> {
        self.deleted.lock().push(path.to_path_buf());
        Ok(())
    }
}
