//! Soundboard actor
//!
//! One task owns the configuration, both playback channels, the volume boost
//! and the mute state. Front-ends talk to it through a [`SoundboardHandle`];
//! timers and end watchers post [`PlaybackEvent`]s back to it, tagged with the
//! channel generation they belong to.

use chrono::Utc;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::output::{configure, halt, AudioHandle, AudioOutput};
use crate::audio::volume::SystemVolume;
use crate::config::{AppConfig, ConfigStore, DEFAULT_DEVICE};
use crate::constants::{COMMAND_QUEUE_SIZE, PEER_EXPIRY_TICK_MS, POSITION_WATCH_INTERVAL_MS};
use crate::error::{Error, LibraryError, Result};
use crate::library::{self, AudioFileStore, ClipSettings, SoundDraft};
use crate::network::{MuteAggregator, MuteBroadcaster, Transport};
use crate::playback::{ActivePlayback, BoostManager, PlaybackSlot, ScheduledTask};
use crate::protocol::{Channel, MuteMessage, Notice, PreviewLabel, SoundSummary, SoundboardStatus};

/// Settings-dialog preview of a file that is not saved yet
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewRequest {
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub settings: ClipSettings,
}

/// Partial update of the global settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub output_device: Option<String>,
    pub volume_boost_enabled: Option<bool>,
    pub volume_boost_amount: Option<u8>,
}

/// Reported by playback tasks
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Clip reached its natural end
    Ended { channel: Channel, generation: u64 },
    /// Trim end reached on a non-looping clip
    TrimElapsed {
        channel: Channel,
        generation: u64,
        label: String,
    },
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Play(String, Reply<()>),
    Preview(PreviewRequest, Reply<()>),
    Stop(Option<String>, Reply<bool>),
    StopAll(Reply<()>),
    SetLocalMute(bool, Reply<()>),
    SaveSound(SoundDraft, Reply<String>),
    RemoveSound(String, Reply<()>),
    MoveSound(usize, usize, Reply<()>),
    UpdateSettings(SettingsUpdate, Reply<()>),
    Status(oneshot::Sender<SoundboardStatus>),
    Sounds(oneshot::Sender<Vec<SoundSummary>>),
    Shutdown(oneshot::Sender<()>),
}

/// External collaborators the soundboard drives
pub struct Backends {
    pub output: Arc<dyn AudioOutput>,
    pub volume: Arc<dyn SystemVolume>,
    pub files: Arc<dyn AudioFileStore>,
    /// `None` keeps the mute state local
    pub transport: Option<Arc<dyn Transport>>,
}

pub struct Soundboard {
    config: AppConfig,
    store: Box<dyn ConfigStore>,
    output: Arc<dyn AudioOutput>,
    files: Arc<dyn AudioFileStore>,
    boost: BoostManager,
    main: PlaybackSlot,
    preview: PlaybackSlot,
    mute: MuteAggregator,
    broadcaster: Option<MuteBroadcaster>,
    notices: broadcast::Sender<Notice>,
    events_tx: mpsc::UnboundedSender<PlaybackEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<PlaybackEvent>>,
}

impl Soundboard {
    pub fn new(config: AppConfig, store: Box<dyn ConfigStore>, backends: Backends) -> Self {
        let peer_id = config.network.peer_id.clone();
        let mute = MuteAggregator::new(peer_id.clone(), config.network.peer_timeout());
        let broadcaster = backends
            .transport
            .map(|transport| MuteBroadcaster::new(transport, peer_id));
        let (notices, _) = broadcast::channel(64);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            store,
            output: backends.output,
            files: backends.files,
            boost: BoostManager::new(backends.volume),
            main: PlaybackSlot::new(Channel::Main),
            preview: PlaybackSlot::new(Channel::Preview),
            mute,
            broadcaster,
            notices,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Move the soundboard onto its own task
    pub fn spawn(self) -> (SoundboardHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (messages_tx, messages_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let handle = SoundboardHandle {
            commands: commands_tx,
            messages: messages_tx,
            notices: self.notices.clone(),
        };
        let task = tokio::spawn(self.run(commands_rx, messages_rx));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut messages: mpsc::Receiver<MuteMessage>) {
        let Some(mut events) = self.events_rx.take() else {
            tracing::error!("Soundboard started twice");
            return;
        };
        let mut expiry = tokio::time::interval(Duration::from_millis(PEER_EXPIRY_TICK_MS));
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Soundboard running as \"{}\" with {} sounds",
            self.mute.local_id(),
            self.config.sounds.len()
        );

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event).await,
                Some(message) = messages.recv() => self.on_network_message(&message),
                _ = expiry.tick() => self.expire_peers(),
            }
        }
        tracing::info!("Soundboard stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Play(name, reply) => {
                let _ = reply.send(self.play(&name).await);
            }
            Command::Preview(request, reply) => {
                let _ = reply.send(self.preview(request).await);
            }
            Command::Stop(name, reply) => {
                let _ = reply.send(Ok(self.stop(name.as_deref()).await));
            }
            Command::StopAll(reply) => {
                self.stop_all().await;
                let _ = reply.send(Ok(()));
            }
            Command::SetLocalMute(muted, reply) => {
                self.set_local_mute(muted).await;
                let _ = reply.send(Ok(()));
            }
            Command::SaveSound(draft, reply) => {
                let _ = reply.send(self.save_sound(draft).await);
            }
            Command::RemoveSound(name, reply) => {
                let _ = reply.send(self.remove_sound(&name).await);
            }
            Command::MoveSound(from, to, reply) => {
                let _ = reply.send(self.move_sound(from, to));
            }
            Command::UpdateSettings(update, reply) => {
                let _ = reply.send(self.update_settings(update));
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Sounds(reply) => {
                let _ = reply.send(self.sounds());
            }
            Command::Shutdown(reply) => {
                self.shutdown().await;
                let _ = reply.send(());
            }
        }
    }

    /// Play a sound on the main channel
    ///
    /// Playing the sound that is already audible stops it instead.
    pub async fn play(&mut self, name: &str) -> Result<()> {
        if self.mute.is_muted() {
            tracing::info!("Network mute active, ignoring \"{}\"", name);
            return Ok(());
        }

        let entry = self
            .config
            .sound(name)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(name.to_string()))?;
        entry.settings.validate()?;

        if self.main.is_playing(name) {
            tracing::debug!("\"{}\" toggled off", name);
            self.stop_channel(Channel::Main).await;
            return Ok(());
        }

        self.main.stop();
        if self.preview.stop().is_some() {
            self.notify(Notice::Preview {
                label: PreviewLabel::Idle,
            });
        }
        self.boost.restore().await;

        if let Some(sound) = self.config.sounds.get_mut(name) {
            sound.record_play(Utc::now());
        }
        self.persist("play statistics");

        let settings = self.config.settings.clone();
        self.boost
            .apply(settings.volume_boost_enabled, settings.volume_boost_amount)
            .await;

        let generation = self.main.next_generation();
        let handle = match self.output.open(&entry.path).await {
            Ok(handle) => handle,
            Err(e) => {
                self.boost.restore().await;
                self.notify_error(format!("Could not load \"{}\": {}", name, e));
                self.notify(Notice::NowPlaying { sound: None });
                return Err(e.into());
            }
        };
        if let Err(e) = configure(handle.as_ref(), &entry.settings) {
            tracing::warn!("Could not apply settings of \"{}\": {}", name, e);
        }

        if settings.uses_custom_device() {
            if let Err(e) = handle.bind_output(&settings.output_device).await {
                self.notify(Notice::Warning {
                    message: format!(
                        "Output device {} unavailable ({}), using the system default",
                        settings.output_device, e
                    ),
                });
                self.config.settings.output_device = DEFAULT_DEVICE.to_string();
                self.persist("output device");
            }
        }

        if let Err(e) = handle.play().await {
            halt(handle.as_ref());
            self.boost.restore().await;
            self.notify_error(format!("Could not play \"{}\": {}", name, e));
            self.notify(Notice::NowPlaying { sound: None });
            return Err(e.into());
        }

        let mut active = ActivePlayback::new(generation, name, handle, entry.settings);
        self.spawn_watchers(Channel::Main, &mut active);
        if self.main.install(active).is_err() {
            self.boost.restore().await;
            return Ok(());
        }

        tracing::info!("Playing \"{}\"", name);
        self.notify(Notice::NowPlaying {
            sound: Some(name.to_string()),
        });
        Ok(())
    }

    /// Preview a file from the settings dialog
    ///
    /// A running preview is stopped instead. The main channel keeps playing.
    pub async fn preview(&mut self, request: PreviewRequest) -> Result<()> {
        if self.mute.is_muted() {
            tracing::info!("Network mute active, ignoring preview");
            return Ok(());
        }

        if !self.preview.is_empty() {
            self.stop_channel(Channel::Preview).await;
            return Ok(());
        }

        let path = request
            .path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(LibraryError::MissingFile)?;
        request.settings.validate()?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.boost.restore().await;
        let settings = self.config.settings.clone();
        self.boost
            .apply(settings.volume_boost_enabled, settings.volume_boost_amount)
            .await;

        let generation = self.preview.next_generation();
        let handle = match self.output.open(&path).await {
            Ok(handle) => handle,
            Err(e) => {
                self.boost.restore().await;
                self.notify_error(format!("Could not load preview: {}", e));
                self.notify(Notice::Preview {
                    label: PreviewLabel::Idle,
                });
                return Err(e.into());
            }
        };
        if let Err(e) = configure(handle.as_ref(), &request.settings) {
            tracing::warn!("Could not apply preview settings: {}", e);
        }

        if settings.uses_custom_device() {
            if let Err(e) = handle.bind_output(&settings.output_device).await {
                self.notify(Notice::Warning {
                    message: format!(
                        "Output device {} unavailable ({}), previewing on the system default",
                        settings.output_device, e
                    ),
                });
            }
        }

        if let Err(e) = handle.play().await {
            halt(handle.as_ref());
            self.boost.restore().await;
            self.notify_error(format!("Could not play preview: {}", e));
            self.notify(Notice::Preview {
                label: PreviewLabel::Idle,
            });
            return Err(e.into());
        }

        let mut active = ActivePlayback::new(generation, label, handle, request.settings);
        self.spawn_watchers(Channel::Preview, &mut active);
        if self.preview.install(active).is_err() {
            self.boost.restore().await;
            return Ok(());
        }

        tracing::debug!("Previewing {}", path.display());
        self.notify(Notice::Preview {
            label: PreviewLabel::Playing,
        });
        Ok(())
    }

    /// Stop the main channel
    ///
    /// With a name, only stops when that sound is the one playing. Returns
    /// whether anything was stopped.
    pub async fn stop(&mut self, name: Option<&str>) -> bool {
        if let Some(name) = name {
            if self.main.label() != Some(name) {
                return false;
            }
        }
        self.stop_channel(Channel::Main).await
    }

    /// Stop both channels
    pub async fn stop_all(&mut self) {
        self.stop_channel(Channel::Main).await;
        self.stop_channel(Channel::Preview).await;
    }

    async fn stop_channel(&mut self, channel: Channel) -> bool {
        let stopped = self.slot_mut(channel).stop();
        self.boost.restore().await;
        match stopped {
            Some(label) => {
                tracing::debug!("Stopped \"{}\" on {}", label, channel);
                self.notify_idle(channel);
                true
            }
            None => false,
        }
    }

    fn slot_mut(&mut self, channel: Channel) -> &mut PlaybackSlot {
        match channel {
            Channel::Main => &mut self.main,
            Channel::Preview => &mut self.preview,
        }
    }

    /// Start the end watcher and the trim timer or loop watch for a playback
    fn spawn_watchers(&self, channel: Channel, active: &mut ActivePlayback) {
        let generation = active.generation;

        let handle = active.handle.clone();
        let events = self.events_tx.clone();
        active.attach(ScheduledTask::spawn(async move {
            handle.ended().await;
            let _ = events.send(PlaybackEvent::Ended { channel, generation });
        }));

        let settings = active.settings;
        match settings.trim() {
            Some(_) if !settings.looping => {
                let Some(duration) = settings.trim_duration() else {
                    return;
                };
                let events = self.events_tx.clone();
                let label = active.label.clone();
                active.attach(ScheduledTask::spawn(async move {
                    tokio::time::sleep(duration).await;
                    let _ = events.send(PlaybackEvent::TrimElapsed {
                        channel,
                        generation,
                        label,
                    });
                }));
            }
            Some((start, end)) => {
                let handle = active.handle.clone();
                active.attach(ScheduledTask::spawn(watch_loop(handle, start, end)));
            }
            None => {}
        }
    }

    async fn handle_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Ended { channel, generation } => {
                let Some(finished) = self.slot_mut(channel).finish(generation) else {
                    tracing::trace!("Stale end event on {} ({})", channel, generation);
                    return;
                };
                tracing::debug!("\"{}\" finished on {}", finished.label, channel);
                self.boost.restore().await;
                self.notify_idle(channel);
            }
            PlaybackEvent::TrimElapsed {
                channel,
                generation,
                label,
            } => {
                let slot = self.slot_mut(channel);
                if slot.label() != Some(label.as_str()) {
                    return;
                }
                let Some(finished) = slot.finish(generation) else {
                    tracing::trace!("Stale trim event on {} ({})", channel, generation);
                    return;
                };
                finished.handle.pause();
                if let Err(e) = finished.handle.seek(finished.settings.start_offset()) {
                    tracing::debug!("Rewind to trim start failed: {}", e);
                }
                finished.handle.clear();
                tracing::debug!("\"{}\" reached its trim end", label);
                self.boost.restore().await;
                self.notify_idle(channel);
            }
        }
    }

    /// Assert or release the local mute
    pub async fn set_local_mute(&mut self, muted: bool) {
        if self.mute.is_locally_muted() == muted {
            return;
        }
        self.mute.set_local(muted);
        if let Some(broadcaster) = self.broadcaster.as_mut() {
            if muted {
                broadcaster.start_mute().await;
            } else {
                broadcaster.stop_mute().await;
            }
        }
        tracing::info!("Local mute {}", if muted { "on" } else { "off" });
        self.notify_mute();
    }

    /// Apply a message received from a peer
    pub fn on_network_message(&mut self, message: &MuteMessage) {
        if self.mute.on_message(message) {
            tracing::info!("{:?} from {}", message.command, message.user);
            self.notify_mute();
        }
    }

    fn expire_peers(&mut self) {
        if !self.mute.expire(tokio::time::Instant::now()).is_empty() {
            self.notify_mute();
        }
    }

    pub fn is_muted(&self) -> bool {
        self.mute.is_muted()
    }

    /// Add or edit a sound
    pub async fn save_sound(&mut self, draft: SoundDraft) -> Result<String> {
        let name = library::save_sound(&mut self.config, self.files.as_ref(), draft).await?;
        self.persist("sound library");
        Ok(name)
    }

    /// Remove a sound, stopping it first when it is playing
    pub async fn remove_sound(&mut self, name: &str) -> Result<()> {
        if !self.config.sounds.contains_key(name) {
            return Err(LibraryError::NotFound(name.to_string()).into());
        }
        if self.main.label() == Some(name) {
            self.stop_channel(Channel::Main).await;
        }
        library::remove_sound(&mut self.config, self.files.as_ref(), name).await?;
        self.persist("sound library");
        Ok(())
    }

    pub fn move_sound(&mut self, from: usize, to: usize) -> Result<()> {
        self.config.move_sound(from, to)?;
        self.persist("sound order");
        Ok(())
    }

    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<()> {
        if let Some(amount) = update.volume_boost_amount {
            if amount == 0 || amount > 100 {
                return Err(LibraryError::InvalidSettings(format!(
                    "boost amount {} outside 1-100",
                    amount
                ))
                .into());
            }
        }

        let settings = &mut self.config.settings;
        if let Some(device) = update.output_device {
            settings.output_device = if device.trim().is_empty() {
                DEFAULT_DEVICE.to_string()
            } else {
                device
            };
        }
        if let Some(enabled) = update.volume_boost_enabled {
            settings.volume_boost_enabled = enabled;
        }
        if let Some(amount) = update.volume_boost_amount {
            settings.volume_boost_amount = amount;
        }
        self.persist("settings");
        Ok(())
    }

    pub fn status(&self) -> SoundboardStatus {
        SoundboardStatus {
            peer_id: self.mute.local_id().to_string(),
            now_playing: self.main.label().map(str::to_string),
            previewing: !self.preview.is_empty(),
            boosted: self.boost.is_boosted(),
            muted: self.mute.is_muted(),
            local_mute: self.mute.is_locally_muted(),
            mute_peers: self.mute.peers(),
            sound_count: self.config.sounds.len(),
        }
    }

    /// Sounds in display order
    pub fn sounds(&self) -> Vec<SoundSummary> {
        self.config
            .ordered_names()
            .into_iter()
            .filter_map(|name| {
                let entry = self.config.sound(&name)?;
                Some(SoundSummary {
                    hotkey: entry.hotkey.clone(),
                    play_count: entry.play_count,
                    last_played: entry.last_played,
                    name,
                })
            })
            .collect()
    }

    async fn shutdown(&mut self) {
        self.stop_all().await;
        if self.mute.is_locally_muted() {
            self.set_local_mute(false).await;
        }
    }

    /// Save the configuration, logging failures
    fn persist(&self, what: &str) {
        if let Err(e) = self.store.save(&self.config) {
            tracing::warn!("Failed to save {}: {}", what, e);
        }
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    fn notify_error(&self, message: String) {
        tracing::error!("{}", message);
        self.notify(Notice::Error { message });
    }

    fn notify_idle(&self, channel: Channel) {
        match channel {
            Channel::Main => self.notify(Notice::NowPlaying { sound: None }),
            Channel::Preview => self.notify(Notice::Preview {
                label: PreviewLabel::Idle,
            }),
        }
    }

    fn notify_mute(&self) {
        self.notify(Notice::MuteChanged {
            muted: self.mute.is_muted(),
            peers: self.mute.peers(),
        });
    }
}

/// Keep a looping clip inside its trimmed range
async fn watch_loop(handle: Arc<dyn AudioHandle>, start: Duration, end: Duration) {
    let mut ticker = tokio::time::interval(Duration::from_millis(POSITION_WATCH_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if handle.position() >= end {
            if let Err(e) = handle.seek(start) {
                tracing::debug!("Loop rewind failed: {}", e);
            }
        }
    }
}

/// Cloneable front-end access to a running [`Soundboard`]
#[derive(Clone)]
pub struct SoundboardHandle {
    commands: mpsc::Sender<Command>,
    messages: mpsc::Sender<MuteMessage>,
    notices: broadcast::Sender<Notice>,
}

impl SoundboardHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    pub async fn play(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.request(|reply| Command::Play(name, reply)).await?
    }

    pub async fn preview(&self, request: PreviewRequest) -> Result<()> {
        self.request(|reply| Command::Preview(request, reply)).await?
    }

    /// Stop the main channel, optionally only when `name` is playing
    pub async fn stop(&self, name: Option<String>) -> Result<bool> {
        self.request(|reply| Command::Stop(name, reply)).await?
    }

    pub async fn stop_all(&self) -> Result<()> {
        self.request(Command::StopAll).await?
    }

    pub async fn set_local_mute(&self, muted: bool) -> Result<()> {
        self.request(|reply| Command::SetLocalMute(muted, reply)).await?
    }

    pub async fn save_sound(&self, draft: SoundDraft) -> Result<String> {
        self.request(|reply| Command::SaveSound(draft, reply)).await?
    }

    pub async fn remove_sound(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.request(|reply| Command::RemoveSound(name, reply)).await?
    }

    pub async fn move_sound(&self, from: usize, to: usize) -> Result<()> {
        self.request(|reply| Command::MoveSound(from, to, reply)).await?
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<()> {
        self.request(|reply| Command::UpdateSettings(update, reply)).await?
    }

    pub async fn status(&self) -> Result<SoundboardStatus> {
        self.request(Command::Status).await
    }

    pub async fn sounds(&self) -> Result<Vec<SoundSummary>> {
        self.request(Command::Sounds).await
    }

    /// Stop playback, release the local mute and end the actor
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    /// Sender for messages arriving from peers
    pub fn message_sender(&self) -> mpsc::Sender<MuteMessage> {
        self.messages.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }
}
