//! Sound library
//!
//! Clip definitions, their per-clip playback settings, and the add/edit/remove
//! operations the settings dialog performs on the configuration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::AppConfig;
use crate::constants::{MAX_PLAYBACK_SPEED, MAX_TRIM_SECS, MIN_PLAYBACK_SPEED};
use crate::error::LibraryError;

fn default_volume() -> f32 {
    1.0
}

fn default_speed() -> f32 {
    1.0
}

/// Per-clip playback settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipSettings {
    /// Clip gain (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Playback rate (0.0625 - 16.0)
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Restart when the clip (or its trimmed range) ends
    #[serde(default, rename = "loop")]
    pub looping: bool,

    /// Trim start in seconds
    #[serde(default)]
    pub start_time: f64,

    /// Trim end in seconds, 0 plays to the natural end
    #[serde(default)]
    pub end_time: f64,
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            speed: default_speed(),
            looping: false,
            start_time: 0.0,
            end_time: 0.0,
        }
    }
}

impl ClipSettings {
    /// Check the ranges the dialog enforces
    pub fn validate(&self) -> Result<(), LibraryError> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(LibraryError::InvalidSettings(format!(
                "volume {} outside 0.0-1.0",
                self.volume
            )));
        }
        if !(MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&self.speed) {
            return Err(LibraryError::InvalidSettings(format!(
                "speed {} outside {}-{}",
                self.speed, MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED
            )));
        }
        if !(0.0..=MAX_TRIM_SECS).contains(&self.start_time)
            || !(0.0..=MAX_TRIM_SECS).contains(&self.end_time)
        {
            return Err(LibraryError::InvalidSettings(format!(
                "trim times must lie within 0-{} seconds",
                MAX_TRIM_SECS
            )));
        }
        Ok(())
    }

    /// Replace out-of-range values with their defaults
    ///
    /// Returns whether anything changed.
    pub fn repair(&mut self) -> bool {
        let before = *self;
        if !(0.0..=1.0).contains(&self.volume) {
            self.volume = default_volume();
        }
        if !(MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&self.speed) {
            self.speed = default_speed();
        }
        if !(0.0..=MAX_TRIM_SECS).contains(&self.start_time) {
            self.start_time = 0.0;
        }
        if !(0.0..=MAX_TRIM_SECS).contains(&self.end_time) {
            self.end_time = 0.0;
        }
        *self != before
    }

    /// Position playback starts from
    pub fn start_offset(&self) -> Duration {
        Duration::try_from_secs_f64(self.start_time).unwrap_or(Duration::ZERO)
    }

    /// Trimmed range, only when `end_time > start_time`
    pub fn trim(&self) -> Option<(Duration, Duration)> {
        if self.end_time > self.start_time {
            Some((
                self.start_offset(),
                Duration::try_from_secs_f64(self.end_time).ok()?,
            ))
        } else {
            None
        }
    }

    /// Wall-clock length of the trimmed range at the configured speed
    pub fn trim_duration(&self) -> Option<Duration> {
        let (start, end) = self.trim()?;
        if !(self.speed > 0.0 && self.speed.is_finite()) {
            return None;
        }
        Duration::try_from_secs_f64(end.checked_sub(start)?.as_secs_f64() / self.speed as f64).ok()
    }
}

/// One configured clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEntry {
    /// Audio file owned by the file store
    pub path: PathBuf,

    /// Global hotkey combination (registration happens outside the core)
    #[serde(default)]
    pub hotkey: String,

    #[serde(flatten)]
    pub settings: ClipSettings,

    /// Number of initiated plays on the main channel
    #[serde(default)]
    pub play_count: u64,

    /// Time of the last initiated play
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_played: Option<DateTime<Utc>>,
}

impl SoundEntry {
    pub fn new(path: impl Into<PathBuf>, hotkey: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hotkey: hotkey.into(),
            settings: ClipSettings::default(),
            play_count: 0,
            last_played: None,
        }
    }

    /// Count one play
    pub fn record_play(&mut self, at: DateTime<Utc>) {
        self.play_count = self.play_count.saturating_add(1);
        self.last_played = Some(at);
    }
}

/// Add/edit form submitted by the settings dialog
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SoundDraft {
    /// Name of the sound being edited, `None` when adding
    pub original_name: Option<String>,
    pub name: String,
    pub hotkey: String,
    /// Selected audio file
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub settings: ClipSettings,
}

impl SoundDraft {
    /// Reject incomplete forms before anything is touched
    pub fn validate(&self, config: &AppConfig) -> Result<(), LibraryError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(LibraryError::MissingName);
        }
        if self.hotkey.trim().is_empty() {
            return Err(LibraryError::MissingHotkey);
        }
        match &self.path {
            Some(path) if !path.as_os_str().is_empty() => {}
            _ => return Err(LibraryError::MissingFile),
        }
        if self.original_name.as_deref() != Some(name) && config.sounds.contains_key(name) {
            return Err(LibraryError::DuplicateName(name.to_string()));
        }
        self.settings.validate()
    }
}

/// Storage for the audio files referenced by sounds
#[async_trait]
pub trait AudioFileStore: Send + Sync {
    /// Copy a user-selected file into the store, returning the stored path
    async fn import(&self, source: &Path) -> Result<PathBuf, LibraryError>;

    /// Delete a stored file
    async fn delete(&self, path: &Path) -> Result<(), LibraryError>;
}

/// File store backed by a local data directory
pub struct LocalFileStore {
    dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AudioFileStore for LocalFileStore {
    async fn import(&self, source: &Path) -> Result<PathBuf, LibraryError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| LibraryError::FileStore(e.to_string()))?;

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sound".to_string());
        let target = self.dir.join(format!("{}-{}", uuid::Uuid::new_v4().simple(), file_name));

        tokio::fs::copy(source, &target)
            .await
            .map_err(|e| LibraryError::FileStore(format!("{}: {}", source.display(), e)))?;

        tracing::debug!("Imported {} as {}", source.display(), target.display());
        Ok(target)
    }

    async fn delete(&self, path: &Path) -> Result<(), LibraryError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LibraryError::FileStore(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Add a new sound or apply an edit
///
/// Statistics survive edits and renames. A renamed sound keeps its position in
/// the display order; a new sound is appended. When the file changed, the new
/// file is imported and the previously stored one deleted.
pub async fn save_sound(
    config: &mut AppConfig,
    files: &dyn AudioFileStore,
    draft: SoundDraft,
) -> Result<String, LibraryError> {
    draft.validate(config)?;

    let name = draft.name.trim().to_string();
    let selected = draft.path.clone().ok_or(LibraryError::MissingFile)?;
    let previous = draft
        .original_name
        .as_deref()
        .and_then(|original| config.sounds.get(original))
        .cloned();

    let path = match &previous {
        Some(existing) if existing.path == selected => selected,
        _ => {
            let stored = files.import(&selected).await?;
            if let Some(existing) = &previous {
                if let Err(e) = files.delete(&existing.path).await {
                    tracing::warn!("Could not delete replaced file {}: {}", existing.path.display(), e);
                }
            }
            stored
        }
    };

    let (play_count, last_played) = previous
        .as_ref()
        .map(|p| (p.play_count, p.last_played))
        .unwrap_or((0, None));

    match draft.original_name.as_deref().filter(|_| previous.is_some()) {
        Some(original) if original != name => {
            config.sounds.remove(original);
            if let Some(slot) = config
                .settings
                .sound_order
                .iter_mut()
                .find(|n| n.as_str() == original)
            {
                *slot = name.clone();
            }
        }
        Some(_) => {}
        None => config.settings.sound_order.push(name.clone()),
    }

    config.sounds.insert(
        name.clone(),
        SoundEntry {
            path,
            hotkey: draft.hotkey.trim().to_string(),
            settings: draft.settings,
            play_count,
            last_played,
        },
    );

    tracing::info!("Saved sound \"{}\"", name);
    Ok(name)
}

/// Remove a sound and its stored file
///
/// A failing file delete is logged and the entry is removed anyway.
pub async fn remove_sound(
    config: &mut AppConfig,
    files: &dyn AudioFileStore,
    name: &str,
) -> Result<SoundEntry, LibraryError> {
    let entry = config
        .sounds
        .remove(name)
        .ok_or_else(|| LibraryError::NotFound(name.to_string()))?;

    if let Err(e) = files.delete(&entry.path).await {
        tracing::warn!("Could not delete audio file {}: {}", entry.path.display(), e);
    }

    config.settings.sound_order.retain(|n| n != name);
    tracing::info!("Removed sound \"{}\"", name);
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFileStore;

    fn draft(name: &str, path: &str) -> SoundDraft {
        SoundDraft {
            original_name: None,
            name: name.to_string(),
            hotkey: "Ctrl+1".to_string(),
            path: Some(PathBuf::from(path)),
            settings: ClipSettings::default(),
        }
    }

    #[test]
    fn test_trim_only_when_end_after_start() {
        let mut settings = ClipSettings::default();
        assert!(settings.trim().is_none());

        settings.start_time = 5.0;
        settings.end_time = 2.0;
        assert!(settings.trim().is_none());

        settings.start_time = 2.0;
        settings.end_time = 5.0;
        settings.speed = 2.0;
        assert_eq!(settings.trim_duration(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = ClipSettings::default();
        assert!(settings.validate().is_ok());

        settings.volume = 1.5;
        assert!(settings.validate().is_err());

        settings.volume = 0.5;
        settings.speed = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_extreme_timing_is_rejected_without_panicking() {
        let tiny_speed = ClipSettings {
            speed: 1e-30,
            end_time: 5.0,
            ..ClipSettings::default()
        };
        assert!(tiny_speed.validate().is_err());
        assert_eq!(tiny_speed.trim_duration(), None);

        let far_start = ClipSettings {
            start_time: 1e20,
            ..ClipSettings::default()
        };
        assert!(far_start.validate().is_err());
        assert_eq!(far_start.start_offset(), Duration::ZERO);

        let nan_end = ClipSettings {
            end_time: f64::NAN,
            ..ClipSettings::default()
        };
        assert!(nan_end.validate().is_err());
        assert!(nan_end.trim().is_none());

        for speed in [0.0, -1.0, f32::INFINITY, f32::NAN] {
            let settings = ClipSettings {
                speed,
                start_time: 2.0,
                end_time: 5.0,
                ..ClipSettings::default()
            };
            assert!(settings.validate().is_err());
            assert_eq!(settings.trim_duration(), None);
        }

        let fastest = ClipSettings {
            speed: MAX_PLAYBACK_SPEED,
            end_time: 16.0,
            ..ClipSettings::default()
        };
        assert!(fastest.validate().is_ok());
        assert_eq!(fastest.trim_duration(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_repair_resets_only_bad_fields() {
        let mut settings = ClipSettings {
            volume: 0.3,
            speed: f32::NAN,
            looping: true,
            start_time: -1.0,
            end_time: 4.0,
        };
        assert!(settings.repair());
        assert_eq!(settings.volume, 0.3);
        assert_eq!(settings.speed, 1.0);
        assert_eq!(settings.start_time, 0.0);
        assert_eq!(settings.end_time, 4.0);
        assert!(settings.looping);
        assert!(!settings.repair());
    }

    #[test]
    fn test_entry_deserializes_with_defaults() {
        let entry: SoundEntry =
            serde_json::from_str(r#"{"path":"a.mp3","play_count":3}"#).unwrap();
        assert_eq!(entry.settings.volume, 1.0);
        assert_eq!(entry.settings.speed, 1.0);
        assert!(!entry.settings.looping);
        assert_eq!(entry.play_count, 3);
    }

    #[tokio::test]
    async fn test_draft_rejections_leave_config_untouched() {
        let files = MemoryFileStore::default();
        let mut config = AppConfig::default();
        save_sound(&mut config, &files, draft("Laugh", "laugh.mp3")).await.unwrap();
        let before = config.clone();

        let missing_name = draft("  ", "x.mp3");
        assert_eq!(
            save_sound(&mut config, &files, missing_name).await,
            Err(LibraryError::MissingName)
        );

        let mut missing_hotkey = draft("Boo", "x.mp3");
        missing_hotkey.hotkey.clear();
        assert_eq!(
            save_sound(&mut config, &files, missing_hotkey).await,
            Err(LibraryError::MissingHotkey)
        );

        let mut missing_file = draft("Boo", "x.mp3");
        missing_file.path = None;
        assert_eq!(
            save_sound(&mut config, &files, missing_file).await,
            Err(LibraryError::MissingFile)
        );

        assert_eq!(
            save_sound(&mut config, &files, draft("Laugh", "other.mp3")).await,
            Err(LibraryError::DuplicateName("Laugh".to_string()))
        );

        assert_eq!(config, before);
    }

    #[tokio::test]
    async fn test_rename_keeps_stats_and_position() {
        let files = MemoryFileStore::default();
        let mut config = AppConfig::default();
        save_sound(&mut config, &files, draft("A", "a.mp3")).await.unwrap();
        save_sound(&mut config, &files, draft("B", "b.mp3")).await.unwrap();
        save_sound(&mut config, &files, draft("C", "c.mp3")).await.unwrap();

        config.sounds.get_mut("B").unwrap().play_count = 7;
        let stored_path = config.sounds["B"].path.clone();

        let mut edit = draft("Bee", "");
        edit.original_name = Some("B".to_string());
        edit.path = Some(stored_path.clone());
        save_sound(&mut config, &files, edit).await.unwrap();

        assert_eq!(config.settings.sound_order, vec!["A", "Bee", "C"]);
        assert!(!config.sounds.contains_key("B"));
        assert_eq!(config.sounds["Bee"].play_count, 7);
        assert_eq!(config.sounds["Bee"].path, stored_path);
        assert!(files.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_changed_file_replaces_stored_copy() {
        let files = MemoryFileStore::default();
        let mut config = AppConfig::default();
        save_sound(&mut config, &files, draft("A", "a.mp3")).await.unwrap();
        let old_path = config.sounds["A"].path.clone();

        let mut edit = draft("A", "new.mp3");
        edit.original_name = Some("A".to_string());
        save_sound(&mut config, &files, edit).await.unwrap();

        assert_ne!(config.sounds["A"].path, old_path);
        assert_eq!(files.deleted(), vec![old_path]);
        assert_eq!(config.settings.sound_order, vec!["A"]);
    }

    #[tokio::test]
    async fn test_remove_sound_deletes_file_and_order() {
        let files = MemoryFileStore::default();
        let mut config = AppConfig::default();
        save_sound(&mut config, &files, draft("A", "a.mp3")).await.unwrap();
        save_sound(&mut config, &files, draft("B", "b.mp3")).await.unwrap();

        let removed = remove_sound(&mut config, &files, "A").await.unwrap();
        assert_eq!(files.deleted(), vec![removed.path]);
        assert_eq!(config.settings.sound_order, vec!["B"]);

        assert_eq!(
            remove_sound(&mut config, &files, "A").await,
            Err(LibraryError::NotFound("A".to_string()))
        );
    }

    #[tokio::test]
    async fn test_local_store_import_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.wav");
        std::fs::write(&source, b"RIFF").unwrap();

        let store = LocalFileStore::new(dir.path().join("sounds"));
        let stored = store.import(&source).await.unwrap();
        assert!(stored.starts_with(store.dir()));
        assert!(stored.exists());

        store.delete(&stored).await.unwrap();
        assert!(!stored.exists());
        // Deleting twice is fine
        store.delete(&stored).await.unwrap();
    }
}
