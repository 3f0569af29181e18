//! Application configuration
//!
//! The whole soundboard state that survives restarts lives in one TOML
//! document: global settings, network and control API options, and the sound
//! library itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, LibraryError, Result};
use crate::library::SoundEntry;

/// Sentinel output device id meaning "system default"
pub const DEFAULT_DEVICE: &str = "default";

/// Complete persisted configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub settings: Settings,
    pub network: NetworkConfig,
    pub ui: UiConfig,
    pub sounds: BTreeMap<String, SoundEntry>,
}

/// Global playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Output device id, `"default"` for the system default
    pub output_device: String,

    /// Raise the system volume while a sound plays
    pub volume_boost_enabled: bool,

    /// Percentage points added to the system volume
    pub volume_boost_amount: u8,

    /// Display order of sound names
    pub sound_order: Vec<String>,

    /// Hotkey that opens the quick-play overlay
    pub overlay_hotkey: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_device: DEFAULT_DEVICE.to_string(),
            volume_boost_enabled: false,
            volume_boost_amount: DEFAULT_BOOST_AMOUNT,
            sound_order: Vec::new(),
            overlay_hotkey: DEFAULT_OVERLAY_HOTKEY.to_string(),
        }
    }
}

impl Settings {
    /// Whether a specific output device is selected
    pub fn uses_custom_device(&self) -> bool {
        !self.output_device.is_empty() && self.output_device != DEFAULT_DEVICE
    }
}

/// LAN mute synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Enable the LAN mute protocol
    pub enabled: bool,

    /// UDP port shared by all peers
    pub port: u16,

    /// Destination for broadcasts
    pub broadcast_address: Ipv4Addr,

    /// Interface to bind
    pub bind_address: Ipv4Addr,

    /// Identity announced to peers, generated when empty
    pub peer_id: String,

    /// Seconds without a repeated MUTE before a remote peer is dropped, 0 disables
    pub peer_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_MUTE_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            bind_address: Ipv4Addr::UNSPECIFIED,
            peer_id: String::new(),
            peer_timeout_secs: DEFAULT_PEER_TIMEOUT_SECS,
        }
    }
}

impl NetworkConfig {
    pub fn peer_timeout(&self) -> Option<Duration> {
        (self.peer_timeout_secs > 0).then(|| Duration::from_secs(self.peer_timeout_secs))
    }
}

/// Control API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Parse a TOML document and normalize it
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: AppConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Repair values older or hand-edited files may carry
    ///
    /// `sound_order` keeps only names that exist and gains any sound it is
    /// missing, so every sound appears exactly once. Clip settings outside
    /// their valid ranges fall back to the defaults.
    pub fn normalize(&mut self) {
        let sounds = &self.sounds;
        let mut seen = std::collections::HashSet::new();
        self.settings
            .sound_order
            .retain(|name| sounds.contains_key(name) && seen.insert(name.clone()));
        for name in self.sounds.keys() {
            if !seen.contains(name) {
                self.settings.sound_order.push(name.clone());
            }
        }

        for (name, sound) in self.sounds.iter_mut() {
            if sound.settings.repair() {
                tracing::warn!("Reset out-of-range playback settings of \"{}\"", name);
            }
        }

        if self.settings.output_device.is_empty() {
            self.settings.output_device = DEFAULT_DEVICE.to_string();
        }
        if self.settings.volume_boost_amount == 0 {
            self.settings.volume_boost_amount = DEFAULT_BOOST_AMOUNT;
        }
        if self.settings.overlay_hotkey.is_empty() {
            self.settings.overlay_hotkey = DEFAULT_OVERLAY_HOTKEY.to_string();
        }
        if self.network.peer_id.trim().is_empty() {
            self.network.peer_id = default_peer_id();
        }
    }

    pub fn sound(&self, name: &str) -> Option<&SoundEntry> {
        self.sounds.get(name)
    }

    /// Sound names in display order
    pub fn ordered_names(&self) -> Vec<String> {
        self.settings.sound_order.clone()
    }

    /// Move a sound within the display order
    pub fn move_sound(&mut self, from: usize, to: usize) -> std::result::Result<(), LibraryError> {
        let len = self.settings.sound_order.len();
        if from >= len {
            return Err(LibraryError::IndexOutOfBounds(from));
        }
        if to >= len {
            return Err(LibraryError::IndexOutOfBounds(to));
        }
        let name = self.settings.sound_order.remove(from);
        self.settings.sound_order.insert(to, name);
        Ok(())
    }
}

/// Peer identity used when none is configured
pub fn default_peer_id() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("peer-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]))
}

/// Default location of the configuration file
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Default directory imported audio files are copied to
pub fn default_sounds_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("sounds"))
}

/// Persistence for [`AppConfig`]
pub trait ConfigStore: Send {
    fn load(&self) -> Result<AppConfig>;
    fn save(&self, config: &AppConfig) -> Result<()>;
}

/// TOML file store
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlConfigStore {
    /// Missing files yield the defaults
    fn load(&self) -> Result<AppConfig> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => AppConfig::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", self.path.display());
                let mut config = AppConfig::default();
                config.normalize();
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = config.to_toml()?;
        // The file on disk is either the old or the new document
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("Saved config to {}", self.path.display());
        Ok(())
    }
}
