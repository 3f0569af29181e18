//! # LAN Soundboard
//!
//! Hotkey soundboard with a shared mute across every soundboard on the LAN.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                              SOUNDBOARD PC                                │
//! │                                                                           │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐                         │
//! │  │  Console   │   │Control API │   │  Hotkeys*  │   (front-ends)          │
//! │  └─────┬──────┘   └─────┬──────┘   └─────┬──────┘                         │
//! │        └────────────────┼────────────────┘                                │
//! │                         ▼  Command queue (SoundboardHandle)               │
//! │  ┌────────────────────────────────────────────────────────────────────┐   │
//! │  │                  Soundboard actor (soundboard)                     │   │
//! │  │                                                                    │   │
//! │  │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────────────┐   │   │
//! │  │  │  Main slot   │  │ Preview slot │  │ Boost manager           │   │   │
//! │  │  │ (playback)   │  │ (playback)   │  │ (playback::boost)       │   │   │
//! │  │  └──────┬───────┘  └──────┬───────┘  └───────────┬─────────────┘   │   │
//! │  │         │  timers / end   │                      │                 │   │
//! │  │         │  watchers post  │                      ▼                 │   │
//! │  │         │  tagged events  │             ┌─────────────────┐        │   │
//! │  │         ▼                 ▼             │  System volume  │        │   │
//! │  │  ┌─────────────────────────────────┐    │ (audio::volume) │        │   │
//! │  │  │ Audio output (audio::rodio)     │    └─────────────────┘        │   │
//! │  │  └─────────────────────────────────┘                               │   │
//! │  │                                                                    │   │
//! │  │  ┌──────────────────────────┐   ┌────────────────────────────┐     │   │
//! │  │  │ Mute aggregator          │◄──┤ Mute broadcaster           │     │   │
//! │  │  │ (network::mute)          │   │ repeat MUTE / UNMUTE burst │     │   │
//! │  │  └────────────▲─────────────┘   └──────────────┬─────────────┘     │   │
//! │  └───────────────┼────────────────────────────────┼───────────────────┘   │
//! │                  │                                ▼                       │
//! │  ┌───────────────┴────────────────────────────────────────────────────┐   │
//! │  │        UDP transport (network::udp) - broadcast, shared port       │   │
//! │  │        Datagrams: {"command":"MUTE"|"UNMUTE","user":"<peer>"}      │   │
//! │  └────────────────────────────────────────────────────────────────────┘   │
//! └────────────────────────────────────┬──────────────────────────────────────┘
//!                                      │ UDP broadcast over LAN
//!                                      ▼
//!                          other soundboard PCs (same port)
//! ```
//!
//! `*` Global hotkeys belong to the embedding application, which forwards
//! them to [`soundboard::SoundboardHandle::play`].

pub mod audio;
pub mod config;
pub mod error;
pub mod library;
pub mod network;
pub mod playback;
pub mod protocol;
pub mod soundboard;
#[cfg(feature = "control-api")]
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Directory name used for config and data paths
    pub const APP_NAME: &str = "lan-soundboard";

    /// Configuration file name
    pub const CONFIG_FILE_NAME: &str = "soundboard.toml";

    /// Default boost in percentage points
    pub const DEFAULT_BOOST_AMOUNT: u8 = 20;

    /// Default hotkey of the quick-play overlay
    pub const DEFAULT_OVERLAY_HOTKEY: &str = "CommandOrControl+Shift+Space";

    /// UDP port shared by all peers
    pub const DEFAULT_MUTE_PORT: u16 = 41234;

    /// Seconds a remote mute stays valid without a repeat
    pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 5;

    /// Default port of the control API
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Maximum packet size for UDP
    pub const MAX_PACKET_SIZE: usize = 1472; // MTU - IP/UDP headers

    /// Interval of repeated MUTE broadcasts while locally muted
    pub const MUTE_REPEAT_INTERVAL_MS: u64 = 1000;

    /// UNMUTE copies sent when the local mute is released
    pub const UNMUTE_BURST_COUNT: usize = 10;

    /// Poll interval of the loop position watch
    pub const POSITION_WATCH_INTERVAL_MS: u64 = 20;

    /// Poll interval used to detect the natural end of a clip
    pub const END_POLL_INTERVAL_MS: u64 = 50;

    /// How often stale remote mutes are checked
    pub const PEER_EXPIRY_TICK_MS: u64 = 1000;

    /// Command queue depth of the soundboard actor
    pub const COMMAND_QUEUE_SIZE: usize = 64;

    /// First delay after a failed UDP receive, doubled per repeated failure
    pub const RECEIVE_BACKOFF_MS: u64 = 50;

    /// Longest delay between UDP receive attempts while they keep failing
    pub const RECEIVE_BACKOFF_MAX_MS: u64 = 1000;

    /// Slowest accepted playback rate
    pub const MIN_PLAYBACK_SPEED: f32 = 0.0625;

    /// Fastest accepted playback rate
    pub const MAX_PLAYBACK_SPEED: f32 = 16.0;

    /// Upper bound of trim start and end times (24 h)
    pub const MAX_TRIM_SECS: f64 = 86_400.0;
}
