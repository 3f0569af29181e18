//! Shared message types
//!
//! Wire format of the LAN mute protocol, plus the notices and status
//! snapshots the soundboard reports to its front-ends.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_PACKET_SIZE;
use crate::error::NetworkError;

/// Identity a peer announces in its messages
pub type PeerId = String;

/// Mute protocol command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MuteCommand {
    Mute,
    Unmute,
}

/// Datagram exchanged between peers
///
/// Encoded as `{"command":"MUTE","user":"<peer id>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteMessage {
    pub command: MuteCommand,
    pub user: PeerId,
}

impl MuteMessage {
    pub fn mute(user: impl Into<PeerId>) -> Self {
        Self {
            command: MuteCommand::Mute,
            user: user.into(),
        }
    }

    pub fn unmute(user: impl Into<PeerId>) -> Self {
        Self {
            command: MuteCommand::Unmute,
            user: user.into(),
        }
    }

    /// Encode for transmission
    pub fn encode(&self) -> Result<Vec<u8>, NetworkError> {
        let bytes = serde_json::to_vec(self).map_err(|_| NetworkError::InvalidPacket)?;
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(NetworkError::PacketTooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    /// Decode a received datagram
    ///
    /// Anything that is not a well-formed message with a non-empty sender is
    /// rejected.
    pub fn decode(data: &[u8]) -> Result<Self, NetworkError> {
        if data.len() > MAX_PACKET_SIZE {
            return Err(NetworkError::PacketTooLarge(data.len()));
        }
        let message: MuteMessage =
            serde_json::from_slice(data).map_err(|_| NetworkError::InvalidPacket)?;
        if message.user.trim().is_empty() {
            return Err(NetworkError::InvalidPacket);
        }
        Ok(message)
    }
}

/// Playback channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Hotkey/grid playback
    Main,
    /// Settings dialog preview
    Preview,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Main => write!(f, "main"),
            Channel::Preview => write!(f, "preview"),
        }
    }
}

/// Label the preview control should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreviewLabel {
    /// Preview stopped, control offers "Preview"
    Idle,
    /// Preview running, control offers "Stop"
    Playing,
}

/// User-facing notifications emitted by the soundboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// Main channel changed what it plays
    NowPlaying { sound: Option<String> },
    /// Preview control label changed
    Preview { label: PreviewLabel },
    /// Aggregate mute state changed
    MuteChanged { muted: bool, peers: Vec<PeerId> },
    /// Something degraded but playback continues
    Warning { message: String },
    /// An action failed
    Error { message: String },
}

/// Output device description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// Point-in-time view of the soundboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundboardStatus {
    pub peer_id: PeerId,
    pub now_playing: Option<String>,
    pub previewing: bool,
    pub boosted: bool,
    pub muted: bool,
    pub local_mute: bool,
    pub mute_peers: Vec<PeerId>,
    pub sound_count: usize,
}

/// Sound as listed to front-ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundSummary {
    pub name: String,
    pub hotkey: String,
    pub play_count: u64,
    pub last_played: Option<chrono::DateTime<chrono::Utc>>,
}
