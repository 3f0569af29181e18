//! Error types for the soundboard

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Soundboard is not running")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio output errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open source {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Playback rejected: {0}")]
    PlaybackRejected(String),

    #[error("Seek failed: {0}")]
    SeekFailed(String),

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// System volume errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VolumeError {
    #[error("Volume backend unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read volume: {0}")]
    ReadFailed(String),

    #[error("Failed to set volume to {level}: {reason}")]
    WriteFailed { level: u8, reason: String },
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    #[error("Invalid packet format")]
    InvalidPacket,
}

/// Sound library errors (user input and file store)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LibraryError {
    #[error("Sound not found: {0}")]
    NotFound(String),

    #[error("Sound name is required")]
    MissingName,

    #[error("Hotkey is required")]
    MissingHotkey,

    #[error("An audio file must be selected")]
    MissingFile,

    #[error("The name \"{0}\" is already in use")]
    DuplicateName(String),

    #[error("Invalid clip settings: {0}")]
    InvalidSettings(String),

    #[error("Order index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    #[error("File store error: {0}")]
    FileStore(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
