//! Playback state: channel slots and the shared volume boost

pub mod boost;
pub mod slot;

pub use boost::BoostManager;
pub use slot::{ActivePlayback, PlaybackSlot, ScheduledTask};
