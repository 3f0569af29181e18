//! Network subsystem for the LAN mute protocol

pub mod broadcaster;
pub mod mute;
pub mod udp;

use async_trait::async_trait;

use crate::error::NetworkError;
use crate::protocol::MuteMessage;

pub use broadcaster::MuteBroadcaster;
pub use mute::MuteAggregator;
pub use udp::{create_socket, UdpTransport};

/// Fan-out of mute messages to every peer on the LAN
///
/// Delivery is unordered and unreliable.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &MuteMessage) -> Result<(), NetworkError>;
}
