//! Mute state aggregated across peers
//!
//! The soundboard is muted while at least one peer, local or remote, asserts
//! MUTE. Membership changes are idempotent: a repeated MUTE only refreshes the
//! peer, an UNMUTE for an unknown peer does nothing.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::protocol::{MuteCommand, MuteMessage, PeerId};

pub struct MuteAggregator {
    local_id: PeerId,
    /// Peers asserting mute and when they last did
    peers: HashMap<PeerId, Instant>,
    /// Remote peers not refreshed within this window are dropped
    timeout: Option<Duration>,
}

impl MuteAggregator {
    pub fn new(local_id: impl Into<PeerId>, timeout: Option<Duration>) -> Self {
        Self {
            local_id: local_id.into(),
            peers: HashMap::new(),
            timeout,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Apply a received message, returning whether membership changed
    ///
    /// Our own broadcasts come back over the LAN; the local entry is driven by
    /// [`set_local`](Self::set_local) only, so those echoes are ignored.
    pub fn on_message(&mut self, message: &MuteMessage) -> bool {
        if message.user == self.local_id {
            return false;
        }
        self.apply(message.command, &message.user)
    }

    /// Set the local peer's own mute assertion
    pub fn set_local(&mut self, muted: bool) -> bool {
        let command = if muted {
            MuteCommand::Mute
        } else {
            MuteCommand::Unmute
        };
        let local_id = self.local_id.clone();
        self.apply(command, &local_id)
    }

    fn apply(&mut self, command: MuteCommand, peer: &str) -> bool {
        match command {
            MuteCommand::Mute => self.peers.insert(peer.to_string(), Instant::now()).is_none(),
            MuteCommand::Unmute => self.peers.remove(peer).is_some(),
        }
    }

    pub fn is_muted(&self) -> bool {
        !self.peers.is_empty()
    }

    pub fn is_locally_muted(&self) -> bool {
        self.peers.contains_key(&self.local_id)
    }

    /// Peers asserting mute, sorted
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.peers.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Drop remote peers whose last MUTE is older than the timeout
    pub fn expire(&mut self, now: Instant) -> Vec<PeerId> {
        let Some(timeout) = self.timeout else {
            return Vec::new();
        };

        let expired: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(peer, seen)| {
                peer.as_str() != self.local_id && now.saturating_duration_since(**seen) > timeout
            })
            .map(|(peer, _)| peer.clone())
            .collect();

        for peer in &expired {
            self.peers.remove(peer);
            tracing::info!("Mute from {} expired", peer);
        }
        expired
    }
}
