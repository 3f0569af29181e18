//! Local mute announcements
//!
//! While the local user is muted, MUTE is repeated every second so peers that
//! missed a datagram (or joined later) converge. Releasing the mute sends a
//! burst of UNMUTE copies.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::{MUTE_REPEAT_INTERVAL_MS, UNMUTE_BURST_COUNT};
use crate::network::Transport;
use crate::playback::ScheduledTask;
use crate::protocol::{MuteMessage, PeerId};

pub struct MuteBroadcaster {
    transport: Arc<dyn Transport>,
    peer_id: PeerId,
    repeat: Option<ScheduledTask>,
}

impl MuteBroadcaster {
    pub fn new(transport: Arc<dyn Transport>, peer_id: impl Into<PeerId>) -> Self {
        Self {
            transport,
            peer_id: peer_id.into(),
            repeat: None,
        }
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat.is_some()
    }

    /// Announce MUTE now and keep repeating it until [`stop_mute`](Self::stop_mute)
    pub async fn start_mute(&mut self) {
        let message = MuteMessage::mute(self.peer_id.clone());
        send_logged(self.transport.as_ref(), &message).await;

        if self.repeat.is_some() {
            return;
        }

        let transport = self.transport.clone();
        let period = Duration::from_millis(MUTE_REPEAT_INTERVAL_MS);
        self.repeat = Some(ScheduledTask::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                send_logged(transport.as_ref(), &message).await;
            }
        }));
        tracing::debug!("Repeating MUTE every {:?}", period);
    }

    /// Cancel the repeat and send the UNMUTE burst
    pub async fn stop_mute(&mut self) {
        if let Some(repeat) = self.repeat.take() {
            repeat.cancel();
        }

        let message = MuteMessage::unmute(self.peer_id.clone());
        for _ in 0..UNMUTE_BURST_COUNT {
            send_logged(self.transport.as_ref(), &message).await;
        }
        tracing::debug!("Sent UNMUTE x{}", UNMUTE_BURST_COUNT);
    }
}

async fn send_logged(transport: &dyn Transport, message: &MuteMessage) {
    if let Err(e) = transport.send(message).await {
        tracing::warn!("Failed to send {:?}: {}", message.command, e);
    }
}
