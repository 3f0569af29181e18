//! UDP broadcast transport
//!
//! Every peer binds the same port with address reuse enabled and sends to the
//! broadcast address, so each datagram reaches all soundboards on the segment,
//! including the sender itself.

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};

use crate::config::NetworkConfig;
use crate::constants::{MAX_PACKET_SIZE, RECEIVE_BACKOFF_MAX_MS, RECEIVE_BACKOFF_MS};
use crate::error::NetworkError;
use crate::network::Transport;
use crate::protocol::MuteMessage;

/// Create a broadcast-capable UDP socket bound to `addr`
pub fn create_socket(addr: SocketAddr) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket
        .set_reuse_port(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .set_broadcast(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

    UdpSocket::from_std(socket.into()).map_err(|e| NetworkError::BindFailed(e.to_string()))
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_invalid: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    invalid: AtomicU64,
}

/// Mute protocol over UDP broadcast
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    destination: SocketAddr,
    counters: Arc<Counters>,
}

impl UdpTransport {
    /// Bind the shared port from the network settings
    pub fn bind(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let local = SocketAddr::V4(SocketAddrV4::new(config.bind_address, config.port));
        let destination = SocketAddr::V4(SocketAddrV4::new(config.broadcast_address, config.port));
        let socket = create_socket(local)?;
        tracing::info!("Mute transport bound to {}, broadcasting to {}", local, destination);
        Ok(Self::from_socket(socket, destination))
    }

    pub fn from_socket(socket: UdpSocket, destination: SocketAddr) -> Self {
        Self {
            socket: Arc::new(socket),
            destination,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            packets_sent: self.counters.sent.load(Ordering::Relaxed),
            packets_received: self.counters.received.load(Ordering::Relaxed),
            packets_invalid: self.counters.invalid.load(Ordering::Relaxed),
        }
    }

    /// Decode incoming datagrams and forward them until `shutdown` fires
    ///
    /// Malformed datagrams are counted and dropped.
    pub fn spawn_receiver(
        &self,
        messages: mpsc::Sender<MuteMessage>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let socket = self.socket.clone();
        let counters = self.counters.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_PACKET_SIZE];
            let mut failures = 0u32;
            loop {
                let result = tokio::select! {
                    result = socket.recv_from(&mut buf) => result,
                    _ = &mut shutdown => break,
                };
                match result {
                    Ok((len, from)) => {
                        failures = 0;
                        match MuteMessage::decode(&buf[..len]) {
                            Ok(message) => {
                                counters.received.fetch_add(1, Ordering::Relaxed);
                                tracing::trace!("{:?} from {} ({})", message.command, message.user, from);
                                if messages.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                counters.invalid.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!("Dropped datagram from {}: {}", from, e);
                            }
                        }
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let error = NetworkError::ReceiveFailed(e.to_string());
                        if failures == 1 {
                            tracing::warn!("{}", error);
                        } else {
                            tracing::debug!("{} ({} in a row)", error, failures);
                        }
                        tokio::select! {
                            _ = tokio::time::sleep(receive_backoff(failures)) => {}
                            _ = &mut shutdown => break,
                        }
                    }
                }
            }
            tracing::debug!("Mute receiver stopped");
        })
    }
}

/// Delay before reading again after `failures` consecutive receive errors
fn receive_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    let ms = RECEIVE_BACKOFF_MS.saturating_mul(1 << exponent);
    Duration::from_millis(ms.min(RECEIVE_BACKOFF_MAX_MS))
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, message: &MuteMessage) -> Result<(), NetworkError> {
        let bytes = message.encode()?;
        self.socket
            .send_to(&bytes, self.destination)
            .await
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
