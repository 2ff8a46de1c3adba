//! Transport I/O (§4.1): the only place that touches the OS socket.
//! Wraps a single `UdpSocket` shared between the sending and receiving
//! halves of an endpoint, and turns the underlying blocking-with-timeout
//! recv into a bounded idle tick so the endpoint's background loop can
//! also service retransmit timers on the same cadence.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use crate::error::{GameNetError, Result};
use crate::packet::Packet;

/// Datagrams this large or larger are rejected before parsing; well above
/// any realistic game packet and far below the UDP/IPv4 practical ceiling,
/// it exists purely to bound the receive buffer.
const MAX_DATAGRAM: usize = 65536;

pub struct Transport {
    socket: Arc<UdpSocket>,
    remote: Option<SocketAddr>,
    malformed_drops: AtomicU64,
}

impl Transport {
    pub async fn bind(local_addr: SocketAddr, remote: Option<SocketAddr>) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr).await.map_err(GameNetError::Bind)?;
        debug!(local = %local_addr, remote = ?remote, "transport bound");
        Ok(Self {
            socket: Arc::new(socket),
            remote,
            malformed_drops: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Send a packet to the configured remote. Fails with `NoRemote` if
    /// this endpoint was opened receive-only.
    pub async fn emit(&self, packet: &Packet) -> Result<()> {
        let addr = self.remote.ok_or(GameNetError::NoRemote)?;
        self.emit_to(addr, packet).await
    }

    pub async fn emit_to(&self, addr: SocketAddr, packet: &Packet) -> Result<()> {
        let bytes = packet.encode();
        self.socket.send_to(&bytes, addr).await?;
        trace!(chan = ?packet.chan(), len = bytes.len(), peer = %addr, "sent datagram");
        Ok(())
    }

    /// Wait up to `timeout` for the next valid datagram. Malformed
    /// datagrams (too short, unknown channel) are dropped and counted,
    /// then the wait continues against the same deadline rather than
    /// resetting it -- a burst of garbage cannot starve timer servicing.
    pub async fn recv_tick(&self, timeout: Duration) -> Option<(SocketAddr, Packet)> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let recv = tokio::time::timeout(remaining, self.socket.recv_from(&mut buf)).await;
            let (len, from) = match recv {
                Ok(Ok(pair)) => pair,
                Ok(Err(err)) => {
                    warn!(error = %err, "socket recv error");
                    return None;
                }
                Err(_elapsed) => return None,
            };

            match Packet::decode(&buf[..len]) {
                Ok(packet) => return Some((from, packet)),
                Err(err) => {
                    let total = self.malformed_drops.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(error = %err, from = %from, total_dropped = total, "dropped malformed datagram");
                    continue;
                }
            }
        }
    }

    pub fn malformed_drop_count(&self) -> u64 {
        self.malformed_drops.load(Ordering::Relaxed)
    }
}
