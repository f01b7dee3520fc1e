//! Thin wrapper around datagram send/receive and a bounded wait primitive.
//! The engine's one suspension point lives in `wait_readable`.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Outcome of `wait_readable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Readable,
    Timeout,
}

pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    /// Binds an ephemeral, unconnected datagram socket in the same address
    /// family as `peer`.
    pub async fn bind(peer: SocketAddr) -> Result<Self> {
        let bind_addr: SocketAddr = if peer.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .context("binding local UDP socket")?;
        Ok(Self { socket })
    }

    /// Datagram send. UDP can't partially send, so any `Ok` return is
    /// complete.
    pub async fn send(&self, buf: &[u8], to: SocketAddr) -> Result<()> {
        self.socket.send_to(buf, to).await.context("UDP send")?;
        Ok(())
    }

    /// Blocks up to `timeout_dur` for the socket to have at least one
    /// datagram available, without consuming it.
    pub async fn wait_readable(&self, timeout_dur: Duration) -> Result<WaitResult> {
        match timeout(timeout_dur, self.socket.readable()).await {
            Ok(Ok(())) => Ok(WaitResult::Readable),
            Ok(Err(e)) => Err(e).context("waiting for socket readiness"),
            Err(_) => Ok(WaitResult::Timeout),
        }
    }

    /// Reads one datagram, expected to be available after `wait_readable`
    /// returned `Readable`. Returns `Ok(None)` on a spurious wakeup (the
    /// readiness notification raced with another reader draining the
    /// socket) rather than treating it as fatal.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match self.socket.try_recv_from(buf) {
            Ok((n, from)) => Ok(Some((n, from))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e).context("UDP recv"),
        }
    }

    /// Monotonic clock read, at least microsecond resolution.
    pub fn now() -> Instant {
        Instant::now()
    }
}
