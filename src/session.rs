//! The single long-lived entity for one transfer: the negotiated peer, the
//! open file, and the retransmission bookkeeping RFC 1350's lockstep
//! DATA/ACK exchange needs.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::fs::File;

use crate::codec::Packet;
use crate::transport::Transport;

/// Direction of the single transfer this session drives. Immutable after
/// bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// RRQ: download from the server.
    Read,
    /// WRQ: upload to the server.
    Write,
}

/// Protocol state through one transfer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    RrqSent,
    WrqSent,
    DataSent,
    LastDataSent,
    AckSent,
    LastAckSent,
    Closed,
}

/// Initial retransmission interval.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Retry budget for a single outstanding packet.
pub const MAX_RETRIES: u32 = 6;

pub struct Session {
    /// Resolved server endpoint. Starts as the well-known server address;
    /// fixed to the server's chosen TID after the first received datagram.
    pub remote: SocketAddr,
    /// Whether `remote` has been fixed to the server's transfer ID yet.
    pub remote_fixed: bool,
    pub transport: Transport,
    pub file: File,
    pub direction: Direction,
    pub blkno: u16,
    pub state: State,
    /// Most recently encoded outbound packet; retransmission re-sends this
    /// verbatim. A `Vec<u8>` rather than a fixed buffer plus length, since
    /// the 516-byte ceiling is already enforced by `Packet::encode`.
    pub last_packet: Vec<u8>,
    /// Absolute deadline for the next retransmission. `None` means
    /// "not armed".
    pub timer: Option<Instant>,
    pub backoff: Duration,
    pub retries_left: u32,
    pub verbose: bool,
}

impl Session {
    /// Clears the retransmission timer.
    pub fn clear_timer(&mut self) {
        self.timer = None;
    }

    /// Resets the retry budget and clears the timer after a successfully
    /// acknowledged exchange.
    pub fn reset_retry_budget(&mut self) {
        self.retries_left = MAX_RETRIES;
        self.clear_timer();
    }

    /// Encodes `pkt` and installs it as the authoritative retransmission
    /// payload.
    pub fn set_outbound(&mut self, pkt: &Packet) -> Result<()> {
        self.last_packet = pkt.encode()?;
        Ok(())
    }

    pub fn log(&self, msg: impl AsRef<str>) {
        if self.verbose {
            eprintln!("{}", msg.as_ref());
        }
    }
}
