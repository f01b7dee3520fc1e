//! Resolves the remote endpoint, opens the local file, encodes the initial
//! RRQ/WRQ, and hands back a `Session` ready for `engine::run`.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tokio::fs::OpenOptions;
use tokio::net::lookup_host;

use crate::codec::Packet;
use crate::session::{Direction, INITIAL_BACKOFF, MAX_RETRIES, Session, State};
use crate::transport::Transport;

/// Everything the bootstrap step needs, independent of where it came from
/// (CLI, tests, or any other caller).
pub struct Request<'a> {
    pub host: &'a str,
    pub port: u16,
    pub direction: Direction,
    pub remote_file: &'a str,
    pub local_file: &'a Path,
    pub mode: &'a str,
    pub verbose: bool,
}

/// Resolves `host:port`, opens a socket against the first candidate
/// address that accepts one, opens the local file for the chosen
/// direction, and encodes the initial RRQ/WRQ.
pub async fn bootstrap(req: &Request<'_>) -> Result<Session> {
    let candidates: Vec<SocketAddr> = lookup_host((req.host, req.port))
        .await
        .with_context(|| format!("resolving {}:{}", req.host, req.port))?
        .collect();
    if candidates.is_empty() {
        return Err(anyhow!(
            "no addresses found for {}:{}",
            req.host,
            req.port
        ));
    }

    let mut bound: Option<(Transport, SocketAddr)> = None;
    for candidate in &candidates {
        if let Ok(transport) = Transport::bind(*candidate).await {
            bound = Some((transport, *candidate));
            break;
        }
    }
    let (transport, remote) = bound
        .ok_or_else(|| anyhow!("could not open a socket for any address resolved for {}:{}", req.host, req.port))?;

    let (file, blkno, state, initial_packet) = match req.direction {
        Direction::Read => {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(req.local_file)
                .await
                .with_context(|| format!("opening {} for writing", req.local_file.display()))?;
            let pkt = Packet::RRQ {
                filename: req.remote_file.to_string(),
                mode: req.mode.to_string(),
            };
            (file, 1u16, State::RrqSent, pkt)
        }
        Direction::Write => {
            let file = OpenOptions::new()
                .read(true)
                .open(req.local_file)
                .await
                .with_context(|| format!("opening {} for reading", req.local_file.display()))?;
            let pkt = Packet::WRQ {
                filename: req.remote_file.to_string(),
                mode: req.mode.to_string(),
            };
            (file, 0u16, State::WrqSent, pkt)
        }
    };

    let last_packet = initial_packet.encode().context("encoding initial request")?;

    Ok(Session {
        remote,
        remote_fixed: false,
        transport,
        file,
        direction: req.direction,
        blkno,
        state,
        last_packet,
        timer: None,
        backoff: INITIAL_BACKOFF,
        retries_left: MAX_RETRIES,
        verbose: req.verbose,
    })
}
