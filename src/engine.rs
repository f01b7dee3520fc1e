//! The protocol engine: the event loop that drives a single transfer from
//! bootstrap until `State::Closed`, implementing RFC 1350's lockstep
//! DATA/ACK exchange with TID locking and exponential-backoff retransmit.

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::codec::{BLOCK_SIZE, MAX_PACKET, Packet};
use crate::session::{MAX_RETRIES, Session, State};
use crate::transport::WaitResult;

/// Result of applying the state-transition table to one decoded packet.
enum Transition {
    /// Malformed-block-number or unexpected-opcode case: no state change,
    /// timer and retry budget untouched.
    Unchanged,
    /// A state-advancing exchange; `Session::last_packet` now holds the
    /// next outbound packet.
    Advanced,
    /// Upload finished: the server ACKed the final DATA block.
    CloseSuccess,
    /// The peer reported an ERROR packet.
    CloseFailure(anyhow::Error),
}

/// Drives `session` until it closes, returning `Ok(())` on a completed
/// transfer or `Err` on any fatal condition (peer-reported error, exhausted
/// retry budget, local I/O failure).
pub async fn run(session: &mut Session) -> Result<()> {
    let mut recv_buf = vec![0u8; MAX_PACKET];

    loop {
        let now = crate::transport::Transport::now();

        // Step 1: possibly (re)transmit.
        let should_send = match session.timer {
            None => true,
            Some(deadline) => now >= deadline,
        };
        if should_send {
            session
                .transport
                .send(&session.last_packet, session.remote)
                .await?;
            if session.state == State::LastAckSent {
                session.state = State::Closed;
                return Ok(());
            }
        }

        // Step 2: arm/adjust the timer.
        let wait_for = match session.timer {
            None => {
                session.backoff = crate::session::INITIAL_BACKOFF;
                session.timer = Some(now + session.backoff);
                session.backoff
            }
            Some(deadline) if now >= deadline => {
                session.backoff *= 2;
                session.timer = Some(now + session.backoff);
                session.backoff
            }
            Some(deadline) => deadline.saturating_duration_since(now),
        };

        // Step 3: wait for readable or timeout.
        match session.transport.wait_readable(wait_for).await? {
            WaitResult::Timeout => {
                // Step 4: retry budget.
                session.retries_left -= 1;
                if session.retries_left == 0 {
                    bail!(
                        "timeout waiting for a reply in state {:?}, aborting after {MAX_RETRIES} retries",
                        session.state
                    );
                }
                continue;
            }
            WaitResult::Readable => {
                // Step 5: receive and decode.
                let Some((n, from)) = session.transport.recv(&mut recv_buf)? else {
                    continue; // spurious wakeup
                };

                if session.remote_fixed {
                    if from != session.remote {
                        session.log(format!("dropping datagram from unexpected peer {from}"));
                        continue;
                    }
                } else {
                    session.remote = from;
                    session.remote_fixed = true;
                }

                let pkt = match Packet::decode(&recv_buf[..n]) {
                    Ok(pkt) => pkt,
                    Err(e) => {
                        session.log(format!("malformed datagram from {from}: {e}"));
                        continue;
                    }
                };

                // Step 6: state transition.
                match apply(session, pkt).await? {
                    Transition::Unchanged => continue,
                    Transition::Advanced => session.reset_retry_budget(),
                    Transition::CloseSuccess => return Ok(()),
                    Transition::CloseFailure(e) => return Err(e),
                }
            }
        }
    }
}

/// The state-transition table, expressed as a pattern match over
/// `(state, packet)`.
async fn apply(session: &mut Session, pkt: Packet) -> Result<Transition> {
    match (session.state, pkt) {
        (State::RrqSent | State::AckSent, Packet::DATA { block_num, data }) => {
            if block_num != session.blkno {
                session.log(format!(
                    "ignoring DATA block {block_num}, expected {}",
                    session.blkno
                ));
                return Ok(Transition::Unchanged);
            }

            session
                .file
                .write_all(&data)
                .await
                .context("writing received block to local file")?;

            let is_last = data.len() < BLOCK_SIZE;
            let ack = Packet::ACK {
                block_num: session.blkno,
            };
            session.set_outbound(&ack)?;
            session.blkno = session.blkno.wrapping_add(1);
            session.state = if is_last {
                State::LastAckSent
            } else {
                State::AckSent
            };
            Ok(Transition::Advanced)
        }

        (State::RrqSent | State::AckSent, Packet::ERROR { code, msg }) => {
            eprintln!("server error {code}: {msg}");
            Ok(Transition::CloseFailure(anyhow!(
                "server reported error {code}: {msg}"
            )))
        }

        (State::RrqSent | State::AckSent, other) => {
            session.log(format!("unexpected packet while downloading: {other:?}"));
            Ok(Transition::Unchanged)
        }

        (State::WrqSent | State::DataSent | State::LastDataSent, Packet::ACK { block_num }) => {
            if block_num != session.blkno {
                session.log(format!(
                    "ignoring stale ACK {block_num}, expected {}",
                    session.blkno
                ));
                return Ok(Transition::Unchanged);
            }

            if session.state == State::LastDataSent {
                return Ok(Transition::CloseSuccess);
            }

            let mut block = vec![0u8; BLOCK_SIZE];
            let read = read_block(&mut session.file, &mut block)
                .await
                .context("reading next block from local file")?;
            block.truncate(read);

            let next_blkno = session.blkno.wrapping_add(1);
            let data = Packet::DATA {
                block_num: next_blkno,
                data: block,
            };
            session.set_outbound(&data)?;
            session.blkno = next_blkno;
            session.state = if read == BLOCK_SIZE {
                State::DataSent
            } else {
                State::LastDataSent
            };
            Ok(Transition::Advanced)
        }

        (State::WrqSent | State::DataSent | State::LastDataSent, Packet::ERROR { code, msg }) => {
            eprintln!("server error {code}: {msg}");
            Ok(Transition::CloseFailure(anyhow!(
                "server reported error {code}: {msg}"
            )))
        }

        (State::WrqSent | State::DataSent | State::LastDataSent, other) => {
            session.log(format!("unexpected packet while uploading: {other:?}"));
            Ok(Transition::Unchanged)
        }

        // Closed / LastAckSent never reach here: the main loop returns
        // before calling `apply` from those states.
        _ => Ok(Transition::Unchanged),
    }
}

/// Reads up to `buf.len()` bytes, looping across short reads, since a
/// single `AsyncRead::read` call is not guaranteed to fill the buffer even
/// when more file data remains.
async fn read_block(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
