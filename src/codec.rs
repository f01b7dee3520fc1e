//! TFTP wire codec (RFC 1350 §5).
//!
//! Pure encode/decode functions over a tagged `Packet` enum — no I/O. A
//! single sum type with a pair of total functions keeps the engine's state
//! table in `engine.rs` a plain pattern match over `(State, Packet)`
//! instead of opcode out-parameters.

use anyhow::{Result, anyhow, bail};

const OPCODE_RRQ: u16 = 1;
const OPCODE_WRQ: u16 = 2;
const OPCODE_DATA: u16 = 3;
const OPCODE_ACK: u16 = 4;
const OPCODE_ERROR: u16 = 5;

/// Default and only data payload size this client negotiates (RFC 1350).
pub const BLOCK_SIZE: usize = 512;

/// Largest packet this client will ever send or accept: 4-byte header
/// plus a full data block.
pub const MAX_PACKET: usize = 4 + BLOCK_SIZE;

/// A fully parsed TFTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Packet {
    RRQ { filename: String, mode: String },
    WRQ { filename: String, mode: String },
    DATA { block_num: u16, data: Vec<u8> },
    ACK { block_num: u16 },
    ERROR { code: u16, msg: String },
}

impl Packet {
    /// Parse raw bytes into a `Packet`. Failure means "malformed, drop the
    /// datagram and keep waiting" — callers never treat this as fatal.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            bail!("packet too short");
        }
        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        match opcode {
            OPCODE_RRQ => decode_request(buf, true),
            OPCODE_WRQ => decode_request(buf, false),
            OPCODE_DATA => decode_data(buf),
            OPCODE_ACK => decode_ack(buf),
            OPCODE_ERROR => decode_error(buf),
            other => bail!("unknown opcode {other}"),
        }
    }

    /// Serialize the packet to bytes for transmission. Fails only for
    /// programming errors: a filename/mode or error message that would
    /// overflow the 516-byte envelope. DATA payloads are always produced by
    /// the engine at <= `BLOCK_SIZE` bytes, so that arm rejects anything
    /// larger as a caller bug rather than a wire condition.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Packet::RRQ { filename, mode } => encode_request(OPCODE_RRQ, filename, mode)?,
            Packet::WRQ { filename, mode } => encode_request(OPCODE_WRQ, filename, mode)?,
            Packet::DATA { block_num, data } => {
                if data.len() > BLOCK_SIZE {
                    bail!(
                        "DATA payload of {} bytes exceeds block size {BLOCK_SIZE}",
                        data.len()
                    );
                }
                let mut buf = Vec::with_capacity(4 + data.len());
                buf.extend_from_slice(&OPCODE_DATA.to_be_bytes());
                buf.extend_from_slice(&block_num.to_be_bytes());
                buf.extend_from_slice(data);
                buf
            }
            Packet::ACK { block_num } => {
                let mut buf = Vec::with_capacity(4);
                buf.extend_from_slice(&OPCODE_ACK.to_be_bytes());
                buf.extend_from_slice(&block_num.to_be_bytes());
                buf
            }
            Packet::ERROR { code, msg } => {
                let mut buf = Vec::with_capacity(5 + msg.len());
                buf.extend_from_slice(&OPCODE_ERROR.to_be_bytes());
                buf.extend_from_slice(&code.to_be_bytes());
                buf.extend_from_slice(msg.as_bytes());
                buf.push(0);
                if buf.len() > MAX_PACKET {
                    bail!("ERROR message too long for a single TFTP packet");
                }
                buf
            }
        };
        Ok(bytes)
    }
}

fn encode_request(opcode: u16, filename: &str, mode: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(4 + filename.len() + mode.len());
    buf.extend_from_slice(&opcode.to_be_bytes());
    buf.extend_from_slice(filename.as_bytes());
    buf.push(0);
    buf.extend_from_slice(mode.as_bytes());
    buf.push(0);
    if buf.len() > MAX_PACKET {
        bail!("filename/mode too long for a single TFTP packet");
    }
    Ok(buf)
}

/// Parse RRQ / WRQ: 2-byte opcode | filename\0 | mode\0
fn decode_request(buf: &[u8], is_read: bool) -> Result<Packet> {
    let payload = &buf[2..];
    let fields: Vec<&[u8]> = payload.split(|&b| b == 0).collect();
    if fields.len() < 2 {
        bail!("missing filename or mode");
    }

    let filename = String::from_utf8(fields[0].to_vec())?;
    let mode = String::from_utf8(fields[1].to_vec())?.to_ascii_lowercase();

    if filename.is_empty() {
        bail!("empty filename");
    }

    if is_read {
        Ok(Packet::RRQ { filename, mode })
    } else {
        Ok(Packet::WRQ { filename, mode })
    }
}

/// Parse DATA: 2-byte opcode | 2-byte block# | 0..512 bytes
fn decode_data(buf: &[u8]) -> Result<Packet> {
    if buf.len() < 4 {
        bail!("DATA packet too short");
    }
    let block_num = u16::from_be_bytes([buf[2], buf[3]]);
    let data = buf[4..].to_vec();
    if data.len() > BLOCK_SIZE {
        bail!("DATA payload of {} bytes exceeds {BLOCK_SIZE}", data.len());
    }
    Ok(Packet::DATA { block_num, data })
}

/// Parse ACK: 2-byte opcode | 2-byte block#
fn decode_ack(buf: &[u8]) -> Result<Packet> {
    if buf.len() < 4 {
        bail!("ACK packet too short");
    }
    let block_num = u16::from_be_bytes([buf[2], buf[3]]);
    Ok(Packet::ACK { block_num })
}

/// Parse ERROR: 2-byte opcode | 2-byte code | msg\0. Unlike a lenient
/// reader, this requires the NUL terminator to actually be present inside
/// the buffer, rather than defaulting to "rest of buffer" when it's
/// missing.
fn decode_error(buf: &[u8]) -> Result<Packet> {
    if buf.len() < 5 {
        bail!("ERROR packet too short");
    }
    let code = u16::from_be_bytes([buf[2], buf[3]]);
    let msg_bytes = &buf[4..];
    let end = msg_bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| anyhow!("ERROR message missing NUL terminator"))?;
    let msg = String::from_utf8_lossy(&msg_bytes[..end]).to_string();
    Ok(Packet::ERROR { code, msg })
}
