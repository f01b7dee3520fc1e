//! Command-line surface: flags and positional arguments for a single
//! RRQ/WRQ run, in the classic `tftp get`/`put` style.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;

use crate::session::Direction;

/// A Trivial File Transfer Protocol (TFTP) client.
#[derive(Parser, Debug)]
#[command(name = "tftp-client", version, about)]
pub struct Cli {
    /// Server hostname.
    #[arg(short = 'h', long, default_value = "localhost")]
    pub host: String,

    /// Server port, numeric or the service name "tftp".
    #[arg(short = 'p', long, default_value = "69")]
    pub port: String,

    /// Download a file from the server.
    #[arg(short = 'r', long)]
    pub read: bool,

    /// Upload a file to the server.
    #[arg(short = 'w', long)]
    pub write: bool,

    /// Verbose logging to stderr.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Remote filename for `-r`; local filename for `-w`.
    pub file1: String,

    /// Local filename for `-r`; remote filename for `-w`. Defaults to
    /// `file1` when omitted.
    pub file2: Option<String>,
}

impl Cli {
    /// Exactly one of `-r`/`-w` must be given.
    pub fn direction(&self) -> Result<Direction> {
        match (self.read, self.write) {
            (true, false) => Ok(Direction::Read),
            (false, true) => Ok(Direction::Write),
            (false, false) => Err(anyhow!("one of -r (read) or -w (write) is required")),
            (true, true) => Err(anyhow!("-r and -w are mutually exclusive")),
        }
    }

    /// Numeric port or the well-known TFTP service name.
    pub fn resolve_port(&self) -> Result<u16> {
        if let Ok(port) = self.port.parse::<u16>() {
            return Ok(port);
        }
        match self.port.to_ascii_lowercase().as_str() {
            "tftp" => Ok(69),
            other => Err(anyhow!("unknown port or service name '{other}'")),
        }
    }

    /// Resolves the remote filename and local path. The second positional
    /// is direction-dependent: for `-r` it's the local destination, for
    /// `-w` it's the remote name (classic `tftp get`/`put` semantics). When
    /// omitted, both sides use `file1`.
    pub fn endpoints(&self, direction: Direction) -> (String, PathBuf) {
        match &self.file2 {
            None => (self.file1.clone(), PathBuf::from(&self.file1)),
            Some(second) => match direction {
                Direction::Read => (self.file1.clone(), PathBuf::from(second)),
                Direction::Write => (second.clone(), PathBuf::from(&self.file1)),
            },
        }
    }
}
