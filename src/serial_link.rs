//! Line oriented link with the firmware of one biosensor.
//!
//! The firmware speaks a very small ASCII protocol: the host sends one command
//! per line, and the firmware answers with lines of text. Lines starting with
//! `[` are the firmware's own debug traces (e.g. `[DEBUG] Connecting to
//! WiFi...`) and are never part of an answer, so [`SerialLink`] drops them
//! before the caller gets to see anything.
//!
//! **Example**
//! ```ignore
//! let mut link = SerialLink::new(port.path(), connector.open(&port)?);
//! link.send(Command::ConnectWifi)?;
//! while Sentinel::parse(&link.receive_line()?) != Some(Sentinel::WifiConnected) {}
//! ```

use std::{
    fmt,
    io::{self, ErrorKind},
    time::{Duration, Instant},
};

use hexplay::HexViewBuilder;
use log::{debug, log_enabled, trace, Level::Trace};
use thiserror::Error;

use crate::utils::Transport;

// =============================================================================
// Public Interface
// =============================================================================

/// Commands understood by the biosensor firmware.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Command {
    /// Asks for the JSON description of the device configuration.
    GetInfo,
    /// Keeps the firmware in its interactive mode instead of starting the
    /// autonomous sensing loop.
    ManagedMode,
    ConnectWifi,
    ConnectMqtt,
}
impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::GetInfo => "getInfo",
            Command::ManagedMode => "managedMode",
            Command::ConnectWifi => "connectWifi",
            Command::ConnectMqtt => "connectMqtt",
        }
    }
}
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lines used by the firmware to report the result of a connection attempt.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Sentinel {
    WifiConnected,
    WifiTimeout,
    MqttConnected,
    MqttTimeout,
}
impl Sentinel {
    /// Recognizes a sentinel line. Shipped firmware prints `MqttConnected!`,
    /// so one trailing `!` is tolerated.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.strip_suffix('!').unwrap_or(line);
        match line {
            "WifiConnected" => Some(Sentinel::WifiConnected),
            "WifiTimeout" => Some(Sentinel::WifiTimeout),
            "MqttConnected" => Some(Sentinel::MqttConnected),
            "MqttTimeout" => Some(Sentinel::MqttTimeout),
            _ => None,
        }
    }
}

/// Fatal failures of the serial line.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial line {0} was closed")]
    Closed(String),

    #[error("non-ASCII byte {byte:#04x} received on {port}")]
    Encoding { port: String, byte: u8 },

    #[error("no answer on {port} within {after:?}")]
    TimedOut { port: String, after: Duration },

    #[error("I/O error on {port}: {source}")]
    Io { port: String, source: io::Error },
}

/// A connection to one biosensor, exclusively owned by whoever drives the
/// biosensor at the moment. Dropping the link closes the port.
pub struct SerialLink {
    name: String,
    transport: Box<dyn Transport>,
    /// Bytes received after the last complete line.
    pending: Vec<u8>,
}
impl SerialLink {
    pub fn new(name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        SerialLink {
            name: name.into(),
            transport,
            pending: Vec::new(),
        }
    }

    /// The name of the port this link is connected to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends a command followed by the line terminator.
    pub fn send(&mut self, command: Command) -> Result<(), LinkError> {
        debug!("{} <- {}", self.name, command);
        let line = format!("{}\n", command);
        let written = self.transport.write_all(line.as_bytes());
        match written.and_then(|_| self.transport.flush()) {
            Ok(()) => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// Returns the next line that is not a diagnostic trace, waiting for as
    /// long as it takes.
    pub fn receive_line(&mut self) -> Result<String, LinkError> {
        loop {
            if let Some(line) = self.receive_line_before(None)? {
                return Ok(line);
            }
        }
    }

    /// Same as [`receive_line`](Self::receive_line) but gives up and returns
    /// `Ok(None)` once `deadline` has passed.
    pub fn receive_line_before(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<Option<String>, LinkError> {
        loop {
            let raw = match self.read_raw_line(deadline)? {
                Some(raw) => raw,
                None => return Ok(None),
            };
            if log_enabled!(Trace) {
                let view = HexViewBuilder::new(&raw)
                    .address_offset(0)
                    .row_width(16)
                    .finish();
                trace!("{} ->\n{}", self.name, view);
            }
            if let Some(&byte) = raw.iter().find(|b| !b.is_ascii()) {
                return Err(LinkError::Encoding {
                    port: self.name.clone(),
                    byte,
                });
            }
            // All bytes are ASCII, hence valid UTF-8.
            let line = String::from_utf8_lossy(&raw).trim().to_owned();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                debug!("{} (diag) {}", self.name, line);
                continue;
            }
            debug!("{} -> {}", self.name, line);
            return Ok(Some(line));
        }
    }

    /// Reads up to and including the next `\n`, returning the bytes before it.
    fn read_raw_line(&mut self, deadline: Option<Instant>) -> Result<Option<Vec<u8>>, LinkError> {
        let mut chunk = [0u8; 64];
        loop {
            if let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = self.pending.drain(..=end).collect();
                line.pop();
                return Ok(Some(line));
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
            }
            match self.transport.read(&mut chunk) {
                Ok(0) => return Err(LinkError::Closed(self.name.clone())),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(self.io_error(e)),
            }
        }
    }

    fn io_error(&self, source: io::Error) -> LinkError {
        LinkError::Io {
            port: self.name.clone(),
            source,
        }
    }
}
impl fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SerialLink").field(&self.name).finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
