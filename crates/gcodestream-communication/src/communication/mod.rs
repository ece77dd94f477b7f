//! Byte-stream transports
//!
//! A [`Transport`] is the duplex channel a session streams through. It is
//! handed to the session already open; discovering and probing devices is
//! left to the caller.

pub mod serial;
pub mod virtual_port;

use gcodestream_core::TransportError;
use std::time::Duration;

pub use serial::SerialTransport;
pub use virtual_port::VirtualTransport;

/// Duplex line-oriented channel to the firmware
///
/// All methods take `&self`: the receive activity reads while callers write,
/// so implementations keep their read and write halves independently locked.
pub trait Transport: Send + Sync {
    /// Human-readable channel name (port name, simulator id)
    fn name(&self) -> String;

    /// Write raw bytes
    fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Read one line, without its terminator
    ///
    /// Returns `Ok(None)` when nothing complete arrived within `timeout`.
    fn read_line(&self, timeout: Duration) -> Result<Option<String>, TransportError>;

    /// Close the channel; pending and future reads fail with
    /// [`TransportError::Closed`]
    fn close(&self);

    /// Check if the channel is still open
    fn is_open(&self) -> bool;
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a serial transport
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
}

impl ConnectionParams {
    /// 8N1 parameters for `port` at `baud_rate`
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
        }
    }
}

/// Longest unterminated line kept while waiting for its `\n`
pub const MAX_LINE_LEN: usize = 1024;

/// Accumulates raw bytes and hands out complete lines
///
/// Lines end at `\n`; a trailing `\r` is dropped. Invalid UTF-8 is replaced
/// rather than rejected, since a garbled line is still worth logging. An
/// unterminated tail longer than [`MAX_LINE_LEN`] is discarded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes
    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);

        let tail_start = self
            .pending
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        let tail_len = self.pending.len() - tail_start;
        if tail_len > MAX_LINE_LEN {
            tracing::warn!("Discarding {} bytes of unterminated input", tail_len);
            self.pending.truncate(tail_start);
        }
    }

    /// Take the next complete line, if any
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw[..pos]);
        Some(line.trim_end_matches('\r').to_string())
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop buffered bytes
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
