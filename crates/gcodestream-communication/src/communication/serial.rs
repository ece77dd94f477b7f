//! Serial port transport
//!
//! Wraps a `serialport` handle for direct connection to CNC controllers via
//! USB or RS-232. The handle is cloned once so reads and writes never wait
//! on each other.

use super::{ConnectionParams, LineBuffer, SerialParity, Transport};
use gcodestream_core::TransportError;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Longest single blocking read; bounds how long `close()` takes to be seen
const READ_SLICE: Duration = Duration::from_millis(20);

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

struct ReadHalf {
    port: Box<dyn serialport::SerialPort>,
    buffer: LineBuffer,
}

/// Serial port transport backed by the `serialport` crate
pub struct SerialTransport {
    name: String,
    writer: Mutex<Box<dyn serialport::SerialPort>>,
    reader: Mutex<ReadHalf>,
    open: AtomicBool,
}

impl SerialTransport {
    /// Open a serial port with the given parameters
    pub fn open(params: &ConnectionParams) -> Result<Self, TransportError> {
        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(TransportError::InvalidParameters {
                    reason: format!("Invalid data bits: {}", other),
                })
            }
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(TransportError::InvalidParameters {
                    reason: format!("Invalid stop bits: {}", other),
                })
            }
        };

        let failed = |e: serialport::Error| {
            tracing::warn!("Failed to open serial port {}: {}", params.port, e);
            TransportError::FailedToOpen {
                port: params.port.clone(),
                reason: e.to_string(),
            }
        };

        let writer = serialport::new(&params.port, params.baud_rate)
            .timeout(READ_SLICE)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(failed)?;
        let reader = writer.try_clone().map_err(failed)?;

        tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);

        Ok(Self {
            name: params.port.clone(),
            writer: Mutex::new(writer),
            reader: Mutex::new(ReadHalf {
                port: reader,
                buffer: LineBuffer::new(),
            }),
            open: AtomicBool::new(true),
        })
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let mut port = self.writer.lock().map_err(|e| TransportError::Write {
            reason: e.to_string(),
        })?;
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| TransportError::Write {
                reason: e.to_string(),
            })
    }

    fn read_line(&self, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut half = self.reader.lock().map_err(|e| TransportError::Read {
            reason: e.to_string(),
        })?;
        let mut chunk = [0u8; 256];

        loop {
            if !self.is_open() {
                return Err(TransportError::Closed);
            }
            if let Some(line) = half.buffer.next_line() {
                return Ok(Some(line));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let slice = (deadline - now).min(READ_SLICE);
            half.port
                .set_timeout(slice)
                .map_err(|e| TransportError::Read {
                    reason: e.to_string(),
                })?;

            match half.port.read(&mut chunk) {
                Ok(n) => half.buffer.push(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    return Err(TransportError::Read {
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::info!("Closed {}", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_bad_data_bits() {
        let params = ConnectionParams {
            data_bits: 9,
            ..ConnectionParams::new("/dev/null", 9600)
        };
        assert!(matches!(
            SerialTransport::open(&params),
            Err(TransportError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let params = ConnectionParams::new("/dev/gcodestream-does-not-exist", 9600);
        assert!(matches!(
            SerialTransport::open(&params),
            Err(TransportError::FailedToOpen { .. })
        ));
    }
}
