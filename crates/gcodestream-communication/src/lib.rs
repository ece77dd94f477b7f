//! # gcodestream Communication
//!
//! Byte-stream transports, GRBL-style firmware response parsing and the
//! flow-controlled streaming session.

pub mod communication;
pub mod firmware;
pub mod streaming;

pub use communication::{
    ConnectionParams, LineBuffer, SerialParity, SerialTransport, Transport, VirtualTransport,
};

pub use firmware::grbl::{
    parse_status, FirmwareResponse, ResponseParser, StatusParser, StatusReport,
};

pub use streaming::{Advance, Session, SessionSettings, StreamingEngine};
