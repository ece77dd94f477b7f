//! # gcodestream Core
//!
//! Core types shared by the gcodestream crates: the error taxonomy, position
//! and session state models, session events and observability sinks.

pub mod data;
pub mod error;
pub mod event;
pub mod log_sink;

pub use data::{Axis, JogDirection, MachineState, PositionSnapshot, SessionState, SpeedClass};

pub use error::{
    Error, FirmwareError, LoadError, ProtocolError, Result, SessionError, TransportError,
};

pub use event::{EventDispatcher, SessionEvent};

pub use log_sink::{
    ChannelLogSink, LogEntry, LogSink, MemoryLogSink, TracingLogSink, RX_PREFIX, TX_PREFIX,
};
