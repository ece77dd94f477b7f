//! Error handling for gcodestream
//!
//! The error taxonomy follows how failures are treated at runtime:
//! - Transport errors (open/write/read) are connection-fatal
//! - Protocol errors (malformed status frames) are recovered locally
//! - Firmware errors (`error` responses) are reported but never retried
//! - Session errors are invalid operations for the current state
//! - Load errors are I/O failures while reading a G-code file
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Transport error type
///
/// Raised by the byte-stream channel the session talks through. Any of these
/// ends the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Failed to open the underlying device
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Writing to the channel failed
    #[error("Write failed: {reason}")]
    Write {
        /// The reason the write failed.
        reason: String,
    },

    /// Reading from the channel failed
    #[error("Read failed: {reason}")]
    Read {
        /// The reason the read failed.
        reason: String,
    },

    /// The channel has been closed
    #[error("Transport closed")]
    Closed,

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Protocol error type
///
/// Describes why a status frame could not be decoded. These are never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line is not a `<...>` status frame
    #[error("Not a status frame")]
    NotAStatusFrame,

    /// The frame has no `MPos:` field
    #[error("Status frame has no MPos field")]
    MissingMachinePosition,

    /// The `MPos:` coordinates could not be parsed
    #[error("Invalid coordinates in {field}: {value}")]
    InvalidCoordinates {
        /// The field name that failed to parse.
        field: String,
        /// The raw field value.
        value: String,
    },
}

/// Firmware error type
///
/// Reported when the firmware rejects a command or raises an alarm.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FirmwareError {
    /// The firmware answered a command with an `error` response
    #[error("Command '{command}' rejected: {response}")]
    Rejected {
        /// The last line sent before the error arrived.
        command: String,
        /// The raw error response.
        response: String,
    },

    /// The firmware entered an alarm state
    #[error("Alarm: {message}")]
    Alarm {
        /// The raw alarm line.
        message: String,
    },
}

/// Session error type
///
/// Invalid operations for the current session state. Reported synchronously,
/// the session state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No transport is attached
    #[error("Not connected")]
    NotConnected,

    /// A transport is already attached
    #[error("Already connected")]
    AlreadyConnected,

    /// `start()` was called without a program
    #[error("No program loaded")]
    NoProgramLoaded,

    /// Invalid state transition
    #[error("Invalid state transition from {current} to {requested}")]
    InvalidStateTransition {
        /// The current state name.
        current: String,
        /// The requested operation or state.
        requested: String,
    },

    /// The operation would interleave with an active job
    #[error("Cannot {operation} while a job is streaming")]
    Busy {
        /// The rejected operation.
        operation: String,
    },
}

/// G-code load error type
#[derive(Error, Debug)]
pub enum LoadError {
    /// The file could not be read
    #[error("File error for {path}: {reason}")]
    FileError {
        /// Path of the file.
        path: String,
        /// The reason the file could not be read.
        reason: String,
    },

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Main error type for gcodestream
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Firmware error
    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    /// Session error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Load error
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this error ends the connection
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is an invalid operation for the current state
    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::Session(_))
    }

    /// Check if this is a firmware error
    pub fn is_firmware_error(&self) -> bool {
        matches!(self, Error::Firmware(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
