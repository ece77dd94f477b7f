//! # gcodestream
//!
//! Flow-controlled G-code streaming for GRBL-style CNC firmware.
//!
//! ## Architecture
//!
//! gcodestream is organized as a workspace with multiple crates:
//!
//! 1. **gcodestream-core** - Errors, data model, session events, log sinks
//! 2. **gcodestream-gcode** - G-code program loading
//! 3. **gcodestream-communication** - Transports, firmware parsing, streaming session
//! 4. **gcodestream-settings** - Configuration and persistence
//! 5. **gcodestream** - Command-line streamer that integrates all crates

pub use gcodestream_communication::{
    firmware, parse_status, Advance, ConnectionParams, FirmwareResponse, ResponseParser,
    SerialParity, SerialTransport, Session, SessionSettings, StatusParser, StatusReport,
    StreamingEngine, Transport, VirtualTransport,
};
pub use gcodestream_core::{
    data, Axis, ChannelLogSink, Error, EventDispatcher, FirmwareError, JogDirection, LoadError,
    LogSink, MachineState, MemoryLogSink, PositionSnapshot, ProtocolError, Result, SessionError,
    SessionEvent, SessionState, SpeedClass, TracingLogSink, TransportError,
};
pub use gcodestream_gcode::{GcodeLoader, Program, TrajectoryHint};
pub use gcodestream_settings::{Config, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output on stderr
/// - RUST_LOG environment variable support, INFO unless overridden
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::debug!("gcodestream {} built {}", VERSION, BUILD_DATE);
    Ok(())
}
