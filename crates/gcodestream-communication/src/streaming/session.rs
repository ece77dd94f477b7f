//! Streaming session
//!
//! A [`Session`] owns one transport connection, the [`StreamingEngine`] and
//! a background receive activity. The receive activity reads firmware lines
//! with a bounded poll and is the only thing that advances a running job;
//! callers start, pause, resume and stop it.
//!
//! Every shared field lives behind one mutex. Transmissions happen while
//! that mutex is held, so the state check that gates a write and the write
//! itself cannot interleave with `stop()`. Settle delays are taken after the
//! mutex is released.

use super::engine::{Advance, StreamingEngine};
use super::SessionSettings;
use crate::communication::Transport;
use crate::firmware::grbl::commands::{
    self, ABSOLUTE_MODE, HOME, SET_ORIGIN, SOFT_RESET, STATUS_QUERY,
};
use crate::firmware::grbl::{FirmwareResponse, ResponseParser, StatusParser};
use gcodestream_core::{
    Axis, Error, EventDispatcher, FirmwareError, JogDirection, LogSink, MachineState,
    PositionSnapshot, Result, SessionError, SessionEvent, SessionState, SpeedClass,
    TracingLogSink, RX_PREFIX, TX_PREFIX,
};
use gcodestream_gcode::{GcodeLoader, Program, TrajectoryHint};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

const RECEIVER_THREAD_NAME: &str = "gcodestream-rx";

/// State guarded by the session mutex
struct Inner {
    engine: StreamingEngine,
    transport: Option<Arc<dyn Transport>>,
    position: PositionSnapshot,
    machine_state: Option<MachineState>,
    /// Run flag of the current receive activity
    running: Option<Arc<AtomicBool>>,
}

/// State shared with the receive activity
struct Shared {
    inner: Mutex<Inner>,
    sink: RwLock<Arc<dyn LogSink>>,
    events: EventDispatcher,
    settings: SessionSettings,
}

/// What the receive activity does after an acknowledgement
enum AckOutcome {
    Sent,
    Completed(usize),
    Ignored,
    Failed(Error),
}

impl Shared {
    fn log(&self, line: &str) {
        let sink = self.sink.read().clone();
        sink.append(line);
    }

    fn publish(&self, event: SessionEvent) {
        self.events.publish(event);
    }

    /// Write one newline-terminated line and record it as the last line sent
    fn transmit_locked(&self, inner: &mut Inner, line: &str) -> Result<()> {
        let transport = inner.transport.as_ref().ok_or(SessionError::NotConnected)?;
        let mut data = line.as_bytes().to_vec();
        if !line.ends_with('\n') {
            data.push(b'\n');
        }
        let line = line.trim_end();
        inner.engine.record_sent(line);
        transport.write(&data)?;
        self.log(&format!("{}{}", TX_PREFIX, line));
        Ok(())
    }

    /// Write a line outside the program; its answer must not advance the job
    fn transmit_manual_locked(&self, inner: &mut Inner, line: &str) -> Result<()> {
        self.transmit_locked(inner, line)?;
        inner.engine.record_manual_command();
        Ok(())
    }

    /// Write a real-time byte; it is neither newline-terminated nor recorded
    fn transmit_realtime_locked(&self, inner: &Inner, byte: u8, label: &str) -> Result<()> {
        let transport = inner.transport.as_ref().ok_or(SessionError::NotConnected)?;
        transport.write(&[byte])?;
        self.log(&format!("{}{}", TX_PREFIX, label));
        Ok(())
    }

    /// Tear down the connection after a transport failure
    ///
    /// With `expected` set, only the connection owning that run flag is
    /// dropped; a newer connection is left alone.
    fn drop_connection(&self, expected: Option<&Arc<AtomicBool>>, reason: &str) {
        let was_connected = {
            let mut inner = self.inner.lock();
            if let Some(expected) = expected {
                match &inner.running {
                    Some(current) if Arc::ptr_eq(current, expected) => {}
                    _ => return,
                }
            }
            if let Some(running) = inner.running.take() {
                running.store(false, Ordering::SeqCst);
            }
            if let Some(transport) = inner.transport.take() {
                transport.close();
            }
            let was_connected = inner.engine.state().is_connected();
            inner.engine.detach();
            was_connected
        };

        if was_connected {
            error!("Connection lost: {}", reason);
            self.log(&format!("Connection lost: {}", reason));
            self.publish(SessionEvent::ConnectionLost(reason.to_string()));
            self.publish(SessionEvent::StateChanged(SessionState::Disconnected));
        }
    }

    /// Drop the connection if `result` carries a transport failure
    fn check<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(Error::Transport(e)) = &result {
            self.drop_connection(None, &e.to_string());
        }
        result
    }

    fn settle_blocking(&self) {
        std::thread::sleep(self.settings.settle_delay);
    }

    fn query_status(&self) -> Result<()> {
        let result = {
            let inner = self.inner.lock();
            self.transmit_realtime_locked(&inner, STATUS_QUERY, "?")
        };
        self.check(result)
    }

    fn receive_loop(&self, transport: Arc<dyn Transport>, running: Arc<AtomicBool>) {
        debug!("Receive loop started for {}", transport.name());
        while running.load(Ordering::SeqCst) {
            match transport.read_line(self.settings.read_timeout) {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => {}
                Err(e) => {
                    if running.load(Ordering::SeqCst) {
                        self.drop_connection(Some(&running), &e.to_string());
                    }
                    break;
                }
            }
        }
        debug!("Receive loop stopped for {}", transport.name());
    }

    fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.log(&format!("{}{}", RX_PREFIX, line));

        match ResponseParser::parse(line) {
            Some(FirmwareResponse::Ok) => self.handle_ack(),
            Some(FirmwareResponse::Status(frame)) => self.handle_status(&frame),
            Some(FirmwareResponse::Error(response)) => {
                let command = {
                    let mut inner = self.inner.lock();
                    inner.engine.reject();
                    inner.engine.last_line_sent().unwrap_or_default().to_string()
                };
                let err = FirmwareError::Rejected {
                    command: command.clone(),
                    response: response.clone(),
                };
                warn!("{}", err);
                self.log(&format!("Error in command: {}", command));
                self.publish(SessionEvent::FirmwareError { command, response });
            }
            Some(FirmwareResponse::Alarm(message)) => {
                let err = FirmwareError::Alarm {
                    message: message.clone(),
                };
                warn!("{}", err);
                self.log(&format!("Alarm: {}", message));
                self.publish(SessionEvent::Alarm(message));
            }
            Some(FirmwareResponse::Message(message)) => debug!("Firmware message: {}", message),
            None => {}
        }
    }

    fn handle_status(&self, frame: &str) {
        let report = match StatusParser::try_parse(frame) {
            Ok(report) => report,
            Err(e) => {
                debug!("Ignoring status frame {:?}: {}", frame, e);
                return;
            }
        };
        {
            let mut inner = self.inner.lock();
            inner.position = report.position;
            if let Some(state) = &report.machine_state {
                inner.machine_state = Some(state.clone());
            }
        }
        self.publish(SessionEvent::PositionChanged {
            position: report.position,
            machine_state: report.machine_state,
        });
    }

    fn handle_ack(&self) {
        let outcome = {
            let mut inner = self.inner.lock();
            match inner.engine.acknowledge() {
                Advance::Send(command) => match self.transmit_locked(&mut inner, &command) {
                    Ok(()) => AckOutcome::Sent,
                    Err(e) => AckOutcome::Failed(e),
                },
                Advance::Completed { lines } => AckOutcome::Completed(lines),
                Advance::Ignored => AckOutcome::Ignored,
            }
        };

        match outcome {
            AckOutcome::Sent => self.settle_blocking(),
            AckOutcome::Completed(lines) => {
                info!("Job complete ({} lines)", lines);
                self.log(&format!("Job complete ({} lines)", lines));
                self.publish(SessionEvent::JobCompleted { lines });
                self.publish(SessionEvent::StateChanged(SessionState::Idle));
            }
            AckOutcome::Ignored => debug!("Acknowledgement for an earlier line or outside a job"),
            AckOutcome::Failed(e) => {
                let _ = self.check::<()>(Err(e));
            }
        }
    }
}

/// A connection to one firmware endpoint plus the job streamed through it
pub struct Session {
    shared: Arc<Shared>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    /// Serializes caller-issued writes and their settle delays
    command_gate: tokio::sync::Mutex<()>,
}

impl Session {
    /// Create a disconnected session
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    engine: StreamingEngine::new(),
                    transport: None,
                    position: PositionSnapshot::origin(),
                    machine_state: None,
                    running: None,
                }),
                sink: RwLock::new(Arc::new(TracingLogSink)),
                events: EventDispatcher::default(),
                settings,
            }),
            receiver: Mutex::new(None),
            command_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the observability sink
    pub fn set_log_sink(&self, sink: Arc<dyn LogSink>) {
        *self.shared.sink.write() = sink;
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Session settings
    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().engine.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Last reported machine position
    pub fn position(&self) -> PositionSnapshot {
        self.shared.inner.lock().position
    }

    /// Last reported machine state tag
    pub fn machine_state(&self) -> Option<MachineState> {
        self.shared.inner.lock().machine_state.clone()
    }

    pub fn last_line_sent(&self) -> Option<String> {
        self.shared
            .inner
            .lock()
            .engine
            .last_line_sent()
            .map(str::to_string)
    }

    /// `(cursor, program length)`
    pub fn progress(&self) -> (usize, usize) {
        self.shared.inner.lock().engine.progress()
    }

    /// A copy of the loaded program
    pub fn program(&self) -> Program {
        self.shared.inner.lock().engine.program().clone()
    }

    /// Final X/Y seen while loading the program
    pub fn trajectory(&self) -> TrajectoryHint {
        self.shared.inner.lock().engine.program().trajectory()
    }

    /// Attach an open transport and start the receive activity
    pub fn connect(&self, transport: Arc<dyn Transport>) -> Result<()> {
        let name = transport.name();
        let running = Arc::new(AtomicBool::new(true));
        {
            let mut inner = self.shared.inner.lock();
            inner.engine.attach()?;
            inner.transport = Some(Arc::clone(&transport));
            inner.running = Some(Arc::clone(&running));
        }

        // A receive activity that ended on a lost connection is still joinable.
        if let Some(stale) = self.receiver.lock().take() {
            let _ = stale.join();
        }

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(RECEIVER_THREAD_NAME.to_string())
            .spawn({
                let running = Arc::clone(&running);
                move || shared.receive_loop(transport, running)
            });

        match spawned {
            Ok(handle) => *self.receiver.lock() = Some(handle),
            Err(e) => {
                self.shared
                    .drop_connection(Some(&running), &format!("receiver: {}", e));
                return Err(Error::other(format!("Failed to start receiver: {}", e)));
            }
        }

        info!("Connected to {}", name);
        self.shared.log(&format!("Connected to {}", name));
        self.shared.publish(SessionEvent::Connected(name));
        self.shared
            .publish(SessionEvent::StateChanged(SessionState::Idle));
        Ok(())
    }

    /// Detach the transport and stop the receive activity
    ///
    /// Works from any state and is a no-op when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        let was_connected = {
            let mut inner = self.shared.inner.lock();
            if let Some(running) = inner.running.take() {
                running.store(false, Ordering::SeqCst);
            }
            if let Some(transport) = inner.transport.take() {
                transport.close();
            }
            let was_connected = inner.engine.state().is_connected();
            inner.engine.detach();
            was_connected
        };

        let handle = self.receiver.lock().take();
        if let Some(handle) = handle {
            if tokio::task::spawn_blocking(move || handle.join())
                .await
                .is_err()
            {
                warn!("Receive loop join failed");
            }
        }

        if was_connected {
            info!("Disconnected");
            self.shared.log("Disconnected");
            self.shared.publish(SessionEvent::Disconnected);
            self.shared
                .publish(SessionEvent::StateChanged(SessionState::Disconnected));
        }
        Ok(())
    }

    /// Parse `raw_text` and make it the current program
    pub fn load(&self, raw_text: &str) -> Result<usize> {
        self.load_program(GcodeLoader::load_str(raw_text))
    }

    /// Read a G-code file and make it the current program
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let program = GcodeLoader::load_file(path)?;
        self.load_program(program)
    }

    /// Make `program` the current program
    pub fn load_program(&self, program: Program) -> Result<usize> {
        let len = program.len();
        self.shared.inner.lock().engine.load(program)?;
        info!("Loaded {} commands", len);
        Ok(len)
    }

    /// Start streaming the loaded program from its first command
    pub async fn start(&self) -> Result<()> {
        let _gate = self.command_gate.lock().await;
        let result = {
            let mut inner = self.shared.inner.lock();
            let command = inner.engine.start()?;
            self.shared.transmit_locked(&mut inner, &command)
        };
        self.shared.check(result)?;
        self.shared
            .publish(SessionEvent::StateChanged(SessionState::Streaming));
        self.settle().await;
        Ok(())
    }

    /// Suspend advancement; the pending command stays unacknowledged
    pub fn pause(&self) -> Result<()> {
        self.shared.inner.lock().engine.pause()?;
        info!("Paused");
        self.shared.log("Paused");
        self.shared
            .publish(SessionEvent::StateChanged(SessionState::Paused));
        Ok(())
    }

    /// Continue a paused job by re-sending the pending command
    ///
    /// If the firmware had already buffered that command it runs twice.
    pub async fn resume(&self) -> Result<()> {
        let _gate = self.command_gate.lock().await;
        let result = {
            let mut inner = self.shared.inner.lock();
            let command = inner.engine.resume()?;
            self.shared.transmit_locked(&mut inner, &command)
        };
        self.shared.check(result)?;
        info!("Resumed");
        self.shared.log("Resumed");
        self.shared
            .publish(SessionEvent::StateChanged(SessionState::Streaming));
        self.settle().await;
        Ok(())
    }

    /// Abandon the current job and rewind to the first command
    pub fn stop(&self) {
        let state = {
            let mut inner = self.shared.inner.lock();
            inner.engine.stop();
            inner.engine.state()
        };
        if state == SessionState::Stopped {
            info!("Stopped");
            self.shared.log("Stopped");
            self.shared.publish(SessionEvent::StateChanged(state));
        }
    }

    /// Send the soft-reset byte ahead of everything else, then stop
    ///
    /// The reset discards every line the firmware has not answered yet.
    pub fn emergency_stop(&self) -> Result<()> {
        let result = {
            let mut inner = self.shared.inner.lock();
            inner.engine.ensure_connected()?;
            let result = self
                .shared
                .transmit_realtime_locked(&inner, SOFT_RESET, "0x18");
            inner.engine.abort();
            result
        };
        self.shared.check(result)?;
        warn!("Emergency stop");
        self.shared.log("Emergency stop");
        self.shared
            .publish(SessionEvent::StateChanged(SessionState::Stopped));
        Ok(())
    }

    /// Ask the firmware for a status frame
    ///
    /// Sent as the real-time `?` byte without a newline; the reply arrives
    /// through the receive activity.
    pub fn get_status(&self) -> Result<()> {
        self.shared.query_status()
    }

    /// Zero all axes at the current position
    pub async fn set_origin(&self) -> Result<()> {
        let _gate = self.command_gate.lock().await;
        let result = {
            let mut inner = self.shared.inner.lock();
            inner.engine.ensure_not_streaming("set origin")?;
            let result = self.shared.transmit_manual_locked(&mut inner, SET_ORIGIN);
            if result.is_ok() {
                inner.position = PositionSnapshot::origin();
            }
            result
        };
        self.shared.check(result)?;
        self.shared.publish(SessionEvent::PositionChanged {
            position: PositionSnapshot::origin(),
            machine_state: None,
        });
        self.settle().await;
        Ok(())
    }

    /// Move one axis by the jog distance of `speed`, then restore absolute mode
    pub async fn jog(&self, axis: Axis, direction: JogDirection, speed: SpeedClass) -> Result<()> {
        let _gate = self.command_gate.lock().await;
        let distance = self.shared.settings.jog_distance(speed);
        let command = commands::jog_command(axis, direction, distance);
        for line in [command.as_str(), ABSOLUTE_MODE] {
            let result = {
                let mut inner = self.shared.inner.lock();
                inner.engine.ensure_not_streaming("jog")?;
                self.shared.transmit_manual_locked(&mut inner, line)
            };
            self.shared.check(result)?;
            self.settle().await;
        }
        Ok(())
    }

    /// Run the homing cycle and refresh the position once it should be done
    pub async fn home(&self) -> Result<()> {
        let _gate = self.command_gate.lock().await;
        let result = {
            let mut inner = self.shared.inner.lock();
            inner.engine.ensure_not_streaming("home")?;
            self.shared.transmit_manual_locked(&mut inner, HOME)
        };
        self.shared.check(result)?;

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let delay = self.shared.settings.home_status_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                if let Err(e) = shared.query_status() {
                    debug!("Status query after homing skipped: {}", e);
                }
            }
        });

        self.settle().await;
        Ok(())
    }

    /// Load and stream the axis travel exercise
    pub async fn run_limit_test(&self) -> Result<()> {
        self.load_program(commands::limit_test_program())?;
        self.start().await
    }

    async fn settle(&self) {
        tokio::time::sleep(self.shared.settings.settle_delay).await;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        if let Some(running) = inner.running.take() {
            running.store(false, Ordering::SeqCst);
        }
        if let Some(transport) = inner.transport.take() {
            transport.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::VirtualTransport;
    use gcodestream_core::MemoryLogSink;
    use std::time::Duration;

    fn quick_session() -> (Session, MemoryLogSink) {
        let session = Session::new(
            SessionSettings::default().with_settle_delay(Duration::from_millis(1)),
        );
        let sink = MemoryLogSink::new();
        session.set_log_sink(Arc::new(sink.clone()));
        (session, sink)
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let (session, sink) = quick_session();
        session
            .connect(Arc::new(VirtualTransport::new("sim")))
            .unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(sink.contains("Connected to sim"));

        let err = session
            .connect(Arc::new(VirtualTransport::new("other")))
            .unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::AlreadyConnected)));
        session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let (session, _sink) = quick_session();
        session.load("G0 X1").unwrap();
        assert!(matches!(
            session.start().await,
            Err(Error::Session(SessionError::NotConnected))
        ));
        assert!(matches!(
            session.get_status(),
            Err(Error::Session(SessionError::NotConnected))
        ));
        assert!(matches!(
            session.emergency_stop(),
            Err(Error::Session(SessionError::NotConnected))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (session, sink) = quick_session();
        session.disconnect().await.unwrap();
        assert!(!sink.contains("Disconnected"));

        session
            .connect(Arc::new(VirtualTransport::new("sim")))
            .unwrap();
        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(
            sink.lines().iter().filter(|l| *l == "Disconnected").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_stop_while_disconnected_keeps_state() {
        let (session, sink) = quick_session();
        session.stop();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(sink.lines().is_empty());
    }
}
