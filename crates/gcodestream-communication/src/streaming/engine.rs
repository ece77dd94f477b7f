//! Flow-controlled streaming state machine
//!
//! The engine owns the loaded program, the cursor and the session state. It
//! performs no I/O: every operation that needs a line transmitted returns
//! that line, and the session writes it while still holding the lock that
//! guards the engine. That keeps the state check and the write atomic with
//! respect to `stop()`.
//!
//! At most one program command is unacknowledged at any time: a command is
//! only handed out by `start()`, `resume()` or `acknowledge()`.
//!
//! The firmware answers every newline-terminated line with exactly one `ok`
//! or `error`, in order. The engine counts the lines still waiting for that
//! answer, manual commands and abandoned program lines included, and only
//! treats an `ok` as the pending program command's acknowledgement once all
//! earlier lines have been answered.

use gcodestream_core::{SessionError, SessionState};
use gcodestream_gcode::Program;

/// Outcome of an acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Transmit this command next
    Send(String),
    /// The last command was acknowledged
    Completed {
        /// Number of commands streamed
        lines: usize,
    },
    /// The acknowledgement answered an earlier line, or no job is running
    Ignored,
}

/// Streaming state machine
#[derive(Debug, Default)]
pub struct StreamingEngine {
    program: Program,
    cursor: usize,
    state: SessionState,
    last_line_sent: Option<String>,
    /// Lines sent and not yet answered with `ok` or `error`
    unacknowledged: usize,
}

impl StreamingEngine {
    /// Create a disconnected engine with no program
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Index of the next command to send
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The loaded program
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// `(cursor, program length)`
    pub fn progress(&self) -> (usize, usize) {
        (self.cursor, self.program.len())
    }

    /// Number of transmitted lines still waiting for a response
    pub fn unacknowledged(&self) -> usize {
        self.unacknowledged
    }

    /// The most recently transmitted line
    pub fn last_line_sent(&self) -> Option<&str> {
        self.last_line_sent.as_deref()
    }

    /// Remember a transmitted line for error reporting
    pub fn record_sent(&mut self, line: &str) {
        self.last_line_sent = Some(line.to_string());
    }

    /// Count a manual command that the firmware will answer
    pub fn record_manual_command(&mut self) {
        self.unacknowledged += 1;
    }

    /// Transport attached: Disconnected → Idle
    pub fn attach(&mut self) -> Result<(), SessionError> {
        if self.state.is_connected() {
            return Err(SessionError::AlreadyConnected);
        }
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Transport detached: any state → Disconnected
    pub fn detach(&mut self) {
        self.state = SessionState::Disconnected;
        self.cursor = 0;
        self.last_line_sent = None;
        self.unacknowledged = 0;
    }

    /// Fail with `NotConnected` unless a transport is attached
    pub fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    /// Fail with `Busy` while the program is actively streaming
    ///
    /// Commands sent outside the program would delay the pending program
    /// line's acknowledgement behind their own.
    pub fn ensure_not_streaming(&self, operation: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        if self.state == SessionState::Streaming {
            return Err(SessionError::Busy {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Replace the program wholesale
    pub fn load(&mut self, program: Program) -> Result<(), SessionError> {
        if self.state.is_job_active() {
            return Err(SessionError::Busy {
                operation: "load a program".to_string(),
            });
        }
        self.program = program;
        self.cursor = 0;
        Ok(())
    }

    /// Begin streaming from the first command
    pub fn start(&mut self) -> Result<String, SessionError> {
        let first = self
            .program
            .get(0)
            .map(str::to_string)
            .ok_or(SessionError::NoProgramLoaded)?;
        self.ensure_connected()?;
        if !self.state.can_start() {
            return Err(self.invalid("start"));
        }
        self.cursor = 0;
        self.state = SessionState::Streaming;
        self.unacknowledged += 1;
        Ok(first)
    }

    /// Handle an `ok` from the firmware
    pub fn acknowledge(&mut self) -> Advance {
        if !self.answer() || self.state != SessionState::Streaming {
            return Advance::Ignored;
        }
        self.cursor += 1;
        match self.pending_command() {
            Some(command) => {
                self.unacknowledged += 1;
                Advance::Send(command)
            }
            None => {
                self.cursor = self.program.len();
                self.state = SessionState::Idle;
                Advance::Completed {
                    lines: self.program.len(),
                }
            }
        }
    }

    /// Handle an `error` from the firmware
    ///
    /// The rejected line is answered but the job does not advance.
    pub fn reject(&mut self) {
        self.answer();
    }

    /// Suspend advancement
    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Streaming {
            return Err(self.invalid("pause"));
        }
        self.state = SessionState::Paused;
        Ok(())
    }

    /// Continue streaming, re-sending the command pending at pause time
    pub fn resume(&mut self) -> Result<String, SessionError> {
        if self.state != SessionState::Paused {
            return Err(self.invalid("resume"));
        }
        let command = self.pending_command().ok_or_else(|| self.invalid("resume"))?;
        self.state = SessionState::Streaming;
        self.unacknowledged += 1;
        Ok(command)
    }

    /// Abandon the current job and rewind the cursor
    ///
    /// A disconnected engine stays disconnected. Lines already sent are
    /// still answered by the firmware and stay counted.
    pub fn stop(&mut self) {
        if self.state.is_connected() {
            self.state = SessionState::Stopped;
        }
        self.cursor = 0;
    }

    /// Stop after a soft reset; the firmware discards every unanswered line
    pub fn abort(&mut self) {
        self.stop();
        self.unacknowledged = 0;
    }

    /// Consume one outstanding line; true when it was the most recent one
    fn answer(&mut self) -> bool {
        match self.unacknowledged {
            0 => false,
            n => {
                self.unacknowledged = n - 1;
                n == 1
            }
        }
    }

    fn pending_command(&self) -> Option<String> {
        self.program.get(self.cursor).map(str::to_string)
    }

    fn invalid(&self, requested: &str) -> SessionError {
        SessionError::InvalidStateTransition {
            current: self.state.to_string(),
            requested: requested.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn connected_with(commands: &[&str]) -> StreamingEngine {
        let mut engine = StreamingEngine::new();
        engine.attach().unwrap();
        engine
            .load(Program::from_commands(commands.iter().copied()))
            .unwrap();
        engine
    }

    #[test]
    fn test_streams_to_completion() {
        let mut engine = connected_with(&["G0 X1", "G0 X2", "G0 X3"]);
        assert_eq!(engine.start().unwrap(), "G0 X1");
        assert_eq!(engine.acknowledge(), Advance::Send("G0 X2".to_string()));
        assert_eq!(engine.acknowledge(), Advance::Send("G0 X3".to_string()));
        assert_eq!(engine.acknowledge(), Advance::Completed { lines: 3 });
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(engine.cursor(), 3);
        assert_eq!(engine.unacknowledged(), 0);
        assert_eq!(engine.acknowledge(), Advance::Ignored);
    }

    #[test]
    fn test_start_on_empty_program() {
        let mut engine = StreamingEngine::new();
        engine.attach().unwrap();
        assert_eq!(engine.start(), Err(SessionError::NoProgramLoaded));
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(engine.unacknowledged(), 0);
    }

    #[test]
    fn test_start_requires_connection() {
        let mut engine = StreamingEngine::new();
        engine.load(Program::from_commands(["G0 X1"])).unwrap();
        assert_eq!(engine.start(), Err(SessionError::NotConnected));
        assert_eq!(engine.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_start_while_streaming_is_rejected() {
        let mut engine = connected_with(&["G0 X1", "G0 X2"]);
        engine.start().unwrap();
        assert!(matches!(
            engine.start(),
            Err(SessionError::InvalidStateTransition { .. })
        ));
        assert_eq!(engine.cursor(), 0);
        assert_eq!(engine.unacknowledged(), 1);
    }

    #[test]
    fn test_pause_resume_resends_pending() {
        let mut engine = connected_with(&["G0 X1", "G0 X2", "G0 X3"]);
        engine.start().unwrap();
        engine.acknowledge();
        engine.pause().unwrap();
        assert_eq!(engine.acknowledge(), Advance::Ignored);
        assert_eq!(engine.cursor(), 1);
        assert_eq!(engine.resume().unwrap(), "G0 X2");
        assert_eq!(engine.cursor(), 1);
        assert_eq!(engine.state(), SessionState::Streaming);
    }

    #[test]
    fn test_resume_waits_for_answer_to_original_line() {
        let mut engine = connected_with(&["G0 X1", "G0 X2", "G0 X3"]);
        engine.start().unwrap();
        engine.pause().unwrap();
        assert_eq!(engine.resume().unwrap(), "G0 X1");
        assert_eq!(engine.unacknowledged(), 2);

        assert_eq!(engine.acknowledge(), Advance::Ignored);
        assert_eq!(engine.cursor(), 0);
        assert_eq!(engine.acknowledge(), Advance::Send("G0 X2".to_string()));
    }

    #[test]
    fn test_manual_command_answer_does_not_advance_program() {
        let mut engine = connected_with(&["G0 X1", "G0 X2"]);
        engine.record_manual_command();
        assert_eq!(engine.start().unwrap(), "G0 X1");

        assert_eq!(engine.acknowledge(), Advance::Ignored);
        assert_eq!(engine.cursor(), 0);
        assert_eq!(engine.acknowledge(), Advance::Send("G0 X2".to_string()));
    }

    #[test]
    fn test_error_answers_line_without_advancing() {
        let mut engine = connected_with(&["G0 X1", "G0 X2"]);
        engine.start().unwrap();
        engine.reject();
        assert_eq!(engine.unacknowledged(), 0);
        assert_eq!(engine.cursor(), 0);
        assert_eq!(engine.state(), SessionState::Streaming);
        assert_eq!(engine.acknowledge(), Advance::Ignored);
        assert_eq!(engine.cursor(), 0);
    }

    #[test]
    fn test_pause_requires_streaming() {
        let mut engine = connected_with(&["G0 X1"]);
        assert!(engine.pause().is_err());
        assert!(engine.resume().is_err());
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn test_stop_rewinds_and_allows_restart() {
        let mut engine = connected_with(&["G0 X1", "G0 X2"]);
        engine.start().unwrap();
        engine.acknowledge();
        engine.stop();
        assert_eq!(engine.state(), SessionState::Stopped);
        assert_eq!(engine.cursor(), 0);
        assert_eq!(engine.acknowledge(), Advance::Ignored);
        assert_eq!(engine.start().unwrap(), "G0 X1");
    }

    #[test]
    fn test_restart_before_stale_answer_arrives() {
        let mut engine = connected_with(&["G0 X1", "G0 X2"]);
        engine.start().unwrap();
        engine.stop();
        engine.start().unwrap();

        assert_eq!(engine.acknowledge(), Advance::Ignored);
        assert_eq!(engine.acknowledge(), Advance::Send("G0 X2".to_string()));
    }

    #[test]
    fn test_abort_forgets_unanswered_lines() {
        let mut engine = connected_with(&["G0 X1", "G0 X2"]);
        engine.record_manual_command();
        engine.start().unwrap();
        engine.abort();
        assert_eq!(engine.state(), SessionState::Stopped);
        assert_eq!(engine.unacknowledged(), 0);

        engine.start().unwrap();
        assert_eq!(engine.acknowledge(), Advance::Send("G0 X2".to_string()));
    }

    #[test]
    fn test_stop_while_disconnected_stays_disconnected() {
        let mut engine = StreamingEngine::new();
        engine.stop();
        assert_eq!(engine.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_load_rejected_during_job() {
        let mut engine = connected_with(&["G0 X1"]);
        engine.start().unwrap();
        assert!(matches!(
            engine.load(Program::default()),
            Err(SessionError::Busy { .. })
        ));
    }

    #[test]
    fn test_detach_clears_last_line() {
        let mut engine = connected_with(&["G0 X1"]);
        engine.start().unwrap();
        engine.record_sent("G0 X1");
        engine.detach();
        assert_eq!(engine.last_line_sent(), None);
        assert_eq!(engine.unacknowledged(), 0);
        assert_eq!(engine.state(), SessionState::Disconnected);
        assert_eq!(engine.attach(), Ok(()));
        assert_eq!(engine.attach(), Err(SessionError::AlreadyConnected));
    }

    proptest! {
        #[test]
        fn prop_one_program_command_in_flight(len in 1usize..40, manual in 0usize..4) {
            let commands: Vec<String> = (0..len).map(|i| format!("G1 X{}", i)).collect();
            let mut engine = StreamingEngine::new();
            engine.attach().unwrap();
            engine.load(Program::from_commands(&commands)).unwrap();
            for _ in 0..manual {
                engine.record_manual_command();
            }

            let mut sent = vec![engine.start().unwrap()];
            for _ in 0..manual {
                prop_assert_eq!(engine.acknowledge(), Advance::Ignored);
                prop_assert_eq!(engine.cursor(), 0);
            }
            loop {
                prop_assert_eq!(engine.unacknowledged(), 1);
                match engine.acknowledge() {
                    Advance::Send(command) => {
                        prop_assert_eq!(engine.cursor(), sent.len());
                        sent.push(command);
                    }
                    Advance::Completed { lines } => {
                        prop_assert_eq!(lines, len);
                        break;
                    }
                    Advance::Ignored => prop_assert!(false, "acknowledgement ignored mid-job"),
                }
            }

            prop_assert_eq!(sent, commands);
            prop_assert_eq!(engine.progress(), (len, len));
            prop_assert_eq!(engine.state(), SessionState::Idle);
            prop_assert_eq!(engine.unacknowledged(), 0);
        }
    }
}
