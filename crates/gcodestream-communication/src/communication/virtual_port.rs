//! In-memory transport
//!
//! `VirtualTransport` stands in for a firmware endpoint: the host side writes
//! through the [`Transport`] trait, and the firmware side is driven by
//! [`VirtualTransport::push_line`]. With auto-acknowledge enabled it answers
//! like a minimal GRBL: `ok` for every command line, a status frame for `?`,
//! and a banner after a soft reset.

use super::{LineBuffer, Transport};
use gcodestream_core::TransportError;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const STATUS_FRAME: &str = "<Idle|MPos:0.000,0.000,0.000|FS:0,0>";
const RESET_BANNER: &str = "Grbl 1.1h ['$' for help]";

#[derive(Default)]
struct VirtualState {
    inbound: LineBuffer,
    writes: Vec<Vec<u8>>,
    read_error: Option<String>,
    fail_writes: bool,
}

/// Scriptable in-memory firmware endpoint
pub struct VirtualTransport {
    name: String,
    state: Mutex<VirtualState>,
    changed: Condvar,
    open: AtomicBool,
    auto_ack: AtomicBool,
}

impl VirtualTransport {
    /// Create a silent endpoint
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(VirtualState::default()),
            changed: Condvar::new(),
            open: AtomicBool::new(true),
            auto_ack: AtomicBool::new(false),
        }
    }

    /// Answer every host write the way a minimal GRBL would
    pub fn with_auto_ack(self) -> Self {
        self.auto_ack.store(true, Ordering::SeqCst);
        self
    }

    /// Queue a firmware line for the host to read
    pub fn push_line(&self, line: &str) {
        let mut state = self.state.lock();
        state.inbound.push(line.as_bytes());
        state.inbound.push(b"\n");
        self.changed.notify_all();
    }

    /// Make the next read fail with `reason`
    pub fn inject_read_error(&self, reason: impl Into<String>) {
        self.state.lock().read_error = Some(reason.into());
        self.changed.notify_all();
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Every write so far, byte-exact
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Every write so far as text, with the trailing newline removed
    pub fn written_lines(&self) -> Vec<String> {
        self.state
            .lock()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).trim_end_matches('\n').to_string())
            .collect()
    }

    /// Number of writes so far
    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Block until at least `count` writes were recorded or `timeout` passes
    pub fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.writes.len() < count {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.writes.len() >= count;
            }
        }
        true
    }

    fn auto_reply(state: &mut VirtualState, data: &[u8]) {
        match data {
            [0x18] => {
                state.inbound.push(RESET_BANNER.as_bytes());
                state.inbound.push(b"\n");
            }
            b"?" => {
                state.inbound.push(STATUS_FRAME.as_bytes());
                state.inbound.push(b"\n");
            }
            _ if data.ends_with(b"\n") && data.len() > 1 => state.inbound.push(b"ok\n"),
            _ => {}
        }
    }
}

impl Transport for VirtualTransport {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(TransportError::Write {
                reason: "simulated write failure".to_string(),
            });
        }
        state.writes.push(data.to_vec());
        if self.auto_ack.load(Ordering::SeqCst) {
            Self::auto_reply(&mut state, data);
        }
        self.changed.notify_all();
        Ok(())
    }

    fn read_line(&self, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if !self.is_open() {
                return Err(TransportError::Closed);
            }
            if let Some(reason) = state.read_error.take() {
                return Err(TransportError::Read { reason });
            }
            if let Some(line) = state.inbound.next_line() {
                return Ok(Some(line));
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return Ok(state.inbound.next_line());
            }
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _guard = self.state.lock();
        self.changed.notify_all();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_read() {
        let port = VirtualTransport::new("sim");
        port.push_line("ok");
        assert_eq!(
            port.read_line(Duration::from_millis(10)).unwrap().as_deref(),
            Some("ok")
        );
        assert_eq!(port.read_line(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn test_auto_ack_replies() {
        let port = VirtualTransport::new("sim").with_auto_ack();
        port.write(b"G0 X1\n").unwrap();
        port.write(b"?").unwrap();
        port.write(&[0x18]).unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(port.read_line(timeout).unwrap().as_deref(), Some("ok"));
        assert_eq!(port.read_line(timeout).unwrap().as_deref(), Some(STATUS_FRAME));
        assert_eq!(port.read_line(timeout).unwrap().as_deref(), Some(RESET_BANNER));
        assert_eq!(port.written_lines(), vec!["G0 X1", "?", "\u{18}"]);
    }

    #[test]
    fn test_close_fails_reads_and_writes() {
        let port = VirtualTransport::new("sim");
        port.close();
        assert_eq!(
            port.read_line(Duration::from_millis(10)),
            Err(TransportError::Closed)
        );
        assert_eq!(port.write(b"G0\n"), Err(TransportError::Closed));
    }

    #[test]
    fn test_injected_read_error() {
        let port = VirtualTransport::new("sim");
        port.inject_read_error("unplugged");
        assert!(matches!(
            port.read_line(Duration::from_millis(10)),
            Err(TransportError::Read { .. })
        ));
    }

    #[test]
    fn test_wait_for_writes_times_out() {
        let port = VirtualTransport::new("sim");
        assert!(!port.wait_for_writes(1, Duration::from_millis(10)));
        port.write(b"G0\n").unwrap();
        assert!(port.wait_for_writes(1, Duration::from_millis(10)));
    }
}
