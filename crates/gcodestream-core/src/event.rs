//! Session event system
//!
//! Provides:
//! - Event types for session state, position and job progress
//! - Event dispatcher for publishing events to subscribers

use crate::data::{MachineState, PositionSnapshot, SessionState};
use tokio::sync::broadcast;

/// Session event types
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A transport was attached
    Connected(String),
    /// The transport was detached on request
    Disconnected,
    /// The transport failed and the session dropped it
    ConnectionLost(String),
    /// Session state changed
    StateChanged(SessionState),
    /// A status frame updated the position snapshot
    PositionChanged {
        /// The new machine position.
        position: PositionSnapshot,
        /// The machine state tag, when the frame carried one.
        machine_state: Option<MachineState>,
    },
    /// Every command of the program was acknowledged
    JobCompleted {
        /// Number of commands streamed.
        lines: usize,
    },
    /// The firmware rejected a command
    FirmwareError {
        /// The last line sent.
        command: String,
        /// The raw error response.
        response: String,
    },
    /// The firmware raised an alarm
    Alarm(String),
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Connected(name) => write!(f, "Connected to {}", name),
            SessionEvent::Disconnected => write!(f, "Disconnected"),
            SessionEvent::ConnectionLost(reason) => write!(f, "Connection lost: {}", reason),
            SessionEvent::StateChanged(state) => write!(f, "State: {}", state),
            SessionEvent::PositionChanged { position, .. } => write!(f, "Position: {}", position),
            SessionEvent::JobCompleted { lines } => write!(f, "Job complete ({} lines)", lines),
            SessionEvent::FirmwareError { command, response } => {
                write!(f, "Error in command {}: {}", command, response)
            }
            SessionEvent::Alarm(message) => write!(f, "Alarm: {}", message),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of receivers; zero subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let dispatcher = EventDispatcher::default();
        assert_eq!(dispatcher.publish(SessionEvent::Disconnected), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 1);

        dispatcher.publish(SessionEvent::JobCompleted { lines: 3 });
        let event = rx.recv().await.unwrap();
        assert_eq!(event, SessionEvent::JobCompleted { lines: 3 });
        assert_eq!(event.to_string(), "Job complete (3 lines)");
    }
}
