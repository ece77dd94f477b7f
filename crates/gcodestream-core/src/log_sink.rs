//! Observability sinks
//!
//! A session writes one human-readable line per wire event into its sink:
//! transmitted lines are prefixed with [`TX_PREFIX`], received lines with
//! [`RX_PREFIX`]. External dashboards parse these prefixes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Prefix for every transmitted line
pub const TX_PREFIX: &str = "→ ";

/// Prefix for every received line
pub const RX_PREFIX: &str = "← ";

/// Write-only log capability
pub trait LogSink: Send + Sync {
    /// Append a single line
    fn append(&self, line: &str);
}

/// Forwards sink lines to `tracing` under the `gcodestream::wire` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn append(&self, line: &str) {
        tracing::info!(target: "gcodestream::wire", "{}", line);
    }
}

/// A timestamped sink line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// When the line was appended
    pub timestamp: DateTime<Utc>,
    /// The line text
    pub line: String,
}

/// Collects sink lines in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLogSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines appended so far, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.line.clone()).collect()
    }

    /// All entries appended so far, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Lines carrying the transmit prefix, with the prefix stripped
    pub fn transmitted(&self) -> Vec<String> {
        self.lines()
            .iter()
            .filter_map(|l| l.strip_prefix(TX_PREFIX).map(str::to_string))
            .collect()
    }

    /// Check whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|e| e.line.contains(needle))
    }

    /// Drop all collected lines
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, line: &str) {
        self.entries.lock().push(LogEntry {
            timestamp: Utc::now(),
            line: line.to_string(),
        });
    }
}

/// Forwards sink lines over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelLogSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelLogSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelLogSink {
    fn append(&self, line: &str) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.tx.send(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects_lines() {
        let sink = MemoryLogSink::new();
        sink.append("→ G0 X1");
        sink.append("← ok");
        assert_eq!(sink.lines(), vec!["→ G0 X1", "← ok"]);
        assert_eq!(sink.transmitted(), vec!["G0 X1"]);
        assert!(sink.contains("ok"));

        sink.clear();
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelLogSink::new();
        sink.append("Connected");
        assert_eq!(rx.recv().await.as_deref(), Some("Connected"));

        drop(rx);
        sink.append("ignored");
    }
}
