use gcodestream::{MemoryLogSink, Session, SessionEvent, SessionSettings, SessionState, VirtualTransport};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_streams_file_into_simulator() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "; generated").unwrap();
    writeln!(file, "G21").unwrap();
    writeln!(file, "G0 X5 Y5").unwrap();
    writeln!(file, "(engrave)").unwrap();
    writeln!(file, "G1 X10 Y0 F300").unwrap();

    let session = Session::new(SessionSettings {
        settle_delay: Duration::from_millis(1),
        read_timeout: Duration::from_millis(10),
        ..SessionSettings::default()
    });
    let sink = MemoryLogSink::new();
    session.set_log_sink(Arc::new(sink.clone()));
    session
        .connect(Arc::new(VirtualTransport::new("simulator").with_auto_ack()))
        .unwrap();

    assert_eq!(session.load_file(file.path()).unwrap(), 3);
    assert_eq!(session.trajectory().last_x, 10.0);
    assert_eq!(session.trajectory().last_y, 0.0);

    let mut events = session.subscribe();
    session.start().await.unwrap();
    let completed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(SessionEvent::JobCompleted { lines }) = events.recv().await {
                return lines;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(completed, 3);
    assert_eq!(sink.transmitted(), vec!["G21", "G0 X5 Y5", "G1 X10 Y0 F300"]);
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_missing_file_is_a_load_error() {
    let session = Session::default();
    let err = session.load_file("/nonexistent/job.nc").unwrap_err();
    assert!(matches!(err, gcodestream::Error::Load(_)));
}
