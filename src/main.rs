use anyhow::{bail, Context};
use clap::Parser;
use gcodestream::{
    init_logging, Config, ConnectionParams, SerialTransport, Session, SessionEvent,
    SessionSettings, Transport, VirtualTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gcodestream", version, about = "Stream a G-code file to GRBL-style firmware")]
struct Args {
    /// Serial port (e.g., /dev/ttyUSB0, COM3); overrides the config file
    #[arg(short, long)]
    port: Option<String>,
    /// Baud rate; overrides the config file
    #[arg(short, long)]
    baud: Option<u32>,
    /// Config file (JSON or TOML); defaults to the per-user config
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Stream into an in-memory firmware that acknowledges every line
    #[arg(long)]
    simulate: bool,
    /// G-code file to stream
    file: PathBuf,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_or_default()?,
    };
    if let Some(port) = &args.port {
        config.connection.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.connection.baud_rate = baud;
    }
    config.validate()?;
    Ok(config)
}

fn open_transport(args: &Args, config: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    if args.simulate {
        return Ok(Arc::new(VirtualTransport::new("simulator").with_auto_ack()));
    }
    if config.connection.port.is_empty() {
        bail!("No serial port given; pass --port or set connection.port in the config");
    }
    let params = ConnectionParams::new(config.connection.port.clone(), config.connection.baud_rate);
    Ok(Arc::new(SerialTransport::open(&params)?))
}

async fn stream(session: &Session, args: &Args) -> anyhow::Result<()> {
    let lines = session
        .load_file(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    info!("Streaming {} commands from {}", lines, args.file.display());

    let mut events = session.subscribe();
    session.start().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::JobCompleted { lines }) => {
                    info!("Finished {} commands", lines);
                    return Ok(());
                }
                Ok(SessionEvent::FirmwareError { command, response }) => {
                    session.stop();
                    bail!("Firmware rejected {:?}: {}", command, response);
                }
                Ok(SessionEvent::Alarm(message)) => {
                    session.stop();
                    bail!("Firmware alarm: {}", message);
                }
                Ok(SessionEvent::ConnectionLost(reason)) => bail!("Connection lost: {}", reason),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} session events", skipped),
                Err(RecvError::Closed) => bail!("Session closed"),
            },
            _ = tokio::signal::ctrl_c() => {
                session.emergency_stop()?;
                let (sent, total) = session.progress();
                bail!("Interrupted after {} of {} commands", sent, total);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging()?;

    let config = load_config(&args)?;
    let session = Session::new(SessionSettings::from(&config));
    session.connect(open_transport(&args, &config)?)?;

    let result = stream(&session, &args).await;
    session.disconnect().await?;
    result
}
