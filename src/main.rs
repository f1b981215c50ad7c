use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use cm160_lib::constants::HISTORY_CAPACITY;
use cm160_lib::{Cm160, CsvSink, JsonLinesSink, ReplayTransport, Session, Sink};
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{signal, sync::watch, time::sleep};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// `time,watts` rows
    Csv,
    /// One JSON consumption event per line
    JsonLines,
    /// JSON lines on standard output
    Stdout,
    /// SQLite database (needs the `sqlite` feature)
    Sqlite,
}

impl SinkKind {
    fn default_store(self) -> &'static str {
        match self {
            SinkKind::Csv => "/tmp/tesla.csv",
            SinkKind::JsonLines => "/tmp/tesla.jsonl",
            SinkKind::Stdout => "-",
            SinkKind::Sqlite => "/tmp/tesla.sqlite",
        }
    }
}

/// Acquire power readings from an OWL CM160 and store them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Where readings are stored. Defaults to a file under /tmp named after the sink.
    store: Option<PathBuf>,
    /// Storage backend.
    #[arg(short, long, value_enum, default_value_t = SinkKind::Csv)]
    sink: SinkKind,
    /// Feed a capture file (one hex-encoded USB read per line) instead of the device.
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,
    /// Maximum number of history readings held before they are written out.
    #[arg(long, default_value_t = HISTORY_CAPACITY)]
    history_capacity: usize,
    /// Reopen the device after a transport failure instead of exiting.
    #[arg(long)]
    reconnect: bool,
    /// Delay between reconnection attempts.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    reconnect_delay: u64,
    /// Also write logs to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, shutting down gracefully.");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Unable to listen for Ctrl+C: {}", e);
                // Keep the sender alive so the session is not told to stop.
                std::future::pending::<()>().await;
            }
        }
    });

    let result = run(cli, shutdown_rx).await;
    if let Err(e) = &result {
        error!("Application failed: {:?}", e);
    }
    result
}

fn init_tracing(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbosity.tracing_level_filter().into())
        .from_env_lossy();

    let (file_layer, guard) = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    Ok(guard)
}

fn open_sink(kind: SinkKind, store: Option<&Path>) -> Result<Box<dyn Sink>> {
    let path = store.unwrap_or_else(|| Path::new(kind.default_store()));
    match kind {
        SinkKind::Stdout => Ok(Box::new(JsonLinesSink::new(io::stdout()))),
        SinkKind::Csv => {
            let existing = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
            let file = open_append(path)?;
            info!(path = %path.display(), "Using CSV store");
            if existing {
                Ok(Box::new(CsvSink::without_header(file)))
            } else {
                Ok(Box::new(CsvSink::new(file)))
            }
        }
        SinkKind::JsonLines => {
            let file = open_append(path)?;
            info!(path = %path.display(), "Using JSON lines store");
            Ok(Box::new(JsonLinesSink::new(LineWriter::new(file))))
        }
        SinkKind::Sqlite => open_sqlite(path),
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open store {}", path.display()))
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: &Path) -> Result<Box<dyn Sink>> {
    let sink = cm160_lib::SqliteSink::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_path: &Path) -> Result<Box<dyn Sink>> {
    anyhow::bail!("SQLite support is not compiled in; rebuild with `--features sqlite`")
}

async fn run(cli: Cli, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let mut sink = open_sink(cli.sink, cli.store.as_deref())?;

    if let Some(path) = &cli.replay {
        let transport = ReplayTransport::from_file(path)
            .with_context(|| format!("Failed to load capture {}", path.display()))?;
        let mut session = Session::new(transport, sink, cli.history_capacity);
        let end = session.run(&mut shutdown).await?;
        info!("Replay finished: {}", end);
        return Ok(());
    }

    let delay = Duration::from_secs(cli.reconnect_delay);
    info!("Please plug your CM160 device...");
    loop {
        let device = match Cm160::open().await {
            Ok(device) => device,
            Err(e) if cli.reconnect => {
                warn!("Could not open device: {}", e);
                if wait_before_retry(delay, &mut shutdown).await {
                    return Ok(());
                }
                continue;
            }
            Err(e) => return Err(e).context("Failed to open the OWL CM160"),
        };

        // Each connection starts over in history replay with a fresh state machine.
        let mut session = Session::new(device, sink, cli.history_capacity);
        let result = session.run(&mut shutdown).await;
        let (device, returned_sink, _) = session.into_parts();
        sink = returned_sink;
        device.close().await;

        match result {
            Ok(end) => {
                info!("Acquisition stopped: {}", end);
                return Ok(());
            }
            Err(e) if cli.reconnect => {
                error!("Connection lost: {}", e);
                if wait_before_retry(delay, &mut shutdown).await {
                    return Ok(());
                }
            }
            Err(e) => return Err(e).context("Acquisition failed"),
        }
    }
}

/// Sleeps for `delay`; returns true if shutdown was requested meanwhile.
async fn wait_before_retry(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    info!("Retrying in {}s", delay.as_secs());
    tokio::select! {
        _ = sleep(delay) => false,
        _ = shutdown.changed() => true,
    }
}
