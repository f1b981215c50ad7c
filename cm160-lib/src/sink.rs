//! Persistence backends for decoded readings.
//!
//! The acquisition core only ever calls [`Sink::append`]. Deduplication of
//! readings replayed again after a reconnect is left to each backend.

use crate::error::SinkError;
use crate::reading::Timestamp;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::io::Write;
use tracing::trace;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub trait Sink {
    fn append(&mut self, timestamp: &Timestamp, watts: f64) -> Result<(), SinkError>;

    /// Pushes buffered output to the backing store
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn append(&mut self, timestamp: &Timestamp, watts: f64) -> Result<(), SinkError> {
        (**self).append(timestamp, watts)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn append(&mut self, timestamp: &Timestamp, watts: f64) -> Result<(), SinkError> {
        (**self).append(timestamp, watts)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

fn calendar_time(timestamp: &Timestamp) -> Result<NaiveDateTime, SinkError> {
    timestamp.to_naive().ok_or(SinkError::InvalidTimestamp(*timestamp))
}

/// Keeps every appended reading in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<(Timestamp, f64)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for MemorySink {
    fn append(&mut self, timestamp: &Timestamp, watts: f64) -> Result<(), SinkError> {
        self.records.push((*timestamp, watts));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CsvRow {
    time: String,
    watts: f64,
}

/// Writes `time,watts` rows with ISO-8601 local times.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    /// Same as [`CsvSink::new`] but without a header row, for appending to an existing file
    pub fn without_header(inner: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(inner),
        }
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }
}

impl<W: Write> Sink for CsvSink<W> {
    fn append(&mut self, timestamp: &Timestamp, watts: f64) -> Result<(), SinkError> {
        let time = calendar_time(timestamp)?;
        self.writer.serialize(CsvRow {
            time: time.format(TIME_FORMAT).to_string(),
            watts,
        })?;
        // One row per minute at most, so every row goes straight to disk.
        self.writer.flush()?;
        trace!(%timestamp, watts, "CSV row written");
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ConsumptionEvent {
    timestamp: String,
    consumption: Consumption,
}

#[derive(Debug, Serialize)]
struct Consumption {
    value: u64,
}

/// One JSON object per line:
/// `{"timestamp":"2013-04-05T12:34:00","consumption":{"value":1610}}`
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn append(&mut self, timestamp: &Timestamp, watts: f64) -> Result<(), SinkError> {
        let time = calendar_time(timestamp)?;
        let event = ConsumptionEvent {
            timestamp: time.format(TIME_FORMAT).to_string(),
            consumption: Consumption {
                value: watts.max(0.0).round() as u64,
            },
        };
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSink;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::{Sink, TIME_FORMAT, calendar_time};
    use crate::error::SinkError;
    use crate::reading::Timestamp;
    use chrono::{Local, TimeZone};
    use rusqlite::{Connection, params};
    use std::path::Path;
    use tracing::info;

    /// Stores readings in a `readings` table keyed by local time.
    /// A reading replayed again after a reconnect replaces the earlier row.
    pub struct SqliteSink {
        conn: Connection,
    }

    impl SqliteSink {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
            let conn = Connection::open(path.as_ref())?;
            info!(path = %path.as_ref().display(), "Opened SQLite store");
            Self::with_connection(conn)
        }

        pub fn open_in_memory() -> Result<Self, SinkError> {
            Self::with_connection(Connection::open_in_memory()?)
        }

        fn with_connection(conn: Connection) -> Result<Self, SinkError> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS readings (
                    time  TEXT PRIMARY KEY,
                    epoch INTEGER,
                    watts REAL NOT NULL
                );",
            )?;
            Ok(Self { conn })
        }

        pub fn connection(&self) -> &Connection {
            &self.conn
        }
    }

    impl Sink for SqliteSink {
        fn append(&mut self, timestamp: &Timestamp, watts: f64) -> Result<(), SinkError> {
            let time = calendar_time(timestamp)?;
            let epoch = Local.from_local_datetime(&time).earliest().map(|t| t.timestamp());
            self.conn.execute(
                "INSERT OR REPLACE INTO readings (time, epoch, watts) VALUES (?1, ?2, ?3)",
                params![time.format(TIME_FORMAT).to_string(), epoch, watts],
            )?;
            Ok(())
        }
    }
}
