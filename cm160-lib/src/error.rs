use crate::reading::Timestamp;
use std::io;
use thiserror::Error;

/// The primary error type for the `cm160-lib` library.
#[derive(Error, Debug)]
pub enum CmError {
    #[error("USB device not found. Is the OWL CM160 plugged in?")]
    DeviceNotFound,

    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer error: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    #[error("Timeout during USB operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    #[error("Parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("End of capture")]
    EndOfCapture,
}

/// A frame whose trailing byte does not match the sum of the first ten.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid checksum: expected {expected:#04x}, computed {computed:#04x}")]
pub struct ChecksumError {
    /// Checksum byte carried by the frame
    pub expected: u8,
    /// Checksum computed over bytes 0..10
    pub computed: u8,
}

/// The history buffer already holds `capacity` readings.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("History buffer full ({capacity} readings)")]
pub struct CapacityExceeded {
    pub capacity: usize,
}

/// Failure reported by a persistence backend.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Timestamp {0} is not a valid local date")]
    InvalidTimestamp(Timestamp),

    #[error("Rejected: {0}")]
    Rejected(String),
}
