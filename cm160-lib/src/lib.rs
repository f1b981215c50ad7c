pub mod acquisition;
pub mod constants;
pub mod device;
pub mod error;
pub mod frame;
pub mod history;
pub mod reading;
pub mod session;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod tests;

// Re-export the main types for easy access
pub use acquisition::{AcquisitionStateMachine, AcquisitionStats, FlushReport, FrameOutcome, Mode};
pub use device::Cm160;
pub use error::{CapacityExceeded, ChecksumError, CmError, SinkError};
pub use frame::{Frame, FrameKind, FrameType, Handshake, split_frames, validate};
pub use history::HistoryBuffer;
pub use reading::{Reading, Timestamp, decode};
pub use session::{Session, SessionEnd};
pub use sink::{CsvSink, JsonLinesSink, MemorySink, Sink};
pub use transport::{ReplayTransport, Transport};

#[cfg(feature = "sqlite")]
pub use sink::SqliteSink;
