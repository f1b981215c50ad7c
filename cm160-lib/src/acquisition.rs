//! # Acquisition state machine
//!
//! A freshly connected CM160 first replays the samples it retained while
//! nobody was listening, oldest first, then switches to live samples. There
//! is no explicit end-of-history marker: the boundary is the first live frame
//! (or the backlog filling the history buffer).
//!
//! During replay readings are held in a [`HistoryBuffer`] and written to the
//! sink in one pass at the boundary. Once live, every reading goes straight
//! to the sink. If a pass is cut short by a sink failure, the reading that
//! failed is dropped and the rest is retried before the next live reading;
//! live readings are never written ahead of queued history.
//!
//! The machine never touches the transport. Handshake frames produce a
//! [`FrameOutcome::Acknowledge`] carrying the byte the caller must write back.

use crate::constants::HISTORY_CAPACITY;
use crate::error::ChecksumError;
use crate::frame::{Frame, FrameKind, Handshake};
use crate::history::HistoryBuffer;
use crate::reading::{Reading, decode};
use crate::sink::Sink;
use strum_macros::Display;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Mode {
    #[strum(to_string = "replaying history")]
    ReplayingHistory,
    #[strum(to_string = "live")]
    Live,
}

/// Result of one history drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Readings accepted by the sink
    pub written: usize,
    /// Readings the sink refused; they are not retried
    pub dropped: usize,
    /// Readings left queued after a sink failure
    pub pending: usize,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }
}

/// What the state machine did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Handshake frame; `ack` must be written back to the device.
    Acknowledge { handshake: Handshake, ack: u8 },
    /// Empty history slot, ignored.
    Empty,
    /// Replay ended; the backlog was drained into the sink.
    Flushed(FlushReport),
    /// Historical frame received while live, discarded.
    OutOfOrder,
    /// Checksum mismatch, discarded.
    Rejected(ChecksumError),
    /// Unknown type byte, discarded.
    Unrecognized(u8),
    /// Reading held in the history buffer.
    Buffered(Reading),
    /// Reading written to the sink.
    Forwarded(Reading),
    /// Sink refused a live reading, which is dropped.
    Dropped(Reading),
    /// Live reading dropped because older history is still queued.
    HeldBack(Reading),
}

impl FrameOutcome {
    /// Acknowledgement byte to write back, if any
    pub fn ack(&self) -> Option<u8> {
        match self {
            FrameOutcome::Acknowledge { ack, .. } => Some(*ack),
            _ => None,
        }
    }
}

/// Per-connection counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcquisitionStats {
    pub frames: u64,
    pub handshakes: u64,
    pub empty: u64,
    pub checksum_errors: u64,
    pub out_of_order: u64,
    pub unrecognized: u64,
    pub buffered: u64,
    pub appended: u64,
    pub sink_failures: u64,
    pub held_back: u64,
}

#[derive(Debug, Clone)]
pub struct AcquisitionStateMachine {
    mode: Mode,
    history: HistoryBuffer,
    last_valid_month: u8,
    stats: AcquisitionStats,
}

impl AcquisitionStateMachine {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            mode: Mode::ReplayingHistory,
            history: HistoryBuffer::new(history_capacity),
            last_valid_month: 0,
            stats: AcquisitionStats::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn last_valid_month(&self) -> u8 {
        self.last_valid_month
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    /// Runs one frame through the transition function.
    pub fn process_frame<S: Sink + ?Sized>(&mut self, frame: &Frame, sink: &mut S) -> FrameOutcome {
        self.stats.frames += 1;
        let kind = frame.kind();
        trace!(%frame, %kind, mode = %self.mode, "Processing frame");

        match kind {
            FrameKind::Handshake(handshake) => {
                self.stats.handshakes += 1;
                debug!("Received {} handshake", handshake);
                FrameOutcome::Acknowledge {
                    handshake,
                    ack: handshake.ack(),
                }
            }
            FrameKind::Empty => {
                self.stats.empty += 1;
                debug!("Received empty frame");
                FrameOutcome::Empty
            }
            FrameKind::Invalid => {
                self.stats.unrecognized += 1;
                warn!(%frame, "Discarding frame with unknown type byte {:#04x}", frame.as_bytes()[0]);
                FrameOutcome::Unrecognized(frame.as_bytes()[0])
            }
            FrameKind::Live | FrameKind::HistoricalData => self.process_data(frame, kind, sink),
        }
    }

    fn process_data<S: Sink + ?Sized>(&mut self, frame: &Frame, kind: FrameKind, sink: &mut S) -> FrameOutcome {
        if self.mode == Mode::ReplayingHistory && (kind == FrameKind::Live || self.history.is_full()) {
            // The frame that ends the replay is not decoded.
            return FrameOutcome::Flushed(self.finish_replay(sink));
        }

        if self.mode == Mode::Live && kind == FrameKind::HistoricalData {
            self.stats.out_of_order += 1;
            warn!(%frame, "Received historical frame while live, discarding");
            return FrameOutcome::OutOfOrder;
        }

        if let Err(e) = frame.validate() {
            self.stats.checksum_errors += 1;
            warn!(%frame, "{}", e);
            return FrameOutcome::Rejected(e);
        }

        let (reading, month) = decode(frame, self.last_valid_month);
        self.last_valid_month = month;
        debug!("DATA: {}", reading);

        match self.mode {
            Mode::ReplayingHistory => match self.history.push(reading) {
                Ok(()) => {
                    self.stats.buffered += 1;
                    trace!(stored = self.history.len(), "Recording history");
                    FrameOutcome::Buffered(reading)
                }
                Err(e) => {
                    // Same boundary as a full buffer: the reading is not kept.
                    info!("{}", e);
                    FrameOutcome::Flushed(self.finish_replay(sink))
                }
            },
            Mode::Live => {
                if !self.history.is_empty() && !self.flush_history(sink).is_complete() {
                    // The store only ever moves forward in time.
                    self.stats.held_back += 1;
                    warn!(
                        timestamp = %reading.timestamp,
                        pending = self.history.len(),
                        "History still queued, dropping live reading"
                    );
                    return FrameOutcome::HeldBack(reading);
                }
                self.forward(reading, sink)
            }
        }
    }

    fn finish_replay<S: Sink + ?Sized>(&mut self, sink: &mut S) -> FlushReport {
        if let Some((oldest, newest)) = self.history.span() {
            info!(
                count = self.history.len(),
                "History replay finished ({} .. {}), switching to live",
                oldest,
                newest
            );
        } else {
            info!("History replay finished with no readings, switching to live");
        }
        self.mode = Mode::Live;
        self.flush_history(sink)
    }

    /// Writes the backlog oldest-first and stops at the first sink failure.
    /// The refused reading is dropped; the ones after it stay queued for the
    /// next pass.
    fn flush_history<S: Sink + ?Sized>(&mut self, sink: &mut S) -> FlushReport {
        let total = self.history.len();
        let mut written = 0;
        let mut failure = None;

        for reading in self.history.iter() {
            if let Err(e) = sink.append(&reading.timestamp, reading.watts) {
                failure = Some((reading.timestamp, e));
                break;
            }
            written += 1;
        }
        self.stats.appended += written as u64;

        let dropped = match failure {
            Some((timestamp, e)) => {
                self.stats.sink_failures += 1;
                error!(%timestamp, written, "Could not dump history reading, dropping it: {}", e);
                1
            }
            None => 0,
        };
        self.history.discard_oldest(written + dropped);

        let pending = self.history.len();
        if pending == 0 {
            debug!(written, dropped, "Wrote {}/{} history readings", written, total);
        } else {
            warn!(written, pending, "History dump interrupted");
        }

        FlushReport {
            written,
            dropped,
            pending,
        }
    }

    fn forward<S: Sink + ?Sized>(&mut self, reading: Reading, sink: &mut S) -> FrameOutcome {
        match sink.append(&reading.timestamp, reading.watts) {
            Ok(()) => {
                self.stats.appended += 1;
                FrameOutcome::Forwarded(reading)
            }
            Err(e) => {
                self.stats.sink_failures += 1;
                error!(timestamp = %reading.timestamp, "Could not append current record: {}", e);
                FrameOutcome::Dropped(reading)
            }
        }
    }
}

impl Default for AcquisitionStateMachine {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
