//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use cm160_lib::constants::{EMPTY_MSG, FRAME_SIZE, ID_MSG, WAIT_MSG};
#[allow(unused_imports)]
pub use cm160_lib::{
    AcquisitionStateMachine, Frame, FrameOutcome, MemorySink, Mode, ReplayTransport, Session, SessionEnd, Sink,
    SinkError, Timestamp,
};

/// Builds a data frame with a correct checksum
#[allow(dead_code)]
pub fn data_frame(frame_type: u8, month: u8, day: u8, hour: u8, minute: u8, current: u16) -> Frame {
    let current = current.to_le_bytes();
    let mut bytes = [frame_type, 13, month, day, hour, minute, 0, 0, current[0], current[1], 0];
    bytes[10] = bytes[..10].iter().fold(0u8, |sum, &b| sum.wrapping_add(b));
    Frame::new(bytes)
}

/// Historical frame for 2013-04-05 12:mm
#[allow(dead_code)]
pub fn history_frame(minute: u8) -> Frame {
    data_frame(0x59, 4, 5, 12, minute, 100)
}

/// Live frame for 2013-04-05 13:mm
#[allow(dead_code)]
pub fn live_frame(minute: u8) -> Frame {
    data_frame(0x51, 4, 5, 13, minute, 100)
}

/// Concatenates frames into one USB read
#[allow(dead_code)]
pub fn buffer_of(frames: &[Frame]) -> Vec<u8> {
    frames.iter().flat_map(|f| f.into_bytes()).collect()
}

/// Sink that accepts `accept` readings, then fails every append until reset.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct FlakySink {
    pub accepted: Vec<(Timestamp, f64)>,
    pub accept: usize,
    pub attempts: usize,
}

#[allow(dead_code)]
impl FlakySink {
    pub fn failing_after(accept: usize) -> Self {
        Self {
            accept,
            ..Self::default()
        }
    }

    pub fn recover(&mut self) {
        self.accept = usize::MAX;
    }

    pub fn minutes(&self) -> Vec<u8> {
        self.accepted.iter().map(|(ts, _)| ts.minute).collect()
    }
}

impl Sink for FlakySink {
    fn append(&mut self, timestamp: &Timestamp, watts: f64) -> Result<(), SinkError> {
        self.attempts += 1;
        if self.accepted.len() >= self.accept {
            return Err(SinkError::Rejected("store unavailable".to_string()));
        }
        self.accepted.push((*timestamp, watts));
        Ok(())
    }
}

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
