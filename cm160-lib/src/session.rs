use crate::acquisition::{AcquisitionStateMachine, AcquisitionStats};
use crate::error::CmError;
use crate::frame::split_frames;
use crate::sink::Sink;
use crate::transport::Transport;
use strum_macros::Display;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};

/// Why [`Session::run`] returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionEnd {
    #[strum(to_string = "shutdown requested")]
    Shutdown,
    #[strum(to_string = "capture exhausted")]
    Exhausted,
}

/// One connection's worth of acquisition: a transport, a sink and a fresh
/// state machine. Frames are handled strictly in arrival order.
pub struct Session<T, S> {
    transport: T,
    sink: S,
    machine: AcquisitionStateMachine,
}

impl<T: Transport, S: Sink> Session<T, S> {
    pub fn new(transport: T, sink: S, history_capacity: usize) -> Self {
        Self {
            transport,
            sink,
            machine: AcquisitionStateMachine::new(history_capacity),
        }
    }

    pub fn machine(&self) -> &AcquisitionStateMachine {
        &self.machine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_parts(self) -> (T, S, AcquisitionStateMachine) {
        (self.transport, self.sink, self.machine)
    }

    /// Reads and processes until shutdown, end of capture or a transport error.
    ///
    /// Shutdown is only observed between reads, so a buffer that has been
    /// read is always processed completely.
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<SessionEnd, CmError> {
        info!("Start acquiring data...");
        let result = self.read_loop(shutdown).await;

        if let Err(e) = self.sink.flush() {
            error!("Could not flush sink: {}", e);
        }
        log_stats(self.machine.stats());
        result
    }

    async fn read_loop(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<SessionEnd, CmError> {
        loop {
            if *shutdown.borrow() {
                return Ok(SessionEnd::Shutdown);
            }

            let read = tokio::select! {
                biased;
                _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
                read = self.transport.read() => read,
            };

            match read {
                Ok(buffer) => self.process_buffer(&buffer).await?,
                Err(CmError::EndOfCapture) => return Ok(SessionEnd::Exhausted),
                Err(e) => return Err(e),
            }
        }
    }

    /// Feeds every complete frame of `buffer` to the state machine and
    /// writes back any acknowledgement. A trailing partial frame is dropped.
    pub async fn process_buffer(&mut self, buffer: &[u8]) -> Result<(), CmError> {
        let mut frames = split_frames(buffer);
        trace!(bytes = buffer.len(), frames = frames.len(), "Treating read");

        for frame in frames.by_ref() {
            let outcome = self.machine.process_frame(&frame, &mut self.sink);
            if let Some(ack) = outcome.ack() {
                self.transport.write_ack(ack).await?;
            }
        }

        let remainder = frames.remainder();
        if !remainder.is_empty() {
            warn!(
                bytes = remainder.len(),
                data = hex::encode(remainder),
                "Discarding incomplete frame"
            );
        }
        Ok(())
    }
}

fn log_stats(stats: &AcquisitionStats) {
    info!(
        frames = stats.frames,
        handshakes = stats.handshakes,
        empty = stats.empty,
        checksum_errors = stats.checksum_errors,
        out_of_order = stats.out_of_order,
        unrecognized = stats.unrecognized,
        buffered = stats.buffered,
        appended = stats.appended,
        sink_failures = stats.sink_failures,
        held_back = stats.held_back,
        "Session statistics"
    );
}
