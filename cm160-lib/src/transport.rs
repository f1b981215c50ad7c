use crate::error::CmError;
use bytes::Bytes;
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info};

/// Source of raw device reads and sink for handshake acknowledgements.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Blocks until the device delivers a buffer. The buffer holds whole
    /// frames, possibly followed by a partial one.
    async fn read(&mut self) -> Result<Bytes, CmError>;

    /// Writes exactly one acknowledgement byte.
    async fn write_ack(&mut self, ack: u8) -> Result<(), CmError>;
}

/// Feeds previously captured USB reads instead of a live device.
///
/// A capture is plain text with one hex-encoded read per line. Whitespace
/// inside a line is ignored, as are blank lines and lines starting with `#`.
#[derive(Debug, Default, Clone)]
pub struct ReplayTransport {
    buffers: VecDeque<Bytes>,
    acks: Vec<u8>,
}

impl ReplayTransport {
    pub fn from_buffers<I, B>(buffers: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            buffers: buffers.into_iter().map(Into::into).collect(),
            acks: Vec::new(),
        }
    }

    pub fn from_hex_lines(text: &str) -> Result<Self, CmError> {
        let mut buffers = VecDeque::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
            let data = hex::decode(&compact).map_err(|e| CmError::ParseError {
                line: index + 1,
                message: e.to_string(),
            })?;
            buffers.push_back(Bytes::from(data));
        }
        Ok(Self {
            buffers,
            acks: Vec::new(),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CmError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let transport = Self::from_hex_lines(&text)?;
        info!(
            path = %path.as_ref().display(),
            reads = transport.remaining(),
            "Loaded capture"
        );
        Ok(transport)
    }

    /// Reads not yet delivered
    pub fn remaining(&self) -> usize {
        self.buffers.len()
    }

    /// Acknowledgement bytes written so far, in order
    pub fn acks(&self) -> &[u8] {
        &self.acks
    }
}

impl Transport for ReplayTransport {
    async fn read(&mut self) -> Result<Bytes, CmError> {
        let data = self.buffers.pop_front().ok_or(CmError::EndOfCapture)?;
        debug!(bytes = hex::encode(&data), "Replay Read");
        Ok(data)
    }

    async fn write_ack(&mut self, ack: u8) -> Result<(), CmError> {
        debug!("Replay Ack: {:#04x}", ack);
        self.acks.push(ack);
        Ok(())
    }
}
