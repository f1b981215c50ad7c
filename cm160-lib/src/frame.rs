//! # CM160 frame format
//!
//! Everything the device sends is cut into 11-byte frames. Three of them are
//! fixed sentinels (`ID_MSG`, `WAIT_MSG`, `EMPTY_MSG`); every other frame is a
//! data frame whose first byte tells live samples (`0x51`) from replayed
//! history (`0x59`) and whose last byte is a mod-256 sum of the first ten.
//!
//! A single USB read may carry several frames. [`split_frames`] walks them
//! in order and keeps the trailing partial frame aside so the caller can
//! drop it; the device resends incomplete frames.

use crate::constants::{ACK_ID, ACK_WAIT, CHECKSUM_SPAN, EMPTY_MSG, FRAME_SIZE, ID_MSG, WAIT_MSG};
use crate::error::{ChecksumError, CmError};
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;
use std::slice::ChunksExact;
use strum_macros::Display;

/// One 11-byte protocol unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_SIZE]);

/// Type byte of a non-sentinel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Live = 0x51,
    History = 0x59,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Handshake sentinels that require a one-byte answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Handshake {
    #[strum(to_string = "ID")]
    Id,
    #[strum(to_string = "WAIT")]
    Wait,
}

impl Handshake {
    /// Byte the host must write back for this handshake
    pub fn ack(self) -> u8 {
        match self {
            Handshake::Id => ACK_ID,
            Handshake::Wait => ACK_WAIT,
        }
    }
}

/// Classification of a frame. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Handshake(Handshake),
    Empty,
    Live,
    HistoricalData,
    Invalid,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Handshake(handshake) => write!(f, "handshake {}", handshake),
            FrameKind::Empty => write!(f, "empty"),
            FrameKind::Live => write!(f, "live"),
            FrameKind::HistoricalData => write!(f, "historical"),
            FrameKind::Invalid => write!(f, "invalid"),
        }
    }
}

impl FrameKind {
    /// True for frames that carry a sample
    pub fn is_data(&self) -> bool {
        matches!(self, FrameKind::Live | FrameKind::HistoricalData)
    }
}

impl Frame {
    pub const fn new(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; FRAME_SIZE] {
        self.0
    }

    pub fn frame_type(&self) -> FrameType {
        FrameType::from_primitive(self.0[0])
    }

    /// Checksum byte carried by the frame
    pub fn checksum(&self) -> u8 {
        self.0[CHECKSUM_SPAN]
    }

    /// Low byte of the sum of bytes 0..10
    pub fn computed_checksum(&self) -> u8 {
        self.0[..CHECKSUM_SPAN].iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
    }

    pub fn validate(&self) -> Result<(), ChecksumError> {
        let computed = self.computed_checksum();
        if computed == self.checksum() {
            Ok(())
        } else {
            Err(ChecksumError {
                expected: self.checksum(),
                computed,
            })
        }
    }

    /// Sentinels are matched on the whole frame before the type byte is looked at.
    pub fn kind(&self) -> FrameKind {
        match self.0 {
            ID_MSG => FrameKind::Handshake(Handshake::Id),
            WAIT_MSG => FrameKind::Handshake(Handshake::Wait),
            EMPTY_MSG => FrameKind::Empty,
            _ => match self.frame_type() {
                FrameType::Live => FrameKind::Live,
                FrameType::History => FrameKind::HistoricalData,
                FrameType::Unknown(_) => FrameKind::Invalid,
            },
        }
    }

    fn from_chunk(chunk: &[u8]) -> Self {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes.copy_from_slice(chunk);
        Self(bytes)
    }
}

/// Checks the frame checksum. Pure and total over any 11 bytes.
pub fn validate(frame: &Frame) -> Result<(), ChecksumError> {
    frame.validate()
}

impl From<[u8; FRAME_SIZE]> for Frame {
    fn from(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = CmError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; FRAME_SIZE] = bytes.try_into().map_err(|_| CmError::InvalidFrame {
            expected: FRAME_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Iterator over the complete frames of one USB read.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl<'a> Frames<'a> {
    /// Trailing bytes that do not form a complete frame
    pub fn remainder(&self) -> &'a [u8] {
        self.chunks.remainder()
    }
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(Frame::from_chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Frames<'_> {}

pub fn split_frames(buffer: &[u8]) -> Frames<'_> {
    Frames {
        chunks: buffer.chunks_exact(FRAME_SIZE),
    }
}
