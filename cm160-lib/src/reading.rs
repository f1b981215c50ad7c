use crate::constants::{AMPS_PER_COUNT, LINE_VOLTAGE, YEAR_BASE};
use crate::frame::Frame;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Data frame layout (11 bytes)
///
/// Historical and live frames share this layout. The timestamp is the
/// device's local wall-clock time at minute resolution.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct DataFrameRaw {
    /// 0x51 (live) or 0x59 (history)
    pub frame_type: u8,
    /// Years since 2000
    pub year: u8,
    /// 1-12, occasionally garbage
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    /// Not decoded
    pub reserved: [u8; 2],
    /// Mean current over the preceding minute, 0.07 A per count
    pub current_raw: U16,
    pub checksum: u8,
}

impl From<&Frame> for DataFrameRaw {
    fn from(frame: &Frame) -> Self {
        zerocopy::transmute!(frame.into_bytes())
    }
}

/// Minute-resolution timestamp of a reading. Seconds are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub year: u16,
    /// Zero-based month, 0-11
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl Timestamp {
    /// Year in the "years since 1900" convention of calendar structs
    pub fn years_since_1900(&self) -> i32 {
        i32::from(self.year) - 1900
    }

    /// Calendar date and time, or `None` when the fields do not form a real date
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month) + 1, u32::from(self.day))?.and_hms_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            0,
        )
    }

    /// Interprets the timestamp in the host's local time zone.
    /// Ambiguous times (DST fold) resolve to the earlier instant.
    pub fn to_local(&self) -> Option<DateTime<Local>> {
        Local.from_local_datetime(&self.to_naive()?).earliest()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}/{:02}/{:02} {:02}:{:02}",
            self.year,
            u16::from(self.month) + 1,
            self.day,
            self.hour,
            self.minute
        )
    }
}

/// A decoded sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: Timestamp,
    pub amps: f64,  // Amperes, mean over one minute
    pub watts: f64, // Watts at nominal line voltage
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {:.2} A, {:.0} W", self.timestamp, self.amps, self.watts)
    }
}

/// Decodes a data frame into a reading.
///
/// The device firmware sometimes reports a month outside 1-12. Such a month
/// is replaced by `last_valid_month`; an in-range month becomes the new
/// carried value. Returns the reading and the month to carry forward.
///
/// The checksum is not checked here; see [`Frame::validate`].
pub fn decode(frame: &Frame, last_valid_month: u8) -> (Reading, u8) {
    let raw = DataFrameRaw::from(frame);

    let decoded_month = i16::from(raw.month) - 1;
    let month = match u8::try_from(decoded_month) {
        Ok(month) if month <= 11 => month,
        _ => {
            debug!(
                raw_month = raw.month,
                repaired = last_valid_month,
                "Month out of range, using last valid month"
            );
            last_valid_month
        }
    };

    let amps = f64::from(raw.current_raw.get()) * AMPS_PER_COUNT;
    let reading = Reading {
        timestamp: Timestamp {
            year: YEAR_BASE + u16::from(raw.year),
            month,
            day: raw.day,
            hour: raw.hour,
            minute: raw.minute,
        },
        amps,
        watts: amps * LINE_VOLTAGE,
    };
    (reading, month)
}
