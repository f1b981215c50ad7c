// Protocol constants for the OWL CM160

use std::time::Duration;

/// Size of every frame exchanged with the device (11 bytes)
pub const FRAME_SIZE: usize = 11;

/// Number of leading bytes covered by the checksum
pub const CHECKSUM_SPAN: usize = 10;

/// Type byte of a live (real-time) data frame
pub const FRAME_ID_LIVE: u8 = 0x51;

/// Type byte of a historical (backlog replay) data frame
pub const FRAME_ID_HISTORY: u8 = 0x59;

/// Identification handshake sent by the device after connection ("IDTCMV001")
pub const ID_MSG: [u8; FRAME_SIZE] = [0xA9, 0x49, 0x44, 0x54, 0x43, 0x4D, 0x56, 0x30, 0x30, 0x31, 0x01];

/// Wait handshake sent periodically by the device ("IDTWAITPCR")
pub const WAIT_MSG: [u8; FRAME_SIZE] = [0xA9, 0x49, 0x44, 0x54, 0x57, 0x41, 0x49, 0x54, 0x50, 0x43, 0x52];

/// Historical frame with no retained sample. Its checksum is valid.
pub const EMPTY_MSG: [u8; FRAME_SIZE] = [0x59, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x50];

/// Acknowledgement byte for `ID_MSG`
pub const ACK_ID: u8 = 0x5A;

/// Acknowledgement byte for `WAIT_MSG`
pub const ACK_WAIT: u8 = 0xA5;

/// Default history capacity. The device retains about 30 days of
/// minute samples (43200), rounded up.
pub const HISTORY_CAPACITY: usize = 65536;

/// Nominal line voltage used to derive power from current
pub const LINE_VOLTAGE: f64 = 230.0;

/// Amperes per raw current count (mean over the preceding minute)
pub const AMPS_PER_COUNT: f64 = 0.07;

/// The device reports two-digit years
pub const YEAR_BASE: u16 = 2000;

// USB identification and endpoints

pub const VID: u16 = 0x0FDE;
pub const PID: u16 = 0xCA05;
pub const ENDPOINT_IN: u8 = 0x82;
pub const ENDPOINT_OUT: u8 = 0x01;
pub const CONFIGURATION: u8 = 1;
pub const INTERFACE: u8 = 0;

/// Size of one bulk IN request
pub const READ_BUFFER_SIZE: usize = 512;

// CP210x USB-UART bridge vendor requests

pub const CP210X_IFC_ENABLE: u8 = 0x00;
pub const CP210X_SET_BAUDRATE: u8 = 0x1E;
pub const UART_ENABLE: u16 = 0x0001;
pub const UART_DISABLE: u16 = 0x0000;
pub const BAUD_RATE: u32 = 250_000;

/// Timeout for the UART setup control transfers
pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(500);

/// Timeout for writing a handshake acknowledgement
pub const ACK_TIMEOUT: Duration = Duration::from_secs(1);
