use crate::constants::{EMPTY_MSG, FRAME_SIZE, ID_MSG, WAIT_MSG};
use crate::error::{CapacityExceeded, ChecksumError, CmError};
use crate::frame::{Frame, FrameKind, FrameType, Handshake, split_frames, validate};
use crate::history::HistoryBuffer;
use crate::reading::{DataFrameRaw, Reading, Timestamp, decode};

fn frame_from_hex(hex_data: &str) -> Frame {
    let bytes = hex::decode(hex_data).expect("Failed to decode hex");
    Frame::try_from(bytes.as_slice()).expect("Failed to build frame")
}

fn with_checksum(mut bytes: [u8; FRAME_SIZE]) -> Frame {
    bytes[10] = bytes[..10].iter().fold(0u8, |sum, &b| sum.wrapping_add(b));
    Frame::new(bytes)
}

fn reading_at(minute: u8) -> Reading {
    Reading {
        timestamp: Timestamp {
            year: 2013,
            month: 3,
            day: 5,
            hour: 12,
            minute,
        },
        amps: 1.0,
        watts: 230.0,
    }
}

#[test]
fn test_sentinels_have_valid_checksums() {
    for sentinel in [ID_MSG, WAIT_MSG, EMPTY_MSG] {
        assert!(Frame::new(sentinel).validate().is_ok(), "{:02x?}", sentinel);
    }
}

#[test]
fn test_classify_sentinels() {
    assert_eq!(Frame::new(ID_MSG).kind(), FrameKind::Handshake(Handshake::Id));
    assert_eq!(Frame::new(WAIT_MSG).kind(), FrameKind::Handshake(Handshake::Wait));
    // EMPTY_MSG starts with the history type byte but must not be treated as data
    assert_eq!(Frame::new(EMPTY_MSG).kind(), FrameKind::Empty);
    assert_eq!(Handshake::Id.ack(), 0x5A);
    assert_eq!(Handshake::Wait.ack(), 0xA5);
}

#[test]
fn test_classify_by_type_byte() {
    let live = with_checksum([0x51, 13, 4, 5, 12, 34, 0, 0, 0x64, 0, 0]);
    let history = with_checksum([0x59, 13, 4, 5, 12, 34, 0, 0, 0x64, 0, 0]);
    let unknown = with_checksum([0x42, 13, 4, 5, 12, 34, 0, 0, 0x64, 0, 0]);

    assert_eq!(live.kind(), FrameKind::Live);
    assert_eq!(history.kind(), FrameKind::HistoricalData);
    assert_eq!(unknown.kind(), FrameKind::Invalid);
    assert_eq!(unknown.frame_type(), FrameType::Unknown(0x42));
    assert!(live.kind().is_data());
    assert!(!Frame::new(WAIT_MSG).kind().is_data());
}

#[test]
fn test_validate_matches_byte_sum() {
    // 0x59 + 0x0d + 0x04 + 0x05 + 0x0c + 0x22 + 0x64 = 0x101 -> 0x01
    let frame = frame_from_hex("590d04050c220000640001");
    assert_eq!(frame.computed_checksum(), 0x01);
    assert_eq!(validate(&frame), Ok(()));

    let corrupted = frame_from_hex("590d04050c220000640002");
    assert_eq!(
        validate(&corrupted),
        Err(ChecksumError {
            expected: 0x02,
            computed: 0x01
        })
    );
}

#[test]
fn test_validate_is_pure() {
    let frames = [
        frame_from_hex("590d04050c220000640001"),
        frame_from_hex("590d04050c220000640002"),
        Frame::new([0xFF; FRAME_SIZE]),
        Frame::new([0x00; FRAME_SIZE]),
    ];
    for frame in frames {
        assert_eq!(validate(&frame), validate(&frame));
    }
}

#[test]
fn test_validate_exhaustive_checksum_byte() {
    let mut bytes = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80, 0x90, 0xA0, 0x00];
    let expected = bytes[..10].iter().map(|&b| u32::from(b)).sum::<u32>() % 256;
    for checksum in 0..=u8::MAX {
        bytes[10] = checksum;
        let frame = Frame::new(bytes);
        assert_eq!(frame.validate().is_ok(), u32::from(checksum) == expected);
    }
}

#[test]
fn test_frame_from_short_slice() {
    let result = Frame::try_from(&[0x59, 0x0d, 0x04][..]);
    match result {
        Err(CmError::InvalidFrame { expected, actual }) => {
            assert_eq!(expected, FRAME_SIZE);
            assert_eq!(actual, 3);
        }
        other => panic!("Expected InvalidFrame, got {:?}", other),
    }
}

#[test]
fn test_split_frames_drops_partial_tail() {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&WAIT_MSG);
    buffer.extend_from_slice(&ID_MSG);
    buffer.extend_from_slice(&[0x59, 0x0d, 0x04]);

    let mut frames = split_frames(&buffer);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames.next(), Some(Frame::new(WAIT_MSG)));
    assert_eq!(frames.next(), Some(Frame::new(ID_MSG)));
    assert_eq!(frames.next(), None);
    assert_eq!(frames.remainder(), &[0x59, 0x0d, 0x04]);
}

#[test]
fn test_frame_display_is_hex() {
    assert_eq!(Frame::new(WAIT_MSG).to_string(), "a949445457414954504352");
}

#[test]
fn test_raw_layout() {
    let frame = frame_from_hex("590d04050c220000640001");
    let raw = DataFrameRaw::from(&frame);
    assert_eq!(raw.frame_type, 0x59);
    assert_eq!(raw.year, 13);
    assert_eq!(raw.month, 4);
    assert_eq!(raw.day, 5);
    assert_eq!(raw.hour, 12);
    assert_eq!(raw.minute, 34);
    assert_eq!(raw.current_raw.get(), 100);
    assert_eq!(raw.checksum, 0x01);
}

#[test]
fn test_decode_fields_and_power() {
    let frame = frame_from_hex("590d04050c220000640001");
    let (reading, month) = decode(&frame, 0);

    assert_eq!(
        reading.timestamp,
        Timestamp {
            year: 2013,
            month: 3,
            day: 5,
            hour: 12,
            minute: 34
        }
    );
    assert_eq!(reading.timestamp.years_since_1900(), 113);
    assert_eq!(month, 3);
    assert!((reading.amps - 7.0).abs() < 1e-9);
    assert!((reading.watts - 1610.0).abs() < 1e-9);
}

#[test]
fn test_decode_current_is_little_endian() {
    // 0x0100 = 256 counts -> 17.92 A
    let frame = with_checksum([0x51, 13, 1, 1, 0, 0, 0, 0, 0x00, 0x01, 0]);
    let (reading, _) = decode(&frame, 0);
    assert!((reading.amps - 17.92).abs() < 1e-9);
}

#[test]
fn test_month_repair_uses_carried_month() {
    let good = with_checksum([0x59, 13, 4, 5, 12, 0, 0, 0, 10, 0, 0]);
    let (_, carried) = decode(&good, 0);
    assert_eq!(carried, 3);

    let garbage = with_checksum([0x59, 13, 13, 5, 12, 1, 0, 0, 10, 0, 0]);
    let (reading, carried) = decode(&garbage, carried);
    assert_eq!(reading.timestamp.month, 3);
    assert_eq!(carried, 3);

    // Device month 0 is out of range too
    let zero = with_checksum([0x59, 13, 0, 5, 12, 2, 0, 0, 10, 0, 0]);
    let (reading, _) = decode(&zero, 7);
    assert_eq!(reading.timestamp.month, 7);
}

#[test]
fn test_month_in_range_updates_carried_month() {
    let frame = with_checksum([0x59, 13, 2, 5, 12, 0, 0, 0, 10, 0, 0]);
    let (reading, carried) = decode(&frame, 9);
    assert_eq!(reading.timestamp.month, 1);
    assert_eq!(carried, 1);
}

#[test]
fn test_timestamp_calendar_conversion() {
    let ts = Timestamp {
        year: 2013,
        month: 3,
        day: 5,
        hour: 12,
        minute: 34,
    };
    assert_eq!(ts.to_string(), "2013/04/05 12:34");
    let naive = ts.to_naive().expect("valid date");
    assert_eq!(naive.format("%Y-%m-%dT%H:%M:%S").to_string(), "2013-04-05T12:34:00");

    let impossible = Timestamp { day: 31, month: 1, ..ts };
    assert!(impossible.to_naive().is_none());
}

#[test]
fn test_history_push_until_full() {
    let mut history = HistoryBuffer::new(3);
    for minute in 0..3 {
        history.push(reading_at(minute)).expect("room left");
    }
    assert!(history.is_full());
    assert_eq!(history.push(reading_at(3)), Err(CapacityExceeded { capacity: 3 }));
    assert_eq!(history.len(), 3);
}

#[test]
fn test_history_drain_in_order_empties() {
    let mut history = HistoryBuffer::new(10);
    for minute in [1, 2, 3] {
        history.push(reading_at(minute)).unwrap();
    }
    let (oldest, newest) = history.span().unwrap();
    assert_eq!(oldest.minute, 1);
    assert_eq!(newest.minute, 3);

    let drained = history.drain_in_order();
    let minutes: Vec<u8> = drained.iter().map(|r| r.timestamp.minute).collect();
    assert_eq!(minutes, vec![1, 2, 3]);
    assert!(history.is_empty());
    assert!(history.span().is_none());
    assert!(history.drain_in_order().is_empty());
}

#[test]
fn test_history_discard_oldest_keeps_order() {
    let mut history = HistoryBuffer::new(4);
    for minute in 1..=4 {
        history.push(reading_at(minute)).unwrap();
    }

    assert_eq!(history.discard_oldest(2), 2);
    let minutes: Vec<u8> = history.iter().map(|r| r.timestamp.minute).collect();
    assert_eq!(minutes, vec![3, 4]);

    // Asking for more than is held empties the buffer
    assert_eq!(history.discard_oldest(10), 2);
    assert!(history.is_empty());
}
