//! Tests for the persistence backends

mod common;

use cm160_lib::{CsvSink, JsonLinesSink};
use common::*;

fn timestamp(minute: u8) -> Timestamp {
    Timestamp {
        year: 2013,
        month: 3,
        day: 5,
        hour: 12,
        minute,
    }
}

#[test]
fn test_csv_rows() {
    let mut sink = CsvSink::new(Vec::new());
    sink.append(&timestamp(34), 1610.0).unwrap();
    sink.append(&timestamp(35), 230.5).unwrap();
    sink.flush().unwrap();

    let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    assert_eq!(
        text,
        "time,watts\n2013-04-05T12:34:00,1610.0\n2013-04-05T12:35:00,230.5\n"
    );
}

#[test]
fn test_csv_without_header() {
    let mut sink = CsvSink::without_header(Vec::new());
    sink.append(&timestamp(0), 0.0).unwrap();

    let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    assert_eq!(text, "2013-04-05T12:00:00,0.0\n");
}

#[test]
fn test_json_lines_event_shape() {
    let mut sink = JsonLinesSink::new(Vec::new());
    sink.append(&timestamp(34), 1610.0000000000002).unwrap();

    let text = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(
        text,
        "{\"timestamp\":\"2013-04-05T12:34:00\",\"consumption\":{\"value\":1610}}\n"
    );
}

#[test]
fn test_invalid_calendar_date_is_rejected() {
    let bogus = Timestamp {
        day: 31,
        month: 1,
        ..timestamp(0)
    };
    let mut sink = CsvSink::new(Vec::new());

    match sink.append(&bogus, 10.0) {
        Err(SinkError::InvalidTimestamp(ts)) => assert_eq!(ts, bogus),
        other => panic!("Expected InvalidTimestamp, got {:?}", other),
    }
}

#[test]
fn test_boxed_sink_forwards() {
    let mut sink: Box<dyn Sink> = Box::new(MemorySink::new());
    sink.append(&timestamp(1), 42.0).unwrap();
    sink.flush().unwrap();
}

#[cfg(feature = "sqlite")]
#[test]
fn test_sqlite_replaces_duplicate_timestamps() {
    use cm160_lib::SqliteSink;

    let mut sink = SqliteSink::open_in_memory().unwrap();
    sink.append(&timestamp(1), 100.0).unwrap();
    sink.append(&timestamp(2), 200.0).unwrap();
    // Replayed again after a reconnect
    sink.append(&timestamp(1), 150.0).unwrap();

    let count: i64 = sink
        .connection()
        .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);

    let watts: f64 = sink
        .connection()
        .query_row(
            "SELECT watts FROM readings WHERE time = '2013-04-05T12:01:00'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!((watts - 150.0).abs() < 1e-9);
}
