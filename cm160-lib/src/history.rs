use crate::constants::HISTORY_CAPACITY;
use crate::error::CapacityExceeded;
use crate::reading::{Reading, Timestamp};

/// Backlog of readings collected while the device replays its history.
///
/// The device emits history oldest-first, so insertion order is
/// chronological. Entries leave only from the front, through
/// [`HistoryBuffer::drain_in_order`] or [`HistoryBuffer::discard_oldest`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBuffer {
    readings: Vec<Reading>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: Vec::new(),
            capacity,
        }
    }

    pub fn push(&mut self, reading: Reading) -> Result<(), CapacityExceeded> {
        if self.is_full() {
            return Err(CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.readings.push(reading);
        Ok(())
    }

    /// Removes and returns every buffered reading, oldest first
    pub fn drain_in_order(&mut self) -> Vec<Reading> {
        std::mem::take(&mut self.readings)
    }

    /// Removes the `count` oldest readings, or all of them if fewer are held.
    /// Returns how many were removed.
    pub fn discard_oldest(&mut self, count: usize) -> usize {
        let count = count.min(self.readings.len());
        self.readings.drain(..count);
        count
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.readings.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// Timestamps of the oldest and newest buffered readings
    pub fn span(&self) -> Option<(Timestamp, Timestamp)> {
        match (self.readings.first(), self.readings.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
