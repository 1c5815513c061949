//! Bounded in-memory window of recent readings for chart display.

use std::collections::VecDeque;

use crate::types::PriceReading;

/// The most recent `capacity` readings of one feed, oldest first.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    readings: VecDeque<PriceReading>,
}

impl PriceHistory {
    /// Create an empty window. A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::new(),
        }
    }

    /// Append a reading, evicting the oldest one when full.
    pub fn push(&mut self, reading: PriceReading) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    /// Newest reading, if any.
    pub fn latest(&self) -> Option<&PriceReading> {
        self.readings.back()
    }

    /// Iterate oldest → newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PriceReading> + ExactSizeIterator {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}
