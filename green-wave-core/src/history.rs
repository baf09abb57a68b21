//! Fixed-capacity position history and rolling speed average

use crate::geo::distance_meters;
use crate::types::PositionSample;
use std::collections::VecDeque;

/// Number of samples kept when no capacity is configured
pub const DEFAULT_CAPACITY: usize = 3;

/// The most recent position samples, oldest first
///
/// Pushing into a full history evicts the oldest sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionHistory {
    samples: VecDeque<PositionSample>,
    capacity: usize,
}

impl PositionHistory {
    /// Create a history holding at most `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: PositionSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PositionSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionSample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Rolling average speed over the window in km/h
    ///
    /// With fewer than two samples this is the device-reported speed of the
    /// lone sample. Otherwise distance and elapsed time are summed over
    /// consecutive pairs, skipping pairs whose clock did not advance or whose
    /// time difference does not fit in an `i64`. Returns
    /// `None` when no time elapsed at all.
    pub fn average_speed_kmh(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return self.samples.back().and_then(|sample| sample.speed_kmh);
        }

        let mut total_distance_m = 0.0;
        let mut total_time_s = 0.0;

        for (prev, current) in self.samples.iter().zip(self.samples.iter().skip(1)) {
            let Some(elapsed_ms) = current.timestamp_ms.checked_sub(prev.timestamp_ms) else {
                continue;
            };
            let elapsed_s = elapsed_ms as f64 / 1000.0;
            if elapsed_s > 0.0 {
                total_distance_m += distance_meters(prev.coordinate(), current.coordinate());
                total_time_s += elapsed_s;
            }
        }

        if total_time_s == 0.0 {
            return None;
        }

        Some(total_distance_m / total_time_s * 3.6)
    }
}

impl Default for PositionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
