use serde::{Deserialize, Serialize};

use super::{ring, RingBuffer, HISTORY_CAPACITY};
use crate::clock::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureEntry {
    pub timestamp: Instant,
    pub ambient_c: Option<f32>,
    pub coil_c: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelAverage {
    sum: f32,
    count: u32,
}

impl ChannelAverage {
    fn add(&mut self, reading: Option<f32>) {
        if let Some(value) = reading.filter(|value| value.is_finite()) {
            self.sum += value;
            self.count += 1;
        }
    }

    fn average(&self) -> Option<f32> {
        (self.count > 0).then(|| self.sum / self.count as f32)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemperatureHistory {
    entries: RingBuffer<TemperatureEntry, HISTORY_CAPACITY>,
    current_minute: Option<u32>,
    ambient: ChannelAverage,
    coil: ChannelAverage,
}

impl TemperatureHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a reading into the running average of its minute. Missing or
    /// NaN channels do not count towards the average.
    pub fn add_reading(&mut self, timestamp: Instant, ambient: Option<f32>, coil: Option<f32>) {
        self.ensure_minute(timestamp);
        self.ambient.add(ambient);
        self.coil.add(coil);

        let entry = TemperatureEntry {
            timestamp: timestamp.minute_start(),
            ambient_c: self.ambient.average(),
            coil_c: self.coil.average(),
        };
        if let Some(slot) = self.entries.latest_mut() {
            *slot = entry;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest_entry(&self) -> Option<TemperatureEntry> {
        self.entries.latest().copied()
    }

    pub fn iter(&self) -> ring::Iter<'_, TemperatureEntry> {
        self.entries.iter()
    }

    fn ensure_minute(&mut self, timestamp: Instant) {
        let minute = timestamp.minute_index();
        if self.current_minute == Some(minute) {
            return;
        }

        self.current_minute = Some(minute);
        self.ambient = ChannelAverage::default();
        self.coil = ChannelAverage::default();
        self.entries.push(TemperatureEntry {
            timestamp: timestamp.minute_start(),
            ambient_c: None,
            coil_c: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(ms: u32) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn averages_readings_within_a_minute() {
        let mut history = TemperatureHistory::new();
        history.add_reading(at(60_500), Some(20.0), Some(40.0));
        history.add_reading(at(61_500), Some(22.0), None);
        history.add_reading(at(62_500), Some(f32::NAN), Some(44.0));

        assert_eq!(history.len(), 1);
        assert_eq!(
            history.latest_entry(),
            Some(TemperatureEntry {
                timestamp: at(60_000),
                ambient_c: Some(21.0),
                coil_c: Some(42.0),
            })
        );
    }

    #[test]
    fn channel_without_valid_reading_stays_empty() {
        let mut history = TemperatureHistory::new();
        history.add_reading(at(5_000), None, Some(30.0));

        let entry = history.latest_entry().unwrap();
        assert_eq!(entry.ambient_c, None);
        assert_eq!(entry.coil_c, Some(30.0));
    }

    #[test]
    fn rollover_starts_a_new_bucket() {
        let mut history = TemperatureHistory::new();
        history.add_reading(at(59_999), Some(20.0), None);
        history.add_reading(at(60_000), Some(30.0), None);

        let ambient: Vec<_> = history.iter().map(|entry| entry.ambient_c).collect();
        assert_eq!(ambient, vec![Some(20.0), Some(30.0)]);
    }

    #[test]
    fn keeps_most_recent_two_hours() {
        let mut history = TemperatureHistory::new();
        for minute in 0..(HISTORY_CAPACITY as u32 + 5) {
            history.add_reading(at(minute * 60_000), Some(minute as f32), None);
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.iter().next().unwrap().timestamp, at(5 * 60_000));
    }
}
