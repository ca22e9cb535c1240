use serde::{Deserialize, Serialize};

use super::{ring, RingBuffer, HISTORY_CAPACITY};
use crate::{clock::Instant, types::FanSpeed};

const MS_PER_HOUR: f64 = 3_600_000.0;

const FALLBACK_COMPRESSOR_WATTS: f32 = 1_500.0;
const FALLBACK_UNLISTED_WATTS: f32 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WattageRate {
    pub fan_speed: FanSpeed,
    pub compressor_on: bool,
    pub watts: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerEntry {
    pub timestamp: Instant,
    pub energy_wh: f64,
    pub average_watts: f32,
    pub fan_speed: FanSpeed,
    pub compressor_on: bool,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    timestamp: Instant,
    fan_speed: FanSpeed,
    compressor_on: bool,
    watts: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct MinuteAggregate {
    index: u32,
    watt_ms: f64,
    duration_ms: u32,
    fan_ms: [u32; 4],
    compressor_on_ms: u32,
}

impl MinuteAggregate {
    fn new(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    fn accumulate(&mut self, duration_ms: u32, sample: &Sample) {
        self.watt_ms += sample.watts as f64 * duration_ms as f64;
        self.duration_ms = self.duration_ms.saturating_add(duration_ms);
        let slot = &mut self.fan_ms[sample.fan_speed.index()];
        *slot = slot.saturating_add(duration_ms);
        if sample.compressor_on {
            self.compressor_on_ms = self.compressor_on_ms.saturating_add(duration_ms);
        }
    }

    /// Longest-held speed; ties go to the faster speed.
    fn dominant_fan_speed(&self) -> FanSpeed {
        // max_by_key keeps the last of equal maxima.
        FanSpeed::ALL
            .into_iter()
            .max_by_key(|speed| self.fan_ms[speed.index()])
            .unwrap_or_default()
    }
}

/// Minute-bucketed energy log.
///
/// Every call to [`log_state`](Self::log_state) integrates the previous
/// sample's wattage over the time since it was taken, split at each minute
/// boundary so that every bucket receives exactly the energy drawn inside it.
/// The running total never decreases.
#[derive(Debug, Clone, Default)]
pub struct PowerHistory {
    entries: RingBuffer<PowerEntry, HISTORY_CAPACITY>,
    rates: Vec<WattageRate>,
    last: Option<Sample>,
    minute: Option<MinuteAggregate>,
    total_energy_wh: f64,
}

impl PowerHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_consumption_table(rates: Vec<WattageRate>) -> Self {
        let mut history = Self::default();
        history.set_consumption_table(rates);
        history
    }

    /// An empty table selects the built-in estimates. Rates that are negative
    /// or not finite are dropped and fall back like unlisted combinations.
    pub fn set_consumption_table(&mut self, mut rates: Vec<WattageRate>) {
        rates.retain(|rate| rate.watts.is_finite() && rate.watts >= 0.0);
        self.rates = rates;
    }

    pub fn lookup_watts(&self, fan_speed: FanSpeed, compressor_on: bool) -> f32 {
        if self.rates.is_empty() {
            if compressor_on {
                return FALLBACK_COMPRESSOR_WATTS;
            }
            return match fan_speed {
                FanSpeed::High => 100.0,
                FanSpeed::Medium => 75.0,
                FanSpeed::Low => 50.0,
                FanSpeed::Off => 5.0,
            };
        }

        self.rates
            .iter()
            .find(|rate| rate.fan_speed == fan_speed && rate.compressor_on == compressor_on)
            .map(|rate| rate.watts)
            .unwrap_or(if compressor_on {
                FALLBACK_COMPRESSOR_WATTS
            } else {
                FALLBACK_UNLISTED_WATTS
            })
    }

    pub fn log_state(&mut self, timestamp: Instant, fan_speed: FanSpeed, compressor_on: bool) {
        let sample = Sample {
            timestamp,
            fan_speed,
            compressor_on,
            watts: self.lookup_watts(fan_speed, compressor_on),
        };

        if let Some(previous) = self.last {
            let mut cursor = previous.timestamp;
            let mut remaining = timestamp.elapsed_since(previous.timestamp);

            while remaining > 0 {
                self.ensure_minute(cursor);
                let segment = remaining.min(cursor.ms_to_next_minute());
                self.total_energy_wh += previous.watts as f64 * segment as f64 / MS_PER_HOUR;
                if let Some(minute) = self.minute.as_mut() {
                    minute.accumulate(segment, &previous);
                }
                self.write_current_entry(&previous);

                cursor = cursor.wrapping_add_ms(segment);
                remaining -= segment;
            }
        }

        self.last = Some(sample);
        self.ensure_minute(timestamp);
        self.write_current_entry(&sample);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_energy_wh(&self) -> f64 {
        self.total_energy_wh
    }

    pub fn latest_entry(&self) -> Option<PowerEntry> {
        self.entries.latest().copied()
    }

    pub fn iter(&self) -> ring::Iter<'_, PowerEntry> {
        self.entries.iter()
    }

    pub fn copy_entries(&self) -> Vec<PowerEntry> {
        self.entries.iter().copied().collect()
    }

    /// Replaces the log with a persisted snapshot.
    ///
    /// Entries with a non-finite energy value are skipped and only the newest
    /// entries that fit are kept. Integration restarts with the next
    /// [`log_state`](Self::log_state) call; the gap since the snapshot is not
    /// counted.
    pub fn restore_entries(&mut self, entries: &[PowerEntry], total_energy_wh: f64) {
        self.entries.clear();
        let valid: Vec<&PowerEntry> = entries
            .iter()
            .filter(|entry| entry.energy_wh.is_finite() && entry.average_watts.is_finite())
            .collect();
        let skip = valid.len().saturating_sub(HISTORY_CAPACITY);
        for entry in valid.into_iter().skip(skip) {
            self.entries.push(*entry);
        }

        let latest_energy = self.entries.latest().map(|entry| entry.energy_wh).unwrap_or(0.0);
        self.total_energy_wh = if total_energy_wh.is_finite() {
            total_energy_wh.max(latest_energy)
        } else {
            latest_energy
        };
        self.last = None;
        self.minute = None;
    }

    fn ensure_minute(&mut self, timestamp: Instant) {
        let index = timestamp.minute_index();
        if self.minute.map(|minute| minute.index) == Some(index) {
            return;
        }
        self.minute = Some(MinuteAggregate::new(index));

        // A restored snapshot may already hold this minute's bucket.
        let resumes_restored = self
            .entries
            .latest()
            .is_some_and(|entry| entry.timestamp == timestamp.minute_start());
        if !resumes_restored {
            self.entries.push(PowerEntry {
                timestamp: timestamp.minute_start(),
                energy_wh: self.total_energy_wh,
                average_watts: 0.0,
                fan_speed: FanSpeed::Off,
                compressor_on: false,
            });
        }
    }

    fn write_current_entry(&mut self, fallback: &Sample) {
        let Some(minute) = self.minute else {
            return;
        };
        let total_energy_wh = self.total_energy_wh;
        let Some(slot) = self.entries.latest_mut() else {
            return;
        };

        slot.energy_wh = total_energy_wh;
        if minute.duration_ms == 0 {
            slot.average_watts = fallback.watts;
            slot.fan_speed = fallback.fan_speed;
            slot.compressor_on = fallback.compressor_on;
        } else {
            slot.average_watts = (minute.watt_ms / minute.duration_ms as f64) as f32;
            slot.fan_speed = minute.dominant_fan_speed();
            slot.compressor_on = minute.compressor_on_ms as u64 * 2 >= minute.duration_ms as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u32) -> Instant {
        Instant::from_millis(ms)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn fallback_table_when_none_configured() {
        let history = PowerHistory::new();
        assert_eq!(history.lookup_watts(FanSpeed::Low, true), 1_500.0);
        assert_eq!(history.lookup_watts(FanSpeed::Medium, false), 75.0);
        assert_eq!(history.lookup_watts(FanSpeed::Off, false), 5.0);
    }

    #[test]
    fn configured_table_with_unlisted_fallback() {
        let history = PowerHistory::with_consumption_table(vec![WattageRate {
            fan_speed: FanSpeed::High,
            compressor_on: true,
            watts: 2_000.0,
        }]);
        assert_eq!(history.lookup_watts(FanSpeed::High, true), 2_000.0);
        assert_eq!(history.lookup_watts(FanSpeed::Low, true), 1_500.0);
        assert_eq!(history.lookup_watts(FanSpeed::Low, false), 25.0);
    }

    #[test]
    fn invalid_rates_fall_back_and_keep_total_monotonic() {
        let rate = |fan_speed, compressor_on, watts| WattageRate {
            fan_speed,
            compressor_on,
            watts,
        };
        let mut history = PowerHistory::with_consumption_table(vec![
            rate(FanSpeed::Low, false, -100.0),
            rate(FanSpeed::Medium, false, 80.0),
        ]);
        assert_eq!(history.lookup_watts(FanSpeed::Low, false), 25.0);
        assert_eq!(history.lookup_watts(FanSpeed::Medium, false), 80.0);

        history.log_state(at(0), FanSpeed::Low, false);
        history.log_state(at(30_000), FanSpeed::Low, false);
        assert!(close(history.total_energy_wh(), 25.0 * 30_000.0 / MS_PER_HOUR));

        history.set_consumption_table(vec![
            rate(FanSpeed::Low, false, f32::NAN),
            rate(FanSpeed::High, true, f32::INFINITY),
        ]);
        assert_eq!(history.lookup_watts(FanSpeed::Low, false), 50.0);
        assert_eq!(history.lookup_watts(FanSpeed::High, true), 1_500.0);

        let before = history.total_energy_wh();
        history.log_state(at(60_000), FanSpeed::Low, false);
        let after = history.total_energy_wh();
        assert!(after.is_finite());
        assert!(after >= before);
    }

    #[test]
    fn first_sample_opens_bucket_without_energy() {
        let mut history = PowerHistory::new();
        history.log_state(at(30_000), FanSpeed::Low, false);

        let entry = history.latest_entry().unwrap();
        assert_eq!(entry.timestamp, at(0));
        assert_eq!(entry.energy_wh, 0.0);
        assert_eq!(entry.average_watts, 50.0);
        assert_eq!(entry.fan_speed, FanSpeed::Low);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn splits_interval_at_minute_boundary() {
        let mut history = PowerHistory::new();
        // Compressor (1500 W) from 0:30 until 1:30.
        history.log_state(at(30_000), FanSpeed::Medium, true);
        history.log_state(at(90_000), FanSpeed::Medium, false);

        assert_eq!(history.len(), 2);
        let entries = history.copy_entries();

        // 30 s at 1500 W in each minute.
        let half_minute_wh = 1_500.0 * 30_000.0 / MS_PER_HOUR;
        assert!(close(entries[0].energy_wh, half_minute_wh));
        assert_eq!(entries[0].average_watts, 1_500.0);
        assert!(entries[0].compressor_on);

        assert!(close(entries[1].energy_wh, 2.0 * half_minute_wh));
        assert!(close(history.total_energy_wh(), 2.0 * half_minute_wh));
        assert_eq!(entries[1].timestamp, at(60_000));
    }

    #[test]
    fn minute_summary_weights_by_duration() {
        let mut history = PowerHistory::new();
        history.log_state(at(0), FanSpeed::High, true);
        history.log_state(at(20_000), FanSpeed::Low, false);
        history.log_state(at(60_000), FanSpeed::Low, false);

        let first = history.iter().next().copied().unwrap();
        // 20 s at 1500 W and 40 s at 50 W.
        let expected = (1_500.0 * 20.0 + 50.0 * 40.0) / 60.0;
        assert!((first.average_watts - expected).abs() < 1e-3);
        assert_eq!(first.fan_speed, FanSpeed::Low);
        assert!(!first.compressor_on);
    }

    #[test]
    fn long_gap_fills_every_minute() {
        let mut history = PowerHistory::new();
        history.log_state(at(0), FanSpeed::Off, false);
        history.log_state(at(5 * 60_000), FanSpeed::Off, false);

        // Minutes 0..=4 covered plus the opened bucket for minute 5.
        assert_eq!(history.len(), 6);
        let energies: Vec<f64> = history.iter().map(|entry| entry.energy_wh).collect();
        assert!(energies.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(close(history.total_energy_wh(), 5.0 * 5.0 / 60.0));
    }

    #[test]
    fn restore_keeps_total_and_resumes_bucket() {
        let mut history = PowerHistory::new();
        history.log_state(at(0), FanSpeed::Low, false);
        history.log_state(at(90_000), FanSpeed::Low, false);
        let snapshot = history.copy_entries();
        let total = history.total_energy_wh();

        let mut restored = PowerHistory::new();
        restored.restore_entries(&snapshot, total);
        assert_eq!(restored.len(), 2);
        assert!(close(restored.total_energy_wh(), total));

        restored.log_state(at(100_000), FanSpeed::Low, false);
        assert_eq!(restored.len(), 2);
        restored.log_state(at(130_000), FanSpeed::Low, false);
        assert_eq!(restored.len(), 3);
        assert!(restored.total_energy_wh() > total);
    }

    #[test]
    fn restore_drops_corrupt_and_excess_entries() {
        let entry = |minute: u32, energy: f64| PowerEntry {
            timestamp: at(minute * 60_000),
            energy_wh: energy,
            average_watts: 50.0,
            fan_speed: FanSpeed::Low,
            compressor_on: false,
        };
        let mut snapshot: Vec<PowerEntry> = (0..130).map(|m| entry(m, m as f64)).collect();
        snapshot.push(entry(130, f64::NAN));

        let mut history = PowerHistory::new();
        history.restore_entries(&snapshot, f64::NAN);

        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.iter().next().unwrap().timestamp, at(10 * 60_000));
        assert_eq!(history.total_energy_wh(), 129.0);
    }
}
