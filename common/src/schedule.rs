use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Offset, TimeZone, Timelike, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

use crate::{config::ScheduleConfig, error::ScheduleEntryError, types::SystemMode};

pub const MAX_SCHEDULE_ENTRIES: usize = 12;
const MAX_TIMEZONE_OFFSET_MINUTES: i16 = 14 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    pub fn from_chrono(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sat | Weekday::Sun => Self::Weekend,
            _ => Self::Weekday,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub hour: u8,
    pub minute: u8,
    #[serde(rename = "temperature")]
    pub temperature_c: f32,
    #[serde(default)]
    pub mode: Option<SystemMode>,
}

impl ScheduleEntry {
    pub fn new(
        hour: u8,
        minute: u8,
        temperature_c: f32,
        mode: Option<SystemMode>,
    ) -> Result<Self, ScheduleEntryError> {
        if hour > 23 {
            return Err(ScheduleEntryError::Hour(hour));
        }
        if minute > 59 {
            return Err(ScheduleEntryError::Minute(minute));
        }
        if !temperature_c.is_finite() {
            return Err(ScheduleEntryError::Temperature(temperature_c));
        }
        Ok(Self {
            hour,
            minute,
            temperature_c,
            mode,
        })
    }

    pub fn validate(&self) -> bool {
        self.hour < 24 && self.minute < 60 && self.temperature_c.is_finite()
    }

    pub fn minutes_of_day(&self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleTarget {
    pub temperature_c: f32,
    pub mode: Option<SystemMode>,
}

/// Weekday/weekend setpoint programs.
///
/// Each program holds at most [`MAX_SCHEDULE_ENTRIES`] entries sorted by time
/// of day, with ties kept in insertion order. The active entry is the last one
/// that has started today; before the first entry the program wraps to the
/// previous evening's last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleResolver {
    default_temp_c: f32,
    weekday: Vec<ScheduleEntry>,
    weekend: Vec<ScheduleEntry>,
    timezone_offset_minutes: i16,
}

impl Default for ScheduleResolver {
    fn default() -> Self {
        Self {
            default_temp_c: 23.0,
            weekday: Vec::new(),
            weekend: Vec::new(),
            timezone_offset_minutes: 0,
        }
    }
}

impl ScheduleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        let mut resolver = Self::new();
        resolver.set_default_temperature(config.default_temp_c);
        resolver.set_timezone_offset_minutes(config.timezone_offset_minutes);
        resolver.set_entries(DayType::Weekday, &config.weekday);
        resolver.set_entries(DayType::Weekend, &config.weekend);
        resolver
    }

    pub fn to_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            default_temp_c: self.default_temp_c,
            timezone_offset_minutes: self.timezone_offset_minutes,
            weekday: self.weekday.clone(),
            weekend: self.weekend.clone(),
        }
    }

    pub fn default_temperature(&self) -> f32 {
        self.default_temp_c
    }

    pub fn set_default_temperature(&mut self, temperature_c: f32) -> bool {
        if !temperature_c.is_finite() {
            return false;
        }
        self.default_temp_c = temperature_c;
        true
    }

    /// Replaces one program. Invalid entries are dropped and anything past
    /// the maximum is not stored.
    pub fn set_entries(&mut self, day_type: DayType, entries: &[ScheduleEntry]) {
        let mut stored: Vec<ScheduleEntry> = entries
            .iter()
            .filter(|entry| entry.validate())
            .take(MAX_SCHEDULE_ENTRIES)
            .copied()
            .collect();
        insertion_sort(&mut stored);

        match day_type {
            DayType::Weekday => self.weekday = stored,
            DayType::Weekend => self.weekend = stored,
        }
    }

    pub fn entries(&self, day_type: DayType) -> &[ScheduleEntry] {
        match day_type {
            DayType::Weekday => &self.weekday,
            DayType::Weekend => &self.weekend,
        }
    }

    pub fn timezone_offset_minutes(&self) -> i16 {
        self.timezone_offset_minutes
    }

    pub fn set_timezone_offset_minutes(&mut self, offset_minutes: i16) -> bool {
        if offset_minutes.abs() > MAX_TIMEZONE_OFFSET_MINUTES {
            return false;
        }
        self.timezone_offset_minutes = offset_minutes;
        true
    }

    pub fn timezone_offset_hours(&self) -> f32 {
        self.timezone_offset_minutes as f32 / 60.0
    }

    pub fn set_timezone_offset_hours(&mut self, offset_hours: f32) -> bool {
        if !offset_hours.is_finite() {
            return false;
        }
        let minutes = (offset_hours * 60.0).round();
        if minutes.abs() > MAX_TIMEZONE_OFFSET_MINUTES as f32 {
            return false;
        }
        self.set_timezone_offset_minutes(minutes as i16)
    }

    /// Resolves the target at a local wall-clock time.
    ///
    /// `fallback_mode` is used when no entry of the active program names a
    /// mode. An empty program yields the default temperature and no mode.
    pub fn target_for(
        &self,
        now: DateTime<FixedOffset>,
        fallback_mode: Option<SystemMode>,
    ) -> ScheduleTarget {
        let entries = self.entries(DayType::from_chrono(now.weekday()));
        if entries.is_empty() {
            return ScheduleTarget {
                temperature_c: self.default_temp_c,
                mode: None,
            };
        }

        let current_minutes = now.hour() as u16 * 60 + now.minute() as u16;
        let active = entries
            .iter()
            .rposition(|entry| entry.minutes_of_day() <= current_minutes)
            .unwrap_or(entries.len() - 1);

        // Walk back from the active entry, wrapping, to the latest named mode.
        let mode = (0..entries.len())
            .map(|step| &entries[(active + entries.len() - step) % entries.len()])
            .find_map(|entry| entry.mode)
            .or(fallback_mode);

        ScheduleTarget {
            temperature_c: entries[active].temperature_c,
            mode,
        }
    }

    pub fn target_for_utc(
        &self,
        now: DateTime<Utc>,
        fallback_mode: Option<SystemMode>,
    ) -> ScheduleTarget {
        self.target_for(self.to_local(now), fallback_mode)
    }

    pub fn to_local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.timezone_offset_minutes as i32 * 60)
            .unwrap_or_else(|| Utc.fix());
        now.with_timezone(&offset)
    }

    /// Start of the next entry strictly after `now`, looking up to a week
    /// ahead across weekday/weekend programs.
    pub fn next_change_after(&self, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let now_minutes = now.hour() as u16 * 60 + now.minute() as u16;

        for day_offset in 0..=7i64 {
            let date = now.date_naive() + Duration::days(day_offset);
            let entries = self.entries(DayType::from_chrono(date.weekday()));

            let Some(entry) = entries
                .iter()
                .find(|entry| day_offset > 0 || entry.minutes_of_day() > now_minutes)
            else {
                continue;
            };

            let Some(naive) = date.and_hms_opt(entry.hour as u32, entry.minute as u32, 0) else {
                continue;
            };

            if let Some(candidate) = now.offset().from_local_datetime(&naive).single() {
                return Some(candidate);
            }
        }

        None
    }
}

fn insertion_sort(entries: &mut [ScheduleEntry]) {
    for i in 1..entries.len() {
        let key = entries[i];
        let mut j = i;
        while j > 0 && entries[j - 1].minutes_of_day() > key.minutes_of_day() {
            entries[j] = entries[j - 1];
            j -= 1;
        }
        entries[j] = key;
    }
}
