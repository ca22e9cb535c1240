use serde::{Deserialize, Serialize};

use crate::{
    history::power::WattageRate,
    schedule::ScheduleEntry,
    types::{FanMode, SystemMode},
};

pub const MIN_HYSTERESIS_C: f32 = 0.1;
pub const MIN_COMPRESSOR_AMBIENT_C: f32 = 7.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub min_runtime_ms: u32,
    pub restart_delay_ms: u32,
    pub control_interval_ms: u32,
    pub sensor_stale_timeout_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_runtime_ms: 300_000,
            restart_delay_ms: 120_000,
            control_interval_ms: 1_000,
            sensor_stale_timeout_ms: 300_000,
        }
    }
}

impl TimingConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if self.control_interval_ms == 0 {
            self.control_interval_ms = defaults.control_interval_ms;
        }
        if self.sensor_stale_timeout_ms == 0 {
            self.sensor_stale_timeout_ms = defaults.sensor_stale_timeout_ms;
        }
    }
}

/// Thermostat and protection parameters, all in degrees Celsius or
/// milliseconds. Every setter ignores invalid input and reports whether the
/// stored value changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub target_temp_c: f32,
    pub hysteresis_c: f32,
    pub compressor_temp_limit_c: f32,
    pub compressor_min_ambient_c: f32,
    pub cooldown_coil_trigger_c: f32,
    pub cooldown_coil_ambient_band_c: f32,
    pub cooldown_min_on_ms: u32,
    pub cooldown_duration_ms: u32,
    pub heating_fan_low_delta_c: f32,
    pub heating_fan_medium_delta_c: f32,
    pub heating_fan_delay_ms: u32,
    pub heating_low_fan_margin_c: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            target_temp_c: 23.0,
            hysteresis_c: 1.0,
            compressor_temp_limit_c: 60.0,
            compressor_min_ambient_c: MIN_COMPRESSOR_AMBIENT_C,
            cooldown_coil_trigger_c: 35.0,
            cooldown_coil_ambient_band_c: 5.0,
            cooldown_min_on_ms: 600_000,
            cooldown_duration_ms: 300_000,
            heating_fan_low_delta_c: 10.0,
            heating_fan_medium_delta_c: 20.0,
            heating_fan_delay_ms: 60_000,
            heating_low_fan_margin_c: 3.0,
        }
    }
}

fn replace_f32(slot: &mut f32, value: f32) -> bool {
    if (*slot - value).abs() > f32::EPSILON {
        *slot = value;
        true
    } else {
        false
    }
}

fn replace_u32(slot: &mut u32, value: u32) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}

impl ControlConfig {
    pub fn upper_bound_c(&self) -> f32 {
        self.target_temp_c + self.hysteresis_c / 2.0
    }

    pub fn lower_bound_c(&self) -> f32 {
        self.target_temp_c - self.hysteresis_c / 2.0
    }

    pub fn set_target_temp(&mut self, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        replace_f32(&mut self.target_temp_c, value)
    }

    pub fn set_hysteresis(&mut self, value: f32) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        replace_f32(&mut self.hysteresis_c, value.max(MIN_HYSTERESIS_C))
    }

    pub fn set_compressor_temp_limit(&mut self, value: f32) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        replace_f32(&mut self.compressor_temp_limit_c, value)
    }

    /// Values below the hardware floor are raised to it.
    pub fn set_compressor_min_ambient(&mut self, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        replace_f32(
            &mut self.compressor_min_ambient_c,
            value.max(MIN_COMPRESSOR_AMBIENT_C),
        )
    }

    pub fn set_cooldown_coil_trigger(&mut self, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        replace_f32(&mut self.cooldown_coil_trigger_c, value)
    }

    pub fn set_cooldown_coil_ambient_band(&mut self, value: f32) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        replace_f32(&mut self.cooldown_coil_ambient_band_c, value)
    }

    pub fn set_cooldown_min_on(&mut self, ms: u32) -> bool {
        replace_u32(&mut self.cooldown_min_on_ms, ms)
    }

    pub fn set_cooldown_duration(&mut self, ms: u32) -> bool {
        if ms == 0 {
            return false;
        }
        replace_u32(&mut self.cooldown_duration_ms, ms)
    }

    /// Sets both heating fan thresholds; rejected unless `0 <= low <= medium`.
    pub fn set_heating_fan_thresholds(&mut self, low_delta: f32, medium_delta: f32) -> bool {
        if !low_delta.is_finite()
            || !medium_delta.is_finite()
            || low_delta < 0.0
            || medium_delta < low_delta
        {
            return false;
        }
        let low_changed = replace_f32(&mut self.heating_fan_low_delta_c, low_delta);
        let medium_changed = replace_f32(&mut self.heating_fan_medium_delta_c, medium_delta);
        low_changed || medium_changed
    }

    pub fn set_heating_fan_delay(&mut self, ms: u32) -> bool {
        replace_u32(&mut self.heating_fan_delay_ms, ms)
    }

    pub fn set_heating_low_fan_margin(&mut self, value: f32) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        replace_f32(&mut self.heating_low_fan_margin_c, value)
    }

    /// Restores the default for every field that a setter would reject.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.target_temp_c.is_finite() {
            self.target_temp_c = defaults.target_temp_c;
        }
        if !self.hysteresis_c.is_finite() || self.hysteresis_c < 0.0 {
            self.hysteresis_c = defaults.hysteresis_c;
        }
        self.hysteresis_c = self.hysteresis_c.max(MIN_HYSTERESIS_C);
        if !self.compressor_temp_limit_c.is_finite() || self.compressor_temp_limit_c < 0.0 {
            self.compressor_temp_limit_c = defaults.compressor_temp_limit_c;
        }
        if !self.compressor_min_ambient_c.is_finite() {
            self.compressor_min_ambient_c = defaults.compressor_min_ambient_c;
        }
        self.compressor_min_ambient_c = self.compressor_min_ambient_c.max(MIN_COMPRESSOR_AMBIENT_C);
        if !self.cooldown_coil_trigger_c.is_finite() {
            self.cooldown_coil_trigger_c = defaults.cooldown_coil_trigger_c;
        }
        if !self.cooldown_coil_ambient_band_c.is_finite() || self.cooldown_coil_ambient_band_c < 0.0
        {
            self.cooldown_coil_ambient_band_c = defaults.cooldown_coil_ambient_band_c;
        }
        if self.cooldown_duration_ms == 0 {
            self.cooldown_duration_ms = defaults.cooldown_duration_ms;
        }
        let thresholds_valid = self.heating_fan_low_delta_c.is_finite()
            && self.heating_fan_medium_delta_c.is_finite()
            && self.heating_fan_low_delta_c >= 0.0
            && self.heating_fan_medium_delta_c >= self.heating_fan_low_delta_c;
        if !thresholds_valid {
            self.heating_fan_low_delta_c = defaults.heating_fan_low_delta_c;
            self.heating_fan_medium_delta_c = defaults.heating_fan_medium_delta_c;
        }
        if !self.heating_low_fan_margin_c.is_finite() || self.heating_low_fan_margin_c < 0.0 {
            self.heating_low_fan_margin_c = defaults.heating_low_fan_margin_c;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedSettings {
    pub control: ControlConfig,
    pub system_mode: SystemMode,
    pub fan_mode: FanMode,
    pub scheduling_enabled: bool,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            system_mode: SystemMode::Cooling,
            fan_mode: FanMode::Auto,
            scheduling_enabled: false,
        }
    }
}

impl PersistedSettings {
    pub fn sanitize(&mut self) {
        self.control.sanitize();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub default_temp_c: f32,
    pub timezone_offset_minutes: i16,
    pub weekday: Vec<ScheduleEntry>,
    pub weekend: Vec<ScheduleEntry>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_temp_c: 23.0,
            timezone_offset_minutes: 0,
            weekday: Vec::new(),
            weekend: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub timing: TimingConfig,
    pub settings: PersistedSettings,
    pub schedule: ScheduleConfig,
    pub wattage: Vec<WattageRate>,
    pub timezone: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            settings: PersistedSettings::default(),
            schedule: ScheduleConfig::default(),
            wattage: Vec::new(),
            timezone: "UTC".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.timing.sanitize();
        self.settings.sanitize();
        self.wattage.retain(|rate| rate.watts.is_finite() && rate.watts >= 0.0);
    }
}
