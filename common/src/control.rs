use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};

use crate::{
    clock::Instant,
    compressor::CompressorGuard,
    config::{ControlConfig, PersistedSettings, RuntimeConfig, TimingConfig},
    fan::FanArbiter,
    history::{PowerHistory, TemperatureHistory},
    schedule::{ScheduleResolver, ScheduleTarget},
    sensors::{SensorReadings, SensorSource},
    types::{ControlAction, ControlStatus, FanMode, FanSpeed, SystemMode},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFanChange {
    pub target: FanSpeed,
    pub effective_at: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
struct HeatingFanDelay {
    applied: Option<FanSpeed>,
    pending: Option<PendingFanChange>,
}

impl HeatingFanDelay {
    fn filter(
        &mut self,
        target: FanSpeed,
        now: Instant,
        delay_ms: u32,
        immediate: bool,
    ) -> FanSpeed {
        let applied = match self.applied {
            Some(applied) if !immediate => applied,
            _ => {
                self.applied = Some(target);
                self.pending = None;
                return target;
            }
        };

        if target == applied {
            self.pending = None;
            return applied;
        }

        // A different target restarts the wait.
        let pending = match self.pending {
            Some(pending) if pending.target == target => pending,
            _ => {
                let pending = PendingFanChange {
                    target,
                    effective_at: now.wrapping_add_ms(delay_ms),
                };
                self.pending = Some(pending);
                pending
            }
        };

        if now.has_reached(pending.effective_at) {
            self.applied = Some(target);
            self.pending = None;
            target
        } else {
            applied
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Compressor and fan orchestration for one indoor unit.
///
/// [`update`](Self::update) is called at a fixed tick rate. Every tick drives
/// the compressor guard and the fan; once per control interval it also polls
/// the sensors, follows the schedule, re-runs the thermostat decision and
/// appends to both histories.
#[derive(Debug, Clone)]
pub struct ControlLoop {
    timing: TimingConfig,
    config: ControlConfig,
    system_mode: SystemMode,
    fan_mode: FanMode,
    scheduling_enabled: bool,

    compressor: CompressorGuard,
    fan: FanArbiter,
    sensors: SensorReadings,
    schedule: ScheduleResolver,
    temperature_log: TemperatureHistory,
    power_log: PowerHistory,

    last_control_update: Option<Instant>,
    cooldown_until: Option<Instant>,
    heating_fan: HeatingFanDelay,
}

impl ControlLoop {
    pub fn new(mut timing: TimingConfig, mut settings: PersistedSettings, now: Instant) -> Self {
        timing.sanitize();
        settings.sanitize();
        Self {
            compressor: CompressorGuard::new(timing.min_runtime_ms, timing.restart_delay_ms, now),
            fan: FanArbiter::new(),
            sensors: SensorReadings::new(timing.sensor_stale_timeout_ms),
            schedule: ScheduleResolver::new(),
            temperature_log: TemperatureHistory::new(),
            power_log: PowerHistory::new(),
            timing,
            config: settings.control,
            system_mode: settings.system_mode,
            fan_mode: settings.fan_mode,
            scheduling_enabled: settings.scheduling_enabled,
            last_control_update: None,
            cooldown_until: None,
            heating_fan: HeatingFanDelay::default(),
        }
    }

    pub fn from_runtime(runtime: &RuntimeConfig, now: Instant) -> Self {
        let mut control = Self::new(runtime.timing.clone(), runtime.settings.clone(), now);
        control.schedule = ScheduleResolver::from_config(&runtime.schedule);
        control.power_log.set_consumption_table(runtime.wattage.clone());
        control
    }

    /// Puts the outputs into a known de-energized state. The compressor
    /// restart delay counts from `now`.
    pub fn begin(&mut self, now: Instant) -> Vec<ControlAction> {
        self.compressor = CompressorGuard::new(
            self.timing.min_runtime_ms,
            self.timing.restart_delay_ms,
            now,
        );
        self.fan = FanArbiter::new();
        self.last_control_update = None;
        self.cooldown_until = None;
        self.heating_fan.reset();
        vec![
            ControlAction::CompressorOff,
            ControlAction::FanSpeed(FanSpeed::Off),
        ]
    }

    /// Runs one tick and returns the output changes to apply.
    ///
    /// `wall_clock` is the local time when the clock is synchronised; while it
    /// is `None` the schedule is not consulted.
    pub fn update<S: SensorSource + ?Sized>(
        &mut self,
        now: Instant,
        wall_clock: Option<DateTime<FixedOffset>>,
        sensors: &mut S,
    ) -> Vec<ControlAction> {
        let mut actions = Vec::new();

        let control_due = self
            .last_control_update
            .map(|last| now.elapsed_since(last) >= self.timing.control_interval_ms)
            .unwrap_or(true);

        if control_due {
            self.last_control_update = Some(now);
            self.sensors.poll(sensors, now);
            if self.scheduling_enabled {
                if let Some(local) = wall_clock {
                    self.apply_schedule(local);
                }
            }
            self.apply_control_logic(now, &mut actions);
        }

        actions.extend(self.compressor.update(now));
        self.update_fan_state(now, &mut actions);

        if control_due {
            self.log_state(now);
        }

        actions
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn settings(&self) -> PersistedSettings {
        PersistedSettings {
            control: self.config.clone(),
            system_mode: self.system_mode,
            fan_mode: self.fan_mode,
            scheduling_enabled: self.scheduling_enabled,
        }
    }

    pub fn target_temperature(&self) -> f32 {
        self.config.target_temp_c
    }

    pub fn set_target_temperature(&mut self, target_c: f32) -> bool {
        self.config.set_target_temp(target_c)
    }

    pub fn hysteresis(&self) -> f32 {
        self.config.hysteresis_c
    }

    pub fn set_hysteresis(&mut self, hysteresis_c: f32) -> bool {
        self.config.set_hysteresis(hysteresis_c)
    }

    pub fn compressor_temperature_limit(&self) -> f32 {
        self.config.compressor_temp_limit_c
    }

    pub fn set_compressor_temperature_limit(&mut self, limit_c: f32) -> bool {
        self.config.set_compressor_temp_limit(limit_c)
    }

    pub fn compressor_minimum_ambient(&self) -> f32 {
        self.config.compressor_min_ambient_c
    }

    pub fn set_compressor_minimum_ambient(&mut self, minimum_c: f32) -> bool {
        self.config.set_compressor_min_ambient(minimum_c)
    }

    pub fn set_cooldown_coil_trigger(&mut self, trigger_c: f32) -> bool {
        self.config.set_cooldown_coil_trigger(trigger_c)
    }

    pub fn set_cooldown_coil_ambient_band(&mut self, band_c: f32) -> bool {
        self.config.set_cooldown_coil_ambient_band(band_c)
    }

    pub fn set_cooldown_min_on(&mut self, ms: u32) -> bool {
        self.config.set_cooldown_min_on(ms)
    }

    pub fn set_cooldown_duration(&mut self, ms: u32) -> bool {
        self.config.set_cooldown_duration(ms)
    }

    pub fn set_heating_fan_thresholds(&mut self, low_delta_c: f32, medium_delta_c: f32) -> bool {
        self.config.set_heating_fan_thresholds(low_delta_c, medium_delta_c)
    }

    pub fn set_heating_fan_delay(&mut self, ms: u32) -> bool {
        self.config.set_heating_fan_delay(ms)
    }

    pub fn set_heating_low_fan_margin(&mut self, margin_c: f32) -> bool {
        self.config.set_heating_low_fan_margin(margin_c)
    }

    pub fn system_mode(&self) -> SystemMode {
        self.system_mode
    }

    pub fn set_system_mode(&mut self, mode: SystemMode) -> bool {
        if self.system_mode == mode {
            return false;
        }
        self.system_mode = mode;
        if !mode.drives_compressor() {
            self.compressor.request_off();
        }
        self.heating_fan.reset();
        true
    }

    pub fn fan_mode(&self) -> FanMode {
        self.fan_mode
    }

    pub fn set_fan_mode(&mut self, mode: FanMode) -> bool {
        if self.fan_mode == mode {
            return false;
        }
        self.fan_mode = mode;
        self.heating_fan.reset();
        true
    }

    pub fn scheduling_enabled(&self) -> bool {
        self.scheduling_enabled
    }

    pub fn enable_scheduling(&mut self, enabled: bool) {
        self.scheduling_enabled = enabled;
    }

    pub fn schedule(&self) -> &ScheduleResolver {
        &self.schedule
    }

    pub fn schedule_mut(&mut self) -> &mut ScheduleResolver {
        &mut self.schedule
    }

    pub fn compressor(&self) -> &CompressorGuard {
        &self.compressor
    }

    pub fn fan(&self) -> &FanArbiter {
        &self.fan
    }

    pub fn sensors(&self) -> &SensorReadings {
        &self.sensors
    }

    pub fn temperature_log(&self) -> &TemperatureHistory {
        &self.temperature_log
    }

    pub fn power_log(&self) -> &PowerHistory {
        &self.power_log
    }

    pub fn power_log_mut(&mut self) -> &mut PowerHistory {
        &mut self.power_log
    }

    pub fn is_compressor_running(&self) -> bool {
        self.compressor.is_running()
    }

    pub fn is_compressor_requested(&self) -> bool {
        self.compressor.is_requested()
    }

    pub fn compressor_restart_delay_remaining(&self, now: Instant) -> u32 {
        self.compressor.restart_delay_remaining(now)
    }

    pub fn compressor_min_runtime_remaining(&self, now: Instant) -> u32 {
        self.compressor.min_runtime_remaining(now)
    }

    pub fn compressor_cooldown_active(&self, now: Instant) -> bool {
        self.cooldown_until
            .is_some_and(|until| !now.has_reached(until))
    }

    pub fn compressor_cooldown_remaining(&self, now: Instant) -> u32 {
        self.cooldown_until
            .map(|until| now.remaining_until(until))
            .unwrap_or(0)
    }

    pub fn current_fan_speed(&self) -> FanSpeed {
        self.fan.current_speed()
    }

    pub fn pending_fan_change(&self) -> Option<PendingFanChange> {
        self.heating_fan.pending
    }

    pub fn status(&self, now: Instant) -> ControlStatus {
        ControlStatus {
            system_mode: self.system_mode.as_str(),
            fan_mode: self.fan_mode.as_str(),
            fan_speed: self.fan.current_speed().as_str(),
            target_temp_c: self.config.target_temp_c,
            hysteresis: self.config.hysteresis_c,
            ambient_temp_c: self.sensors.ambient(now),
            coil_temp_c: self.sensors.coil(now),
            compressor_running: self.compressor.is_running(),
            compressor_requested: self.compressor.is_requested(),
            restart_delay_remaining_ms: self.compressor_restart_delay_remaining(now),
            min_runtime_remaining_ms: self.compressor_min_runtime_remaining(now),
            in_cooldown: self.compressor_cooldown_active(now),
            cooldown_remaining_ms: self.compressor_cooldown_remaining(now),
            schedule_enabled: self.scheduling_enabled,
            total_energy_wh: self.power_log.total_energy_wh(),
        }
    }

    fn apply_schedule(&mut self, local: DateTime<FixedOffset>) {
        let ScheduleTarget {
            temperature_c,
            mode,
        } = self.schedule.target_for(local, Some(self.system_mode));

        if self.set_target_temperature(temperature_c) {
            info!(target_c = temperature_c, "schedule changed target temperature");
        }
        if let Some(mode) = mode {
            if self.set_system_mode(mode) {
                info!(mode = mode.as_str(), "schedule changed system mode");
            }
        }
    }

    fn apply_control_logic(&mut self, now: Instant, actions: &mut Vec<ControlAction>) {
        if let Some(until) = self.cooldown_until {
            if now.has_reached(until) {
                info!("compressor cooldown complete");
                self.cooldown_until = None;
            } else {
                actions.extend(self.compressor.force_off(now));
                return;
            }
        }

        if !self.system_mode.drives_compressor() {
            self.compressor.request_off();
            return;
        }

        let coil = self.sensors.coil(now);
        if let Some(coil) = coil {
            if coil >= self.config.compressor_temp_limit_c {
                if self.compressor.is_running() {
                    warn!(
                        coil_c = coil,
                        limit_c = self.config.compressor_temp_limit_c,
                        "coil over temperature limit, stopping compressor"
                    );
                }
                actions.extend(self.compressor.force_off(now));
                return;
            }
        }

        let Some(ambient) = self.sensors.ambient(now) else {
            self.compressor.request_off();
            return;
        };
        if ambient < self.config.compressor_min_ambient_c {
            self.compressor.request_off();
            return;
        }

        if self.system_mode == SystemMode::Heating && self.should_arm_cooldown(now, ambient, coil) {
            let until = now.wrapping_add_ms(self.config.cooldown_duration_ms);
            info!(
                duration_ms = self.config.cooldown_duration_ms,
                "heating coil cold, compressor cooldown armed"
            );
            self.cooldown_until = Some(until);
            actions.extend(self.compressor.force_off(now));
            return;
        }

        let upper = self.config.upper_bound_c();
        let lower = self.config.lower_bound_c();
        let want_on = match (self.system_mode, self.compressor.is_running()) {
            (SystemMode::Cooling, true) => ambient > lower,
            (SystemMode::Cooling, false) => ambient >= upper,
            (_, true) => ambient < upper,
            (_, false) => ambient <= lower,
        };

        if want_on {
            self.compressor.request_on();
        } else {
            self.compressor.request_off();
        }
    }

    fn should_arm_cooldown(&self, now: Instant, ambient: f32, coil: Option<f32>) -> bool {
        let Some(coil) = coil else {
            return false;
        };
        self.compressor.is_running()
            && coil < self.config.cooldown_coil_trigger_c
            && coil - ambient <= self.config.cooldown_coil_ambient_band_c
            && self.compressor.min_runtime_remaining(now) == 0
            && self.compressor.time_since_last_on(now) >= self.config.cooldown_min_on_ms
    }

    fn update_fan_state(&mut self, now: Instant, actions: &mut Vec<ControlAction>) {
        let in_cooldown = self.compressor_cooldown_active(now);

        let desired = if in_cooldown {
            self.heating_fan.reset();
            if self.fan_mode == FanMode::Off {
                FanSpeed::Off
            } else {
                FanSpeed::Low
            }
        } else {
            match self.system_mode {
                SystemMode::Idle => {
                    self.heating_fan.reset();
                    if self.compressor.is_running() {
                        FanSpeed::Low
                    } else {
                        FanSpeed::Off
                    }
                }
                SystemMode::FanOnly => {
                    self.heating_fan.reset();
                    self.fan_mode.manual_speed().unwrap_or(FanSpeed::Low)
                }
                SystemMode::Cooling | SystemMode::Heating => match self.fan_mode.manual_speed() {
                    Some(speed) => {
                        self.heating_fan.reset();
                        speed
                    }
                    None => self.auto_fan_speed(now),
                },
            }
        };

        self.fan.set_requested_speed(desired);

        if !in_cooldown
            && self.system_mode.drives_compressor()
            && (self.compressor.is_running() || self.compressor.is_requested())
        {
            self.fan.enforce_minimum_speed(FanSpeed::Low);
        }

        if let Some(speed) = self.fan.update() {
            actions.push(ControlAction::FanSpeed(speed));
        }
    }

    fn auto_fan_speed(&mut self, now: Instant) -> FanSpeed {
        let running = self.compressor.is_running();
        let base = if running {
            FanSpeed::Medium
        } else {
            FanSpeed::Low
        };

        if self.system_mode != SystemMode::Heating {
            self.heating_fan.reset();
            return base;
        }

        let (target, immediate) = match (running, self.sensors.ambient(now), self.sensors.coil(now))
        {
            (true, Some(ambient), Some(coil)) => {
                let near_cooldown = coil
                    < self.config.cooldown_coil_trigger_c + self.config.heating_low_fan_margin_c;
                if near_cooldown {
                    (FanSpeed::Low, true)
                } else {
                    let delta = coil - ambient;
                    let speed = if delta < self.config.heating_fan_low_delta_c {
                        FanSpeed::Low
                    } else if delta < self.config.heating_fan_medium_delta_c {
                        FanSpeed::Medium
                    } else {
                        FanSpeed::High
                    };
                    (speed, false)
                }
            }
            _ => (base, false),
        };

        let speed = self
            .heating_fan
            .filter(target, now, self.config.heating_fan_delay_ms, immediate);
        if speed != target {
            debug!(
                applied = speed.as_str(),
                target = target.as_str(),
                "heating fan change pending"
            );
        }
        speed
    }

    fn log_state(&mut self, now: Instant) {
        let ambient = self.sensors.ambient(now);
        let coil = self.sensors.coil(now);
        if ambient.is_some() || coil.is_some() {
            self.temperature_log.add_reading(now, ambient, coil);
        }
        self.power_log
            .log_state(now, self.fan.current_speed(), self.compressor.is_running());
    }
}
