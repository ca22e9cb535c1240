use hvac_common::{ControlAction, FanSpeed, SensorSource, SystemMode};

/// Fraction of the indoor/outdoor difference lost per second.
const ENVELOPE_LEAK_PER_S: f32 = 0.000_5;
/// Ambient change per second at full airflow with the compressor running.
const COMPRESSOR_DELTA_PER_S: f32 = 0.01;
const COIL_RESPONSE_PER_S: f32 = 0.05;
const COOLING_COIL_OFFSET_C: f32 = -15.0;
const HEATING_COIL_OFFSET_C: f32 = 25.0;

#[derive(Debug, Clone)]
pub struct SimulatedRoom {
    ambient_c: f32,
    coil_c: f32,
    outdoor_c: f32,
    mode: SystemMode,
    compressor_on: bool,
    fan_speed: FanSpeed,
}

impl SimulatedRoom {
    pub fn new(ambient_c: f32, outdoor_c: f32) -> Self {
        Self {
            ambient_c,
            coil_c: ambient_c,
            outdoor_c,
            mode: SystemMode::Idle,
            compressor_on: false,
            fan_speed: FanSpeed::Off,
        }
    }

    pub fn set_mode(&mut self, mode: SystemMode) {
        self.mode = mode;
    }

    pub fn apply(&mut self, action: &ControlAction) {
        match action {
            ControlAction::CompressorOn => self.compressor_on = true,
            ControlAction::CompressorOff => self.compressor_on = false,
            ControlAction::FanSpeed(speed) => self.fan_speed = *speed,
        }
    }

    pub fn ambient_c(&self) -> f32 {
        self.ambient_c
    }

    pub fn coil_c(&self) -> f32 {
        self.coil_c
    }

    pub fn advance(&mut self, elapsed_ms: u32) {
        let dt = elapsed_ms as f32 / 1_000.0;

        let leak = (ENVELOPE_LEAK_PER_S * dt).min(1.0);
        self.ambient_c += (self.outdoor_c - self.ambient_c) * leak;

        let coil_target = match (self.compressor_on, self.mode) {
            (true, SystemMode::Heating) => self.ambient_c + HEATING_COIL_OFFSET_C,
            (true, _) => self.ambient_c + COOLING_COIL_OFFSET_C,
            (false, _) => self.ambient_c,
        };
        let response = (COIL_RESPONSE_PER_S * dt).min(1.0);
        self.coil_c += (coil_target - self.coil_c) * response;

        if self.compressor_on {
            let direction = if self.mode == SystemMode::Heating {
                1.0
            } else {
                -1.0
            };
            self.ambient_c += direction * COMPRESSOR_DELTA_PER_S * airflow(self.fan_speed) * dt;
        }
    }
}

fn airflow(speed: FanSpeed) -> f32 {
    match speed {
        FanSpeed::Off => 0.2,
        FanSpeed::Low => 0.6,
        FanSpeed::Medium => 0.8,
        FanSpeed::High => 1.0,
    }
}

impl SensorSource for SimulatedRoom {
    fn read_ambient(&mut self) -> Option<f32> {
        Some(self.ambient_c)
    }

    fn read_coil(&mut self) -> Option<f32> {
        Some(self.coil_c)
    }
}
