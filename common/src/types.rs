use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseModeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMode {
    Cooling,
    Heating,
    FanOnly,
    Idle,
}

impl SystemMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cooling => "cooling",
            Self::Heating => "heating",
            Self::FanOnly => "fan_only",
            Self::Idle => "idle",
        }
    }

    pub fn drives_compressor(self) -> bool {
        matches!(self, Self::Cooling | Self::Heating)
    }
}

impl FromStr for SystemMode {
    type Err = ParseModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cooling" => Ok(Self::Cooling),
            "heating" => Ok(Self::Heating),
            "fan_only" | "fan" => Ok(Self::FanOnly),
            "idle" => Ok(Self::Idle),
            _ => Err(ParseModeError::SystemMode(value.to_string())),
        }
    }
}

/// Parses a scheduled mode name; `unspecified` (or an empty string) leaves
/// the mode to earlier entries or the caller's default.
pub fn parse_scheduled_mode(value: &str) -> Result<Option<SystemMode>, ParseModeError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "unspecified" => Ok(None),
        other => other
            .parse::<SystemMode>()
            .map(Some)
            .map_err(|_| ParseModeError::ScheduledMode(value.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Auto,
    Off,
    Low,
    Medium,
    High,
}

impl FanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Off => "off",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn manual_speed(self) -> Option<FanSpeed> {
        match self {
            Self::Auto => None,
            Self::Off => Some(FanSpeed::Off),
            Self::Low => Some(FanSpeed::Low),
            Self::Medium => Some(FanSpeed::Medium),
            Self::High => Some(FanSpeed::High),
        }
    }
}

impl FromStr for FanMode {
    type Err = ParseModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "off" => Ok(Self::Off),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseModeError::FanMode(value.to_string())),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub const ALL: [FanSpeed; 4] = [Self::Off, Self::Low, Self::Medium, Self::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Off => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl FromStr for FanSpeed {
    type Err = ParseModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseModeError::FanSpeed(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    CompressorOn,
    CompressorOff,
    FanSpeed(FanSpeed),
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlStatus {
    #[serde(rename = "systemMode")]
    pub system_mode: &'static str,
    #[serde(rename = "fanMode")]
    pub fan_mode: &'static str,
    #[serde(rename = "fanSpeed")]
    pub fan_speed: &'static str,
    #[serde(rename = "targetTemp")]
    pub target_temp_c: f32,
    pub hysteresis: f32,
    #[serde(rename = "ambientTemp")]
    pub ambient_temp_c: Option<f32>,
    #[serde(rename = "coilTemp")]
    pub coil_temp_c: Option<f32>,
    #[serde(rename = "compressorRunning")]
    pub compressor_running: bool,
    #[serde(rename = "compressorRequested")]
    pub compressor_requested: bool,
    #[serde(rename = "restartDelayRemainingMs")]
    pub restart_delay_remaining_ms: u32,
    #[serde(rename = "minRuntimeRemainingMs")]
    pub min_runtime_remaining_ms: u32,
    #[serde(rename = "inCooldown")]
    pub in_cooldown: bool,
    #[serde(rename = "cooldownRemainingMs")]
    pub cooldown_remaining_ms: u32,
    #[serde(rename = "scheduleEnabled")]
    pub schedule_enabled: bool,
    #[serde(rename = "totalEnergyWh")]
    pub total_energy_wh: f64,
}
