pub mod clock;
pub mod compressor;
pub mod config;
pub mod control;
pub mod error;
pub mod fan;
pub mod history;
pub mod schedule;
pub mod sensors;
pub mod types;

pub use clock::Instant;
pub use compressor::CompressorGuard;
pub use config::{ControlConfig, PersistedSettings, RuntimeConfig, ScheduleConfig, TimingConfig};
pub use control::{ControlLoop, PendingFanChange};
pub use error::{ParseModeError, ScheduleEntryError};
pub use fan::FanArbiter;
pub use history::{
    PowerEntry, PowerHistory, TemperatureEntry, TemperatureHistory, WattageRate,
};
pub use schedule::{DayType, ScheduleEntry, ScheduleResolver, ScheduleTarget};
pub use sensors::{SensorReadings, SensorSource, TemperatureSample};
pub use types::{ControlAction, ControlStatus, FanMode, FanSpeed, SystemMode};
