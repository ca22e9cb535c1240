use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseModeError {
    #[error("unknown system mode `{0}`")]
    SystemMode(String),
    #[error("unknown fan mode `{0}`")]
    FanMode(String),
    #[error("unknown fan speed `{0}`")]
    FanSpeed(String),
    #[error("unknown scheduled mode `{0}`")]
    ScheduledMode(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleEntryError {
    #[error("hour {0} is out of range 0..=23")]
    Hour(u8),
    #[error("minute {0} is out of range 0..=59")]
    Minute(u8),
    #[error("temperature {0} is not a finite value")]
    Temperature(f32),
}
