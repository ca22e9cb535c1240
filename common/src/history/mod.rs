//! Minute-bucketed histories of temperature and power state.

pub mod power;
pub mod ring;
pub mod temperature;

/// Entries kept per history (two hours of minute buckets).
pub const HISTORY_CAPACITY: usize = 120;

pub use power::{PowerEntry, PowerHistory, WattageRate};
pub use ring::RingBuffer;
pub use temperature::{TemperatureEntry, TemperatureHistory};
