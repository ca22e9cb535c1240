use tracing::debug;

use crate::types::FanSpeed;

/// Single-output fan arbitration.
///
/// The effective speed is the faster of the requested speed and a per-cycle
/// minimum. The minimum is cleared by every [`update`](Self::update), so a
/// caller that needs a floor must re-assert it each cycle.
#[derive(Debug, Clone, Default)]
pub struct FanArbiter {
    requested: FanSpeed,
    minimum: FanSpeed,
    current: FanSpeed,
}

impl FanArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_requested_speed(&mut self, speed: FanSpeed) {
        self.requested = speed;
    }

    pub fn requested_speed(&self) -> FanSpeed {
        self.requested
    }

    pub fn enforce_minimum_speed(&mut self, minimum: FanSpeed) {
        self.minimum = self.minimum.max(minimum);
    }

    pub fn enforced_minimum(&self) -> FanSpeed {
        self.minimum
    }

    pub fn current_speed(&self) -> FanSpeed {
        self.current
    }

    /// Applies the effective speed and returns it when the output changed.
    pub fn update(&mut self) -> Option<FanSpeed> {
        let target = self.requested.max(self.minimum);
        self.minimum = FanSpeed::Off;

        if target == self.current {
            return None;
        }
        debug!(from = self.current.as_str(), to = target.as_str(), "fan speed change");
        self.current = target;
        Some(target)
    }
}
