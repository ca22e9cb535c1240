use serde::{Deserialize, Serialize};

pub const MS_PER_MINUTE: u32 = 60_000;

/// Millisecond timestamp from a free-running 32-bit counter.
///
/// The counter wraps roughly every 49.7 days. Durations are always taken as
/// `later - earlier` with wrapping subtraction, so a rollover between the two
/// readings still yields the true elapsed time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instant(u32);

impl Instant {
    pub const fn from_millis(ms: u32) -> Self {
        Self(ms)
    }

    pub const fn as_millis(self) -> u32 {
        self.0
    }

    pub fn elapsed_since(self, earlier: Instant) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    pub fn wrapping_add_ms(self, ms: u32) -> Self {
        Self(self.0.wrapping_add(ms))
    }

    /// True once `self` is at or past `deadline`.
    ///
    /// Valid while the two instants are less than half the counter range
    /// (~24.8 days) apart.
    pub fn has_reached(self, deadline: Instant) -> bool {
        (self.0.wrapping_sub(deadline.0) as i32) >= 0
    }

    pub fn remaining_until(self, deadline: Instant) -> u32 {
        if self.has_reached(deadline) {
            0
        } else {
            deadline.0.wrapping_sub(self.0)
        }
    }

    pub fn minute_index(self) -> u32 {
        self.0 / MS_PER_MINUTE
    }

    pub fn minute_start(self) -> Instant {
        Self(self.minute_index() * MS_PER_MINUTE)
    }

    pub fn ms_to_next_minute(self) -> u32 {
        MS_PER_MINUTE - (self.0 % MS_PER_MINUTE)
    }
}
