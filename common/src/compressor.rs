use tracing::debug;

use crate::{clock::Instant, types::ControlAction};

/// Compressor relay guard.
///
/// Callers only express a desire with [`request_on`](Self::request_on) /
/// [`request_off`](Self::request_off); [`update`](Self::update) performs the
/// transition once the minimum runtime (for stopping) or the restart delay
/// (for starting) has elapsed. [`force_off`](Self::force_off) is the only way
/// to stop the compressor early.
#[derive(Debug, Clone)]
pub struct CompressorGuard {
    min_runtime_ms: u32,
    restart_delay_ms: u32,

    running: bool,
    requested_on: bool,

    last_on: Option<Instant>,
    last_off: Instant,
}

impl CompressorGuard {
    /// Starts de-energized. The restart delay counts from `now`, so a reboot
    /// right after a stop still protects the compressor.
    pub fn new(min_runtime_ms: u32, restart_delay_ms: u32, now: Instant) -> Self {
        Self {
            min_runtime_ms,
            restart_delay_ms,
            running: false,
            requested_on: false,
            last_on: None,
            last_off: now,
        }
    }

    pub fn request_on(&mut self) {
        self.requested_on = true;
    }

    pub fn request_off(&mut self) {
        self.requested_on = false;
    }

    pub fn force_off(&mut self, now: Instant) -> Option<ControlAction> {
        self.requested_on = false;
        if self.running {
            debug!("compressor forced off");
            Some(self.turn_off(now))
        } else {
            None
        }
    }

    pub fn update(&mut self, now: Instant) -> Option<ControlAction> {
        if self.running {
            if !self.requested_on && self.min_runtime_remaining(now) == 0 {
                debug!("compressor off after minimum runtime");
                return Some(self.turn_off(now));
            }
        } else if self.requested_on && self.can_turn_on(now) {
            debug!("compressor on after restart delay");
            return Some(self.turn_on(now));
        }
        None
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_requested(&self) -> bool {
        self.requested_on
    }

    pub fn can_turn_on(&self, now: Instant) -> bool {
        self.running || now.elapsed_since(self.last_off) >= self.restart_delay_ms
    }

    pub fn time_since_last_on(&self, now: Instant) -> u32 {
        self.last_on.map(|on| now.elapsed_since(on)).unwrap_or(0)
    }

    pub fn time_since_last_off(&self, now: Instant) -> u32 {
        now.elapsed_since(self.last_off)
    }

    pub fn restart_delay_remaining(&self, now: Instant) -> u32 {
        if self.running {
            return 0;
        }
        self.restart_delay_ms
            .saturating_sub(now.elapsed_since(self.last_off))
    }

    pub fn min_runtime_remaining(&self, now: Instant) -> u32 {
        if !self.running {
            return 0;
        }
        self.min_runtime_ms
            .saturating_sub(self.time_since_last_on(now))
    }

    pub fn min_runtime_ms(&self) -> u32 {
        self.min_runtime_ms
    }

    pub fn restart_delay_ms(&self) -> u32 {
        self.restart_delay_ms
    }

    fn turn_on(&mut self, now: Instant) -> ControlAction {
        self.running = true;
        self.last_on = Some(now);
        ControlAction::CompressorOn
    }

    fn turn_off(&mut self, now: Instant) -> ControlAction {
        self.running = false;
        self.last_off = now;
        ControlAction::CompressorOff
    }
}
