use crate::clock::Instant;

/// Pull-based temperature source. `None` or NaN means no reading this time.
pub trait SensorSource {
    fn read_ambient(&mut self) -> Option<f32>;
    fn read_coil(&mut self) -> Option<f32>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureSample {
    pub value_c: f32,
    pub timestamp: Instant,
}

/// Last good reading per channel.
///
/// A failed read keeps the previous sample; it is only retired once it is
/// older than the stale timeout.
#[derive(Debug, Clone)]
pub struct SensorReadings {
    stale_timeout_ms: u32,
    ambient: Option<TemperatureSample>,
    coil: Option<TemperatureSample>,
}

impl SensorReadings {
    pub fn new(stale_timeout_ms: u32) -> Self {
        Self {
            stale_timeout_ms,
            ambient: None,
            coil: None,
        }
    }

    pub fn poll<S: SensorSource + ?Sized>(&mut self, source: &mut S, now: Instant) {
        let ambient = source.read_ambient();
        let coil = source.read_coil();
        self.record(ambient, coil, now);
    }

    pub fn record(&mut self, ambient: Option<f32>, coil: Option<f32>, now: Instant) {
        if let Some(value_c) = ambient.filter(|value| value.is_finite()) {
            self.ambient = Some(TemperatureSample {
                value_c,
                timestamp: now,
            });
        }
        if let Some(value_c) = coil.filter(|value| value.is_finite()) {
            self.coil = Some(TemperatureSample {
                value_c,
                timestamp: now,
            });
        }
    }

    pub fn ambient(&self, now: Instant) -> Option<f32> {
        self.fresh(self.ambient, now)
    }

    pub fn coil(&self, now: Instant) -> Option<f32> {
        self.fresh(self.coil, now)
    }

    pub fn ambient_sample(&self) -> Option<TemperatureSample> {
        self.ambient
    }

    pub fn coil_sample(&self) -> Option<TemperatureSample> {
        self.coil
    }

    fn fresh(&self, sample: Option<TemperatureSample>, now: Instant) -> Option<f32> {
        sample
            .filter(|sample| now.elapsed_since(sample.timestamp) < self.stale_timeout_ms)
            .map(|sample| sample.value_c)
    }
}
