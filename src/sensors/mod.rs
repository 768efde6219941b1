//! Load-gauge sampling seam
//!
//! The load gauge is read by an external acquisition path; the control loop
//! only consumes a raw reading per cycle. Production wiring supplies its own
//! implementation; the shipped ones cover a gauge-less install (fixed
//! baseline) and the mock hardware mode.

use rand::Rng;

use crate::error::Result;

/// Raw load-gauge reading source.
pub trait LoadSensor: Send {
    fn read_raw(&mut self) -> Result<u32>;
}

impl<S: LoadSensor + ?Sized> LoadSensor for Box<S> {
    fn read_raw(&mut self) -> Result<u32> {
        (**self).read_raw()
    }
}

/// Constant reading for installs without a gauge fitted.
pub struct FixedLoadSensor {
    value: u32,
}

impl FixedLoadSensor {
    pub fn new(value: u32) -> Self {
        Self { value }
    }
}

impl LoadSensor for FixedLoadSensor {
    fn read_raw(&mut self) -> Result<u32> {
        Ok(self.value)
    }
}

/// Jittered reading around a baseline, used by the mock hardware mode.
pub struct JitterLoadSensor {
    baseline: u32,
    spread: u32,
}

impl JitterLoadSensor {
    pub fn new(baseline: u32, spread: u32) -> Self {
        Self { baseline, spread }
    }
}

impl LoadSensor for JitterLoadSensor {
    fn read_raw(&mut self) -> Result<u32> {
        if self.spread == 0 {
            return Ok(self.baseline);
        }
        let mut rng = rand::thread_rng();
        let offset = rng.gen_range(0..=self.spread * 2);
        Ok(self.baseline.saturating_add(offset).saturating_sub(self.spread))
    }
}
