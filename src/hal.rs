//! Seams to the hardware the estimators depend on.
//!
//! Implementations: real peripherals on the target, `sensors::*` in the
//! simulator and in tests.

use std::time::{Duration, Instant};

use crate::error::SensorError;

/// Register-oriented two-wire bus.
pub trait Bus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), SensorError>;

    /// Read `buf.len()` bytes starting at register `reg`
    fn read(&mut self, address: u8, reg: u8, buf: &mut [u8]) -> Result<(), SensorError>;
}

/// Receive side of the satellite receiver's serial link.
pub trait ByteSource {
    /// Next pending byte, or `None` immediately when nothing is buffered
    fn try_read_byte(&mut self) -> Option<u8>;
}

/// Monotonic time since boot.
pub trait Clock {
    fn now(&self) -> Duration;

    fn delay(&mut self, duration: Duration);

    fn elapsed_since(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }
}

/// Barometric sensor after bring-up, driven in forced (one-shot) mode.
pub trait PressureSensor {
    /// Rated time from trigger to a readable result
    fn measurement_duration(&self) -> Duration;

    fn trigger(&mut self) -> Result<(), SensorError>;

    /// Result of the last triggered measurement in hPa.
    /// `Err(SensorError::NotReady)` when no new data is flagged.
    fn read_pressure_hpa(&mut self) -> Result<f64, SensorError>;
}

/// Wall-clock backed [`Clock`] for running on a host.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
