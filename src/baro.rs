//! Barometric altitude relative to the pressure measured on the ground at
//! startup, holding the last plausible value through failed reads.

use std::time::Duration;

use serde::Serialize;

use crate::config::BaroConfig;
use crate::error::{SensorError, StartupError};
use crate::hal::{Clock, PressureSensor};

/// International barometric formula (m) for `pressure` over `baseline` (same units)
pub fn pressure_to_altitude(pressure: f64, baseline: f64) -> f64 {
    44330.0 * (1.0 - (pressure / baseline).powf(1.0 / 5.255))
}

fn forced_read<P: PressureSensor, C: Clock>(
    sensor: &mut P,
    clock: &mut C,
    margin: Duration,
) -> Result<f64, SensorError> {
    sensor.trigger()?;
    clock.delay(sensor.measurement_duration() + margin);
    sensor.read_pressure_hpa()
}

/// Average forced-mode samples into the ground baseline (hPa).
pub fn calibrate<P: PressureSensor, C: Clock>(
    sensor: &mut P,
    clock: &mut C,
    config: &BaroConfig,
) -> Result<f64, StartupError> {
    let margin = Duration::from_millis(config.calibration_margin_ms);
    let attempts = config.calibration_samples;
    log::info!("Calibrating baseline pressure ({} samples)", attempts);

    let mut sum = 0.0;
    let mut valid = 0u32;
    for _ in 0..attempts {
        match forced_read(sensor, clock, margin) {
            Ok(hpa) => {
                sum += hpa;
                valid += 1;
                if valid % 10 == 0 {
                    log::debug!("Pressure calibration: {}/{}", valid, attempts);
                }
            }
            Err(err) => log::debug!("Pressure calibration read failed: {}", err),
        }
    }

    if valid == 0 {
        return Err(StartupError::NoBaroCalibration { attempts });
    }
    let baseline = sum / f64::from(valid);
    log::info!("Baseline pressure {:.2} hPa ({} readings)", baseline, valid);
    Ok(baseline)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BaroStatus {
    /// Not sampled this cycle
    Skipped,
    /// New plausible altitude accepted
    Fresh,
    /// Read succeeded but the altitude was at or below the plausibility floor
    Implausible,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BaroUpdate {
    pub status: BaroStatus,
    /// Held altitude after this cycle (m)
    pub altitude_m: f64,
    /// Most recent successful pressure reading (hPa)
    pub pressure_hpa: Option<f64>,
    /// Read succeeded but came in at or below the floor after the warm-up
    pub held_low: bool,
}

pub struct BarometricEstimator {
    baseline_hpa: f64,
    last_altitude: f64,
    last_pressure: Option<f64>,
    cycle: u64,
    read_every: u64,
    warmup_cycles: u64,
    floor_m: f64,
    margin: Duration,
    held_low_readings: u32,
}

impl BarometricEstimator {
    pub fn new(baseline_hpa: f64, config: &BaroConfig) -> Self {
        Self {
            baseline_hpa,
            last_altitude: 0.0,
            last_pressure: None,
            cycle: 0,
            read_every: config.read_every_cycles.max(1),
            warmup_cycles: config.hold_warmup_cycles,
            floor_m: config.plausible_floor_m,
            margin: Duration::from_millis(config.read_margin_ms),
            held_low_readings: 0,
        }
    }

    pub fn baseline_hpa(&self) -> f64 {
        self.baseline_hpa
    }

    pub fn altitude_m(&self) -> f64 {
        self.last_altitude
    }

    pub fn pressure_hpa(&self) -> Option<f64> {
        self.last_pressure
    }

    /// Readings at or below the floor seen after the warm-up
    pub fn held_low_readings(&self) -> u32 {
        self.held_low_readings
    }

    /// Run once per control cycle. Samples the sensor every `read_every_cycles`
    /// cycles; the reported altitude only ever moves to a plausible reading.
    pub fn update<P: PressureSensor, C: Clock>(&mut self, sensor: &mut P, clock: &mut C) -> BaroUpdate {
        let cycle = self.cycle;
        self.cycle = self.cycle.wrapping_add(1);

        if cycle % self.read_every != 0 {
            return self.report(BaroStatus::Skipped, false);
        }

        match forced_read(sensor, clock, self.margin) {
            Ok(hpa) => {
                self.last_pressure = Some(hpa);
                let altitude = pressure_to_altitude(hpa, self.baseline_hpa);
                if altitude > self.floor_m {
                    self.last_altitude = altitude;
                    self.report(BaroStatus::Fresh, false)
                } else {
                    // Expected on the ground during warm-up
                    let held_low = cycle > self.warmup_cycles;
                    if held_low {
                        self.held_low_readings = self.held_low_readings.wrapping_add(1);
                    }
                    self.report(BaroStatus::Implausible, held_low)
                }
            }
            Err(err) => {
                log::debug!("Barometer read failed: {}", err);
                self.report(BaroStatus::Failed, false)
            }
        }
    }

    fn report(&self, status: BaroStatus, held_low: bool) -> BaroUpdate {
        BaroUpdate {
            status,
            altitude_m: self.last_altitude,
            pressure_hpa: self.last_pressure,
            held_low,
        }
    }
}
