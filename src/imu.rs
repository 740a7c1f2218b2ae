//! Six-axis inertial sensor over the two-wire bus: identity probe, raw
//! sample reads and the static bias/offset calibration.

use std::time::Duration;

use crate::config::ImuConfig;
use crate::error::{SensorError, StartupError};
use crate::hal::{Bus, Clock};
use crate::types::RawImuSample;

pub const REG_WHO_AM_I: u8 = 0x75;
pub const REG_ACCEL_XOUT_H: u8 = 0x3B;
pub const REG_GYRO_XOUT_H: u8 = 0x43;

fn decode_triplet(buf: &[u8; 6]) -> [i16; 3] {
    [
        i16::from_be_bytes([buf[0], buf[1]]),
        i16::from_be_bytes([buf[2], buf[3]]),
        i16::from_be_bytes([buf[4], buf[5]]),
    ]
}

pub struct Mpu6500<B: Bus> {
    bus: B,
    address: u8,
    identity: u8,
}

impl<B: Bus> Mpu6500<B> {
    /// Read the identity register and keep the handle only for a known part.
    pub fn probe(mut bus: B, address: u8, accepted_ids: &[u8]) -> Result<Self, StartupError> {
        let mut id = [0u8; 1];
        bus.read(address, REG_WHO_AM_I, &mut id)?;
        if !accepted_ids.contains(&id[0]) {
            return Err(StartupError::UnknownImu { id: id[0] });
        }
        log::info!("IMU identity 0x{:02X} at 0x{:02X}", id[0], address);
        Ok(Self {
            bus,
            address,
            identity: id[0],
        })
    }

    pub fn identity(&self) -> u8 {
        self.identity
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn read_triplet(&mut self, reg: u8) -> Result<[i16; 3], SensorError> {
        let mut buf = [0u8; 6];
        self.bus.read(self.address, reg, &mut buf)?;
        Ok(decode_triplet(&buf))
    }

    pub fn read_accel_raw(&mut self) -> Result<[i16; 3], SensorError> {
        self.read_triplet(REG_ACCEL_XOUT_H)
    }

    pub fn read_gyro_raw(&mut self) -> Result<[i16; 3], SensorError> {
        self.read_triplet(REG_GYRO_XOUT_H)
    }

    pub fn read_sample(&mut self) -> Result<RawImuSample, SensorError> {
        Ok(RawImuSample {
            accel: self.read_accel_raw()?,
            gyro: self.read_gyro_raw()?,
        })
    }
}

/// Static corrections measured once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImuCalibration {
    /// °/s per axis
    pub gyro_bias_dps: [f64; 3],
    /// g per axis, Z relative to +1 g
    pub accel_offset_g: [f64; 3],
}

/// Average static samples into gyro bias and accelerometer offset.
///
/// The vehicle must be level and still. Failed reads are skipped; the run
/// is fatal only if no read succeeds for either sensor.
pub fn calibrate<B: Bus, C: Clock>(
    imu: &mut Mpu6500<B>,
    clock: &mut C,
    config: &ImuConfig,
) -> Result<ImuCalibration, StartupError> {
    let spacing = Duration::from_millis(config.calibration_spacing_ms);
    let attempts = config.calibration_samples;

    log::info!("Calibrating gyroscope ({} samples), keep the vehicle still", attempts);
    let gyro_mean = average_counts(attempts, clock, spacing, || imu.read_gyro_raw())
        .ok_or(StartupError::NoImuCalibration { attempts })?;

    log::info!("Calibrating accelerometer ({} samples)", attempts);
    let accel_mean = average_counts(attempts, clock, spacing, || imu.read_accel_raw())
        .ok_or(StartupError::NoImuCalibration { attempts })?;

    let mut cal = ImuCalibration::default();
    for axis in 0..3 {
        cal.gyro_bias_dps[axis] = gyro_mean[axis] / config.gyro_sensitivity;
        cal.accel_offset_g[axis] = accel_mean[axis] / config.accel_sensitivity;
    }
    cal.accel_offset_g[2] -= 1.0;

    for (axis, name) in ['X', 'Y', 'Z'].iter().enumerate() {
        log::info!(
            "Axis {}: gyro bias {:.3} °/s, accel offset {:.3} g",
            name,
            cal.gyro_bias_dps[axis],
            cal.accel_offset_g[axis]
        );
    }
    Ok(cal)
}

fn average_counts<C, F>(attempts: u32, clock: &mut C, spacing: Duration, mut read: F) -> Option<[f64; 3]>
where
    C: Clock,
    F: FnMut() -> Result<[i16; 3], SensorError>,
{
    let mut sum = [0i64; 3];
    let mut valid = 0u32;
    for _ in 0..attempts {
        match read() {
            Ok(raw) => {
                for axis in 0..3 {
                    sum[axis] += i64::from(raw[axis]);
                }
                valid += 1;
            }
            Err(err) => log::debug!("Calibration read failed: {}", err),
        }
        clock.delay(spacing);
    }
    if valid == 0 {
        return None;
    }
    if valid < attempts {
        log::warn!("Calibration used {}/{} samples", valid, attempts);
    }
    Some(sum.map(|s| s as f64 / f64::from(valid)))
}
