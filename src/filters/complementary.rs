use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::config::ImuConfig;
use crate::imu::ImuCalibration;
use crate::types::RawImuSample;

const GRAVITY: f64 = 9.81; // m/s²

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeState {
    /// Pitch (degrees)
    pub theta: f64,
    /// Roll (degrees)
    pub phi: f64,
}

/// Output of one filter step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttitudeUpdate {
    pub attitude: AttitudeState,
    /// Calibrated specific force in the body frame (m/s²)
    pub accel_mps2: Vector3<f64>,
}

/// Pitch/roll from a gyro integrator corrected by accelerometer tilt.
pub struct AttitudeFilter {
    state: AttitudeState,
    calibration: ImuCalibration,
    accel_sensitivity: f64,
    gyro_sensitivity: f64,
    // Gyro weight
    alpha: f64,
}

impl AttitudeFilter {
    pub fn new(calibration: ImuCalibration, config: &ImuConfig) -> Self {
        Self {
            state: AttitudeState::default(),
            calibration,
            accel_sensitivity: config.accel_sensitivity,
            gyro_sensitivity: config.gyro_sensitivity,
            alpha: config.alpha,
        }
    }

    pub fn state(&self) -> AttitudeState {
        self.state
    }

    /// Counts to m/s², removing the offset with the sign of the raw reading
    pub fn accel_mps2(&self, raw: [i16; 3]) -> Vector3<f64> {
        let mut out = Vector3::zeros();
        for axis in 0..3 {
            let counts = f64::from(raw[axis]);
            let offset = self.calibration.accel_offset_g[axis].copysign(counts);
            out[axis] = (counts / self.accel_sensitivity - offset) * GRAVITY;
        }
        out
    }

    /// Counts to bias-corrected °/s
    pub fn gyro_dps(&self, raw: [i16; 3]) -> Vector3<f64> {
        let mut out = Vector3::zeros();
        for axis in 0..3 {
            out[axis] =
                f64::from(raw[axis]) / self.gyro_sensitivity - self.calibration.gyro_bias_dps[axis];
        }
        out
    }

    /// Advance the filter by `dt` seconds.
    pub fn update(&mut self, sample: &RawImuSample, dt: f64) -> AttitudeUpdate {
        let a = self.accel_mps2(sample.accel);
        let g = self.gyro_dps(sample.gyro);

        let theta_acc = a.x.atan2(a.y.hypot(a.z)).to_degrees();
        let phi_acc = a.y.atan2(a.x.hypot(a.z)).to_degrees();

        let theta_gyro = self.state.theta + g.x * dt;
        let phi_gyro = self.state.phi + g.y * dt;

        self.state.theta = self.alpha * theta_gyro + (1.0 - self.alpha) * theta_acc;
        self.state.phi = self.alpha * phi_gyro + (1.0 - self.alpha) * phi_acc;

        AttitudeUpdate {
            attitude: self.state,
            accel_mps2: a,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn filter(calibration: ImuCalibration) -> AttitudeFilter {
        AttitudeFilter::new(calibration, &ImuConfig::default())
    }

    #[test]
    fn test_level_at_rest_stays_level() {
        let mut f = filter(ImuCalibration::default());
        let sample = RawImuSample {
            accel: [0, 0, 8192],
            gyro: [0, 0, 0],
        };
        for _ in 0..100 {
            f.update(&sample, 0.02);
        }
        assert_abs_diff_eq!(f.state().theta, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.state().phi, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_step_blend() {
        let mut f = filter(ImuCalibration::default());
        // 45° pitch from the accelerometer, 10 °/s pitch rate
        let sample = RawImuSample {
            accel: [8192, 0, 8192],
            gyro: [1310, 0, 0],
        };
        let out = f.update(&sample, 0.1);
        // 0.95 * (0 + 10 * 0.1) + 0.05 * 45
        assert_abs_diff_eq!(out.attitude.theta, 0.95 + 2.25, epsilon = 1e-9);
        assert_abs_diff_eq!(out.attitude.phi, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.accel_mps2.z, 9.81, epsilon = 1e-12);
    }

    #[test]
    fn test_converges_to_accelerometer_tilt() {
        let mut f = filter(ImuCalibration::default());
        let sample = RawImuSample {
            accel: [0, 8192, 8192],
            gyro: [0, 0, 0],
        };
        for _ in 0..500 {
            f.update(&sample, 0.02);
        }
        assert_abs_diff_eq!(f.state().phi, 45.0, epsilon = 1e-6);
    }

    #[test]
    fn test_offset_follows_sign_of_reading() {
        let cal = ImuCalibration {
            gyro_bias_dps: [0.0; 3],
            accel_offset_g: [0.01, 0.0, 0.0],
        };
        let f = filter(cal);
        let pos = f.accel_mps2([8192, 0, 0]);
        let neg = f.accel_mps2([-8192, 0, 0]);
        assert_abs_diff_eq!(pos.x, 0.99 * 9.81, epsilon = 1e-9);
        assert_abs_diff_eq!(neg.x, -0.99 * 9.81, epsilon = 1e-9);
    }

    #[test]
    fn test_gyro_bias_removed() {
        let cal = ImuCalibration {
            gyro_bias_dps: [1.0, -2.0, 0.5],
            accel_offset_g: [0.0; 3],
        };
        let rates = filter(cal).gyro_dps([131, -262, 65]);
        assert_abs_diff_eq!(rates.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rates.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rates.z, 65.0 / 131.0 - 0.5, epsilon = 1e-12);
    }
}
