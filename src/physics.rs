//! Airspeed and load factor
//! Calibrated airspeed from the pressure rise over the ground baseline, and
//! the vertical load factor from the calibrated accelerometer

use crate::config::AirspeedConfig;

pub const GRAVITY: f64 = 9.81; // m/s²
const HPA_TO_PA: f64 = 100.0;
const MPS_TO_KMH: f64 = 3.6;

/// Dynamic pressure (Pa) from current and baseline pressure (hPa).
/// Anything below `noise_floor_pa`, negatives included, reads as zero.
pub fn dynamic_pressure_pa(current_hpa: f64, baseline_hpa: f64, noise_floor_pa: f64) -> f64 {
    let q = (current_hpa - baseline_hpa) * HPA_TO_PA;
    if q < noise_floor_pa {
        0.0
    } else {
        q
    }
}

/// Airspeed (km/h) for dynamic pressure `q` (Pa) at density `rho` (kg/m³)
///
/// Physics: q = ½·ρ·v²  →  v = √(2q/ρ)
pub fn airspeed_from_dynamic_pressure(q_pa: f64, rho: f64) -> f64 {
    (2.0 * q_pa.max(0.0) / rho).sqrt() * MPS_TO_KMH
}

/// Vertical load factor (g) from body-frame Z acceleration (m/s²)
pub fn load_factor(accel_z_mps2: f64) -> f64 {
    accel_z_mps2 / GRAVITY
}

pub struct AirspeedEstimator {
    air_density: f64,
    noise_floor_pa: f64,
}

impl AirspeedEstimator {
    pub fn new(config: &AirspeedConfig) -> Self {
        Self {
            air_density: config.air_density,
            noise_floor_pa: config.noise_floor_pa,
        }
    }

    /// km/h; zero until a pressure reading exists
    pub fn estimate(&self, current_hpa: Option<f64>, baseline_hpa: f64) -> f64 {
        let Some(current) = current_hpa else {
            return 0.0;
        };
        let q = dynamic_pressure_pa(current, baseline_hpa, self.noise_floor_pa);
        airspeed_from_dynamic_pressure(q, self.air_density)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn estimator() -> AirspeedEstimator {
        AirspeedEstimator::new(&AirspeedConfig::default())
    }

    #[test]
    fn test_below_noise_floor() {
        // 0.004 hPa = 0.4 Pa
        let cas = estimator().estimate(Some(1000.004), 1000.0);
        assert_eq!(cas, 0.0);
    }

    #[test]
    fn test_negative_dynamic_pressure_clamped() {
        assert_eq!(dynamic_pressure_pa(999.0, 1000.0, 0.5), 0.0);
        assert_eq!(estimator().estimate(Some(999.0), 1000.0), 0.0);
    }

    #[test]
    fn test_two_pascal() {
        let expected = (2.0 * 2.0 / 1.225_f64).sqrt() * 3.6;
        assert_abs_diff_eq!(airspeed_from_dynamic_pressure(2.0, 1.225), expected, epsilon = 1e-12);
        let cas = estimator().estimate(Some(1000.02), 1000.0);
        assert_abs_diff_eq!(cas, expected, epsilon = 1e-6);
        assert_abs_diff_eq!(cas, 6.5053, epsilon = 1e-3);
    }

    #[test]
    fn test_no_reading_is_zero() {
        assert_eq!(estimator().estimate(None, 1013.25), 0.0);
    }

    #[test]
    fn test_load_factor_one_g() {
        assert_abs_diff_eq!(load_factor(9.81), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(load_factor(-4.905), -0.5, epsilon = 1e-12);
    }
}
