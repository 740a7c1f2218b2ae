//! Tunables for every estimator and the control loop.
//!
//! Defaults are the flight values; a JSON file only needs the keys it changes.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gps: GpsConfig,
    pub imu: ImuConfig,
    pub baro: BaroConfig,
    pub airspeed: AirspeedConfig,
    pub phase: PhaseConfig,
    pub control: ControlConfig,
}

impl Config {
    /// Load from a JSON file, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Local time = UTC + offset (hours). Brasília is -3.
    pub utc_offset_hours: i32,
    /// Minimum horizontal jump (m) accepted while the receiver reports low speed
    pub movement_threshold_m: f64,
    /// Ground speed (km/h) above which every fix is accepted
    pub speed_gate_kmh: f64,
    /// Moving-average depth for the local position
    pub filter_depth: usize,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: -3,
            movement_threshold_m: 0.5,
            speed_gate_kmh: 1.0,
            filter_depth: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    pub address: u8,
    pub accepted_ids: Vec<u8>,
    pub calibration_samples: u32,
    pub calibration_spacing_ms: u64,
    /// Counts per g
    pub accel_sensitivity: f64,
    /// Counts per °/s
    pub gyro_sensitivity: f64,
    /// Gyro weight of the complementary filter
    pub alpha: f64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            address: 0x68,
            accepted_ids: vec![0x70, 0x68],
            calibration_samples: 1000,
            calibration_spacing_ms: 5,
            accel_sensitivity: 8192.0,
            gyro_sensitivity: 131.0,
            alpha: 0.95,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaroConfig {
    pub calibration_samples: u32,
    /// Extra wait after the rated measurement time during calibration
    pub calibration_margin_ms: u64,
    /// Extra wait after the rated measurement time during flight reads
    pub read_margin_ms: u64,
    /// Sample the barometer every N control cycles
    pub read_every_cycles: u64,
    /// Cycles after startup during which implausible altitudes are expected
    /// (vehicle still on the ground) and not counted as held low readings
    pub hold_warmup_cycles: u64,
    /// Altitudes at or below this (m) are not accepted as a new valid value
    pub plausible_floor_m: f64,
}

impl Default for BaroConfig {
    fn default() -> Self {
        Self {
            calibration_samples: 50,
            calibration_margin_ms: 10,
            read_margin_ms: 5,
            read_every_cycles: 5,
            hold_warmup_cycles: 100,
            plausible_floor_m: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirspeedConfig {
    /// kg/m³, no altitude compensation
    pub air_density: f64,
    /// Dynamic pressures below this (Pa) read as zero
    pub noise_floor_pa: f64,
}

impl Default for AirspeedConfig {
    fn default() -> Self {
        Self {
            air_density: 1.225,
            noise_floor_pa: 0.5,
        }
    }
}

/// Thresholds of the flight-phase state machine (altitude m, speed km/h, time s).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub landed_max_altitude: f64,
    pub landed_max_speed: f64,
    pub deployed_min_altitude: f64,
    pub deployed_min_elapsed_s: u32,
    pub deployed_min_speed: f64,
    pub leave_landed_altitude: f64,
    pub leave_landed_speed: f64,
    pub leave_deployed_altitude: f64,
    pub leave_deployed_speed: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            landed_max_altitude: 2.0,
            landed_max_speed: 0.5,
            deployed_min_altitude: 5.0,
            deployed_min_elapsed_s: 60,
            deployed_min_speed: 0.5,
            leave_landed_altitude: 3.0,
            leave_landed_speed: 1.0,
            leave_deployed_altitude: 3.0,
            leave_deployed_speed: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub cycle_period_ms: u64,
    /// Log parser statistics every N cycles (0 disables)
    pub stats_interval_cycles: u64,
    pub gps_silence_secs: u64,
    pub baro_silence_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: 20,
            stats_interval_cycles: 500,
            gps_silence_secs: 5,
            baro_silence_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_gives_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.gps.filter_depth, 5);
        assert_eq!(config.imu.accepted_ids, vec![0x70, 0x68]);
    }

    #[test]
    fn test_partial_json_overrides_only_named_keys() {
        let config: Config =
            serde_json::from_str(r#"{ "gps": { "utc_offset_hours": 0 }, "imu": { "alpha": 0.9 } }"#)
                .unwrap();
        assert_eq!(config.gps.utc_offset_hours, 0);
        assert_eq!(config.gps.movement_threshold_m, 0.5);
        assert_eq!(config.imu.alpha, 0.9);
        assert_eq!(config.baro, BaroConfig::default());
    }

    #[test]
    fn test_load_reports_bad_file() {
        let dir = std::env::temp_dir().join(format!("glider_nav_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("parsing config"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
