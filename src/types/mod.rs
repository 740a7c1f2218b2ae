use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Position in meters relative to the first valid fix (east, north, up).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LocalPosition {
    pub const ORIGIN: LocalPosition = LocalPosition {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Horizontal distance to `other`, ignoring the vertical component
    pub fn horizontal_distance(&self, other: &LocalPosition) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn from_vector(v: Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Signed decimal degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One raw inertial read, in sensor counts (x, y, z).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImuSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

/// Discrete flight phase of the glider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightPhase {
    /// Carried by the mother ship, or in the dead zone between the other two
    #[default]
    Attached,
    /// Released and flying
    Deployed,
    /// On the ground
    Landed,
}

impl FlightPhase {
    /// Three-letter code used on the overlay record
    pub fn code(self) -> &'static str {
        match self {
            FlightPhase::Attached => "ATT",
            FlightPhase::Deployed => "DPL",
            FlightPhase::Landed => "LND",
        }
    }

    /// Inverse of [`FlightPhase::code`]; anything else (including `UNK`) is `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ATT" => Some(FlightPhase::Attached),
            "DPL" => Some(FlightPhase::Deployed),
            "LND" => Some(FlightPhase::Landed),
            _ => None,
        }
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_codes() {
        for phase in [
            FlightPhase::Attached,
            FlightPhase::Deployed,
            FlightPhase::Landed,
        ] {
            assert_eq!(FlightPhase::from_code(phase.code()), Some(phase));
        }
        assert_eq!(FlightPhase::from_code("UNK"), None);
    }

    #[test]
    fn test_horizontal_distance_ignores_altitude() {
        let a = LocalPosition::new(0.0, 0.0, 100.0);
        let b = LocalPosition::new(3.0, 4.0, 0.0);
        assert!((a.horizontal_distance(&b) - 5.0).abs() < 1e-12);
    }
}
