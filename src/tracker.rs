//! Geodetic fixes to a local tangent-plane frame anchored at the first fix.

use crate::config::GpsConfig;
use crate::gps::PositionFix;
use crate::nmea::GgaRecord;
use crate::types::{GeoPoint, LocalPosition};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Equirectangular projection of `point` around `origin` (x east, y north)
pub fn latlon_to_meters(point: GeoPoint, origin: GeoPoint) -> (f64, f64) {
    let d_lat = (point.latitude - origin.latitude).to_radians();
    let d_lon = (point.longitude - origin.longitude).to_radians();
    let x = EARTH_RADIUS_M * d_lon * origin.latitude.to_radians().cos();
    let y = EARTH_RADIUS_M * d_lat;
    (x, y)
}

/// Last accepted satellite altitude. Rejected readings keep the held value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AltitudeHold {
    last_valid: f64,
}

impl AltitudeHold {
    pub fn apply(&mut self, gga: &GgaRecord) -> f64 {
        if let Some(alt) = gga.accepted_altitude() {
            self.last_valid = alt;
        }
        self.last_valid
    }

    pub fn value(&self) -> f64 {
        self.last_valid
    }
}

pub struct PositionTracker {
    origin: Option<GeoPoint>,
    x: f64,
    y: f64,
    altitude: AltitudeHold,
    movement_threshold_m: f64,
    speed_gate_kmh: f64,
}

impl PositionTracker {
    pub fn new(config: &GpsConfig) -> Self {
        Self {
            origin: None,
            x: 0.0,
            y: 0.0,
            altitude: AltitudeHold::default(),
            movement_threshold_m: config.movement_threshold_m,
            speed_gate_kmh: config.speed_gate_kmh,
        }
    }

    pub fn origin(&self) -> Option<GeoPoint> {
        self.origin
    }

    pub fn position(&self) -> LocalPosition {
        LocalPosition::new(self.x, self.y, self.altitude.value())
    }

    /// Fold a fix-quality sentence into the held altitude
    pub fn apply_altitude(&mut self, gga: &GgaRecord) {
        self.altitude.apply(gga);
    }

    /// Fold an active position fix. The first one becomes the origin.
    /// Later ones move the position only past the jitter gate.
    pub fn update(&mut self, fix: &PositionFix) -> LocalPosition {
        let Some(origin) = self.origin else {
            self.origin = Some(fix.point);
            self.x = 0.0;
            self.y = 0.0;
            log::info!(
                "Local frame origin set at {:.6}, {:.6}",
                fix.point.latitude,
                fix.point.longitude
            );
            return self.position();
        };

        let (x, y) = latlon_to_meters(fix.point, origin);
        let moved = LocalPosition::new(x, y, 0.0).horizontal_distance(&self.position());
        if moved > self.movement_threshold_m || fix.speed_kmh > self.speed_gate_kmh {
            self.x = x;
            self.y = y;
        }
        self.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn fix(latitude: f64, longitude: f64, speed_kmh: f64) -> PositionFix {
        PositionFix {
            point: GeoPoint {
                latitude,
                longitude,
            },
            speed_kmh,
            local_time: None,
        }
    }

    fn gga(quality: u8, altitude: f64) -> GgaRecord {
        GgaRecord {
            time: None,
            position: None,
            fix_quality: Some(quality),
            satellites: Some(8),
            altitude_m: Some(altitude),
        }
    }

    #[test]
    fn test_first_fix_is_origin() {
        let mut tracker = PositionTracker::new(&GpsConfig::default());
        let pos = tracker.update(&fix(-23.55, -46.63, 12.0));
        assert_eq!(pos, LocalPosition::ORIGIN);
        assert_eq!(tracker.origin().map(|o| o.latitude), Some(-23.55));
    }

    #[test]
    fn test_origin_never_moves() {
        let mut tracker = PositionTracker::new(&GpsConfig::default());
        tracker.update(&fix(-23.55, -46.63, 0.0));
        tracker.update(&fix(-23.56, -46.64, 50.0));
        assert_eq!(tracker.origin().map(|o| o.longitude), Some(-46.63));
    }

    #[test]
    fn test_projection_north_and_east() {
        let origin = GeoPoint {
            latitude: 0.0,
            longitude: 0.0,
        };
        let (x, y) = latlon_to_meters(
            GeoPoint {
                latitude: 0.001,
                longitude: 0.001,
            },
            origin,
        );
        let expected = 6_371_000.0 * 0.001_f64.to_radians();
        assert_abs_diff_eq!(x, expected, epsilon = 1e-6);
        assert_abs_diff_eq!(y, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_sub_threshold_jitter_is_ignored() {
        let mut tracker = PositionTracker::new(&GpsConfig::default());
        tracker.update(&fix(-23.55, -46.63, 0.0));
        // ~0.11 m north
        let pos = tracker.update(&fix(-23.550001, -46.63, 0.9));
        assert_eq!(pos, LocalPosition::ORIGIN);
    }

    #[test]
    fn test_speed_gate_accepts_small_moves() {
        let mut tracker = PositionTracker::new(&GpsConfig::default());
        tracker.update(&fix(-23.55, -46.63, 0.0));
        let pos = tracker.update(&fix(-23.550001, -46.63, 3.0));
        assert!(pos.y < 0.0);
        assert_abs_diff_eq!(pos.y, -0.1112, epsilon = 1e-3);
    }

    #[test]
    fn test_large_move_accepted_at_rest() {
        let mut tracker = PositionTracker::new(&GpsConfig::default());
        tracker.update(&fix(-23.55, -46.63, 0.0));
        let pos = tracker.update(&fix(-23.55001, -46.63, 0.0));
        assert_abs_diff_eq!(pos.y, -1.112, epsilon = 1e-3);
    }

    #[test]
    fn test_altitude_hold_ignores_bad_readings() {
        let mut tracker = PositionTracker::new(&GpsConfig::default());
        tracker.apply_altitude(&gga(1, 760.0));
        tracker.apply_altitude(&gga(0, 900.0));
        tracker.apply_altitude(&gga(1, 0.0));
        tracker.apply_altitude(&gga(1, -4.0));
        assert_eq!(tracker.position().z, 760.0);
    }
}
