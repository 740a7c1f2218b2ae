use std::time::Duration;

use serde::Serialize;

use crate::config::ControlConfig;
use crate::gps::ParserStats;

/// Tracks freshness of one sensor against the control loop's monotonic clock
#[derive(Clone, Debug)]
pub struct SensorHealth {
    pub name: &'static str,
    last_update: Duration,
    pub silence_threshold: Duration,
    consecutive_failures: u32,
    total_failures: u32,
    reported_silent: bool,
}

impl SensorHealth {
    pub fn new(name: &'static str, silence_threshold: Duration, now: Duration) -> Self {
        SensorHealth {
            name,
            last_update: now,
            silence_threshold,
            consecutive_failures: 0,
            total_failures: 0,
            reported_silent: false,
        }
    }

    pub fn update(&mut self, now: Duration) {
        self.last_update = now;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures = self.total_failures.wrapping_add(1);
    }

    pub fn time_since_last_update(&self, now: Duration) -> Duration {
        now.saturating_sub(self.last_update)
    }

    pub fn is_silent(&self, now: Duration) -> bool {
        self.time_since_last_update(now) > self.silence_threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn report(&self, now: Duration) -> SensorReport {
        SensorReport {
            healthy: !self.is_silent(now),
            silence_secs: self.time_since_last_update(now).as_secs_f64(),
            consecutive_failures: self.consecutive_failures,
            total_failures: self.total_failures,
        }
    }

    /// Log once when the sensor goes silent and once when it recovers
    fn log_transition(&mut self, now: Duration) {
        let silent = self.is_silent(now);
        if silent && !self.reported_silent {
            log::warn!(
                "{} silent for {:.1}s ({} consecutive failures), holding last values",
                self.name,
                self.time_since_last_update(now).as_secs_f64(),
                self.consecutive_failures
            );
        } else if !silent && self.reported_silent {
            log::info!("{} recovered", self.name);
        }
        self.reported_silent = silent;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SensorReport {
    pub healthy: bool,
    pub silence_secs: f64,
    pub consecutive_failures: u32,
    pub total_failures: u32,
}

/// Report of sensor health status
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HealthReport {
    pub gps: SensorReport,
    pub baro: SensorReport,
    pub imu: SensorReport,
    /// Sentence counters at the time of the report
    pub parser: ParserStats,
}

pub struct HealthMonitor {
    pub gps: SensorHealth,
    pub baro: SensorHealth,
    pub imu: SensorHealth,
}

impl HealthMonitor {
    pub fn new(config: &ControlConfig, now: Duration) -> Self {
        HealthMonitor {
            gps: SensorHealth::new("GPS", Duration::from_secs(config.gps_silence_secs), now),
            baro: SensorHealth::new("Barometer", Duration::from_secs(config.baro_silence_secs), now),
            // Read every cycle, so a one-second gap is already a dropout
            imu: SensorHealth::new("IMU", Duration::from_secs(1), now),
        }
    }

    pub fn check_health(&self, now: Duration, parser: ParserStats) -> HealthReport {
        HealthReport {
            gps: self.gps.report(now),
            baro: self.baro.report(now),
            imu: self.imu.report(now),
            parser,
        }
    }

    /// Emit warnings for sensors that just went silent, info when they recover
    pub fn log_transitions(&mut self, now: Duration) {
        self.gps.log_transition(now);
        self.baro.log_transition(now);
        self.imu.log_transition(now);
    }

    /// Format health status for logging
    pub fn format_status(&self, now: Duration) -> String {
        let status = |sensor: &SensorHealth| {
            if sensor.is_silent(now) {
                format!("silent {:.1}s", sensor.time_since_last_update(now).as_secs_f64())
            } else {
                "ok".to_string()
            }
        };
        format!(
            "Health: GPS {} | Baro {} | IMU {}",
            status(&self.gps),
            status(&self.baro),
            status(&self.imu)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_sensor_health_detection() {
        let mut health = SensorHealth::new("test", secs(1), secs(0));

        // Initially healthy (just created)
        assert!(!health.is_silent(secs(1)));

        // Past the silence threshold
        assert!(health.is_silent(Duration::from_millis(1100)));

        // Update should reset
        health.update(Duration::from_millis(1100));
        assert!(!health.is_silent(Duration::from_millis(1200)));
    }

    #[test]
    fn test_failures_reset_on_update() {
        let mut health = SensorHealth::new("test", secs(5), secs(0));
        health.record_failure();
        health.record_failure();
        assert_eq!(health.consecutive_failures(), 2);
        health.update(secs(1));
        assert_eq!(health.consecutive_failures(), 0);
        assert_eq!(health.report(secs(1)).total_failures, 2);
    }

    #[test]
    fn test_health_monitor() {
        let mut monitor = HealthMonitor::new(&ControlConfig::default(), secs(0));

        let report = monitor.check_health(secs(1), ParserStats::default());
        assert!(report.gps.healthy);
        assert!(report.baro.healthy);
        assert_eq!(monitor.format_status(secs(1)), "Health: GPS ok | Baro ok | IMU ok");

        monitor.imu.update(secs(9));
        monitor.baro.update(secs(9));
        monitor.log_transitions(secs(10));
        let report = monitor.check_health(secs(10), ParserStats::default());
        assert!(!report.gps.healthy);
        assert!(report.baro.healthy);
        assert!(monitor.gps.reported_silent);
        assert!(monitor.format_status(secs(10)).starts_with("Health: GPS silent 10.0s"));
    }

    #[test]
    fn test_report_serializes() {
        let monitor = HealthMonitor::new(&ControlConfig::default(), secs(0));
        let parser = ParserStats {
            received: 3,
            valid: 2,
            checksum_errors: 1,
            ..ParserStats::default()
        };
        let report = monitor.check_health(secs(0), parser);
        assert_eq!(report.parser, parser);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"gps\":{\"healthy\":true"));
        assert!(json.contains("\"parser\":{\"received\":3,\"valid\":2,\"checksum_errors\":1"));
    }
}
