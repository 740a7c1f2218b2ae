//! The control-loop context: owns every estimator and collaborator, runs the
//! startup calibrations and one cycle per [`FlightComputer::step`].

use std::time::Duration;

use crate::baro::{self, BaroStatus, BarometricEstimator};
use crate::config::Config;
use crate::error::StartupError;
use crate::filters::{AttitudeFilter, AttitudeState};
use crate::flight_phase::{FlightPhaseClassifier, PhaseInputs};
use crate::gps::{GpsReceiver, ParserStats, PositionFix};
use crate::hal::{Bus, ByteSource, Clock, PressureSensor};
use crate::health_monitor::{HealthMonitor, HealthReport};
use crate::imu::{self, Mpu6500};
use crate::mission_clock::MissionClock;
use crate::nmea::Sentence;
use crate::physics::{AirspeedEstimator, GRAVITY};
use crate::smoothing::PositionSmoother;
use crate::telemetry::TelemetrySnapshot;
use crate::tracker::PositionTracker;
use crate::types::FlightPhase;

/// The collaborators the flight computer drives.
pub struct Hardware<B, S, P, C> {
    /// Bus the inertial sensor sits on
    pub imu_bus: B,
    /// Satellite receiver serial link
    pub gps_link: S,
    pub barometer: P,
    pub clock: C,
}

pub struct FlightComputer<B: Bus, S: ByteSource, P: PressureSensor, C: Clock> {
    imu: Mpu6500<B>,
    gps_link: S,
    barometer: P,
    clock: C,

    receiver: GpsReceiver,
    tracker: PositionTracker,
    smoother: PositionSmoother,
    attitude: AttitudeFilter,
    baro: BarometricEstimator,
    airspeed: AirspeedEstimator,
    mission_clock: MissionClock,
    classifier: FlightPhaseClassifier,
    health: HealthMonitor,

    last_imu_update: Duration,
    // Level at rest until the first inertial read
    accel_z_mps2: f64,
    airspeed_kmh: f64,
    cycle: u64,
    stats_interval: u64,
}

impl<B: Bus, S: ByteSource, P: PressureSensor, C: Clock> FlightComputer<B, S, P, C> {
    /// Identify and calibrate the sensors. Any failure here means the
    /// control loop must not run.
    pub fn start(config: Config, hardware: Hardware<B, S, P, C>) -> Result<Self, StartupError> {
        let Hardware {
            imu_bus,
            gps_link,
            mut barometer,
            mut clock,
        } = hardware;

        let baseline = baro::calibrate(&mut barometer, &mut clock, &config.baro)?;

        let mut imu = Mpu6500::probe(imu_bus, config.imu.address, &config.imu.accepted_ids)?;
        let calibration = imu::calibrate(&mut imu, &mut clock, &config.imu)?;

        let now = clock.now();
        log::info!("Sensors ready, waiting for GPS fix");

        Ok(Self {
            imu,
            gps_link,
            barometer,
            receiver: GpsReceiver::new(config.gps.utc_offset_hours),
            tracker: PositionTracker::new(&config.gps),
            smoother: PositionSmoother::new(config.gps.filter_depth),
            attitude: AttitudeFilter::new(calibration, &config.imu),
            baro: BarometricEstimator::new(baseline, &config.baro),
            airspeed: AirspeedEstimator::new(&config.airspeed),
            mission_clock: MissionClock::new(),
            classifier: FlightPhaseClassifier::new(config.phase.clone()),
            health: HealthMonitor::new(&config.control, now),
            last_imu_update: now,
            accel_z_mps2: GRAVITY,
            airspeed_kmh: 0.0,
            cycle: 0,
            stats_interval: config.control.stats_interval_cycles,
            clock,
        })
    }

    /// Run one control cycle: attitude, receiver drain, barometer, then one
    /// telemetry snapshot per position fix decoded this cycle.
    pub fn step(&mut self) -> Vec<TelemetrySnapshot> {
        self.update_attitude();

        let fixes = self.drain_receiver();

        let baro = self.baro.update(&mut self.barometer, &mut self.clock);
        let now = self.clock.now();
        match baro.status {
            BaroStatus::Skipped => {}
            BaroStatus::Failed => self.health.baro.record_failure(),
            BaroStatus::Fresh | BaroStatus::Implausible => self.health.baro.update(now),
        }
        self.airspeed_kmh = self
            .airspeed
            .estimate(baro.pressure_hpa, self.baro.baseline_hpa());

        let snapshots = fixes
            .iter()
            .map(|fix| self.process_fix(fix, baro.altitude_m, now))
            .collect();

        self.cycle = self.cycle.wrapping_add(1);
        if self.stats_interval > 0 && self.cycle % self.stats_interval == 0 {
            let stats = self.receiver.stats();
            log::info!(
                "NMEA: {} received, {} valid, {} checksum errors, {} frame errors (RMC {}, GGA {})",
                stats.received,
                stats.valid,
                stats.checksum_errors,
                stats.frame_errors,
                stats.rmc,
                stats.gga
            );
            log::info!(
                "{} | {} low barometer readings held",
                self.health.format_status(now),
                self.baro.held_low_readings()
            );
        }
        self.health.log_transitions(now);

        snapshots
    }

    fn update_attitude(&mut self) {
        let now = self.clock.now();
        match self.imu.read_sample() {
            Ok(sample) => {
                let dt = now.saturating_sub(self.last_imu_update).as_secs_f64();
                let out = self.attitude.update(&sample, dt);
                self.accel_z_mps2 = out.accel_mps2.z;
                self.last_imu_update = now;
                self.health.imu.update(now);
            }
            Err(err) => {
                log::debug!("IMU read failed, attitude held: {}", err);
                self.health.imu.record_failure();
            }
        }
    }

    fn drain_receiver(&mut self) -> Vec<PositionFix> {
        let mut fixes = Vec::new();
        for sentence in self.receiver.poll(&mut self.gps_link) {
            if let Sentence::Gga(gga) = &sentence {
                self.tracker.apply_altitude(gga);
            }
            if let Some(fix) = self.receiver.apply(&sentence) {
                fixes.push(fix);
            }
        }
        fixes
    }

    fn process_fix(&mut self, fix: &PositionFix, altitude_m: f64, now: Duration) -> TelemetrySnapshot {
        self.health.gps.update(now);
        self.mission_clock.initialize(fix.seconds_of_day(), now);
        let elapsed_s = self.mission_clock.elapsed_s(now).unwrap_or(0);

        let local = self.tracker.update(fix);
        let position = self.smoother.apply(local);

        let phase = self.classifier.classify(PhaseInputs {
            altitude_m,
            airspeed_kmh: self.airspeed_kmh,
            elapsed_s,
        });

        let state = self.receiver.fix();
        TelemetrySnapshot {
            elapsed_s,
            position,
            attitude: self.attitude.state(),
            altitude_m,
            airspeed_kmh: self.airspeed_kmh,
            accel_z_mps2: self.accel_z_mps2,
            phase,
            satellites: state.satellites,
            fix_quality: state.fix_quality,
            local_time: fix.local_time,
        }
    }

    pub fn stats(&self) -> ParserStats {
        self.receiver.stats()
    }

    pub fn phase(&self) -> FlightPhase {
        self.classifier.phase()
    }

    pub fn attitude(&self) -> AttitudeState {
        self.attitude.state()
    }

    pub fn altitude_m(&self) -> f64 {
        self.baro.altitude_m()
    }

    pub fn health_report(&self) -> HealthReport {
        self.health.check_health(self.clock.now(), self.receiver.stats())
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn imu_bus_mut(&mut self) -> &mut B {
        self.imu.bus_mut()
    }

    pub fn gps_link_mut(&mut self) -> &mut S {
        &mut self.gps_link
    }

    pub fn barometer_mut(&mut self) -> &mut P {
        &mut self.barometer
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BaroConfig, ImuConfig};
    use crate::nmea::frame;
    use crate::sensors::{ManualClock, ScriptedBytes, SimulatedBarometer, SimulatedImuBus};
    use crate::types::LocalPosition;
    use approx::assert_abs_diff_eq;

    type SimComputer =
        FlightComputer<SimulatedImuBus, ScriptedBytes, SimulatedBarometer, ManualClock>;

    fn config() -> Config {
        Config {
            imu: ImuConfig {
                calibration_samples: 10,
                ..ImuConfig::default()
            },
            baro: BaroConfig {
                calibration_samples: 5,
                read_every_cycles: 1,
                ..BaroConfig::default()
            },
            ..Config::default()
        }
    }

    fn hardware() -> Hardware<SimulatedImuBus, ScriptedBytes, SimulatedBarometer, ManualClock> {
        let mut barometer = SimulatedBarometer::new(Duration::from_millis(8));
        barometer.set_pressure(1013.25);
        Hardware {
            imu_bus: SimulatedImuBus::level(0x68, 0x70, 8192),
            gps_link: ScriptedBytes::new(),
            barometer,
            clock: ManualClock::new(),
        }
    }

    fn started() -> SimComputer {
        FlightComputer::start(config(), hardware()).unwrap()
    }

    #[test]
    fn test_start_rejects_unknown_imu() {
        let mut hw = hardware();
        hw.imu_bus.identity = 0x11;
        let err = FlightComputer::start(config(), hw).err();
        assert_eq!(err, Some(StartupError::UnknownImu { id: 0x11 }));
    }

    #[test]
    fn test_start_requires_barometer_calibration() {
        let mut hw = hardware();
        hw.barometer.clear_pressure();
        let err = FlightComputer::start(config(), hw).err();
        assert_eq!(err, Some(StartupError::NoBaroCalibration { attempts: 5 }));
    }

    #[test]
    fn test_no_fix_no_telemetry() {
        let mut fc = started();
        for _ in 0..10 {
            fc.clock_mut().advance(Duration::from_millis(20));
            assert!(fc.step().is_empty());
        }
        assert_eq!(fc.cycles(), 10);
    }

    #[test]
    fn test_first_fix_yields_origin_record() {
        let mut fc = started();
        fc.gps_link_mut()
            .push_line(&frame("GPRMC,130000,A,2330.000,S,04630.000,W,0.0,,,,"));
        let snaps = fc.step();
        assert_eq!(snaps.len(), 1);
        let snap = &snaps[0];
        assert_eq!(snap.position, LocalPosition::ORIGIN);
        // 13:00:00 UTC is 10:00:00 local
        assert_eq!(snap.elapsed_s, 36_000);
        assert_eq!(snap.phase, FlightPhase::Landed);
        assert_abs_diff_eq!(snap.accel_z_mps2, 9.81, epsilon = 1e-9);
    }

    #[test]
    fn test_one_record_per_fix() {
        let mut fc = started();
        let rmc = frame("GPRMC,130000,A,2330.000,S,04630.000,W,0.0,,,,");
        fc.gps_link_mut().push_line(&rmc);
        fc.gps_link_mut().push_line(&rmc);
        assert_eq!(fc.step().len(), 2);
        assert_eq!(fc.stats().rmc, 2);
    }

    #[test]
    fn test_corrupted_sentence_changes_nothing() {
        let mut fc = started();
        let elsewhere = frame("GPRMC,130000,A,2331.000,S,04630.000,W,10.0,,,,");
        let bad = format!("{}00", &elsewhere[..elsewhere.len() - 2]);
        fc.gps_link_mut().push_line(&bad);
        assert!(fc.step().is_empty());
        assert_eq!(fc.stats().checksum_errors, 1);
        assert_eq!(fc.phase(), FlightPhase::Attached);

        // The origin comes from the first good fix, not the rejected line
        fc.gps_link_mut()
            .push_line(&frame("GPRMC,130001,A,2330.000,S,04630.000,W,10.0,,,,"));
        let snaps = fc.step();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].position, LocalPosition::ORIGIN);
        assert_eq!(snaps[0].elapsed_s, 36_001);
    }

    #[test]
    fn test_stationary_jitter_keeps_smoothed_position() {
        let mut fc = started();
        fc.gps_link_mut()
            .push_line(&frame("GPRMC,130000,A,2330.000,S,04630.000,W,0.0,,,,"));
        fc.step();

        // About 0.37 m north and south with no ground speed
        for lat in ["2330.0002", "2329.9998", "2330.0002", "2329.9998", "2330.0002"] {
            fc.clock_mut().advance(Duration::from_millis(20));
            let sentence = format!("GPRMC,130001,A,{},S,04630.000,W,0.0,,,,", lat);
            fc.gps_link_mut().push_line(&frame(&sentence));
            let snaps = fc.step();
            assert_eq!(snaps.len(), 1);
            assert_eq!(snaps[0].position, LocalPosition::ORIGIN);
        }

        // The same offset with ground speed passes the gate
        fc.gps_link_mut()
            .push_line(&frame("GPRMC,130002,A,2330.0002,S,04630.000,W,10.0,,,,"));
        let snaps = fc.step();
        assert!(snaps[0].position.y < 0.0);
    }

    #[test]
    fn test_gga_altitude_feeds_position_z() {
        let mut fc = started();
        fc.gps_link_mut()
            .push_line(&frame("GPGGA,130000,2330.000,S,04630.000,W,1,08,0.9,760.0,M,,M,,"));
        fc.gps_link_mut()
            .push_line(&frame("GPRMC,130000,A,2330.000,S,04630.000,W,0.0,,,,"));
        let snaps = fc.step();
        assert_eq!(snaps.len(), 1);
        assert_abs_diff_eq!(snaps[0].position.z, 760.0, epsilon = 1e-9);
        assert_eq!(snaps[0].satellites, 8);
        assert_eq!(snaps[0].fix_quality, 1);
    }

    #[test]
    fn test_mission_clock_survives_receiver_time_jump() {
        let mut fc = started();
        fc.gps_link_mut()
            .push_line(&frame("GPRMC,130000,A,2330.000,S,04630.000,W,0.0,,,,"));
        fc.step();
        fc.clock_mut().advance(Duration::from_millis(5_400));
        fc.gps_link_mut()
            .push_line(&frame("GPRMC,235959,A,2330.000,S,04630.000,W,0.0,,,,"));
        let snaps = fc.step();
        assert_eq!(snaps[0].elapsed_s, 36_005);
    }

    #[test]
    fn test_airspeed_from_pressure_rise() {
        let mut fc = started();
        fc.barometer_mut().set_pressure(1013.27);
        fc.gps_link_mut()
            .push_line(&frame("GPRMC,130000,A,2330.000,S,04630.000,W,0.0,,,,"));
        let snaps = fc.step();
        let expected = (2.0 * 2.0 / 1.225_f64).sqrt() * 3.6;
        assert_abs_diff_eq!(snaps[0].airspeed_kmh, expected, epsilon = 1e-3);
    }

    #[test]
    fn test_grounded_barometer_stays_healthy() {
        let mut fc = FlightComputer::start(Config::default(), hardware()).unwrap();
        for _ in 0..500 {
            fc.clock_mut().advance(Duration::from_millis(20));
            fc.step();
        }
        assert_eq!(fc.altitude_m(), 0.0);
        let baro = fc.health_report().baro;
        assert!(baro.healthy);
        assert_eq!(baro.consecutive_failures, 0);
        assert_eq!(baro.total_failures, 0);
    }

    #[test]
    fn test_failed_barometer_reads_count_against_health() {
        let mut fc = started();
        fc.barometer_mut().clear_pressure();
        for _ in 0..3 {
            fc.clock_mut().advance(Duration::from_millis(20));
            fc.step();
        }
        assert_eq!(fc.health_report().baro.consecutive_failures, 3);
    }

    #[test]
    fn test_health_report_carries_parser_counters() {
        let mut fc = started();
        fc.gps_link_mut()
            .push_line(&frame("GPRMC,130000,A,2330.000,S,04630.000,W,0.0,,,,"));
        fc.step();
        assert_eq!(fc.health_report().parser, fc.stats());
        assert_eq!(fc.health_report().parser.rmc, 1);
    }

    #[test]
    fn test_imu_failure_holds_attitude() {
        let mut fc = started();
        fc.imu_bus_mut().sample.accel = [0, 8192, 8192];
        fc.clock_mut().advance(Duration::from_millis(20));
        fc.step();
        let before = fc.attitude();
        assert!(before.phi > 0.0);

        fc.imu_bus_mut().fail_reads = 1;
        fc.clock_mut().advance(Duration::from_millis(20));
        fc.step();
        assert_eq!(fc.attitude(), before);
        assert_eq!(fc.health_report().imu.consecutive_failures, 1);
    }
}
