//! Simulated collaborators: scripted serial bytes, a manual clock, an
//! inertial sensor behind a fake bus, a forced-mode barometer, and a glide
//! profile that drives them all for the simulator binary.

use std::collections::VecDeque;
use std::io::Read;
use std::time::Duration;

use chrono::{NaiveTime, Timelike};

use crate::error::SensorError;
use crate::hal::{Bus, ByteSource, Clock, PressureSensor};
use crate::imu::{REG_ACCEL_XOUT_H, REG_GYRO_XOUT_H, REG_WHO_AM_I};
use crate::nmea;
use crate::types::{GeoPoint, RawImuSample};

/// Serial receive buffer fed by hand.
#[derive(Debug, Default)]
pub struct ScriptedBytes {
    pending: VecDeque<u8>,
}

impl ScriptedBytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes.iter().copied());
    }

    /// Queue a line followed by CR LF
    pub fn push_line(&mut self, line: &str) {
        self.push_bytes(line.as_bytes());
        self.push_bytes(b"\r\n");
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl ByteSource for ScriptedBytes {
    fn try_read_byte(&mut self) -> Option<u8> {
        self.pending.pop_front()
    }
}

/// Replays a capture file at roughly the receiver's line rate.
pub struct CaptureFeed<R: Read> {
    reader: R,
    bytes_per_cycle: usize,
    done: bool,
}

impl<R: Read> CaptureFeed<R> {
    pub fn new(reader: R, bytes_per_cycle: usize) -> Self {
        Self {
            reader,
            bytes_per_cycle: bytes_per_cycle.max(1),
            done: false,
        }
    }

    /// Bytes per control cycle for a UART at `baud` (8N1: 10 bits per byte)
    pub fn bytes_per_cycle_for(baud: u32, cycle: Duration) -> usize {
        let bytes_per_sec = f64::from(baud) / 10.0;
        (bytes_per_sec * cycle.as_secs_f64()).ceil() as usize
    }

    /// Move the next slice of the capture into `target`.
    /// Returns `Ok(false)` once the capture is exhausted.
    pub fn feed_into(&mut self, target: &mut ScriptedBytes) -> std::io::Result<bool> {
        if self.done {
            return Ok(false);
        }
        let mut chunk = vec![0u8; self.bytes_per_cycle];
        let n = self.reader.read(&mut chunk)?;
        if n == 0 {
            self.done = true;
            return Ok(false);
        }
        target.push_bytes(&chunk[..n]);
        Ok(true)
    }
}

/// Clock that only moves when told to (or when something delays on it).
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn delay(&mut self, duration: Duration) {
        self.now += duration;
    }
}

/// Register-level stand-in for the inertial sensor.
#[derive(Debug, Clone)]
pub struct SimulatedImuBus {
    pub address: u8,
    pub identity: u8,
    pub sample: RawImuSample,
    /// The next N reads fail
    pub fail_reads: u32,
}

impl SimulatedImuBus {
    pub fn new(address: u8, identity: u8) -> Self {
        Self {
            address,
            identity,
            sample: RawImuSample::default(),
            fail_reads: 0,
        }
    }

    /// Level and at rest: +1 g on Z at the given sensitivity
    pub fn level(address: u8, identity: u8, counts_per_g: i16) -> Self {
        let mut bus = Self::new(address, identity);
        bus.sample.accel = [0, 0, counts_per_g];
        bus
    }

    pub fn set_sample(&mut self, sample: RawImuSample) {
        self.sample = sample;
    }
}

fn write_be_triplet(values: [i16; 3], buf: &mut [u8]) {
    for (i, value) in values.iter().enumerate() {
        let bytes = value.to_be_bytes();
        if let Some(slot) = buf.get_mut(i * 2..i * 2 + 2) {
            slot.copy_from_slice(&bytes);
        }
    }
}

impl Bus for SimulatedImuBus {
    fn write(&mut self, address: u8, _bytes: &[u8]) -> Result<(), SensorError> {
        if address != self.address {
            return Err(SensorError::Bus { address });
        }
        Ok(())
    }

    fn read(&mut self, address: u8, reg: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        if address != self.address {
            return Err(SensorError::Bus { address });
        }
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(SensorError::Bus { address });
        }
        buf.fill(0);
        match reg {
            REG_WHO_AM_I => {
                if let Some(first) = buf.first_mut() {
                    *first = self.identity;
                }
            }
            REG_ACCEL_XOUT_H => write_be_triplet(self.sample.accel, buf),
            REG_GYRO_XOUT_H => write_be_triplet(self.sample.gyro, buf),
            _ => {}
        }
        Ok(())
    }
}

/// Forced-mode barometer with scripted results.
#[derive(Debug)]
pub struct SimulatedBarometer {
    measurement: Duration,
    triggered: bool,
    script: VecDeque<Result<f64, SensorError>>,
    steady: Option<f64>,
    pub triggers: u32,
}

impl SimulatedBarometer {
    pub fn new(measurement: Duration) -> Self {
        Self {
            measurement,
            triggered: false,
            script: VecDeque::new(),
            steady: None,
            triggers: 0,
        }
    }

    /// Answer every read with this pressure once the script runs out
    pub fn set_pressure(&mut self, hpa: f64) {
        self.steady = Some(hpa);
    }

    /// Reads fail once the script runs out
    pub fn clear_pressure(&mut self) {
        self.steady = None;
    }

    pub fn queue(&mut self, result: Result<f64, SensorError>) {
        self.script.push_back(result);
    }
}

impl PressureSensor for SimulatedBarometer {
    fn measurement_duration(&self) -> Duration {
        self.measurement
    }

    fn trigger(&mut self) -> Result<(), SensorError> {
        self.triggered = true;
        self.triggers += 1;
        Ok(())
    }

    fn read_pressure_hpa(&mut self) -> Result<f64, SensorError> {
        if !std::mem::replace(&mut self.triggered, false) {
            return Err(SensorError::NotReady);
        }
        match self.script.pop_front() {
            Some(result) => result,
            None => self.steady.ok_or(SensorError::NotReady),
        }
    }
}

/// Scripted flight: ground wait, tow climb, release, glide, landing.
#[derive(Debug, Clone)]
pub struct GlideProfile {
    pub origin: GeoPoint,
    pub ground_pressure_hpa: f64,
    pub utc_start: NaiveTime,
    pub climb_start_s: f64,
    pub release_s: f64,
    pub climb_rate_mps: f64,
    pub sink_rate_mps: f64,
    pub tow_speed_kmh: f64,
    pub glide_speed_kmh: f64,
    pub heading_deg: f64,
    pub glide_pitch_deg: f64,
    pub counts_per_g: f64,
}

impl Default for GlideProfile {
    fn default() -> Self {
        Self {
            origin: GeoPoint {
                latitude: -23.5505,
                longitude: -46.6333,
            },
            ground_pressure_hpa: 1013.25,
            utc_start: NaiveTime::from_hms_opt(13, 0, 0).unwrap_or_default(),
            climb_start_s: 20.0,
            release_s: 80.0,
            climb_rate_mps: 2.0,
            sink_rate_mps: 1.5,
            tow_speed_kmh: 25.0,
            glide_speed_kmh: 35.0,
            heading_deg: 45.0,
            glide_pitch_deg: -4.0,
            counts_per_g: 8192.0,
        }
    }
}

impl GlideProfile {
    fn peak_altitude(&self) -> f64 {
        (self.release_s - self.climb_start_s).max(0.0) * self.climb_rate_mps
    }

    /// Touchdown time (s)
    pub fn landing_s(&self) -> f64 {
        self.release_s + self.peak_altitude() / self.sink_rate_mps
    }

    pub fn altitude_at(&self, t: f64) -> f64 {
        if t < self.climb_start_s {
            0.0
        } else if t < self.release_s {
            (t - self.climb_start_s) * self.climb_rate_mps
        } else {
            (self.peak_altitude() - (t - self.release_s) * self.sink_rate_mps).max(0.0)
        }
    }

    pub fn ground_speed_at(&self, t: f64) -> f64 {
        if t < self.climb_start_s || t >= self.landing_s() {
            0.0
        } else if t < self.release_s {
            self.tow_speed_kmh
        } else {
            self.glide_speed_kmh
        }
    }

    /// Horizontal distance flown by `t` (m)
    fn distance_at(&self, t: f64) -> f64 {
        let tow = (t.min(self.release_s) - self.climb_start_s).max(0.0);
        let glide = (t.min(self.landing_s()) - self.release_s).max(0.0);
        (tow * self.tow_speed_kmh + glide * self.glide_speed_kmh) / 3.6
    }

    pub fn position_at(&self, t: f64) -> GeoPoint {
        const R: f64 = 6_371_000.0;
        let d = self.distance_at(t);
        let heading = self.heading_deg.to_radians();
        let north = d * heading.cos();
        let east = d * heading.sin();
        GeoPoint {
            latitude: self.origin.latitude + (north / R).to_degrees(),
            longitude: self.origin.longitude
                + (east / (R * self.origin.latitude.to_radians().cos())).to_degrees(),
        }
    }

    /// Static pressure at the profile altitude (inverse barometric formula)
    pub fn pressure_at(&self, t: f64) -> f64 {
        let h = self.altitude_at(t);
        self.ground_pressure_hpa * (1.0 - h / 44330.0).powf(5.255)
    }

    /// What a port facing the airflow reads: static plus ram pressure (hPa)
    pub fn sensed_pressure_at(&self, t: f64) -> f64 {
        const AIR_DENSITY: f64 = 1.225;
        let v = self.ground_speed_at(t) / 3.6;
        self.pressure_at(t) + 0.5 * AIR_DENSITY * v * v / 100.0
    }

    pub fn imu_at(&self, t: f64) -> RawImuSample {
        let pitch = if t >= self.release_s && t < self.landing_s() {
            self.glide_pitch_deg.to_radians()
        } else {
            0.0
        };
        let g = self.counts_per_g;
        RawImuSample {
            accel: [(pitch.sin() * g) as i16, 0, (pitch.cos() * g) as i16],
            gyro: [0, 0, 0],
        }
    }

    /// RMC and GGA sentences the receiver would emit at `t`
    pub fn sentences_at(&self, t: f64) -> [String; 2] {
        let (utc, _) = self
            .utc_start
            .overflowing_add_signed(chrono::Duration::milliseconds((t * 1000.0) as i64));
        let time = format!("{:02}{:02}{:02}.00", utc.hour(), utc.minute(), utc.second());
        let point = self.position_at(t);
        let (lat, ns) = format_coordinate(point.latitude, 'N', 'S', 2);
        let (lon, ew) = format_coordinate(point.longitude, 'E', 'W', 3);
        let knots = self.ground_speed_at(t) / nmea::KNOTS_TO_KMH;
        let altitude = self.altitude_at(t) + 760.0;

        let rmc = nmea::frame(&format!(
            "GPRMC,{},A,{},{},{},{},{:.2},{:.1},010125,,",
            time, lat, ns, lon, ew, knots, self.heading_deg
        ));
        let gga = nmea::frame(&format!(
            "GPGGA,{},{},{},{},{},1,08,0.9,{:.1},M,-5.0,M,,",
            time, lat, ns, lon, ew, altitude
        ));
        [rmc, gga]
    }
}

/// Signed decimal degrees to NMEA `d(dd)mm.mmmm` plus hemisphere letter
pub fn format_coordinate(decimal: f64, positive: char, negative: char, width: usize) -> (String, char) {
    let hemisphere = if decimal < 0.0 { negative } else { positive };
    let abs = decimal.abs();
    let degrees = abs.trunc();
    let minutes = (abs - degrees) * 60.0;
    (
        format!("{:0width$}{:07.4}", degrees as u32, minutes, width = width),
        hemisphere,
    )
}
