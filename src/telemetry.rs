//! The two line records the flight computer emits every fix, and their
//! decoding on the ground side.
//!
//! Overlay: `HUD|HH:MM:SS|ALT|CAS|GZ|PHASE`
//! Raw log: `DATA,elapsed_s,X,Y,Z,theta,phi`

use std::io::{self, Write};

use chrono::NaiveTime;
use serde::Serialize;

use crate::error::RecordError;
use crate::filters::AttitudeState;
use crate::physics::load_factor;
use crate::types::{FlightPhase, LocalPosition};

const HUD_PREFIX: &str = "HUD";
const DATA_PREFIX: &str = "DATA";
const HUD_FIELDS: usize = 6;
const DATA_FIELDS: usize = 7;
const UNKNOWN_PHASE: &str = "UNK";

/// Everything one telemetry line pair needs, captured at the end of a cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Mission elapsed time (s)
    pub elapsed_s: u32,
    /// Smoothed local position (m)
    pub position: LocalPosition,
    pub attitude: AttitudeState,
    /// Barometric altitude (m)
    pub altitude_m: f64,
    /// Calibrated airspeed (km/h)
    pub airspeed_kmh: f64,
    /// Body Z acceleration (m/s²)
    pub accel_z_mps2: f64,
    pub phase: FlightPhase,
    pub satellites: u8,
    pub fix_quality: u8,
    /// Receiver local time of day
    pub local_time: Option<NaiveTime>,
}

/// `HH:MM:SS` for a seconds count, wrapped to 24 h
pub fn clock_text(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        (seconds / 3600) % 24,
        (seconds / 60) % 60,
        seconds % 60
    )
}

pub fn format_hud(snapshot: &TelemetrySnapshot) -> String {
    format!(
        "{}|{}|{:.1}|{:.1}|{:.2}|{}",
        HUD_PREFIX,
        clock_text(snapshot.elapsed_s),
        snapshot.altitude_m,
        snapshot.airspeed_kmh,
        load_factor(snapshot.accel_z_mps2),
        snapshot.phase.code()
    )
}

pub fn format_data(snapshot: &TelemetrySnapshot) -> String {
    let p = snapshot.position;
    format!(
        "{},{},{:.2},{:.2},{:.2},{:.2},{:.2}",
        DATA_PREFIX,
        snapshot.elapsed_s,
        p.x,
        p.y,
        p.z,
        snapshot.attitude.theta,
        snapshot.attitude.phi
    )
}

/// Emit the overlay line then the raw log line, newline-terminated.
pub fn write_to<W: Write>(out: &mut W, snapshot: &TelemetrySnapshot) -> io::Result<()> {
    writeln!(out, "{}", format_hud(snapshot))?;
    writeln!(out, "{}", format_data(snapshot))?;
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HudRecord {
    pub time: NaiveTime,
    pub altitude_m: f64,
    pub airspeed_kmh: f64,
    pub load_factor: f64,
    /// `None` for `UNK` or any code this build does not know
    pub phase: Option<FlightPhase>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataRecord {
    pub elapsed_s: u32,
    pub position: LocalPosition,
    pub theta: f64,
    pub phi: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Hud(HudRecord),
    Data(DataRecord),
}

fn number(field: &'static str, value: &str) -> Result<f64, RecordError> {
    value.trim().parse().map_err(|_| RecordError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// Decode one received telemetry line.
pub fn parse_record(line: &str) -> Result<Record, RecordError> {
    let line = line.trim();
    if line.starts_with(HUD_PREFIX) {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != HUD_FIELDS || parts[0] != HUD_PREFIX {
            return Err(RecordError::FieldCount {
                kind: HUD_PREFIX,
                found: parts.len(),
                expected: HUD_FIELDS,
            });
        }
        let time = NaiveTime::parse_from_str(parts[1], "%H:%M:%S").map_err(|_| {
            RecordError::InvalidField {
                field: "time",
                value: parts[1].to_string(),
            }
        })?;
        let phase = match parts[5] {
            UNKNOWN_PHASE => None,
            code => FlightPhase::from_code(code),
        };
        Ok(Record::Hud(HudRecord {
            time,
            altitude_m: number("altitude", parts[2])?,
            airspeed_kmh: number("airspeed", parts[3])?,
            load_factor: number("load factor", parts[4])?,
            phase,
        }))
    } else if line.starts_with(DATA_PREFIX) {
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != DATA_FIELDS || parts[0] != DATA_PREFIX {
            return Err(RecordError::FieldCount {
                kind: DATA_PREFIX,
                found: parts.len(),
                expected: DATA_FIELDS,
            });
        }
        let elapsed_s = parts[1].parse().map_err(|_| RecordError::InvalidField {
            field: "elapsed",
            value: parts[1].to_string(),
        })?;
        Ok(Record::Data(DataRecord {
            elapsed_s,
            position: LocalPosition::new(
                number("x", parts[2])?,
                number("y", parts[3])?,
                number("z", parts[4])?,
            ),
            theta: number("theta", parts[5])?,
            phi: number("phi", parts[6])?,
        }))
    } else {
        Err(RecordError::UnknownPrefix(line.to_string()))
    }
}
