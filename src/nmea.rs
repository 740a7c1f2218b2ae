//! NMEA 0183 sentence decoding.
//!
//! Decoding is pure: a line goes in, a typed sentence (or a rejection
//! reason) comes out. Applying the result to receiver state happens in
//! [`crate::gps`]. Byte framing lives in [`LineAssembler`].

use chrono::NaiveTime;

use crate::error::DecodeError;
use crate::types::GeoPoint;

pub const START_MARKER: u8 = b'$';
pub const CHECKSUM_DELIMITER: u8 = b'*';
pub const FIELD_DELIMITER: char = ',';

/// Longest candidate line kept by the assembler and accepted by the decoder
pub const MAX_SENTENCE_LEN: usize = 255;
/// Shortest line worth decoding
pub const MIN_SENTENCE_LEN: usize = 5;
/// Candidates this short or shorter are dropped by the assembler without counting
pub const MIN_FRAME_LEN: usize = 6;

pub const KNOTS_TO_KMH: f64 = 1.852;
/// Ground speeds under this (km/h) are receiver noise and read as zero
pub const SPEED_NOISE_FLOOR_KMH: f64 = 0.5;

/// Sentence families this decoder understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentenceKind {
    /// Recommended minimum: time, validity, position, ground speed
    Rmc,
    /// Fix data: quality, satellites, altitude
    Gga,
}

impl SentenceKind {
    /// `GP` (GPS only) and `GN` (multi-constellation) talkers are equivalent.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "GPRMC" | "GNRMC" => Some(SentenceKind::Rmc),
            "GPGGA" | "GNGGA" => Some(SentenceKind::Gga),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RmcRecord {
    /// UTC time of day; parsed whether or not the fix is active
    pub time: Option<NaiveTime>,
    /// Status field was `A`
    pub active: bool,
    /// Only decoded for active fixes
    pub position: Option<GeoPoint>,
    /// Only decoded for active fixes; floored to zero below the noise floor
    pub speed_kmh: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GgaRecord {
    pub time: Option<NaiveTime>,
    pub position: Option<GeoPoint>,
    pub fix_quality: Option<u8>,
    pub satellites: Option<u8>,
    /// Raw altitude field, accepted or not
    pub altitude_m: Option<f64>,
}

impl GgaRecord {
    /// Altitude usable as a new value: needs a non-zero fix quality and a
    /// strictly positive reading. `None` means "keep the previous one".
    pub fn accepted_altitude(&self) -> Option<f64> {
        if self.fix_quality.unwrap_or(0) == 0 {
            return None;
        }
        self.altitude_m.filter(|alt| *alt > 0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Sentence {
    Rmc(RmcRecord),
    Gga(GgaRecord),
}

/// Outcome of decoding a checksum-valid line.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Accepted(Sentence),
    /// Valid sentence of a type we do not use
    Ignored,
}

/// Decode one line (`$...*hh`, optional trailing CR/LF).
///
/// Fields that are missing or empty stay `None`; a partial record is still
/// a successful decode.
pub fn decode(line: &str) -> Result<Decoded, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.len() > MAX_SENTENCE_LEN {
        return Err(DecodeError::TooLong {
            len: line.len(),
            max: MAX_SENTENCE_LEN,
        });
    }

    let payload = verified_payload(line)?;
    let fields: Vec<&str> = payload.split(FIELD_DELIMITER).collect();

    let sentence = match SentenceKind::from_id(fields[0]) {
        Some(SentenceKind::Rmc) => Sentence::Rmc(decode_rmc(&fields)),
        Some(SentenceKind::Gga) => Sentence::Gga(decode_gga(&fields)),
        None => return Ok(Decoded::Ignored),
    };
    Ok(Decoded::Accepted(sentence))
}

/// XOR of every payload byte (between `$` and `*`)
pub fn checksum(payload: &str) -> u8 {
    payload.bytes().fold(0, |acc, b| acc ^ b)
}

/// Wrap a payload as `$payload*HH`
pub fn frame(payload: &str) -> String {
    format!("${}*{:02X}", payload, checksum(payload))
}

/// Validate framing and checksum, returning the payload between the markers.
fn verified_payload(line: &str) -> Result<&str, DecodeError> {
    let bytes = line.as_bytes();
    if bytes.len() < MIN_SENTENCE_LEN {
        return Err(DecodeError::TooShort(bytes.len()));
    }
    if bytes[0] != START_MARKER {
        return Err(DecodeError::MissingStartMarker);
    }

    // The delimiter must leave room for two hex digits after it
    let search_end = bytes.len() - 2;
    let star = bytes[..search_end]
        .iter()
        .rposition(|&b| b == CHECKSUM_DELIMITER)
        .filter(|&pos| pos >= 1)
        .ok_or(DecodeError::MissingChecksum)?;

    let hex = line
        .get(star + 1..star + 3)
        .ok_or(DecodeError::MissingChecksum)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidChecksumField(hex.to_string()));
    }
    let expected = u8::from_str_radix(hex, 16)
        .map_err(|_| DecodeError::InvalidChecksumField(hex.to_string()))?;

    let payload = &line[1..star];
    let computed = checksum(payload);
    if computed != expected {
        return Err(DecodeError::BadChecksum { expected, computed });
    }
    Ok(payload)
}

fn field<'a>(fields: &[&'a str], index: usize) -> Option<&'a str> {
    fields
        .get(index)
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
}

fn decode_rmc(fields: &[&str]) -> RmcRecord {
    // RMC,time,status,lat,N/S,lon,E/W,speed(knots),course,date,...
    let time = field(fields, 1).and_then(parse_time);
    let active = field(fields, 2) == Some("A");

    let (position, speed_kmh) = if active {
        let position = parse_position(fields, 3);
        let speed_kmh = field(fields, 7)
            .and_then(|s| s.parse::<f64>().ok())
            .map(knots_to_kmh);
        (position, speed_kmh)
    } else {
        (None, None)
    };

    RmcRecord {
        time,
        active,
        position,
        speed_kmh,
    }
}

fn decode_gga(fields: &[&str]) -> GgaRecord {
    // GGA,time,lat,N/S,lon,E/W,quality,sats,hdop,alt,M,geoid,M,...
    GgaRecord {
        time: field(fields, 1).and_then(parse_time),
        position: parse_position(fields, 2),
        fix_quality: field(fields, 6).and_then(|s| s.parse().ok()),
        satellites: field(fields, 7).and_then(|s| s.parse().ok()),
        altitude_m: field(fields, 9).and_then(|s| s.parse().ok()),
    }
}

/// Latitude/longitude pair starting at `index` (value, hemisphere, value, hemisphere)
fn parse_position(fields: &[&str], index: usize) -> Option<GeoPoint> {
    let latitude = parse_coordinate(field(fields, index)?, field(fields, index + 1))?;
    let longitude = parse_coordinate(field(fields, index + 2)?, field(fields, index + 3))?;
    Some(GeoPoint {
        latitude,
        longitude,
    })
}

/// `dddmm.mmmm` plus hemisphere to signed decimal degrees
pub fn parse_coordinate(value: &str, hemisphere: Option<&str>) -> Option<f64> {
    let raw: f64 = value.parse().ok()?;
    if !raw.is_finite() {
        return None;
    }
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        Some("S") | Some("W") => Some(-decimal),
        _ => Some(decimal),
    }
}

/// `hhmmss[.sss]` to a time of day; fractional seconds are dropped
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let digits = value.get(..6)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: u32 = digits[0..2].parse().ok()?;
    let minutes: u32 = digits[2..4].parse().ok()?;
    let seconds: u32 = digits[4..6].parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, seconds)
}

fn knots_to_kmh(knots: f64) -> f64 {
    let kmh = knots * KNOTS_TO_KMH;
    if kmh < SPEED_NOISE_FLOOR_KMH {
        0.0
    } else {
        kmh
    }
}

/// A completed candidate from the byte stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// Candidate outgrew [`MAX_SENTENCE_LEN`] and was dropped
    Overflow(usize),
}

/// Splits the receiver's byte stream into candidate lines.
///
/// `$` opens a candidate (flushing any unterminated one first), CR or LF
/// closes it. Bytes outside a candidate are skipped.
pub struct LineAssembler {
    buf: Vec<u8>,
    overflowed: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_SENTENCE_LEN),
            overflowed: false,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match byte {
            START_MARKER => {
                let flushed = self.finish();
                self.buf.push(START_MARKER);
                flushed
            }
            b'\r' | b'\n' => self.finish(),
            _ => {
                if self.buf.is_empty() {
                    return None;
                }
                if self.buf.len() >= MAX_SENTENCE_LEN {
                    self.overflowed = true;
                } else {
                    self.buf.push(byte);
                }
                None
            }
        }
    }

    /// Bytes buffered for the open candidate
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn finish(&mut self) -> Option<Frame> {
        if self.buf.is_empty() {
            return None;
        }
        let overflowed = std::mem::replace(&mut self.overflowed, false);
        let len = self.buf.len();
        if overflowed {
            self.buf.clear();
            return Some(Frame::Overflow(len));
        }
        if len <= MIN_FRAME_LEN {
            self.buf.clear();
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(Frame::Line(line))
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}
