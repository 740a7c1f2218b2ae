//! Satellite receiver: drains the serial link, decodes sentences, keeps
//! the latest fix state and the diagnostic counters.

use chrono::{Duration as ChronoDuration, NaiveTime, Timelike};
use serde::Serialize;

use crate::error::DecodeError;
use crate::hal::ByteSource;
use crate::nmea::{self, Decoded, Frame, LineAssembler, RmcRecord, Sentence};
use crate::types::GeoPoint;

/// Diagnostic counters. Wrap on overflow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParserStats {
    /// Candidate lines handed to the decoder
    pub received: u32,
    /// Lines that passed framing and checksum
    pub valid: u32,
    pub checksum_errors: u32,
    /// Overlong candidates and lines with broken framing
    pub frame_errors: u32,
    pub rmc: u32,
    pub gga: u32,
    pub ignored: u32,
}

/// An active position fix, ready for the tracker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Ground speed (km/h); zero when the sentence carried none
    pub speed_kmh: f64,
    /// Local time of day of the most recent time field
    pub local_time: Option<NaiveTime>,
}

impl PositionFix {
    pub fn seconds_of_day(&self) -> u32 {
        self.local_time
            .map(|t| t.num_seconds_from_midnight())
            .unwrap_or(0)
    }
}

/// What the receiver currently believes about the fix.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FixState {
    /// Local time of day (UTC shifted by the configured offset)
    pub local_time: Option<NaiveTime>,
    pub valid_fix: bool,
    pub speed_kmh: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub satellites: u8,
    pub fix_quality: u8,
}

pub struct GpsReceiver {
    assembler: LineAssembler,
    stats: ParserStats,
    fix: FixState,
    utc_offset: ChronoDuration,
}

impl GpsReceiver {
    pub fn new(utc_offset_hours: i32) -> Self {
        Self {
            assembler: LineAssembler::new(),
            stats: ParserStats::default(),
            fix: FixState::default(),
            utc_offset: ChronoDuration::hours(i64::from(utc_offset_hours)),
        }
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    pub fn fix(&self) -> &FixState {
        &self.fix
    }

    /// Drain every pending byte and return the sentences accepted on the way.
    /// Returns immediately when the source has nothing buffered.
    pub fn poll<S: ByteSource>(&mut self, source: &mut S) -> Vec<Sentence> {
        let mut sentences = Vec::new();
        while let Some(byte) = source.try_read_byte() {
            match self.assembler.push(byte) {
                Some(Frame::Line(line)) => {
                    if let Some(sentence) = self.handle_line(&line) {
                        sentences.push(sentence);
                    }
                }
                Some(Frame::Overflow(len)) => {
                    self.stats.frame_errors = self.stats.frame_errors.wrapping_add(1);
                    log::debug!("Dropped overlong NMEA candidate ({} bytes)", len);
                }
                None => {}
            }
        }
        sentences
    }

    /// Decode a single line and update the counters. Rejected lines change
    /// nothing else.
    pub fn handle_line(&mut self, line: &str) -> Option<Sentence> {
        self.stats.received = self.stats.received.wrapping_add(1);
        match nmea::decode(line) {
            Ok(Decoded::Accepted(sentence)) => {
                self.stats.valid = self.stats.valid.wrapping_add(1);
                match sentence {
                    Sentence::Rmc(_) => self.stats.rmc = self.stats.rmc.wrapping_add(1),
                    Sentence::Gga(_) => self.stats.gga = self.stats.gga.wrapping_add(1),
                }
                Some(sentence)
            }
            Ok(Decoded::Ignored) => {
                self.stats.valid = self.stats.valid.wrapping_add(1);
                self.stats.ignored = self.stats.ignored.wrapping_add(1);
                None
            }
            Err(DecodeError::BadChecksum { expected, computed }) => {
                self.stats.checksum_errors = self.stats.checksum_errors.wrapping_add(1);
                log::debug!(
                    "NMEA checksum mismatch ({:02X} != {:02X}): {}",
                    expected,
                    computed,
                    line
                );
                None
            }
            Err(err) => {
                self.stats.frame_errors = self.stats.frame_errors.wrapping_add(1);
                log::debug!("NMEA line rejected: {}", err);
                None
            }
        }
    }

    /// Fold a decoded sentence into the fix state. Returns the position fix
    /// when the sentence is an active RMC carrying a position.
    pub fn apply(&mut self, sentence: &Sentence) -> Option<PositionFix> {
        match sentence {
            Sentence::Rmc(rmc) => self.apply_rmc(rmc),
            Sentence::Gga(gga) => {
                if let Some(quality) = gga.fix_quality {
                    self.fix.fix_quality = quality;
                }
                if let Some(sats) = gga.satellites {
                    self.fix.satellites = sats;
                }
                None
            }
        }
    }

    fn apply_rmc(&mut self, rmc: &RmcRecord) -> Option<PositionFix> {
        if let Some(utc) = rmc.time {
            self.fix.local_time = Some(self.to_local(utc));
        }

        self.fix.valid_fix = rmc.active;
        if !rmc.active {
            return None;
        }

        if let Some(speed) = rmc.speed_kmh {
            self.fix.speed_kmh = speed;
        }
        let point = rmc.position?;
        self.fix.latitude = Some(point.latitude);
        self.fix.longitude = Some(point.longitude);

        Some(PositionFix {
            point,
            speed_kmh: self.fix.speed_kmh,
            local_time: self.fix.local_time,
        })
    }

    /// Shift a UTC time of day by the configured offset, wrapping at midnight
    pub fn to_local(&self, utc: NaiveTime) -> NaiveTime {
        let (local, _) = utc.overflowing_add_signed(self.utc_offset);
        local
    }
}
