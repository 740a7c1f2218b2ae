//! Estimation core of a glider flight computer: satellite sentence parsing,
//! local position tracking, attitude, barometric altitude, airspeed, mission
//! time, flight-phase classification and the telemetry records.

pub mod baro;
pub mod computer;
pub mod config;
pub mod error;
pub mod filters;
pub mod flight_phase;
pub mod gps;
pub mod hal;
pub mod health_monitor;
pub mod imu;
pub mod mission_clock;
pub mod nmea;
pub mod physics;
pub mod sensors;
pub mod smoothing;
pub mod telemetry;
pub mod tracker;
pub mod types;

pub use computer::{FlightComputer, Hardware};
pub use config::Config;
pub use types::{FlightPhase, LocalPosition};
