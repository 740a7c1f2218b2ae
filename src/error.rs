use thiserror::Error;

/// Why a candidate sentence was rejected by the decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("sentence too short ({0} bytes)")]
    TooShort(usize),

    #[error("sentence exceeds {max} bytes ({len})")]
    TooLong { len: usize, max: usize },

    #[error("sentence does not start with '$'")]
    MissingStartMarker,

    #[error("no checksum delimiter near end of sentence")]
    MissingChecksum,

    #[error("checksum field is not hexadecimal: {0:?}")]
    InvalidChecksumField(String),

    #[error("checksum mismatch: sentence carries {expected:02X}, payload XORs to {computed:02X}")]
    BadChecksum { expected: u8, computed: u8 },
}

/// Transient device failure. Never fatal inside the control loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("bus transaction failed at address {address:#04x}")]
    Bus { address: u8 },

    #[error("measurement not ready")]
    NotReady,

    #[error("I/O error: {0}")]
    Io(String),
}

/// Preconditions that must hold before the control loop may start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    #[error("inertial sensor not detected (identity {id:#04x})")]
    UnknownImu { id: u8 },

    #[error("no valid inertial samples in {attempts} calibration reads")]
    NoImuCalibration { attempts: u32 },

    #[error("no valid pressure samples in {attempts} calibration reads")]
    NoBaroCalibration { attempts: u32 },

    #[error("sensor failure during startup: {0}")]
    Sensor(#[from] SensorError),
}

/// Failure to decode a telemetry record on the receiving side.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("unknown record prefix in {0:?}")]
    UnknownPrefix(String),

    #[error("{kind} record has {found} fields, expected {expected}")]
    FieldCount {
        kind: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("invalid {field} field: {value:?}")]
    InvalidField { field: &'static str, value: String },
}
