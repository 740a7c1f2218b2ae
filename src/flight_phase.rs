use crate::config::PhaseConfig;
use crate::types::FlightPhase;

/// Inputs for one classification
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseInputs {
    pub altitude_m: f64,
    pub airspeed_kmh: f64,
    pub elapsed_s: u32,
}

/// Hysteretic flight-phase state machine.
pub struct FlightPhaseClassifier {
    previous: FlightPhase,
    thresholds: PhaseConfig,
}

impl FlightPhaseClassifier {
    pub fn new(thresholds: PhaseConfig) -> Self {
        Self {
            previous: FlightPhase::Attached,
            thresholds,
        }
    }

    pub fn phase(&self) -> FlightPhase {
        self.previous
    }

    pub fn classify(&mut self, inputs: PhaseInputs) -> FlightPhase {
        let t = &self.thresholds;
        let alt = inputs.altitude_m;
        let spd = inputs.airspeed_kmh;

        // First match wins
        let next = if alt < t.landed_max_altitude && spd < t.landed_max_speed {
            FlightPhase::Landed
        } else if alt > t.deployed_min_altitude
            && inputs.elapsed_s > t.deployed_min_elapsed_s
            && spd > t.deployed_min_speed
        {
            FlightPhase::Deployed
        } else if self.previous == FlightPhase::Landed
            && (alt > t.leave_landed_altitude || spd > t.leave_landed_speed)
        {
            FlightPhase::Attached
        } else if self.previous == FlightPhase::Deployed
            && (alt < t.leave_deployed_altitude || spd < t.leave_deployed_speed)
        {
            FlightPhase::Attached
        } else {
            self.previous
        };

        if next != self.previous {
            log::info!(
                "Flight phase {} -> {} (alt {:.1} m, cas {:.1} km/h, t {} s)",
                self.previous,
                next,
                alt,
                spd,
                inputs.elapsed_s
            );
        }
        self.previous = next;
        next
    }
}
