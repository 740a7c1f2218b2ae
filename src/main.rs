use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use glider_nav::hal::{Clock, SystemClock};
use glider_nav::sensors::{
    CaptureFeed, GlideProfile, ManualClock, ScriptedBytes, SimulatedBarometer, SimulatedImuBus,
};
use glider_nav::{telemetry, Config, FlightComputer, Hardware};

/// UART rate of the satellite receiver
const GPS_BAUD: u32 = 9600;
/// Rated forced-mode measurement time of the simulated barometer
const BARO_MEASUREMENT_MS: u64 = 8;
/// Keep running this long after touchdown when no cycle count is given
const GROUND_TAIL_S: f64 = 20.0;

#[derive(Parser, Debug)]
#[command(name = "glider_nav")]
#[command(about = "Glider flight computer estimation loop on simulated sensors", long_about = None)]
struct Args {
    /// JSON config file (missing keys keep their defaults)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of control cycles (default: whole simulated flight, or until the capture ends)
    #[arg(long)]
    cycles: Option<u64>,

    /// Control cycle period in milliseconds (overrides the config)
    #[arg(long)]
    period_ms: Option<u64>,

    /// Replay NMEA bytes from a receiver capture instead of the simulated flight
    #[arg(long, value_name = "PATH")]
    nmea: Option<PathBuf>,

    /// Run against the wall clock instead of simulated time
    #[arg(long, default_value_t = false)]
    realtime: bool,

    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(period) = args.period_ms {
        config.control.cycle_period_ms = period;
    }

    if args.realtime {
        run(&args, config, SystemClock::new())
    } else {
        run(&args, config, ManualClock::new())
    }
}

fn run<C: Clock>(args: &Args, config: Config, clock: C) -> Result<()> {
    let period = Duration::from_millis(config.control.cycle_period_ms.max(1));
    let profile = GlideProfile {
        counts_per_g: config.imu.accel_sensitivity,
        ..GlideProfile::default()
    };

    let mut capture = match &args.nmea {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening NMEA capture {}", path.display()))?;
            log::info!("Replaying NMEA capture {}", path.display());
            Some(CaptureFeed::new(
                BufReader::new(file),
                CaptureFeed::<File>::bytes_per_cycle_for(GPS_BAUD, period),
            ))
        }
        None => None,
    };

    let identity = config.imu.accepted_ids.first().copied().unwrap_or(0x70);
    let counts_per_g = config.imu.accel_sensitivity as i16;
    let mut barometer = SimulatedBarometer::new(Duration::from_millis(BARO_MEASUREMENT_MS));
    barometer.set_pressure(profile.sensed_pressure_at(0.0));

    let hardware = Hardware {
        imu_bus: SimulatedImuBus::level(config.imu.address, identity, counts_per_g),
        gps_link: ScriptedBytes::new(),
        barometer,
        clock,
    };
    let mut fc = FlightComputer::start(config, hardware).context("flight computer startup")?;

    let max_cycles = args.cycles.unwrap_or_else(|| {
        if capture.is_some() {
            u64::MAX
        } else {
            ((profile.landing_s() + GROUND_TAIL_S) / period.as_secs_f64()).ceil() as u64
        }
    });

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let start = fc.clock().now();
    let mut last_second: Option<u64> = None;

    for _ in 0..max_cycles {
        let cycle_start = fc.clock().now();
        let t = cycle_start.saturating_sub(start).as_secs_f64();

        fc.imu_bus_mut().set_sample(profile.imu_at(t));
        fc.barometer_mut().set_pressure(profile.sensed_pressure_at(t));

        match capture.as_mut() {
            Some(feed) => {
                let more = feed
                    .feed_into(fc.gps_link_mut())
                    .context("reading NMEA capture")?;
                if !more && fc.gps_link_mut().is_empty() && args.cycles.is_none() {
                    log::info!("Capture exhausted");
                    break;
                }
            }
            None => {
                // The receiver reports once per second
                let second = t as u64;
                if last_second != Some(second) {
                    last_second = Some(second);
                    for sentence in profile.sentences_at(t) {
                        fc.gps_link_mut().push_line(&sentence);
                    }
                }
            }
        }

        for snapshot in fc.step() {
            telemetry::write_to(&mut out, &snapshot).context("writing telemetry")?;
        }

        let spent = fc.clock().elapsed_since(cycle_start);
        fc.clock_mut().delay(period.saturating_sub(spent));
    }
    out.flush()?;

    log::info!(
        "Finished after {} cycles, final phase {}",
        fc.cycles(),
        fc.phase()
    );
    log::info!("Parser stats: {}", serde_json::to_string(&fc.stats())?);
    log::info!("Health: {}", serde_json::to_string(&fc.health_report())?);
    Ok(())
}
