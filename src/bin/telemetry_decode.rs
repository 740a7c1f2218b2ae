use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glider_nav::telemetry::{parse_record, Record};

/// Ground-side decoder: turns the flight computer's telemetry lines into JSON.
#[derive(Parser, Debug)]
struct Args {
    /// Telemetry capture (reads stdin when omitted)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Only emit DATA records
    #[arg(long, default_value_t = false)]
    data_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let reader: Box<dyn BufRead> = match &args.log {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let (mut hud, mut data, mut rejected) = (0u64, 0u64, 0u64);

    for line in reader.lines() {
        let line = line.context("reading telemetry")?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(&line) {
            Ok(record) => {
                match record {
                    Record::Hud(_) => hud += 1,
                    Record::Data(_) => data += 1,
                }
                if args.data_only && matches!(record, Record::Hud(_)) {
                    continue;
                }
                writeln!(out, "{}", serde_json::to_string(&record)?)?;
            }
            Err(err) => {
                rejected += 1;
                log::debug!("Skipping line: {}", err);
            }
        }
    }
    out.flush()?;

    log::info!("{} HUD, {} DATA, {} rejected", hud, data, rejected);
    Ok(())
}
