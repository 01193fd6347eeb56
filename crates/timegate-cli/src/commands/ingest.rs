use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Deserialize;

use timegate_core::diagnostics::FixedGauge;
use timegate_core::{Engine, Settings};

use super::open_store;

#[derive(Args)]
pub struct IngestArgs {
    /// Event identifier (e.g. "app0-min1-gen1")
    #[arg(long, conflicts_with = "file")]
    pub event: Option<String>,
    /// Event timestamp, RFC3339 (default: now)
    #[arg(long, requires = "event")]
    pub at: Option<String>,
    /// JSON-lines file of events to replay
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// One replayed line: `{"event_id": "...", "fired_at": "..."}`.
#[derive(Deserialize)]
struct EventLine {
    event_id: String,
    #[serde(default)]
    fired_at: Option<DateTime<Utc>>,
}

pub fn run(args: IngestArgs, db: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db)?;
    let settings = Settings::load()?;
    // The memory budget applies to the host's capped handler process,
    // not to this tool.
    let mut engine = Engine::new(store, settings).with_memory_gauge(Box::new(FixedGauge(0)));

    match (args.event, args.file) {
        (Some(event_id), None) => {
            let fired_at = match args.at {
                Some(raw) => DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc),
                None => Utc::now(),
            };
            let report = engine.handle_event(&event_id, fired_at)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        (None, Some(path)) => {
            let reader = BufReader::new(File::open(&path)?);
            let mut reports = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let event: EventLine = serde_json::from_str(&line)?;
                let fired_at = event.fired_at.unwrap_or_else(Utc::now);
                reports.push(engine.handle_event(&event.event_id, fired_at)?);
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => return Err("exactly one of --event or --file is required".into()),
    }
    Ok(())
}
