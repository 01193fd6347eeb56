use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;

use timegate_core::{Ledger, Settings};

use super::open_store;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's usage and points per entity
    Today,
    /// All-time totals per entity
    All,
}

pub fn run(action: StatsAction, db: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db)?;
    let settings = Settings::load()?;
    let ledger = Ledger::new(&store, settings.ledger.clone());
    let (summary, rows) = ledger.stats(Utc::now())?;

    match action {
        StatsAction::Today => {
            let entities: Vec<_> = rows
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "logical_id": r.logical_id,
                        "today_seconds": r.today_seconds,
                        "today_minutes": r.today_minutes,
                        "today_points": r.today_points,
                    })
                })
                .collect();
            let out = serde_json::json!({
                "summary": {
                    "entities": summary.entities,
                    "today_seconds": summary.today_seconds,
                    "today_points": summary.today_points,
                },
                "entities": entities,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        StatsAction::All => {
            let out = serde_json::json!({
                "summary": summary,
                "entities": rows,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
