use std::path::PathBuf;

use chrono::Utc;

use timegate_core::{Engine, Settings};

use super::open_store;

pub fn run(db: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db)?;
    let settings = Settings::load()?;
    let engine = Engine::new(store, settings);
    let (rolled, transitions) = engine.run_rollover(Utc::now())?;
    let out = serde_json::json!({
        "rolled_entities": rolled,
        "transitions": transitions,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
