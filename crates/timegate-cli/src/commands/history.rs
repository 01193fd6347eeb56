use std::path::PathBuf;

use timegate_core::{Ledger, Settings};

use super::open_store;

pub fn run(entity: &str, limit: usize, db: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db)?;
    let settings = Settings::load()?;
    let ledger = Ledger::new(&store, settings.ledger.clone());
    let entries = ledger.history(entity, limit)?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
