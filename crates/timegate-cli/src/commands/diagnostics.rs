use std::path::PathBuf;

use timegate_core::diagnostics;

use super::open_store;

pub fn run(db: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db)?;
    let snapshot = diagnostics::snapshot(&store)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
