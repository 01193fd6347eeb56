use std::path::PathBuf;

use clap::Subcommand;

use timegate_core::shield::{self, ShieldController, ShieldDoc};

use super::open_store;

#[derive(Subcommand)]
pub enum ShieldsAction {
    /// Print the gated-entity configuration
    Show,
    /// Replace the configuration from a JSON file
    Set {
        /// JSON file with the full-replacement document
        file: PathBuf,
    },
    /// Print the persisted lock state per gated entity
    Status,
}

pub fn run(action: ShieldsAction, db: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db)?;

    match action {
        ShieldsAction::Show => match shield::load(&store)? {
            Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
            None => println!("no shield configuration"),
        },
        ShieldsAction::Set { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let doc: ShieldDoc = serde_json::from_str(&raw)?;
            shield::save(&store, &doc)?;
            println!("shield configuration replaced ({} gated entities)", doc.gated.len());
        }
        ShieldsAction::Status => {
            let Some(doc) = shield::load(&store)? else {
                println!("no shield configuration");
                return Ok(());
            };
            let rows: Vec<_> = ShieldController::new(&store)
                .lock_states(&doc)?
                .into_iter()
                .map(|(logical_id, state)| {
                    serde_json::json!({
                        "logical_id": logical_id,
                        "is_locked": state.is_locked,
                        "reason": state.reason,
                        "last_changed_at": state.last_changed_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}
