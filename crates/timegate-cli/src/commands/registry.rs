use std::path::PathBuf;

use clap::Subcommand;

use timegate_core::registry::{self, RegistryDoc};

use super::open_store;

#[derive(Subcommand)]
pub enum RegistryAction {
    /// Print the registry document
    Show,
    /// Replace the registry document from a JSON file
    Set {
        /// JSON file with the full-replacement document
        file: PathBuf,
    },
}

pub fn run(action: RegistryAction, db: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db)?;

    match action {
        RegistryAction::Show => match registry::load(&store)? {
            Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
            None => println!("no registry document"),
        },
        RegistryAction::Set { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let doc: RegistryDoc = serde_json::from_str(&raw)?;
            registry::save(&store, &doc)?;
            println!("registry replaced (generation {})", doc.generation);
        }
    }
    Ok(())
}
