pub mod diagnostics;
pub mod history;
pub mod ingest;
pub mod registry;
pub mod rollover;
pub mod shields;
pub mod stats;

use std::path::PathBuf;

use timegate_core::KvStore;

/// Open the shared durable store, honoring a path override.
pub fn open_store(db: &Option<PathBuf>) -> Result<KvStore, Box<dyn std::error::Error>> {
    let store = match db {
        Some(path) => KvStore::open_at(path.clone())?,
        None => KvStore::open()?,
    };
    Ok(store)
}
