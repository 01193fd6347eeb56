//! Durable key-value store shared by the host app and handler invocations.
//!
//! The store is the only state that survives between invocations: every
//! component re-reads what it needs and persists what it changes before an
//! invocation may be considered successful. Records that must not be torn
//! by a mid-write termination are serialized as a single JSON value and
//! written under one key.

pub mod keys;
mod kv;
mod migrations;

pub use kv::KvStore;

use std::path::PathBuf;

/// Returns `~/.config/timegate[-dev]/` based on TIMEGATE_ENV.
///
/// Set TIMEGATE_ENV=dev to use a separate development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TIMEGATE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("timegate-dev")
    } else {
        base_dir.join("timegate")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
