//! Core error types for timegate-core.
//!
//! The taxonomy mirrors how failures are handled at runtime: everything in
//! [`EngineError`] except `Store` is recovered locally within a single
//! invocation, while store failures abort the invocation without marking
//! it successful (redelivery is assumed safe).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for timegate-core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// An event identifier that no registry entry resolves. The event is
    /// dropped; usage is never fabricated for unknown entities.
    #[error("No mapping for event '{event_id}'")]
    MappingMissing { event_id: String },

    /// An event armed under a superseded configuration generation.
    /// Expected noise during reconfiguration, skipped without logging
    /// above debug level.
    #[error(
        "Event '{event_id}' carries generation {event_generation}, registry is at {current_generation}"
    )]
    StaleGeneration {
        event_id: String,
        event_generation: u32,
        current_generation: u32,
    },

    /// A host-written document (registry or shield configuration) failed
    /// to decode. The cycle's policy evaluation is skipped and the
    /// last-known lock states are retained.
    #[error("Failed to decode {document} document: {message}")]
    ConfigDecode {
        document: &'static str,
        message: String,
    },

    /// The access-control actuator could not be reached. The intended
    /// lock state is persisted anyway so the host can reconcile later.
    #[error("Actuator unreachable for handle '{handle}': {message}")]
    ActuatorUnavailable { handle: String, message: String },

    /// Durable store failures
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Settings file failures
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Durable-store-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the store file
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Store migration failed: {0}")]
    MigrationFailed(String),

    /// Store is locked by another writer
    #[error("Store is locked")]
    Locked,

    /// A persisted record no longer decodes
    #[error("Corrupt value under key '{key}': {message}")]
    CorruptValue { key: String, message: String },

    /// IO errors (data directory creation and friends)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings-file-specific errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to load the settings file
    #[error("Failed to load settings from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save the settings file
    #[error("Failed to save settings to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// A settings value is out of range
    #[error("Invalid settings value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
