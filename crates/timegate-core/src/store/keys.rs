//! Key naming for the shared kv namespace.
//!
//! Every key the engine reads or writes is built here so the host app can
//! rely on a single, stable naming scheme.

use chrono::NaiveDate;

/// Registry document (JSON), written by the host before monitoring starts.
pub const REGISTRY: &str = "registry";

/// Gated-entity configuration document (JSON), full replacement.
pub const SHIELDS: &str = "shields";

/// ISO date of the last global day rollover.
pub const ROLLOVER_LAST_RUN: &str = "rollover:last-run";

/// Change-notifier sequence counter.
pub const CHANGE_SEQUENCE: &str = "seq:change";

pub const DIAG_LAST_HEARTBEAT: &str = "diag:last-heartbeat";
pub const DIAG_LAST_EVENT_AT: &str = "diag:last-event-at";
pub const DIAG_INVOCATIONS: &str = "diag:invocations";
pub const DIAG_EVENTS_DROPPED: &str = "diag:events-dropped";
pub const DIAG_DEGRADED: &str = "diag:degraded";

/// Prefix under which all usage counters live.
pub const COUNTER_PREFIX: &str = "counter:";

/// Usage counter record for one tracked entity.
pub fn counter(logical_id: &str) -> String {
    format!("{COUNTER_PREFIX}{logical_id}")
}

/// Archived daily snapshot. Dates render as `%Y-%m-%d`, so keys under one
/// entity sort chronologically.
pub fn history(logical_id: &str, date: NaiveDate) -> String {
    format!("history:{logical_id}:{date}")
}

pub fn history_prefix(logical_id: &str) -> String {
    format!("history:{logical_id}:")
}

/// Persisted lock state for one gated entity.
pub fn shield_state(logical_id: &str) -> String {
    format!("shield-state:{logical_id}")
}

/// ISO date of the last "goal completed" signal for a gated entity.
pub fn unlock_notified(logical_id: &str) -> String {
    format!("unlock-notified:{logical_id}")
}
