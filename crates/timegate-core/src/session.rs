//! Session-relative delta computation for threshold events.
//!
//! The monitoring subsystem re-fires historical thresholds whenever it
//! restarts, delivers duplicates, and reorders across restarts. This
//! module decides, for one incoming event, whether it represents genuine
//! new usage and how many seconds it adds.
//!
//! Accounting is delta-based against the session's high-water threshold:
//! an event at threshold T adds `T - peak` seconds, never T itself.
//! Treating thresholds as absolute totals double-counts the moment a new
//! session starts from a lower threshold than the previous session's
//! peak.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SessionSettings;
use crate::ledger::UsageCounter;

/// Why an event was not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Same threshold as the session peak: already counted.
    Duplicate,
    /// Threshold regressed shortly after the previous event: the monitor
    /// re-delivering history, not new usage.
    CatchUp,
    /// Regressed threshold inside the post-restart guard window.
    RestartNoise,
}

/// Outcome of the delta decision for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaDecision {
    Skip(SkipReason),
    Count { delta_secs: u64, new_peak_secs: u64 },
}

/// Decide what an event firing at `fired_threshold_secs` contributes.
///
/// `armed_at` is when the host last (re)armed monitoring; it anchors the
/// restart guard. The counter is not mutated here: the caller applies
/// `new_peak_secs` and the event timestamp together with the delta so the
/// whole update persists in one write.
pub fn decide(
    counter: &UsageCounter,
    fired_threshold_secs: u64,
    now: DateTime<Utc>,
    armed_at: Option<DateTime<Utc>>,
    windows: &SessionSettings,
) -> DeltaDecision {
    let peak = counter.session_peak_secs;

    if fired_threshold_secs == peak && counter.last_event_at.is_some() {
        return DeltaDecision::Skip(SkipReason::Duplicate);
    }

    // A long gap (or no prior event at all) opens a fresh session. The
    // stale high-water mark must not swallow a new session's regressed
    // thresholds; advancing thresholds stay delta-based either way, since
    // the expected cadence (one event per minute) already exceeds the
    // restart window.
    let fresh_session = match counter.last_event_at {
        None => true,
        Some(last) => (now - last).num_seconds() > windows.restart_window_secs as i64,
    };

    if fired_threshold_secs < peak && !fresh_session {
        let within_restart_guard = armed_at
            .map(|armed| (now - armed).num_seconds() < windows.restart_guard_secs as i64)
            .unwrap_or(false);
        if within_restart_guard {
            return DeltaDecision::Skip(SkipReason::RestartNoise);
        }
        if let Some(last) = counter.last_event_at {
            if (now - last).num_seconds() < windows.rapid_fire_window_secs as i64 {
                return DeltaDecision::Skip(SkipReason::CatchUp);
            }
        }
    }

    let effective_peak = if fresh_session && fired_threshold_secs < peak {
        0
    } else {
        peak
    };
    DeltaDecision::Count {
        delta_secs: fired_threshold_secs.saturating_sub(effective_peak),
        new_peak_secs: fired_threshold_secs,
    }
}
