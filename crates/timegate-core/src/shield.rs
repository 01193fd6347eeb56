//! Shield decision state machine.
//!
//! Applies a priority-ordered policy per gated entity and drives the
//! external access-control actuator:
//!
//! 1. Downtime: outside the allowed window, locked regardless of goals.
//! 2. Daily limit reached.
//! 3. Reward time exhausted: goals were met, but the earned allowance
//!    has been consumed.
//! 4. Goals met: unlocked.
//! 5. Default: locked until goals are met.
//!
//! The actuator is called only when the computed lock flag differs from
//! the persisted one; the state and reason are persisted every cycle so
//! the host can always explain the current decision.

use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::goals::{self, GatedEntity, GoalOutcome};
use crate::store::{keys, KvStore};

/// Why a gated entity is in its current lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    #[default]
    None,
    Downtime,
    DailyLimit,
    RewardExhausted,
    GoalUnmet,
}

/// Persisted lock state of one gated entity.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LockState {
    pub is_locked: bool,
    pub reason: LockReason,
    pub last_changed_at: Option<DateTime<Utc>>,
}

/// Actuator failure. Carried as a message only; the engine persists the
/// intended state regardless and leaves reconciliation to the host.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ActuatorError(pub String);

/// The external access-control actuator.
///
/// `set_locked` must be idempotent; the engine already minimizes calls
/// to transitions but redelivery can still repeat one.
pub trait Actuator {
    fn set_locked(&self, handle: &str, locked: bool) -> std::result::Result<(), ActuatorError>;
}

/// Actuator that only logs transitions. Used by the CLI and headless
/// hosts that reconcile lock states themselves.
pub struct LoggingActuator;

impl Actuator for LoggingActuator {
    fn set_locked(&self, handle: &str, locked: bool) -> std::result::Result<(), ActuatorError> {
        info!(handle, locked, "shield transition");
        Ok(())
    }
}

/// Full-replacement gated-entity configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShieldDoc {
    #[serde(default)]
    pub gated: Vec<GatedEntity>,
}

impl ShieldDoc {
    pub fn validate(&self) -> Result<()> {
        for entity in &self.gated {
            if entity.logical_id.is_empty() {
                return Err(decode_error("gated entity with empty logical_id".into()));
            }
            if entity.actuator_handle.is_empty() {
                return Err(decode_error(format!(
                    "gated entity '{}' has an empty actuator_handle",
                    entity.logical_id
                )));
            }
        }
        Ok(())
    }
}

fn decode_error(message: String) -> EngineError {
    EngineError::ConfigDecode {
        document: "shields",
        message,
    }
}

/// Load the shield configuration document from the store.
pub fn load(store: &KvStore) -> Result<Option<ShieldDoc>> {
    let Some(raw) = store.get_string(keys::SHIELDS)? else {
        return Ok(None);
    };
    let doc: ShieldDoc = serde_json::from_str(&raw).map_err(|e| decode_error(e.to_string()))?;
    doc.validate()?;
    Ok(Some(doc))
}

/// Write a shield configuration document (host side).
pub fn save(store: &KvStore, doc: &ShieldDoc) -> Result<()> {
    doc.validate()?;
    store.put_json(keys::SHIELDS, doc)?;
    Ok(())
}

/// One observable change from a policy evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub logical_id: String,
    pub is_locked: bool,
    pub reason: LockReason,
    /// True when this transition carries the once-per-day "goal
    /// completed" user-facing signal.
    pub goal_completed_signal: bool,
}

/// Evaluates and applies lock states for all gated entities.
pub struct ShieldController<'a> {
    store: &'a KvStore,
}

impl<'a> ShieldController<'a> {
    pub fn new(store: &'a KvStore) -> Self {
        Self { store }
    }

    /// Evaluate every gated entity and apply the outcome.
    ///
    /// One tracked entity's usage can satisfy goals on several gated
    /// entities, so evaluation always covers the whole document.
    /// Returns the transitions (lock flag or reason changes) that
    /// occurred.
    pub fn evaluate_all(
        &self,
        doc: &ShieldDoc,
        today_minutes: &HashMap<String, u64>,
        actuator: &dyn Actuator,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transition>> {
        let mut transitions = Vec::new();
        for gated in &doc.gated {
            let outcome = goals::evaluate(gated, today_minutes);
            if let Some(transition) = self.apply(gated, &outcome, today_minutes, actuator, now)? {
                transitions.push(transition);
            }
        }
        Ok(transitions)
    }

    /// Current persisted lock state per configured gated entity.
    pub fn lock_states(&self, doc: &ShieldDoc) -> Result<Vec<(String, LockState)>> {
        let mut states = Vec::new();
        for gated in &doc.gated {
            let state = self
                .store
                .get_json(&keys::shield_state(&gated.logical_id))?
                .unwrap_or_default();
            states.push((gated.logical_id.clone(), state));
        }
        Ok(states)
    }

    fn apply(
        &self,
        gated: &GatedEntity,
        outcome: &GoalOutcome,
        today_minutes: &HashMap<String, u64>,
        actuator: &dyn Actuator,
        now: DateTime<Utc>,
    ) -> Result<Option<Transition>> {
        let (locked, reason) = desired_state(gated, outcome, today_minutes, now);

        let state_key = keys::shield_state(&gated.logical_id);
        let previous: LockState = self.store.get_json(&state_key)?.unwrap_or_default();
        let flag_changed = previous.is_locked != locked;

        if flag_changed {
            if let Err(e) = actuator.set_locked(&gated.actuator_handle, locked) {
                warn!(
                    entity = %gated.logical_id,
                    error = %e,
                    "actuator unreachable, persisting intended state"
                );
            }
            info!(entity = %gated.logical_id, locked, ?reason, "lock state changed");
        }

        // Persisted every cycle, changed or not, so the reason shown to
        // the user always matches the latest evaluation.
        let state = LockState {
            is_locked: locked,
            reason,
            last_changed_at: if flag_changed {
                Some(now)
            } else {
                previous.last_changed_at
            },
        };
        self.store.put_json(&state_key, &state)?;

        let mut signal = false;
        if flag_changed && !locked && outcome.goal_met {
            signal = self.mark_unlock_notified(&gated.logical_id, now)?;
            if signal {
                info!(entity = %gated.logical_id, "goal completed, entity unlocked");
            }
        }

        if flag_changed || previous.reason != reason {
            return Ok(Some(Transition {
                logical_id: gated.logical_id.clone(),
                is_locked: locked,
                reason,
                goal_completed_signal: signal,
            }));
        }
        Ok(None)
    }

    /// Returns true the first time an entity unlocks on a given day.
    fn mark_unlock_notified(&self, logical_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let key = keys::unlock_notified(logical_id);
        let today = now.date_naive().to_string();
        if self.store.get_string(&key)?.as_deref() == Some(today.as_str()) {
            return Ok(false);
        }
        self.store.set_string(&key, &today)?;
        Ok(true)
    }
}

/// The priority-ordered policy.
fn desired_state(
    gated: &GatedEntity,
    outcome: &GoalOutcome,
    today_minutes: &HashMap<String, u64>,
    now: DateTime<Utc>,
) -> (bool, LockReason) {
    if let Some(window) = &gated.allowed_window {
        let minute_of_day = now.time().hour() * 60 + now.time().minute();
        if !window.contains(minute_of_day) {
            return (true, LockReason::Downtime);
        }
    }

    let own_minutes = today_minutes
        .get(&gated.logical_id)
        .copied()
        .unwrap_or(0);

    if gated.daily_limit_minutes < 1440 && own_minutes >= u64::from(gated.daily_limit_minutes) {
        return (true, LockReason::DailyLimit);
    }

    if outcome.earned_minutes > 0 && own_minutes >= outcome.earned_minutes {
        return (true, LockReason::RewardExhausted);
    }

    if outcome.goal_met {
        return (false, LockReason::None);
    }

    (true, LockReason::GoalUnmet)
}
