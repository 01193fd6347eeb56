//! The invocation pipeline.
//!
//! One call to [`Engine::handle_event`] is one short-lived handler
//! invocation: resolve the event, decide the session delta, fold it into
//! the ledger, re-evaluate every shield, and signal the host. All state
//! lives in the durable store; the engine object itself carries only
//! configuration and the external seams (actuator, wake signal, memory
//! gauge).
//!
//! Recoverable failures (unknown events, stale generations, corrupt
//! documents, unreachable actuator) are absorbed here and reported in the
//! [`CycleReport`]; only store failures abort the invocation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::diagnostics::{MemoryGauge, ProcessMemoryGauge};
use crate::error::{EngineError, Result};
use crate::ledger::Ledger;
use crate::notify::{ChangeNotifier, NoopWake, WakeSignal};
use crate::registry;
use crate::session::{self, DeltaDecision, SkipReason};
use crate::shield::{self, Actuator, LoggingActuator, ShieldController, Transition};
use crate::store::{keys, KvStore};

/// What happened to one incoming event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// The event contributed usage.
    Recorded {
        delta_seconds: u64,
        today_seconds: u64,
        points: u64,
    },
    /// The event resolved but was deduplicated away.
    Skipped { reason: SkipReason },
    /// The event could not be resolved and was dropped.
    Dropped { reason: DropReason },
}

/// Why an event was dropped before the delta decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MappingMissing,
    StaleGeneration,
    ConfigDecode,
}

/// Summary of one invocation, returned to the caller and suitable for
/// JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub event_id: String,
    #[serde(flatten)]
    pub outcome: EventOutcome,
    pub transitions: Vec<Transition>,
    /// Change-notifier sequence after this cycle, when it was bumped.
    pub sequence: Option<u64>,
    pub degraded: bool,
}

/// Usage-accounting and policy-enforcement engine over a durable store.
pub struct Engine {
    store: KvStore,
    settings: Settings,
    actuator: Box<dyn Actuator>,
    wake: Box<dyn WakeSignal>,
    gauge: Box<dyn MemoryGauge>,
}

impl Engine {
    /// Create an engine with a logging actuator, no wake delivery and the
    /// process memory gauge. Hosts plug in their seams via the `with_*`
    /// builders.
    pub fn new(store: KvStore, settings: Settings) -> Self {
        Self {
            store,
            settings,
            actuator: Box::new(LoggingActuator),
            wake: Box::new(NoopWake),
            gauge: Box::new(ProcessMemoryGauge::new()),
        }
    }

    pub fn with_actuator(mut self, actuator: Box<dyn Actuator>) -> Self {
        self.actuator = actuator;
        self
    }

    pub fn with_wake(mut self, wake: Box<dyn WakeSignal>) -> Self {
        self.wake = wake;
        self
    }

    pub fn with_memory_gauge(mut self, gauge: Box<dyn MemoryGauge>) -> Self {
        self.gauge = gauge;
        self
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Process one threshold event fired at `fired_at`.
    ///
    /// # Errors
    /// Only store failures surface as errors; everything else is
    /// reported in the [`CycleReport`].
    pub fn handle_event(&mut self, event_id: &str, fired_at: DateTime<Utc>) -> Result<CycleReport> {
        let span = tracing::debug_span!(
            "invocation",
            id = %Uuid::new_v4(),
            event = event_id
        );
        let _guard = span.enter();

        let degraded = self.gauge.resident_bytes() > self.settings.runtime.memory_budget_bytes;
        if degraded {
            debug!("memory budget exceeded, degraded path active");
        }

        let registry = match registry::load(&self.store) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                warn!(event_id, "no registry document, dropping event");
                return self.dropped(event_id, DropReason::MappingMissing, degraded);
            }
            Err(EngineError::ConfigDecode { document, message }) => {
                warn!(document, %message, "registry decode failed, dropping event");
                return self.dropped(event_id, DropReason::ConfigDecode, degraded);
            }
            Err(e) => return Err(e),
        };

        let mapping = match registry.resolve(event_id) {
            Ok(mapping) => mapping,
            Err(EngineError::StaleGeneration {
                event_generation,
                current_generation,
                ..
            }) => {
                // Expected noise while the host reconfigures; not an
                // error and not counted as a drop.
                debug!(event_id, event_generation, current_generation, "stale event skipped");
                return Ok(CycleReport {
                    event_id: event_id.to_string(),
                    outcome: EventOutcome::Dropped {
                        reason: DropReason::StaleGeneration,
                    },
                    transitions: Vec::new(),
                    sequence: None,
                    degraded,
                });
            }
            Err(EngineError::MappingMissing { .. }) => {
                warn!(event_id, "unknown event, dropping");
                return self.dropped(event_id, DropReason::MappingMissing, degraded);
            }
            Err(e) => return Err(e),
        };

        let ledger = Ledger::new(&self.store, self.settings.ledger.clone());
        let mut counter = ledger.load_counter(&mapping.logical_id)?;
        let decision = session::decide(
            &counter,
            mapping.threshold_seconds,
            fired_at,
            registry.armed_at,
            &self.settings.session,
        );

        let outcome = match decision {
            DeltaDecision::Skip(reason) => {
                debug!(entity = %mapping.logical_id, ?reason, "event skipped");
                EventOutcome::Skipped { reason }
            }
            DeltaDecision::Count {
                delta_secs,
                new_peak_secs,
            } => {
                let points = ledger.apply_delta(
                    &mut counter,
                    delta_secs,
                    mapping.reward_rate_per_minute,
                    fired_at,
                )?;
                counter.session_peak_secs = new_peak_secs;
                counter.last_event_at = Some(fired_at);
                // One write carries the delta, peak and timestamp together.
                ledger.save_counter(&counter)?;
                EventOutcome::Recorded {
                    delta_seconds: delta_secs,
                    today_seconds: counter.today_seconds,
                    points,
                }
            }
        };

        let transitions = self.shields_pass(&ledger, fired_at)?;

        let sequence = if matches!(outcome, EventOutcome::Recorded { .. })
            || !transitions.is_empty()
        {
            Some(ChangeNotifier::new(&self.store).bump(self.wake.as_ref())?)
        } else {
            None
        };

        self.note_invocation(fired_at, degraded)?;

        Ok(CycleReport {
            event_id: event_id.to_string(),
            outcome,
            transitions,
            sequence,
            degraded,
        })
    }

    /// Re-evaluate every shield against the current counters.
    ///
    /// Exposed for hosts that need a policy pass outside event handling,
    /// e.g. after rewriting the shield document or at a window boundary.
    pub fn evaluate_shields(&self, now: DateTime<Utc>) -> Result<Vec<Transition>> {
        let ledger = Ledger::new(&self.store, self.settings.ledger.clone());
        self.shields_pass(&ledger, now)
    }

    /// Run the idempotent global day rollover, then a policy pass.
    pub fn run_rollover(&self, now: DateTime<Utc>) -> Result<(u32, Vec<Transition>)> {
        let ledger = Ledger::new(&self.store, self.settings.ledger.clone());
        let rolled = ledger.run_global_rollover(now)?;
        let transitions = self.shields_pass(&ledger, now)?;
        Ok((rolled, transitions))
    }

    fn shields_pass(&self, ledger: &Ledger, now: DateTime<Utc>) -> Result<Vec<Transition>> {
        let doc = match shield::load(&self.store) {
            Ok(Some(doc)) => doc,
            Ok(None) => return Ok(Vec::new()),
            Err(EngineError::ConfigDecode { document, message }) => {
                // Keep the last-known lock states rather than acting on a
                // document we cannot trust.
                warn!(document, %message, "shield config decode failed, retaining lock states");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let today_minutes = ledger.today_minutes_by_entity(now)?;
        ShieldController::new(&self.store).evaluate_all(
            &doc,
            &today_minutes,
            self.actuator.as_ref(),
            now,
        )
    }

    fn dropped(
        &self,
        event_id: &str,
        reason: DropReason,
        degraded: bool,
    ) -> Result<CycleReport> {
        if !degraded {
            let dropped = self.store.get_i64(keys::DIAG_EVENTS_DROPPED)?.unwrap_or(0);
            self.store.set_i64(keys::DIAG_EVENTS_DROPPED, dropped + 1)?;
        }
        Ok(CycleReport {
            event_id: event_id.to_string(),
            outcome: EventOutcome::Dropped { reason },
            transitions: Vec::new(),
            sequence: None,
            degraded,
        })
    }

    fn note_invocation(&self, fired_at: DateTime<Utc>, degraded: bool) -> Result<()> {
        // The degraded flag itself stays current; the rest of the
        // bookkeeping is shed under memory pressure.
        self.store.set_bool(keys::DIAG_DEGRADED, degraded)?;
        if degraded {
            return Ok(());
        }
        let invocations = self.store.get_i64(keys::DIAG_INVOCATIONS)?.unwrap_or(0);
        self.store.set_i64(keys::DIAG_INVOCATIONS, invocations + 1)?;
        self.store
            .set_string(keys::DIAG_LAST_EVENT_AT, &fired_at.to_rfc3339())?;
        Ok(())
    }
}
