//! # Timegate Core Library
//!
//! This library turns an unreliable stream of "threshold crossed" events
//! for tracked apps into trustworthy per-day usage totals and correct
//! lock/unlock decisions for gated (reward) apps. It is built for
//! short-lived, memory-capped handler invocations: the durable store is
//! the only state that survives between calls, every decision is
//! idempotent, and duplicate or out-of-order event delivery is safe by
//! construction.
//!
//! ## Architecture
//!
//! - **Store**: SQLite-backed key-value store shared with the host app
//! - **Registry**: read-only mapping from event identifiers to tracked
//!   entities, with a generation epoch that invalidates stale events
//! - **Session**: dedup and session-relative delta computation
//! - **Ledger**: daily/hourly counters, day rollover, bounded history
//! - **Goals/Shield**: reward-goal evaluation and the priority-ordered
//!   lock decision driving the external actuator
//! - **Notify**: sequence-numbered, payload-less change signaling
//!
//! ## Key Components
//!
//! - [`Engine`]: the per-invocation pipeline
//! - [`KvStore`]: durable store primitives
//! - [`Ledger`]: usage bookkeeping and stats
//! - [`Settings`]: TOML-backed engine tunables

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod goals;
pub mod ledger;
pub mod notify;
pub mod registry;
pub mod session;
pub mod shield;
pub mod store;

pub use config::Settings;
pub use engine::{CycleReport, DropReason, Engine, EventOutcome};
pub use error::{EngineError, Result, SettingsError, StoreError};
pub use goals::{AllowedWindow, GatedEntity, GoalLink, GoalOutcome, UnlockMode};
pub use ledger::{DailyHistoryEntry, EntityStats, Ledger, StatsSummary, UsageCounter};
pub use notify::{ChangeNotifier, NoopWake, WakeSignal, WatchWake};
pub use registry::{EventKey, EventMapping, RegistryDoc};
pub use session::{DeltaDecision, SkipReason};
pub use shield::{Actuator, ActuatorError, LockReason, LockState, ShieldController, ShieldDoc, Transition};
pub use store::KvStore;
