//! Liveness signaling and memory-pressure detection.
//!
//! The heartbeat writes liveness fields to the store on a fixed interval,
//! independent of event arrival; it never touches the accounting critical
//! path. The memory gauge feeds the degraded-path decision: above the
//! configured budget the engine performs the same dedup+delta+persist
//! sequence but skips non-essential diagnostics writes.

use chrono::Utc;
use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

use crate::error::Result;
use crate::notify::ChangeNotifier;
use crate::store::{keys, KvStore};

/// Resident-set gauge for the current invocation.
pub trait MemoryGauge {
    fn resident_bytes(&mut self) -> u64;
}

/// Gauge over the current process resident set.
pub struct ProcessMemoryGauge {
    system: System,
    pid: Pid,
}

impl ProcessMemoryGauge {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        Self { system, pid }
    }
}

impl Default for ProcessMemoryGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGauge for ProcessMemoryGauge {
    fn resident_bytes(&mut self) -> u64 {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]));
        self.system
            .process(self.pid)
            .map(|p| p.memory())
            .unwrap_or(0)
    }
}

/// Fixed gauge for tests and hosts that manage their own budget.
pub struct FixedGauge(pub u64);

impl MemoryGauge for FixedGauge {
    fn resident_bytes(&mut self) -> u64 {
        self.0
    }
}

/// Liveness fields as one readable document.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DiagSnapshot {
    pub last_heartbeat: Option<String>,
    pub last_event_at: Option<String>,
    pub invocations: u64,
    pub events_dropped: u64,
    pub degraded: bool,
    pub change_sequence: u64,
}

/// Write one liveness heartbeat.
pub fn heartbeat_tick(store: &KvStore) -> Result<()> {
    store.set_string(keys::DIAG_LAST_HEARTBEAT, &Utc::now().to_rfc3339())?;
    debug!("heartbeat written");
    Ok(())
}

/// Read the current liveness fields.
pub fn snapshot(store: &KvStore) -> Result<DiagSnapshot> {
    Ok(DiagSnapshot {
        last_heartbeat: store.get_string(keys::DIAG_LAST_HEARTBEAT)?,
        last_event_at: store.get_string(keys::DIAG_LAST_EVENT_AT)?,
        invocations: store.get_i64(keys::DIAG_INVOCATIONS)?.unwrap_or(0) as u64,
        events_dropped: store.get_i64(keys::DIAG_EVENTS_DROPPED)?.unwrap_or(0) as u64,
        degraded: store.get_bool(keys::DIAG_DEGRADED)?.unwrap_or(false),
        change_sequence: ChangeNotifier::new(store).sequence()?,
    })
}

/// Run the heartbeat loop forever at a fixed interval.
///
/// Takes ownership of a store handle so the loop can be spawned as its
/// own task next to the host's event handling.
pub async fn run_heartbeat(store: KvStore, interval_secs: u64) -> Result<()> {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        heartbeat_tick(&store)?;
    }
}
