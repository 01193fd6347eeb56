//! Change signaling toward the host app.
//!
//! The signal carries no data. A monotonically increasing sequence
//! counter lives in the durable store; every successful recording cycle
//! bumps it and fires a payload-less wake. The host re-reads the store
//! for the actual state.

use tokio::sync::watch;

use crate::error::Result;
use crate::store::{keys, KvStore};

/// Payload-less wake primitive.
///
/// `sequence` is advisory only; receivers must re-read the store rather
/// than interpret the number. Delivery is at-least-once.
pub trait WakeSignal: Send + Sync {
    fn wake(&self, sequence: u64);
}

/// Wake signal that goes nowhere (CLI and tests without a host).
pub struct NoopWake;

impl WakeSignal for NoopWake {
    fn wake(&self, _sequence: u64) {}
}

/// Wake signal backed by a tokio watch channel, for in-process hosts.
///
/// Receivers await `changed()` and then re-read the store; coalescing
/// multiple bumps into one wake-up is fine by design.
pub struct WatchWake {
    tx: watch::Sender<u64>,
}

impl WatchWake {
    pub fn new() -> (Self, watch::Receiver<u64>) {
        let (tx, rx) = watch::channel(0);
        (Self { tx }, rx)
    }
}

impl WakeSignal for WatchWake {
    fn wake(&self, sequence: u64) {
        // Send fails only when every receiver is gone; nothing to do then.
        let _ = self.tx.send(sequence);
    }
}

/// Sequence-numbered change notifier over the durable store.
pub struct ChangeNotifier<'a> {
    store: &'a KvStore,
}

impl<'a> ChangeNotifier<'a> {
    pub fn new(store: &'a KvStore) -> Self {
        Self { store }
    }

    /// Current sequence value.
    pub fn sequence(&self) -> Result<u64> {
        Ok(self.store.get_i64(keys::CHANGE_SEQUENCE)?.unwrap_or(0) as u64)
    }

    /// Increment the sequence, persist it, and fire the wake signal.
    pub fn bump(&self, wake: &dyn WakeSignal) -> Result<u64> {
        let next = self.sequence()? + 1;
        self.store.set_i64(keys::CHANGE_SEQUENCE, next as i64)?;
        wake.wake(next);
        Ok(next)
    }
}
