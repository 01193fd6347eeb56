//! Daily usage bookkeeping.
//!
//! Owns the per-entity counters: lifetime and today totals, optional
//! hourly buckets, points accrual, day-boundary rollover with archival,
//! and bounded history retention. Counters are persisted as one JSON
//! record per entity so a terminated invocation can never leave a
//! half-updated counter behind.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LedgerSettings;
use crate::error::Result;
use crate::store::{keys, KvStore};

/// Per-entity usage counter for the current day plus lifetime totals.
///
/// `today_seconds` never decreases within a calendar day and is reset
/// exactly once per day-boundary crossing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageCounter {
    pub logical_id: String,
    #[serde(default)]
    pub total_seconds: u64,
    #[serde(default)]
    pub today_seconds: u64,
    #[serde(default)]
    pub today_points: u64,
    /// Lifetime points.
    #[serde(default)]
    pub earned_points: u64,
    #[serde(default = "zeroed_hours")]
    pub hourly_seconds: [u32; 24],
    /// High-water threshold of the current monitoring session.
    #[serde(default)]
    pub session_peak_secs: u64,
    #[serde(default)]
    pub last_event_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reset_date: Option<NaiveDate>,
}

fn zeroed_hours() -> [u32; 24] {
    [0; 24]
}

impl UsageCounter {
    pub fn new(logical_id: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            total_seconds: 0,
            today_seconds: 0,
            today_points: 0,
            earned_points: 0,
            hourly_seconds: zeroed_hours(),
            session_peak_secs: 0,
            last_event_at: None,
            last_reset_date: None,
        }
    }

    /// Whole minutes accumulated today.
    pub fn today_minutes(&self) -> u64 {
        self.today_seconds / 60
    }
}

/// Immutable archival snapshot of one past day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyHistoryEntry {
    pub logical_id: String,
    pub date: NaiveDate,
    pub seconds: u64,
    pub points: u64,
    #[serde(default)]
    pub hourly_seconds: Option<[u32; 24]>,
}

/// Per-entity stats row for host/CLI consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStats {
    pub logical_id: String,
    pub today_seconds: u64,
    pub today_minutes: u64,
    pub today_points: u64,
    pub total_seconds: u64,
    pub earned_points: u64,
}

/// Whole-store aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatsSummary {
    pub entities: u64,
    pub today_seconds: u64,
    pub today_points: u64,
    pub total_seconds: u64,
    pub earned_points: u64,
}

/// Daily usage ledger over the durable store.
pub struct Ledger<'a> {
    store: &'a KvStore,
    settings: LedgerSettings,
}

impl<'a> Ledger<'a> {
    pub fn new(store: &'a KvStore, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    /// Load the counter for an entity, starting fresh if none exists.
    pub fn load_counter(&self, logical_id: &str) -> Result<UsageCounter> {
        Ok(self
            .store
            .get_json(&keys::counter(logical_id))?
            .unwrap_or_else(|| UsageCounter::new(logical_id)))
    }

    /// Persist a counter as one atomic record write.
    pub fn save_counter(&self, counter: &UsageCounter) -> Result<()> {
        self.store
            .put_json(&keys::counter(&counter.logical_id), counter)?;
        Ok(())
    }

    /// Fold a session delta into the counter, rolling the day first when
    /// `at` crosses a boundary. Returns the points earned by this delta.
    ///
    /// The caller persists the counter afterwards (together with the
    /// session peak update) so the whole mutation lands in one write.
    pub fn apply_delta(
        &self,
        counter: &mut UsageCounter,
        delta_secs: u64,
        reward_rate_per_minute: u32,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        self.rollover_if_needed(counter, at)?;

        counter.total_seconds += delta_secs;
        counter.today_seconds += delta_secs;
        if self.settings.hourly_buckets {
            counter.hourly_seconds[at.hour() as usize] += delta_secs as u32;
        }

        let points = (delta_secs / 60) * u64::from(reward_rate_per_minute);
        counter.today_points += points;
        counter.earned_points += points;

        debug!(
            entity = %counter.logical_id,
            delta_secs,
            today_seconds = counter.today_seconds,
            points,
            "delta applied"
        );
        Ok(points)
    }

    /// Reset the today-columns when `at` falls on a new calendar day,
    /// archiving the previous day first. Runs at most once per day per
    /// entity. Returns whether a rollover happened.
    pub fn rollover_if_needed(&self, counter: &mut UsageCounter, at: DateTime<Utc>) -> Result<bool> {
        let today = at.date_naive();
        if counter.last_reset_date == Some(today) {
            return Ok(false);
        }

        if let Some(prev) = counter.last_reset_date {
            // Empty days leave no archive entry.
            if counter.today_seconds > 0 || counter.today_points > 0 {
                let entry = DailyHistoryEntry {
                    logical_id: counter.logical_id.clone(),
                    date: prev,
                    seconds: counter.today_seconds,
                    points: counter.today_points,
                    hourly_seconds: self
                        .settings
                        .hourly_buckets
                        .then_some(counter.hourly_seconds),
                };
                self.store
                    .put_json(&keys::history(&counter.logical_id, prev), &entry)?;
                info!(
                    entity = %counter.logical_id,
                    date = %prev,
                    seconds = entry.seconds,
                    "archived daily usage"
                );
            }
            self.prune_history(&counter.logical_id, today)?;
        }

        counter.today_seconds = 0;
        counter.today_points = 0;
        counter.hourly_seconds = zeroed_hours();
        counter.last_reset_date = Some(today);
        Ok(true)
    }

    /// Roll every counter in the store once for `now`'s calendar day.
    ///
    /// Idempotent: guarded by a last-run date in the store, so repeated
    /// invocations on the same day are no-ops. Returns the number of
    /// entities rolled.
    pub fn run_global_rollover(&self, now: DateTime<Utc>) -> Result<u32> {
        let today = now.date_naive().to_string();
        if self.store.get_string(keys::ROLLOVER_LAST_RUN)?.as_deref() == Some(today.as_str()) {
            return Ok(0);
        }

        let mut rolled = 0;
        for key in self.store.keys_with_prefix(keys::COUNTER_PREFIX)? {
            let Some(mut counter) = self.store.get_json::<UsageCounter>(&key)? else {
                continue;
            };
            if self.rollover_if_needed(&mut counter, now)? {
                self.save_counter(&counter)?;
                rolled += 1;
            }
        }

        self.store.set_string(keys::ROLLOVER_LAST_RUN, &today)?;
        info!(entities = rolled, "global day rollover complete");
        Ok(rolled)
    }

    /// Today's whole minutes per entity, for goal evaluation.
    ///
    /// Counters that have not rolled into `now`'s day yet still hold the
    /// previous day's totals; those read as zero here.
    pub fn today_minutes_by_entity(&self, now: DateTime<Utc>) -> Result<HashMap<String, u64>> {
        let today = now.date_naive();
        let mut minutes = HashMap::new();
        for key in self.store.keys_with_prefix(keys::COUNTER_PREFIX)? {
            let Some(counter) = self.store.get_json::<UsageCounter>(&key)? else {
                continue;
            };
            let m = if counter.last_reset_date == Some(today) {
                counter.today_minutes()
            } else {
                0
            };
            minutes.insert(counter.logical_id, m);
        }
        Ok(minutes)
    }

    /// Archived entries for one entity, newest first.
    pub fn history(&self, logical_id: &str, limit: usize) -> Result<Vec<DailyHistoryEntry>> {
        let mut entries = Vec::new();
        for key in self.store.keys_with_prefix(&keys::history_prefix(logical_id))? {
            if let Some(entry) = self.store.get_json::<DailyHistoryEntry>(&key)? {
                entries.push(entry);
            }
        }
        // Keys sort chronologically; keep the most recent `limit`.
        let start = entries.len().saturating_sub(limit);
        let mut recent: Vec<_> = entries.split_off(start);
        recent.reverse();
        Ok(recent)
    }

    /// Per-entity stats plus the whole-store aggregate.
    pub fn stats(&self, now: DateTime<Utc>) -> Result<(StatsSummary, Vec<EntityStats>)> {
        let today = now.date_naive();
        let mut summary = StatsSummary::default();
        let mut rows = Vec::new();

        for key in self.store.keys_with_prefix(keys::COUNTER_PREFIX)? {
            let Some(counter) = self.store.get_json::<UsageCounter>(&key)? else {
                continue;
            };
            let current_day = counter.last_reset_date == Some(today);
            let row = EntityStats {
                today_seconds: if current_day { counter.today_seconds } else { 0 },
                today_minutes: if current_day { counter.today_minutes() } else { 0 },
                today_points: if current_day { counter.today_points } else { 0 },
                total_seconds: counter.total_seconds,
                earned_points: counter.earned_points,
                logical_id: counter.logical_id,
            };
            summary.entities += 1;
            summary.today_seconds += row.today_seconds;
            summary.today_points += row.today_points;
            summary.total_seconds += row.total_seconds;
            summary.earned_points += row.earned_points;
            rows.push(row);
        }

        rows.sort_by(|a, b| a.logical_id.cmp(&b.logical_id));
        Ok((summary, rows))
    }

    fn prune_history(&self, logical_id: &str, today: NaiveDate) -> Result<()> {
        let cutoff = today - Duration::days(i64::from(self.settings.retention_days));
        let prefix = keys::history_prefix(logical_id);
        for key in self.store.keys_with_prefix(&prefix)? {
            let Some(date_part) = key.strip_prefix(&prefix) else {
                continue;
            };
            let Ok(date) = date_part.parse::<NaiveDate>() else {
                continue;
            };
            if date < cutoff {
                self.store.delete(&key)?;
                debug!(entity = %logical_id, date = %date, "pruned history entry");
            }
        }
        Ok(())
    }
}
