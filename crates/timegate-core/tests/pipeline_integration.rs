//! Integration tests for the event-to-ledger pipeline.
//!
//! Each test drives the engine the way the host's handler invocations
//! would: one event at a time against a shared store, with nothing held
//! in memory between calls.

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use timegate_core::diagnostics::FixedGauge;
use timegate_core::registry::{self, EventMapping, RegistryDoc};
use timegate_core::{
    DropReason, Engine, EventOutcome, KvStore, Ledger, Settings, SkipReason,
};

fn day1(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap()
}

fn mapping(logical_id: &str, rate: u32, minutes: u32) -> EventMapping {
    EventMapping {
        logical_id: logical_id.into(),
        display_name: logical_id.into(),
        category: "learning".into(),
        reward_rate_per_minute: rate,
        threshold_seconds: u64::from(minutes) * 60,
    }
}

/// Registry arming minute thresholds 1..=30 for one entity.
fn registry_doc(generation: u32, armed_at: Option<DateTime<Utc>>) -> RegistryDoc {
    let mut mappings = HashMap::new();
    for minute in 1..=30 {
        mappings.insert(
            format!("app0-min{minute}-gen{generation}"),
            mapping("duolingo", 10, minute),
        );
    }
    RegistryDoc {
        generation,
        armed_at,
        mappings,
    }
}

fn engine_with(doc: &RegistryDoc) -> Engine {
    let store = KvStore::open_memory().unwrap();
    registry::save(&store, doc).unwrap();
    Engine::new(store, Settings::default()).with_memory_gauge(Box::new(FixedGauge(1_000_000)))
}

fn today_seconds(engine: &Engine, logical_id: &str) -> u64 {
    let ledger = Ledger::new(engine.store(), engine.settings().ledger.clone());
    ledger.load_counter(logical_id).unwrap().today_seconds
}

#[test]
fn test_ten_minute_cadence_accumulates_exactly() {
    // Ten threshold events at minute marks with no gaps: 600 seconds and
    // 100 points at 10 points per minute, not a second more.
    let mut engine = engine_with(&registry_doc(1, None));

    let mut last = None;
    for minute in 1..=10u32 {
        let report = engine
            .handle_event(&format!("app0-min{minute}-gen1"), day1(minute))
            .unwrap();
        last = Some(report);
    }

    let report = last.unwrap();
    match report.outcome {
        EventOutcome::Recorded {
            delta_seconds,
            today_seconds,
            ..
        } => {
            assert_eq!(delta_seconds, 60);
            assert_eq!(today_seconds, 600);
        }
        other => panic!("expected recorded outcome, got {other:?}"),
    }

    let ledger = Ledger::new(engine.store(), engine.settings().ledger.clone());
    let counter = ledger.load_counter("duolingo").unwrap();
    assert_eq!(counter.today_seconds, 600);
    assert_eq!(counter.today_points, 100);
    assert_eq!(counter.session_peak_secs, 600);
}

#[test]
fn test_restart_guard_suppresses_catchup_event() {
    // Monitoring restarts after minute 5 (peak 300). The first
    // post-restart event regresses to threshold 60 inside the 50s guard
    // window: skipped, today stays at 300.
    let mut engine = engine_with(&registry_doc(1, None));
    for minute in 1..=5u32 {
        engine
            .handle_event(&format!("app0-min{minute}-gen1"), day1(minute))
            .unwrap();
    }
    assert_eq!(today_seconds(&engine, "duolingo"), 300);

    let rearmed_at = day1(5) + Duration::seconds(10);
    registry::save(engine.store(), &registry_doc(2, Some(rearmed_at))).unwrap();

    let report = engine
        .handle_event("app0-min1-gen2", day1(5) + Duration::seconds(30))
        .unwrap();
    assert!(matches!(
        report.outcome,
        EventOutcome::Skipped {
            reason: SkipReason::RestartNoise
        }
    ));
    assert_eq!(today_seconds(&engine, "duolingo"), 300);
}

#[test]
fn test_replaying_an_event_is_idempotent() {
    let mut engine = engine_with(&registry_doc(1, None));

    engine.handle_event("app0-min1-gen1", day1(1)).unwrap();
    let after_once = today_seconds(&engine, "duolingo");

    // Redelivery of the same threshold within the rapid-fire window.
    let replay = engine
        .handle_event("app0-min1-gen1", day1(1) + Duration::seconds(5))
        .unwrap();
    assert!(matches!(
        replay.outcome,
        EventOutcome::Skipped {
            reason: SkipReason::Duplicate
        }
    ));
    assert_eq!(today_seconds(&engine, "duolingo"), after_once);
}

#[test]
fn test_no_double_count_across_day_rollover() {
    let mut engine = engine_with(&registry_doc(1, None));

    // Day one: three minutes.
    for minute in 1..=3u32 {
        engine
            .handle_event(&format!("app0-min{minute}-gen1"), day1(minute))
            .unwrap();
    }
    assert_eq!(today_seconds(&engine, "duolingo"), 180);

    // Day two opens with a fresh monitoring session starting over at
    // threshold 60.
    let day2 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    let report = engine.handle_event("app0-min1-gen1", day2).unwrap();
    match report.outcome {
        EventOutcome::Recorded {
            delta_seconds,
            today_seconds,
            ..
        } => {
            assert_eq!(delta_seconds, 60);
            assert_eq!(today_seconds, 60);
        }
        other => panic!("expected recorded outcome, got {other:?}"),
    }

    // Yesterday's 180 seconds are archived, not merged into today.
    let ledger = Ledger::new(engine.store(), engine.settings().ledger.clone());
    let history = ledger.history("duolingo", 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].seconds, 180);
    assert_eq!(history[0].date, day1(0).date_naive());

    let counter = ledger.load_counter("duolingo").unwrap();
    assert_eq!(counter.total_seconds, 240);
}

#[test]
fn test_stale_generation_event_is_ignored() {
    let mut engine = engine_with(&registry_doc(2, None));

    let report = engine.handle_event("app0-min1-gen1", day1(1)).unwrap();
    assert!(matches!(
        report.outcome,
        EventOutcome::Dropped {
            reason: DropReason::StaleGeneration
        }
    ));
    assert_eq!(report.sequence, None);
    assert_eq!(today_seconds(&engine, "duolingo"), 0);
}

#[test]
fn test_unknown_event_never_fabricates_usage() {
    let mut engine = engine_with(&registry_doc(1, None));

    let report = engine.handle_event("app7-min1-gen1", day1(1)).unwrap();
    assert!(matches!(
        report.outcome,
        EventOutcome::Dropped {
            reason: DropReason::MappingMissing
        }
    ));

    let ledger = Ledger::new(engine.store(), engine.settings().ledger.clone());
    let (summary, _) = ledger.stats(day1(2)).unwrap();
    assert_eq!(summary.entities, 0);
}

#[test]
fn test_sequence_advances_only_on_recorded_usage() {
    let mut engine = engine_with(&registry_doc(1, None));

    let first = engine.handle_event("app0-min1-gen1", day1(1)).unwrap();
    let dup = engine
        .handle_event("app0-min1-gen1", day1(1) + Duration::seconds(5))
        .unwrap();
    let second = engine.handle_event("app0-min2-gen1", day1(2)).unwrap();

    assert_eq!(first.sequence, Some(1));
    assert_eq!(dup.sequence, None);
    assert_eq!(second.sequence, Some(2));
}
