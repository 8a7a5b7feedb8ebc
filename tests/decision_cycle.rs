//! Decision Cycle Integration Tests
//!
//! Drives `DecisionCycle::tick()` against the in-process simulated refinery
//! and the in-memory store. No database, no network, no drift task: the
//! simulator only changes when a test sets a value or writes parameters.

use refinery_advisor::acquisition::{FallbackReason, FieldDataReader, SimulatedRefinery};
use refinery_advisor::applier::ParameterApplier;
use refinery_advisor::config::{CycleConfig, HeuristicConfig};
use refinery_advisor::optimizer::DecisionHeuristic;
use refinery_advisor::pipeline::{DecisionCycle, DecisionOutcome};
use refinery_advisor::storage::{DecisionStore, InMemoryStore};
use refinery_advisor::types::{ControlSource, DecisionKind, Readings, UrgencyLevel};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(1);

fn build_cycle(
    sim: &SimulatedRefinery,
    store: &Arc<InMemoryStore>,
    heuristic: HeuristicConfig,
    cycle: CycleConfig,
) -> DecisionCycle<SimulatedRefinery, InMemoryStore> {
    let endpoint = Arc::new(sim.clone());
    let reader = FieldDataReader::new(Arc::clone(&endpoint), TIMEOUT);
    let applier = Arc::new(ParameterApplier::new(endpoint, TIMEOUT));
    DecisionCycle::new(
        reader,
        applier,
        Arc::clone(store),
        DecisionHeuristic::new(&heuristic),
        cycle,
    )
    .with_seed(7)
}

fn default_cycle(sim: &SimulatedRefinery, store: &Arc<InMemoryStore>) -> DecisionCycle<SimulatedRefinery, InMemoryStore> {
    build_cycle(sim, store, HeuristicConfig::default(), CycleConfig::default())
}

/// A quality index of 38 is CRITICAL: one tick stores a decision that raises
/// the crude flow and lowers the recirculation flow.
#[tokio::test]
async fn test_critical_reading_stores_decision() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 38.0);
    let store = Arc::new(InMemoryStore::new());
    let mut cycle = default_cycle(&sim, &store);

    let report = cycle.tick().await.unwrap();
    assert!(report.fallback.is_none());
    assert!(report.sample_stored);
    assert_eq!(report.bit_tq, 38.0);
    assert_eq!(report.urgency, UrgencyLevel::Critical);
    assert_eq!(report.next_sleep, Duration::from_secs(10));
    assert!(matches!(report.decision, DecisionOutcome::Stored { .. }));

    let decisions = store.decisions();
    assert_eq!(decisions.len(), 1);
    let decision = &decisions[0];
    assert_eq!(decision.decision_type, DecisionKind::AiOptimization);
    assert!(!decision.applied);
    assert!(decision.anomaly_detected);
    assert!((0.5..=1.0).contains(&decision.confidence));
    assert!(decision.predicted_bit_tq >= 38.0);
    assert!(decision.parameter_changes.get("fc1065").unwrap() > 127.3);
    assert!(decision.parameter_changes.get("fc31007").unwrap() < 89.1);
    assert_eq!(decision.baseline_values.get("fc1065"), Some(127.3));

    let samples = store.samples();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].bit_tq, Some(38.0));
    assert_eq!(samples[0].data_source, ControlSource::HumanControl);

    assert!(cycle.last_decision_at().is_some());
    assert_eq!(sim.open_sessions(), 0, "every session must be closed");
}

/// Inside the cooldown the gate refuses, but the sample is still stored.
#[tokio::test]
async fn test_cooldown_rate_limits_back_to_back_ticks() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 38.0);
    let store = Arc::new(InMemoryStore::new());
    let mut cycle = default_cycle(&sim, &store);

    cycle.tick().await.unwrap();
    let first_clock = cycle.last_decision_at();

    let report = cycle.tick().await.unwrap();
    assert_eq!(report.decision, DecisionOutcome::NotWarranted);
    assert_eq!(cycle.last_decision_at(), first_clock);
    assert_eq!(store.decisions().len(), 1);
    assert_eq!(store.samples().len(), 2);
}

/// With no cooldown the gate passes again, but the recent unapplied decision
/// blocks a second insert.
#[tokio::test]
async fn test_pending_decision_blocks_new_one() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 42.0);
    let store = Arc::new(InMemoryStore::new());
    let heuristic = HeuristicConfig {
        cooldown_secs: 0,
        ..HeuristicConfig::default()
    };
    let mut cycle = build_cycle(&sim, &store, heuristic, CycleConfig::default());

    assert!(matches!(
        cycle.tick().await.unwrap().decision,
        DecisionOutcome::Stored { .. }
    ));
    assert_eq!(
        cycle.tick().await.unwrap().decision,
        DecisionOutcome::PendingExists { pending: 1 }
    );
    assert_eq!(store.decisions().len(), 1);
    assert_eq!(store.count_pending(None).await.unwrap(), 1);
}

/// A proposal discarded by the pending check leaves the cooldown clock alone,
/// so the tick right after the operator applies the pending decision stores
/// a new one.
#[tokio::test]
async fn test_pending_check_does_not_restart_cooldown() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 38.0);
    let store = Arc::new(InMemoryStore::new());
    let mut cycle = default_cycle(&sim, &store);

    let readings = Readings {
        bit_tq: Some(38.0),
        ..Readings::fallback_base()
    };
    let forced = DecisionHeuristic::default().force_propose(&readings, Utc::now());
    store.insert_decision(&forced).await.unwrap();

    assert_eq!(
        cycle.tick().await.unwrap().decision,
        DecisionOutcome::PendingExists { pending: 1 }
    );
    assert!(cycle.last_decision_at().is_none());

    assert!(store.mark_applied(forced.timestamp).await.unwrap());
    let report = cycle.tick().await.unwrap();
    assert!(
        matches!(report.decision, DecisionOutcome::Stored { .. }),
        "got {:?}",
        report.decision
    );
    assert!(cycle.last_decision_at().is_some());
    assert_eq!(store.decisions().len(), 2);
}

/// A tick that fails at the store leaves the clock where it was.
#[tokio::test]
async fn test_store_failure_does_not_advance_clock() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 38.0);
    let store = Arc::new(InMemoryStore::new());
    let mut cycle = default_cycle(&sim, &store);

    store.set_available(false);
    assert!(cycle.tick().await.is_err());
    assert!(cycle.last_decision_at().is_none());

    store.set_available(true);
    assert!(matches!(
        cycle.tick().await.unwrap().decision,
        DecisionOutcome::Stored { .. }
    ));
}

/// A healthy process produces samples and nothing else.
#[tokio::test]
async fn test_healthy_process_no_decision() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 55.0);
    let store = Arc::new(InMemoryStore::new());
    let mut cycle = default_cycle(&sim, &store);

    for _ in 0..3 {
        let report = cycle.tick().await.unwrap();
        assert_eq!(report.decision, DecisionOutcome::NotWarranted);
        assert_eq!(report.urgency, UrgencyLevel::Normal);
        assert_eq!(report.next_sleep, Duration::from_secs(25));
    }
    assert!(store.decisions().is_empty());
    assert_eq!(store.samples().len(), 3);
    assert!(cycle.last_decision_at().is_none());
}

/// With the auto-apply policy enabled the stored decision is written to the
/// field straight away and marked applied.
#[tokio::test]
async fn test_auto_apply_writes_and_marks() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 38.0);
    let store = Arc::new(InMemoryStore::new());
    let cycle_config = CycleConfig {
        auto_apply_min_confidence: Some(0.0),
        ..CycleConfig::default()
    };
    let mut cycle = build_cycle(&sim, &store, HeuristicConfig::default(), cycle_config);

    let report = cycle.tick().await.unwrap();
    match report.decision {
        DecisionOutcome::AutoApplied { applied_count, .. } => assert_eq!(applied_count, 4),
        other => panic!("expected auto-apply, got {other:?}"),
    }

    let decision = &store.decisions()[0];
    assert!(decision.applied);
    assert_eq!(sim.value("operator_mode"), Some(1.0));
    assert_eq!(
        sim.value("fc1065"),
        decision.parameter_changes.get("fc1065")
    );
    assert_eq!(store.count_pending(None).await.unwrap(), 0);
}

/// A confidence threshold above anything the model emits disables auto-apply.
#[tokio::test]
async fn test_auto_apply_threshold_not_met() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 38.0);
    let store = Arc::new(InMemoryStore::new());
    let cycle_config = CycleConfig {
        auto_apply_min_confidence: Some(1.01),
        ..CycleConfig::default()
    };
    let mut cycle = build_cycle(&sim, &store, HeuristicConfig::default(), cycle_config);

    assert!(matches!(
        cycle.tick().await.unwrap().decision,
        DecisionOutcome::Stored { .. }
    ));
    assert!(sim.writes().is_empty());
    assert!(!store.decisions()[0].applied);
}

/// An unreachable endpoint never fails the tick: the fallback dataset is
/// stored and still drives a decision (45.2 is below target).
#[tokio::test]
async fn test_unreachable_field_uses_fallback() {
    let sim = SimulatedRefinery::new();
    sim.set_reachable(false);
    let store = Arc::new(InMemoryStore::new());
    let mut cycle = default_cycle(&sim, &store);

    let report = cycle.tick().await.unwrap();
    assert!(matches!(report.fallback, Some(FallbackReason::Unreachable(_))));
    assert!((44.7..=45.7).contains(&report.bit_tq), "bit_tq {}", report.bit_tq);
    assert!(report.sample_stored);
    assert!(matches!(report.decision, DecisionOutcome::Stored { .. }));

    sim.set_reachable(true);
    sim.set_value("bit_tq", 55.0);
    let report = cycle.tick().await.unwrap();
    assert!(report.fallback.is_none());
    assert_eq!(report.bit_tq, 55.0);
}

/// A store outage loses the sample and fails the tick at the pending check.
#[tokio::test]
async fn test_store_outage_fails_tick() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 38.0);
    let store = Arc::new(InMemoryStore::new());
    let mut cycle = default_cycle(&sim, &store);

    store.set_available(false);
    assert!(cycle.tick().await.is_err());

    store.set_available(true);
    assert!(store.samples().is_empty());
    assert!(store.decisions().is_empty());
}

/// A store outage on a healthy process only loses the sample.
#[tokio::test]
async fn test_store_outage_without_decision_keeps_ticking() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 55.0);
    let store = Arc::new(InMemoryStore::new());
    let mut cycle = default_cycle(&sim, &store);

    store.set_available(false);
    let report = cycle.tick().await.unwrap();
    assert!(!report.sample_stored);
    assert_eq!(report.decision, DecisionOutcome::NotWarranted);
}

/// `run` returns promptly once cancelled, even mid-sleep.
#[tokio::test]
async fn test_run_stops_on_cancel() {
    let sim = SimulatedRefinery::new();
    sim.set_value("bit_tq", 55.0);
    let store = Arc::new(InMemoryStore::new());
    let cycle_config = CycleConfig {
        startup_delay_secs: 0,
        ..CycleConfig::default()
    };
    let cycle = build_cycle(&sim, &store, HeuristicConfig::default(), cycle_config);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(cycle.run(cancel.clone()));

    // First tick runs immediately; the cycle then sleeps for 25s.
    for _ in 0..100 {
        if !store.samples().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("cycle should stop after cancellation")
        .unwrap();
    assert_eq!(store.samples().len(), 1);
}
