//! End-to-end lock tests through the engine.

use lock_tests::fixtures::{
    counter_snapshot, counter_snapshot_late_capture, drift_snapshot, ledger_snapshot,
    replay_raise,
};
use recrash_harness::engine::{Engine, EngineOutcome, EnginePolicy};
use recrash_harness::programs::{counter, drift, ledger};
use recrash_kernel::value::Value;
use recrash_search::policy::CrashSearchPolicy;
use recrash_search::trial::{MemorySink, Phase, TrialSource};

fn engine() -> Engine {
    Engine::new(EnginePolicy {
        crash: CrashSearchPolicy {
            max_trials: 400,
            ..CrashSearchPolicy::default()
        },
        ..EnginePolicy::default()
    })
    .unwrap()
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: counter crash reproduced from any argument
// ---------------------------------------------------------------------------

#[test]
fn counter_replay_leaves_g_at_three_for_any_argument() {
    for a in [0, 3, -12, 1 << 20] {
        for snapshot in [counter_snapshot(a), counter_snapshot_late_capture(a)] {
            let report = engine().run(&snapshot, &mut MemorySink::default()).unwrap();
            let entry = report
                .entry()
                .unwrap_or_else(|| panic!("a={a}: {:?}", report.outcome));
            assert_eq!(entry.args, vec![Value::Int(a)]);

            let raised = replay_raise(snapshot.target(), entry);
            assert_eq!(raised.site.kind, "ValueError");
            assert_eq!(raised.site.line, counter::RAISE_LINE);
            let frame = raised.innermost_application_frame().unwrap();
            assert_eq!(frame.globals.get("g"), Some(&Value::Int(3)));
        }
    }
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: assistant closes a constant-offset gap
// ---------------------------------------------------------------------------

#[test]
fn drift_level_is_predicted_by_the_assistant() {
    let snapshot = drift_snapshot(107, 0);
    let mut sink = MemorySink::default();
    let report = engine().run(&snapshot, &mut sink).unwrap();
    let EngineOutcome::Reproduced(entry) = &report.outcome else {
        panic!("expected reproduction, got {:?}", report.outcome);
    };
    assert_eq!(
        entry.globals.get("level"),
        Some(&Value::Int(107 - drift::STEP))
    );
    assert_eq!(report.crash_trials, 1);
    assert_eq!(report.entry_trials, 3);
    let last = sink.events.last().unwrap();
    assert_eq!(last.phase, Phase::EntrySearch);
    assert_eq!(last.source, TrialSource::Assistant);
}

#[test]
fn without_the_assistant_two_flips_cannot_reach_the_target() {
    let mut policy = EnginePolicy::default();
    policy.entry.assistant.enabled = false;
    policy.entry.max_trials = 3;
    let mut sink = MemorySink::default();
    let report = Engine::new(policy)
        .unwrap()
        .run(&drift_snapshot(107, 0), &mut sink)
        .unwrap();
    // 100 has three set bits; trial 3 carries at most two flips from 0.
    assert!(matches!(report.outcome, EngineOutcome::StateTimeout));
    assert_eq!(report.entry_trials, 3);
    assert!(sink.events.iter().all(|e| e.source != TrialSource::Assistant));
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: raise inside a library frame, shared account record
// ---------------------------------------------------------------------------

#[test]
fn ledger_crash_uses_the_application_frame() {
    let snapshot = ledger_snapshot(20, 25);
    assert_eq!(snapshot.exception().line, ledger::RAISE_LINE);
    assert!(snapshot.bug_locals().contains_key("book"));
    assert!(!snapshot.bug_locals().contains_key("account"));

    let report = engine().run(&snapshot, &mut MemorySink::default()).unwrap();
    let entry = report.entry().unwrap();
    assert_eq!(entry.args[0].get_path(&["balance"]), Some(Value::Int(20)));
    assert_eq!(
        entry.globals["registry"].get_path(&["main", "balance"]),
        Some(Value::Int(20))
    );
}
