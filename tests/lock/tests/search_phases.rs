//! Phase lock tests: one-trial reproduction from a faithful capture,
//! determinism under a fixed seed, and explicit budget outcomes.

use lock_tests::fixtures::{counter_snapshot, counter_snapshot_late_capture, drift_snapshot};
use recrash_kernel::analysis::analyze;
use recrash_kernel::value::Value;
use recrash_search::corpus::MutationCorpus;
use recrash_search::crash::{CrashReproducer, CrashSearchResult};
use recrash_search::entry::{EntrySearchResult, EntryStateSearcher};
use recrash_search::policy::{CrashSearchPolicy, EntrySearchPolicy};
use recrash_search::trial::{MemorySink, TrialSource, TrialVerdict};

// ---------------------------------------------------------------------------
// ACCEPTANCE: faithful capture reproduces on the first trial
// ---------------------------------------------------------------------------

#[test]
fn crash_search_returns_on_trial_one_for_a_faithful_capture() {
    for a in [0, 1, -7, 40_000] {
        let snapshot = counter_snapshot(a);
        let mut corpus = MutationCorpus::new();
        let mut sink = MemorySink::default();
        let result = CrashReproducer::new(CrashSearchPolicy::default())
            .search(&snapshot, &mut corpus, &mut sink)
            .unwrap();
        let CrashSearchResult::Reproduced { entry, trial } = result else {
            panic!("a={a}: expected reproduction");
        };
        assert_eq!(trial, 1, "a={a}");
        assert_eq!(&entry, snapshot.original(), "a={a}");
        assert_eq!(sink.events[0].source, TrialSource::Seed);
        assert_eq!(sink.events[0].verdict, TrialVerdict::Reproduced);
    }
}

#[test]
fn entry_search_converges_in_one_trial_from_the_true_state() {
    let snapshot = counter_snapshot(9);
    let decl = analyze(snapshot.target().source().unwrap(), "bump").unwrap();
    let mut sink = MemorySink::default();
    let result = EntryStateSearcher::new(EntrySearchPolicy::default())
        .reproduce(
            snapshot.original(),
            &snapshot,
            &decl,
            &mut MutationCorpus::new(),
            &mut sink,
        )
        .unwrap();
    assert!(matches!(result, EntrySearchResult::Converged { trial: 1, .. }));
    assert_eq!(sink.events.len(), 1);
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: fixed seed ⇒ identical trial sequence
// ---------------------------------------------------------------------------

#[test]
fn crash_search_is_deterministic_for_a_seed() {
    let policy = CrashSearchPolicy {
        max_trials: 400,
        seed: 42,
        ..CrashSearchPolicy::default()
    };
    let run = || {
        let mut sink = MemorySink::default();
        let result = CrashReproducer::new(policy.clone())
            .search(
                &counter_snapshot_late_capture(2),
                &mut MutationCorpus::new(),
                &mut sink,
            )
            .unwrap();
        (result.is_reproduced(), sink.events)
    };
    let (first_ok, first) = run();
    let (second_ok, second) = run();
    assert!(first_ok);
    assert_eq!(first_ok, second_ok);
    assert_eq!(first, second);
}

#[test]
fn late_capture_is_searched_back_to_the_crashing_input() {
    let snapshot = counter_snapshot_late_capture(2);
    let policy = CrashSearchPolicy {
        max_trials: 400,
        ..CrashSearchPolicy::default()
    };
    let mut sink = MemorySink::default();
    let result = CrashReproducer::new(policy)
        .search(&snapshot, &mut MutationCorpus::new(), &mut sink)
        .unwrap();
    let CrashSearchResult::Reproduced { entry, trial } = result else {
        panic!("expected reproduction");
    };
    assert!(trial > 1);
    assert_eq!(entry.globals.get("g"), Some(&Value::Int(2)));
    assert_eq!(sink.events[0].verdict, TrialVerdict::Returned);
    assert!(sink.events[1..]
        .iter()
        .all(|e| e.source == TrialSource::Mutation));
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: budgets end in explicit outcomes
// ---------------------------------------------------------------------------

#[test]
fn entry_budget_exhaustion_is_a_timeout() {
    let snapshot = drift_snapshot(107, 0);
    let decl = analyze(snapshot.target().source().unwrap(), "drift").unwrap();
    let policy = EntrySearchPolicy {
        max_trials: 1,
        ..EntrySearchPolicy::default()
    };
    let mut sink = MemorySink::default();
    let result = EntryStateSearcher::new(policy)
        .reproduce(
            snapshot.original(),
            &snapshot,
            &decl,
            &mut MutationCorpus::new(),
            &mut sink,
        )
        .unwrap();
    assert!(matches!(result, EntrySearchResult::Timeout { trials: 1 }));
    assert_eq!(sink.events[0].verdict, TrialVerdict::StateMismatch);
}
