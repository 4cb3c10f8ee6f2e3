//! Policy lock: invalid configuration is rejected before the first trial,
//! and partial JSON fills the rest from defaults.

use lock_tests::fixtures::counter_snapshot;
use recrash_harness::engine::{Engine, EngineError, EnginePolicy};
use recrash_kernel::analysis::analyze;
use recrash_search::corpus::MutationCorpus;
use recrash_search::crash::CrashReproducer;
use recrash_search::entry::EntryStateSearcher;
use recrash_search::error::SearchError;
use recrash_search::policy::{AssistantPolicy, CrashSearchPolicy, EntrySearchPolicy};
use recrash_search::trial::MemorySink;

fn broken_crash_policies() -> Vec<(&'static str, CrashSearchPolicy)> {
    let mut zero_width = CrashSearchPolicy::default();
    zero_width.mutation.int_bit_width = 0;
    let mut wide = CrashSearchPolicy::default();
    wide.mutation.int_bit_width = 65;
    let mut probability = CrashSearchPolicy::default();
    probability.mutation.removal_probability = 1.5;
    let mut tolerance = CrashSearchPolicy::default();
    tolerance.compare.float_tolerance = 0.0;
    let budget = CrashSearchPolicy {
        max_trials: 0,
        ..CrashSearchPolicy::default()
    };
    vec![
        ("bit width 0", zero_width),
        ("bit width 65", wide),
        ("probability 1.5", probability),
        ("tolerance 0", tolerance),
        ("zero budget", budget),
    ]
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: rejected before any trial runs
// ---------------------------------------------------------------------------

#[test]
fn crash_search_rejects_invalid_policies_without_running() {
    let snapshot = counter_snapshot(1);
    for (label, policy) in broken_crash_policies() {
        let mut corpus = MutationCorpus::new();
        let mut sink = MemorySink::default();
        let result = CrashReproducer::new(policy).search(&snapshot, &mut corpus, &mut sink);
        assert!(
            matches!(result, Err(SearchError::InvalidPolicy { .. })),
            "{label}"
        );
        assert!(sink.events.is_empty(), "{label}");
        assert!(corpus.is_empty(), "{label}");
    }
}

#[test]
fn entry_search_rejects_an_invalid_assistant() {
    let snapshot = counter_snapshot(1);
    let decl = analyze(snapshot.target().source().unwrap(), "bump").unwrap();
    let policy = EntrySearchPolicy {
        assistant: AssistantPolicy {
            learning_rate: 0.0,
            ..AssistantPolicy::default()
        },
        ..EntrySearchPolicy::default()
    };
    let mut sink = MemorySink::default();
    let result = EntryStateSearcher::new(policy).reproduce(
        snapshot.original(),
        &snapshot,
        &decl,
        &mut MutationCorpus::new(),
        &mut sink,
    );
    assert!(matches!(result, Err(SearchError::InvalidPolicy { .. })));
    assert!(sink.events.is_empty());
}

#[test]
fn a_disabled_assistant_is_not_validated() {
    let policy = EntrySearchPolicy {
        assistant: AssistantPolicy {
            enabled: false,
            min_trials: 0,
            ..AssistantPolicy::default()
        },
        ..EntrySearchPolicy::default()
    };
    assert!(policy.validate().is_ok());
}

#[test]
fn engine_rejects_invalid_phase_policies() {
    for (label, crash) in broken_crash_policies() {
        let err = Engine::new(EnginePolicy {
            crash,
            ..EnginePolicy::default()
        })
        .unwrap_err();
        assert!(
            matches!(err, EngineError::Search(SearchError::InvalidPolicy { .. })),
            "{label}"
        );
    }
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: partial JSON
// ---------------------------------------------------------------------------

#[test]
fn partial_json_takes_defaults_for_missing_fields() {
    let policy: CrashSearchPolicy =
        serde_json::from_str(r#"{"seed": 9, "mutation": {"int_bit_width": 8}}"#).unwrap();
    assert_eq!(policy.seed, 9);
    assert_eq!(policy.mutation.int_bit_width, 8);
    assert_eq!(policy.max_trials, CrashSearchPolicy::default().max_trials);
    assert_eq!(policy.compare, CrashSearchPolicy::default().compare);
    assert!(policy.validate().is_ok());

    let engine = EnginePolicy::from_json_str(
        r#"{"entry": {"assistant": {"enabled": false}}, "crash": {"seed": 3}}"#,
    )
    .unwrap();
    assert!(!engine.entry.assistant.enabled);
    assert_eq!(engine.crash.seed, 3);
    assert_eq!(engine.entry.max_trials, EntrySearchPolicy::default().max_trials);
}

#[test]
fn json_with_an_out_of_range_field_is_rejected() {
    let err = EnginePolicy::from_json_str(r#"{"crash": {"mutation": {"int_bit_width": 65}}}"#)
        .unwrap_err();
    assert!(matches!(err, EngineError::Search(SearchError::InvalidPolicy { .. })));
}
