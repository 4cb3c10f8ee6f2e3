//! Trial log lock: an engine run writes one parseable JSON line per trial,
//! in trial order, to a real file.

use std::fs;

use lock_tests::fixtures::{counter_snapshot, drift_snapshot};
use recrash_harness::engine::{Engine, EnginePolicy};
use recrash_harness::trial_log::JsonlTrialLog;
use recrash_search::trial::{Phase, TrialEvent, TrialVerdict};

fn read_events(path: &std::path::Path) -> Vec<TrialEvent> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: one line per trial
// ---------------------------------------------------------------------------

#[test]
fn counter_run_logs_both_phases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trials.jsonl");
    let mut log = JsonlTrialLog::create(&path).unwrap();
    let report = Engine::new(EnginePolicy::default())
        .unwrap()
        .run(&counter_snapshot(2), &mut log)
        .unwrap();
    assert_eq!(log.lines(), report.crash_trials + report.entry_trials);
    log.finish().unwrap();

    let events = read_events(&path);
    let summary: Vec<(Phase, u64, TrialVerdict)> =
        events.iter().map(|e| (e.phase, e.trial, e.verdict)).collect();
    assert_eq!(
        summary,
        vec![
            (Phase::CrashSearch, 1, TrialVerdict::Reproduced),
            (Phase::EntrySearch, 1, TrialVerdict::Converged),
        ]
    );
    assert!(events.iter().all(|e| e.exception.is_some()));
}

#[test]
fn entry_trials_are_logged_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drift.jsonl");
    let mut log = JsonlTrialLog::create(&path).unwrap();
    let report = Engine::new(EnginePolicy::default())
        .unwrap()
        .run(&drift_snapshot(107, 0), &mut log)
        .unwrap();
    log.finish().unwrap();

    let events = read_events(&path);
    let entry: Vec<u64> = events
        .iter()
        .filter(|e| e.phase == Phase::EntrySearch)
        .map(|e| e.trial)
        .collect();
    assert_eq!(entry, (1..=report.entry_trials).collect::<Vec<_>>());
    assert_eq!(events.last().map(|e| e.verdict), Some(TrialVerdict::Converged));

    // Raw lines use snake_case tags.
    let first = fs::read_to_string(&path).unwrap();
    let first: serde_json::Value =
        serde_json::from_str(first.lines().next().unwrap()).unwrap();
    assert_eq!(first["phase"], "crash_search");
    assert_eq!(first["source"], "seed");
}

#[test]
fn create_fails_for_a_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(JsonlTrialLog::create(dir.path().join("absent").join("log.jsonl")).is_err());
}
