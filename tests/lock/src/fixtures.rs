//! Crash snapshots for the bundled programs.
//!
//! Each builder captures the snapshot the way an interceptor would: by
//! running the program and recording the raising frame. Builders that take
//! a corrupted original overwrite the captured entry state afterwards, so
//! the bug state stays genuine while the recorded inputs are wrong.

use std::rc::Rc;

use recrash_harness::engine::{capture_call, Capture};
use recrash_harness::programs::{drift, Counter, Drift, Ledger};
use recrash_kernel::value::{Bindings, Value};
use recrash_search::contract::{Environment, Raised, TargetFunction};
use recrash_search::execute::{invoke, TrialOutcome};
use recrash_search::snapshot::CrashSnapshot;
use recrash_search::state::EntryState;

/// Run `target` until it crashes, at most `calls` times.
///
/// # Panics
///
/// Panics if the target never raises or panics. Test-only invariant.
pub fn capture_nth(
    target: Rc<dyn TargetFunction>,
    args: &[Value],
    globals: Bindings,
    calls: usize,
) -> CrashSnapshot {
    let mut env = Environment::new(globals);
    for _ in 0..calls {
        match capture_call(&target, args.to_vec(), Bindings::new(), &mut env) {
            Capture::Returned(_) => {}
            Capture::Crashed(snapshot) => return snapshot,
            Capture::Panicked { detail } => panic!("target panicked: {detail}"),
        }
    }
    panic!("no crash within {calls} calls");
}

/// `bump(a)` crashing on its third call from `g == 0`.
#[must_use]
pub fn counter_snapshot(a: i64) -> CrashSnapshot {
    capture_nth(
        Rc::new(Counter),
        &[Value::Int(a)],
        Bindings::from([("g".to_string(), Value::Int(0))]),
        3,
    )
}

/// Same crash, but the recorded globals were read after the call
/// (`g == 3`), so replaying the recording does not crash.
#[must_use]
pub fn counter_snapshot_late_capture(a: i64) -> CrashSnapshot {
    let captured = counter_snapshot(a);
    let late = EntryState::new(
        vec![Value::Int(a)],
        Bindings::new(),
        Bindings::from([("g".to_string(), Value::Int(3))]),
    );
    captured.with_original(late)
}

/// `drift(5)` whose final `level` is `final_level`, recorded with the
/// wrong starting level `recorded_level`.
#[must_use]
pub fn drift_snapshot(final_level: i64, recorded_level: i64) -> CrashSnapshot {
    let captured = capture_nth(
        Rc::new(Drift),
        &[Value::Int(5)],
        Bindings::from([(
            "level".to_string(),
            Value::Int(final_level - drift::STEP),
        )]),
        1,
    );
    let recorded = EntryState::new(
        vec![Value::Int(5)],
        Bindings::new(),
        Bindings::from([("level".to_string(), Value::Int(recorded_level))]),
    );
    captured.with_original(recorded)
}

/// `settle(book, fee)` overdrawing a shared account.
#[must_use]
pub fn ledger_snapshot(balance: i64, fee: i64) -> CrashSnapshot {
    let account = recrash_harness::programs::ledger::book(balance, "ada");
    capture_nth(
        Rc::new(Ledger),
        &[account.clone(), Value::Int(fee)],
        recrash_harness::programs::ledger::globals(&account),
        1,
    )
}

/// Replay `entry` and return the raise.
///
/// # Panics
///
/// Panics if the replay does not raise. Test-only invariant.
#[must_use]
pub fn replay_raise(target: &dyn TargetFunction, entry: &EntryState) -> Raised {
    match invoke(target, entry) {
        TrialOutcome::Raised(raised) => raised,
        other => panic!("replay did not raise: {other:?}"),
    }
}
