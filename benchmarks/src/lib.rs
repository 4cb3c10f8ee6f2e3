//! Shared inputs for the recrash benchmark suites.

use std::rc::Rc;

use recrash_harness::engine::{capture_call, Capture};
use recrash_harness::programs::{drift, ledger, Counter, Drift};
use recrash_kernel::value::{Bindings, Value};
use recrash_search::contract::{Environment, TargetFunction};
use recrash_search::snapshot::CrashSnapshot;
use recrash_search::state::EntryState;

/// A list of `width` account records. Every `share`-th account reuses the
/// previous owner record, so the graph has real aliasing.
#[must_use]
pub fn account_graph(width: usize, share: usize) -> Value {
    let mut owner = Value::record("Owner", vec![("name", Value::text("owner-0"))]);
    let mut books = Vec::with_capacity(width);
    for i in 0..width {
        if share == 0 || i % share == 0 {
            owner = Value::record("Owner", vec![("name", Value::text(&format!("owner-{i}")))]);
        }
        let balance = i64::try_from(i).unwrap_or(i64::MAX);
        books.push(Value::record(
            "Book",
            vec![
                ("balance", Value::Int(balance)),
                ("rate", Value::Float(0.5)),
                ("owner", owner.clone()),
            ],
        ));
    }
    Value::List(books)
}

fn capture(
    target: Rc<dyn TargetFunction>,
    args: &[Value],
    globals: Bindings,
    calls: usize,
) -> Option<CrashSnapshot> {
    let mut env = Environment::new(globals);
    for _ in 0..calls {
        match capture_call(&target, args.to_vec(), Bindings::new(), &mut env) {
            Capture::Returned(_) => {}
            Capture::Crashed(snapshot) => return Some(snapshot),
            Capture::Panicked { .. } => return None,
        }
    }
    None
}

/// `bump(4)` crashing on its third call. `None` only if the program
/// changed behavior.
#[must_use]
pub fn counter_crash() -> Option<CrashSnapshot> {
    capture(
        Rc::new(Counter),
        &[Value::Int(4)],
        Bindings::from([("g".to_string(), Value::Int(0))]),
        3,
    )
}

/// `drift(5)` ending at `level == 107`, recorded as starting from 0.
#[must_use]
pub fn drift_crash() -> Option<CrashSnapshot> {
    let captured = capture(
        Rc::new(Drift),
        &[Value::Int(5)],
        Bindings::from([("level".to_string(), Value::Int(107 - drift::STEP))]),
        1,
    )?;
    let recorded = EntryState::new(
        vec![Value::Int(5)],
        Bindings::new(),
        Bindings::from([("level".to_string(), Value::Int(0))]),
    );
    Some(captured.with_original(recorded))
}

/// Entry state of `settle` with the account shared between argument and
/// registry.
#[must_use]
pub fn ledger_entry(balance: i64) -> EntryState {
    let account = ledger::book(balance, "ada");
    EntryState::new(
        vec![account.clone(), Value::Int(5)],
        Bindings::new(),
        ledger::globals(&account),
    )
}
