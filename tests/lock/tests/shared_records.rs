//! Identity lock: shared and cyclic records canonicalize, mutate and copy
//! as one object, never as independent copies.

use std::collections::{BTreeMap, BTreeSet};

use recrash_harness::programs::ledger;
use recrash_kernel::analysis::analyze;
use recrash_kernel::mutate::{MutationPolicy, MutationReport, Mutator};
use recrash_kernel::snapshot::canonicalize;
use recrash_kernel::snapshot::compare::{ComparePolicy, StructuralEq};
use recrash_kernel::value::{RecordRef, Value};
use recrash_search::state::EntryState;

fn owner(name: &str) -> Value {
    Value::record("Owner", vec![("name", Value::text(name))])
}

fn book(balance: i64, owner: &Value) -> Value {
    Value::record(
        "Book",
        vec![("balance", Value::Int(balance)), ("owner", owner.clone())],
    )
}

fn name_at(value: &Value, path: &[&str]) -> String {
    match value.get_path(path) {
        Some(Value::Text(s)) => s,
        other => panic!("no text at {path:?}: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: a shared record is one node
// ---------------------------------------------------------------------------

#[test]
fn shared_owner_canonicalizes_to_one_node() {
    let ada = owner("ada");
    let shared = Value::List(vec![book(10, &ada), book(20, &ada)]);
    // list + 2 books + 2 balances + owner + name
    assert_eq!(canonicalize(&shared).node_count(), 7);

    let separate = Value::List(vec![book(10, &owner("ada")), book(20, &owner("ada"))]);
    assert_eq!(canonicalize(&separate).node_count(), 9);

    // Sharing is not part of equality.
    assert!(canonicalize(&shared)
        .structural_eq(&canonicalize(&separate), &ComparePolicy::default()));
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: cycles terminate
// ---------------------------------------------------------------------------

#[test]
fn self_referential_record_is_equal_to_itself() {
    let node = RecordRef::new("Node", BTreeMap::new());
    node.set_field("value", Value::Int(1));
    node.set_field("next", Value::Record(node.clone()));
    let value = Value::Record(node.clone());

    let snapshot = canonicalize(&value);
    assert_eq!(snapshot.node_count(), 2);
    assert!(snapshot.structural_eq(&canonicalize(&value), &ComparePolicy::default()));
    assert!(value.to_json().is_object());

    let copy = value.deep_copy();
    let Some(Value::Record(copied)) = copy.get_path(&["next"]) else {
        panic!("copy lost its back edge");
    };
    let Value::Record(copy_root) = &copy else {
        panic!("copy is not a record");
    };
    assert!(copied.ptr_eq(copy_root));
    assert!(!copied.ptr_eq(&node));

    // Break the cycle so the test does not leak it.
    node.take_field("next");
    copy_root.take_field("next");
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: mutation through one path is visible through every path
// ---------------------------------------------------------------------------

#[test]
fn mutating_a_shared_field_is_visible_through_the_other_parent() {
    let ada = owner("ada");
    let mut books = Value::List(vec![book(10, &ada), book(20, &ada)]);
    let policy = MutationPolicy {
        removal_probability: 0.0,
        ..MutationPolicy::default()
    };
    let mut mutator = Mutator::new(policy, 17);
    let candidates = BTreeSet::from(["books.0.owner.name".to_string()]);
    let mut report = MutationReport::default();

    assert!(mutator.mutate_path(&mut books, "books", &candidates, &mut report));
    assert_eq!(
        report.paths(),
        BTreeSet::from(["books.0.owner.name".to_string()])
    );
    let renamed = name_at(&books, &["0", "owner", "name"]);
    assert_ne!(renamed, "ada");
    assert_eq!(name_at(&books, &["1", "owner", "name"]), renamed);
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: entry-state copies keep argument/global aliasing
// ---------------------------------------------------------------------------

#[test]
fn entry_state_copy_keeps_argument_and_global_aliasing() {
    let decl = analyze(ledger::SOURCE, "settle").unwrap();
    let account = ledger::book(50, "ada");
    let original = EntryState::new(
        vec![account.clone(), Value::Int(5)],
        BTreeMap::new(),
        ledger::globals(&account),
    );

    let mut copy = original.deep_copy();
    assert!(copy.set_path("book.balance", Value::Int(-1), &decl));
    assert_eq!(
        copy.get_path("registry.main.balance", &decl),
        Some(Value::Int(-1))
    );
    assert_eq!(
        original.get_path("registry.main.balance", &decl),
        Some(Value::Int(50))
    );
    assert_eq!(original.fingerprint(), original.deep_copy().fingerprint());
}
