//! Text mutation lock: any label is reachable from any other by accepting
//! only edits that bring it closer.
//!
//! Every text mutation is a single insert, delete or replace, so an
//! accepted edit lowers the edit distance by exactly one.

use recrash_kernel::mutate::{MutationPolicy, MutationReport, Mutator};
use recrash_kernel::value::Value;

const MAX_ITERATIONS: usize = 200_000;

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            row.push(substitute.min(prev[j + 1] + 1).min(row[j] + 1));
        }
        prev = row;
    }
    prev[b.len()]
}

fn text(value: &Value) -> &str {
    match value {
        Value::Text(s) => s,
        other => panic!("not text: {other:?}"),
    }
}

/// Greedy descent; returns the number of accepted edits.
fn descend(from: &str, to: &str, seed: u64) -> usize {
    let mut mutator = Mutator::new(MutationPolicy::default(), seed);
    let mut current = Value::text(from);
    let mut distance = levenshtein(from, to);
    let mut accepted = 0;
    for _ in 0..MAX_ITERATIONS {
        if distance == 0 {
            return accepted;
        }
        let mut candidate = current.clone();
        let mut report = MutationReport::default();
        assert!(mutator.mutate(&mut candidate, "label", &mut report));
        assert_ne!(text(&candidate), text(&current));
        let d = levenshtein(text(&candidate), to);
        if d < distance {
            assert_eq!(d + 1, distance, "one edit moved {} steps", distance - d);
            distance = d;
            current = candidate;
            accepted += 1;
        }
    }
    panic!("{from:?} did not reach {to:?} within {MAX_ITERATIONS} mutations");
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: distance check
// ---------------------------------------------------------------------------

#[test]
fn levenshtein_reference_values() {
    assert_eq!(levenshtein("", ""), 0);
    assert_eq!(levenshtein("abc", ""), 3);
    assert_eq!(levenshtein("kitten", "sitting"), 3);
    assert_eq!(levenshtein("xyz", "retry-3"), 6);
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: greedy descent reaches the target label
// ---------------------------------------------------------------------------

#[test]
fn greedy_text_mutation_reaches_the_target_label() {
    let accepted = descend("xyz", "retry-3", 11);
    assert_eq!(accepted, levenshtein("xyz", "retry-3"));
}

#[test]
fn empty_label_grows_into_the_target() {
    assert_eq!(descend("", "ok", 3), 2);
}

#[test]
fn long_label_shrinks_into_the_target() {
    assert_eq!(descend("abcdefgh", "ace", 5), 5);
}
