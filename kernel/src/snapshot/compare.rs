//! Structural equality over canonical snapshots.
//!
//! Rules:
//!
//! 1. Either side opaque: equal iff type tags match.
//! 2. Atomic vs atomic: type tags must match; floats compare with an
//!    absolute tolerance, every other atom by value.
//! 3. Composite vs composite: same type tag, same shape, same child-key
//!    set, pairwise-equal children. Set-shaped nodes match children
//!    order-insensitively (each element pairs with a distinct element).
//! 4. Atomic vs composite: unequal.
//!
//! A pair of nodes already under comparison is assumed equal, which makes
//! comparison of cyclic snapshots terminate.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::{Atom, CanonicalSnapshot, NodeId, Shape, SnapshotNode};
use crate::policy::InvalidPolicy;

/// Default absolute tolerance for float comparison.
pub const DEFAULT_FLOAT_TOLERANCE: f64 = 0.01;

/// Comparison configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparePolicy {
    /// Floats `a`, `b` are equal when `|a - b| < float_tolerance`.
    pub float_tolerance: f64,
}

impl Default for ComparePolicy {
    fn default() -> Self {
        Self {
            float_tolerance: DEFAULT_FLOAT_TOLERANCE,
        }
    }
}

impl ComparePolicy {
    /// # Errors
    ///
    /// Returns [`InvalidPolicy`] if the tolerance is not a positive finite
    /// number.
    pub fn validate(&self) -> Result<(), InvalidPolicy> {
        if self.float_tolerance.is_finite() && self.float_tolerance > 0.0 {
            Ok(())
        } else {
            Err(InvalidPolicy {
                detail: format!(
                    "float_tolerance must be positive and finite, got {}",
                    self.float_tolerance
                ),
            })
        }
    }
}

/// Native structural equality.
pub trait StructuralEq {
    fn structural_eq(&self, other: &Self, policy: &ComparePolicy) -> bool;
}

impl StructuralEq for Atom {
    fn structural_eq(&self, other: &Self, policy: &ComparePolicy) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => {
                if a.is_nan() || b.is_nan() {
                    return a.is_nan() && b.is_nan();
                }
                if a.is_infinite() || b.is_infinite() {
                    return a == b;
                }
                (a - b).abs() < policy.float_tolerance
            }
            _ => self == other,
        }
    }
}

impl StructuralEq for CanonicalSnapshot {
    fn structural_eq(&self, other: &Self, policy: &ComparePolicy) -> bool {
        Comparison {
            left: self,
            right: other,
            policy,
            assumed: HashSet::new(),
        }
        .eq(self.root(), other.root())
    }
}

struct Comparison<'a> {
    left: &'a CanonicalSnapshot,
    right: &'a CanonicalSnapshot,
    policy: &'a ComparePolicy,
    assumed: HashSet<(NodeId, NodeId)>,
}

impl Comparison<'_> {
    fn eq(&mut self, l: NodeId, r: NodeId) -> bool {
        if self.assumed.contains(&(l, r)) {
            return true;
        }
        match (self.left.node(l), self.right.node(r)) {
            (SnapshotNode::Opaque { type_tag: a }, other)
            | (other, SnapshotNode::Opaque { type_tag: a }) => a == other.type_tag(),
            (
                SnapshotNode::Atomic {
                    type_tag: ta,
                    atom: a,
                },
                SnapshotNode::Atomic {
                    type_tag: tb,
                    atom: b,
                },
            ) => ta == tb && a.structural_eq(b, self.policy),
            (
                SnapshotNode::Composite {
                    type_tag: ta,
                    shape: sa,
                    children: ca,
                },
                SnapshotNode::Composite {
                    type_tag: tb,
                    shape: sb,
                    children: cb,
                },
            ) => {
                if ta != tb || sa != sb || ca.len() != cb.len() {
                    return false;
                }
                self.assumed.insert((l, r));
                let equal = if *sa == Shape::Set {
                    self.eq_unordered(ca, cb)
                } else {
                    self.eq_keyed(ca, cb)
                };
                if !equal {
                    self.assumed.remove(&(l, r));
                }
                equal
            }
            _ => false,
        }
    }

    fn eq_keyed(&mut self, ca: &BTreeMap<String, NodeId>, cb: &BTreeMap<String, NodeId>) -> bool {
        for (key, &a) in ca {
            let Some(&b) = cb.get(key) else {
                return false;
            };
            if !self.eq(a, b) {
                return false;
            }
        }
        true
    }

    /// One-to-one pairing of set elements. Tolerant float equality is not
    /// transitive, so a first-fit pairing can miss a valid one; this finds
    /// a maximum matching with augmenting paths.
    fn eq_unordered(
        &mut self,
        ca: &BTreeMap<String, NodeId>,
        cb: &BTreeMap<String, NodeId>,
    ) -> bool {
        let right: Vec<NodeId> = cb.values().copied().collect();
        let mut adjacent: Vec<Vec<usize>> = Vec::with_capacity(ca.len());
        for &a in ca.values() {
            let row: Vec<usize> = (0..right.len()).filter(|&j| self.eq(a, right[j])).collect();
            if row.is_empty() {
                return false;
            }
            adjacent.push(row);
        }
        let mut owner: Vec<Option<usize>> = vec![None; right.len()];
        (0..adjacent.len()).all(|i| {
            let mut visited = vec![false; right.len()];
            augment(i, &adjacent, &mut owner, &mut visited)
        })
    }
}

fn augment(
    i: usize,
    adjacent: &[Vec<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &j in &adjacent[i] {
        if visited[j] {
            continue;
        }
        visited[j] = true;
        let free = match owner[j] {
            None => true,
            Some(k) => augment(k, adjacent, owner, visited),
        };
        if free {
            owner[j] = Some(i);
            return true;
        }
    }
    false
}

/// Differences between two sets of named snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDiff {
    /// Expected but not observed.
    pub missing: BTreeSet<String>,
    /// Observed but not expected.
    pub extra: BTreeSet<String>,
    /// Present on both sides but structurally unequal.
    pub changed: BTreeSet<String>,
}

impl BindingDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.changed.is_empty()
    }

    /// Every name that differs, in order.
    #[must_use]
    pub fn names(&self) -> BTreeSet<String> {
        self.missing
            .iter()
            .chain(&self.extra)
            .chain(&self.changed)
            .cloned()
            .collect()
    }
}

/// Compare observed bindings against expected ones.
#[must_use]
pub fn diff_bindings(
    observed: &BTreeMap<String, CanonicalSnapshot>,
    expected: &BTreeMap<String, CanonicalSnapshot>,
    policy: &ComparePolicy,
) -> BindingDiff {
    let mut diff = BindingDiff::default();
    for (name, snap) in observed {
        match expected.get(name) {
            None => {
                diff.extra.insert(name.clone());
            }
            Some(base) => {
                if !snap.structural_eq(base, policy) {
                    diff.changed.insert(name.clone());
                }
            }
        }
    }
    for name in expected.keys() {
        if !observed.contains_key(name) {
            diff.missing.insert(name.clone());
        }
    }
    diff
}
