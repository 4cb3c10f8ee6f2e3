//! Type-directed mutation operators.
//!
//! [`Mutator::mutate`] is guaranteed-changing: it returns `true` only after
//! some leaf really changed, and `false` for the documented no-op inputs
//! (`None`, callables, opaque values, single-member enums, and composites
//! with no mutable descendant). Composite children are edited in place, so
//! a record reached through a shared reference is changed for every holder.
//!
//! Record children are taken out of the record while they are being
//! mutated and put back afterwards. A cycle that leads back into a record
//! therefore never meets a live `RefCell` borrow, and `max_depth` bounds the
//! walk.

mod scalar;

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::policy::{check_probability, InvalidPolicy};
use crate::value::{join_path, Value};

/// Mutation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationPolicy {
    /// Integer mutation flips one bit in `0..int_bit_width`.
    pub int_bit_width: u32,
    /// Chance that a listed candidate field is removed or nulled instead
    /// of mutated.
    pub removal_probability: f64,
    /// Chance of descending into a nested composite rather than mutating a
    /// field at the current level.
    pub nested_descent_probability: f64,
    /// Recursion cap for nested composites.
    pub max_depth: usize,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            int_bit_width: 16,
            removal_probability: 0.2,
            nested_descent_probability: 0.5,
            max_depth: 32,
        }
    }
}

impl MutationPolicy {
    /// # Errors
    ///
    /// Returns [`InvalidPolicy`] if the bit width is 0 or above 64, or a
    /// probability lies outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), InvalidPolicy> {
        if self.int_bit_width == 0 || self.int_bit_width > 64 {
            return Err(InvalidPolicy::new(format!(
                "int_bit_width must be in 1..=64, got {}",
                self.int_bit_width
            )));
        }
        check_probability("removal_probability", self.removal_probability)?;
        check_probability("nested_descent_probability", self.nested_descent_probability)?;
        Ok(())
    }
}

/// What one mutation call did, keyed by dotted path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationReport {
    /// Leaf path → value written there.
    pub changes: BTreeMap<String, Value>,
    /// Paths whose field or key was deleted.
    pub removed: BTreeSet<String>,
}

impl MutationReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.changes.is_empty() || !self.removed.is_empty()
    }

    /// Every touched path.
    #[must_use]
    pub fn paths(&self) -> BTreeSet<String> {
        self.changes
            .keys()
            .chain(&self.removed)
            .cloned()
            .collect()
    }

    /// Fold another report in; later writes win.
    pub fn merge(&mut self, other: MutationReport) {
        for path in other.removed {
            self.changes.remove(&path);
            self.removed.insert(path);
        }
        for (path, value) in other.changes {
            self.removed.remove(&path);
            self.changes.insert(path, value);
        }
    }

    fn record(&mut self, path: &str, value: &Value) {
        self.removed.remove(path);
        self.changes.insert(path.to_string(), value.clone());
    }

    fn record_removal(&mut self, path: &str) {
        self.changes.remove(path);
        self.removed.insert(path.to_string());
    }
}

/// Seeded mutation engine.
#[derive(Debug, Clone)]
pub struct Mutator {
    policy: MutationPolicy,
    rng: StdRng,
}

impl Mutator {
    #[must_use]
    pub fn new(policy: MutationPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &MutationPolicy {
        &self.policy
    }

    /// The mutator's random stream, shared with callers that make search
    /// decisions so one seed drives the whole run.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Change exactly one leaf somewhere under `value`.
    ///
    /// `path` is the dotted path of `value` itself and prefixes every
    /// reported change. Returns `false` for no-op inputs.
    pub fn mutate(&mut self, value: &mut Value, path: &str, report: &mut MutationReport) -> bool {
        self.mutate_at(value, path, report, 0)
    }

    /// Like [`Mutator::mutate`], biased toward shallow fields: a nested
    /// composite child is entered only with `nested_descent_probability`,
    /// so the chance of reaching depth `d` falls geometrically.
    pub fn mutate_shallow(
        &mut self,
        value: &mut Value,
        path: &str,
        report: &mut MutationReport,
    ) -> bool {
        self.mutate_biased(value, path, report, 0)
    }

    /// Mutate only along `candidates`, a set of dotted paths rooted at
    /// `path`.
    ///
    /// Every child that is a candidate or leads to one is visited. A child
    /// that is itself listed is, with `removal_probability`, deleted or set
    /// to `None` (even odds; sequence elements are only nulled) instead of
    /// being mutated. When nothing under `value` is listed but `path` is,
    /// `value` gets an ordinary [`Mutator::mutate`].
    pub fn mutate_path(
        &mut self,
        value: &mut Value,
        path: &str,
        candidates: &BTreeSet<String>,
        report: &mut MutationReport,
    ) -> bool {
        self.mutate_candidates_at(value, path, candidates, report, 0)
    }

    fn mutate_at(
        &mut self,
        value: &mut Value,
        path: &str,
        report: &mut MutationReport,
        depth: usize,
    ) -> bool {
        if depth > self.policy.max_depth {
            return false;
        }
        if !value.is_composite() {
            return match scalar::mutate_leaf(value, self.policy.int_bit_width, &mut self.rng) {
                Some(new) => {
                    report.record(path, &new);
                    *value = new;
                    true
                }
                None => false,
            };
        }
        let mut keys = child_keys(value);
        keys.shuffle(&mut self.rng);
        for key in keys {
            let child_path = join_path(path, &key);
            let changed = with_child(value, &key, |child| {
                self.mutate_at(child, &child_path, report, depth + 1)
            });
            if changed == Some(true) {
                return true;
            }
        }
        false
    }

    fn mutate_biased(
        &mut self,
        value: &mut Value,
        path: &str,
        report: &mut MutationReport,
        depth: usize,
    ) -> bool {
        if !value.is_composite() || depth >= self.policy.max_depth {
            return self.mutate_at(value, path, report, depth);
        }
        let mut keys = child_keys(value);
        keys.shuffle(&mut self.rng);
        for key in keys {
            let nested = with_child(value, &key, |child| child.is_composite()).unwrap_or(false);
            if nested && !self.rng.gen_bool(self.policy.nested_descent_probability) {
                continue;
            }
            let child_path = join_path(path, &key);
            let changed = with_child(value, &key, |child| {
                self.mutate_biased(child, &child_path, report, depth + 1)
            });
            if changed == Some(true) {
                return true;
            }
        }
        // Every nested child declined and no scalar sibling could change.
        self.mutate_at(value, path, report, depth)
    }

    fn mutate_candidates_at(
        &mut self,
        value: &mut Value,
        path: &str,
        candidates: &BTreeSet<String>,
        report: &mut MutationReport,
        depth: usize,
    ) -> bool {
        if depth > self.policy.max_depth {
            return false;
        }
        let leading: Vec<String> = child_keys(value)
            .into_iter()
            .filter(|key| leads_to_candidate(&join_path(path, key), candidates))
            .collect();
        if leading.is_empty() {
            return candidates.contains(path) && self.mutate_at(value, path, report, depth);
        }

        let mut changed = false;
        for key in leading {
            let child_path = join_path(path, &key);
            if candidates.contains(&child_path)
                && self.rng.gen_bool(self.policy.removal_probability)
                && self.remove_child(value, &key, &child_path, report)
            {
                changed = true;
                continue;
            }
            changed |= with_child(value, &key, |child| {
                self.mutate_candidates_at(child, &child_path, candidates, report, depth + 1)
            })
            .unwrap_or(false);
        }
        if !changed && candidates.contains(path) {
            changed = self.mutate_at(value, path, report, depth);
        }
        changed
    }

    /// Delete the child or set it to `None`. Returns `false` if neither
    /// would change anything.
    fn remove_child(
        &mut self,
        value: &mut Value,
        key: &str,
        child_path: &str,
        report: &mut MutationReport,
    ) -> bool {
        let deletable = matches!(value, Value::Map(_) | Value::Record(_));
        let already_none = value
            .get_path(&[key])
            .is_some_and(|child| matches!(child, Value::None));
        let delete = deletable && (already_none || self.rng.gen_bool(0.5));
        if delete {
            let removed = match value {
                Value::Map(entries) => entries.remove(key).is_some(),
                Value::Record(r) => r.take_field(key).is_some(),
                _ => false,
            };
            if removed {
                report.record_removal(child_path);
            }
            return removed;
        }
        if already_none {
            return false;
        }
        let written = value.set_path(&[key], Value::None);
        if written {
            report.record(child_path, &Value::None);
        }
        written
    }
}

/// True if `path` is a candidate or a dotted prefix of one.
fn leads_to_candidate(path: &str, candidates: &BTreeSet<String>) -> bool {
    if candidates.contains(path) {
        return true;
    }
    let prefix = format!("{path}.");
    candidates
        .range(prefix.clone()..)
        .next()
        .is_some_and(|c| c.starts_with(&prefix))
}

fn child_keys(value: &Value) -> Vec<String> {
    value.children().into_iter().map(|(k, _)| k).collect()
}

/// Run `f` on one child in place. Record fields are taken out for the
/// duration of the call.
fn with_child<T>(value: &mut Value, key: &str, f: impl FnOnce(&mut Value) -> T) -> Option<T> {
    match value {
        Value::List(items) | Value::Set(items) => {
            let index = key.parse::<usize>().ok()?;
            items.get_mut(index).map(f)
        }
        Value::Map(entries) => entries.get_mut(key).map(f),
        Value::Record(r) => {
            let mut child = r.take_field(key)?;
            let out = f(&mut child);
            r.set_field(key, child);
            Some(out)
        }
        _ => None,
    }
}
