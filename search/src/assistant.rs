//! Regression assistant: learns how entry values map to observed final
//! state and proposes the entry values that should produce the captured
//! state.
//!
//! The model runs backwards. Each training row pairs the observed numeric
//! state of the diffing variables (`X`) with the numeric inputs that
//! produced it (`Y`); a prediction evaluates `X → Y` at the snapshot's
//! captured state. Two closed-form relations are tried per input
//! dimension before falling back to [`Regressor`].

use std::collections::{BTreeMap, BTreeSet};

use recrash_kernel::analysis::FunctionDecl;
use recrash_kernel::snapshot::{Atom, CanonicalSnapshot, NodeId, SnapshotNode};
use recrash_kernel::value::{join_path, Value};
use serde::{Deserialize, Serialize};

use crate::mlp::Regressor;
use crate::policy::AssistantPolicy;
use crate::snapshot::CrashSnapshot;
use crate::state::EntryState;
use crate::trial::TrialRecord;

/// How one predicted dimension was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// `input - observed` was constant.
    Offset,
    /// `input / observed` was constant.
    Scale,
    /// Network regression.
    Network,
}

/// Proposed entry-state writes, keyed by dotted path.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub values: BTreeMap<String, Value>,
    pub methods: BTreeMap<String, Method>,
}

/// Online model over entry-search history.
#[derive(Debug, Clone)]
pub struct RegressionAssistant {
    policy: AssistantPolicy,
    /// Flattened numeric state of the snapshot: the point predictions are
    /// made at.
    target: BTreeMap<String, f64>,
    records: Vec<TrialRecord>,
}

impl RegressionAssistant {
    #[must_use]
    pub fn new(policy: AssistantPolicy, snapshot: &CrashSnapshot) -> Self {
        let mut target = BTreeMap::new();
        // Locals shadow globals of the same name.
        for bindings in [snapshot.bug_globals(), snapshot.bug_locals()] {
            for (name, snap) in bindings {
                let mut features = Vec::new();
                flatten(snap, snap.root(), name, 0, policy.flatten_depth, &mut features);
                target.extend(features);
            }
        }
        Self {
            policy,
            target,
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &AssistantPolicy {
        &self.policy
    }

    /// Add one trial to the history.
    pub fn observe(&mut self, record: &TrialRecord) {
        self.records.push(record.clone());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True once enough records share `diff_names` and both tables would
    /// have at least one column.
    #[must_use]
    pub fn is_ready(&self, diff_names: &BTreeSet<String>) -> bool {
        let rows = self.matching(diff_names);
        rows.len() >= self.policy.min_trials
            && !input_keys(&rows).is_empty()
            && !self.output_keys(&rows, diff_names).is_empty()
    }

    /// Propose values for the mutated input paths.
    ///
    /// Values equal to what `current` already holds are left out; `None`
    /// means nothing useful could be proposed.
    #[must_use]
    pub fn predict(
        &self,
        diff_names: &BTreeSet<String>,
        current: &EntryState,
        decl: &FunctionDecl,
    ) -> Option<Prediction> {
        let rows = self.matching(diff_names);
        let x_keys = self.output_keys(&rows, diff_names);
        let y_keys = input_keys(&rows);
        if x_keys.is_empty() || y_keys.is_empty() {
            return None;
        }

        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for record in &rows {
            let Some(y) = input_row(record, &y_keys, decl) else {
                continue;
            };
            xs.push(self.output_row(record, &x_keys));
            ys.push(y);
        }
        if xs.len() < self.policy.min_trials {
            return None;
        }
        let target_x: Vec<f64> = x_keys.iter().map(|k| self.target[k]).collect();

        let mut estimates: Vec<Option<(f64, Method)>> = y_keys
            .iter()
            .enumerate()
            .map(|(j, y_key)| relation(&xs, &ys, j, &x_keys, y_key, &target_x))
            .collect();
        if estimates.iter().any(Option::is_none) {
            if let Some(model) = Regressor::fit(&xs, &ys, &self.policy) {
                let predicted = model.predict(&target_x);
                for (estimate, y) in estimates.iter_mut().zip(predicted) {
                    if estimate.is_none() {
                        *estimate = Some((y, Method::Network));
                    }
                }
            }
        }

        let mut prediction = Prediction {
            values: BTreeMap::new(),
            methods: BTreeMap::new(),
        };
        for (key, estimate) in y_keys.iter().zip(estimates) {
            let Some((number, method)) = estimate else {
                continue;
            };
            let like = current
                .get_path(key, decl)
                .or_else(|| rows.iter().rev().find_map(|r| r.mutated.get(key).cloned()));
            let Some(like) = like else { continue };
            let Some(value) = from_number(number, &like) else {
                continue;
            };
            if value == like {
                continue;
            }
            prediction.values.insert(key.clone(), value);
            prediction.methods.insert(key.clone(), method);
        }
        tracing::debug!(
            rows = xs.len(),
            inputs = y_keys.len(),
            outputs = x_keys.len(),
            methods = ?prediction.methods,
            "assistant prediction"
        );
        (!prediction.values.is_empty()).then_some(prediction)
    }

    fn matching(&self, diff_names: &BTreeSet<String>) -> Vec<&TrialRecord> {
        self.records
            .iter()
            .filter(|r| r.diff_names() == *diff_names)
            .collect()
    }

    /// Observed numeric features of the diffing variables that the
    /// snapshot also has, in first-seen order.
    fn output_keys(&self, rows: &[&TrialRecord], diff_names: &BTreeSet<String>) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for record in rows {
            for (key, _) in self.observed_features(record, diff_names) {
                if self.target.contains_key(&key) && !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    fn observed_features(
        &self,
        record: &TrialRecord,
        diff_names: &BTreeSet<String>,
    ) -> Vec<(String, f64)> {
        let mut features = Vec::new();
        for name in diff_names {
            if let Some(snap) = record.observed.get(name) {
                flatten(snap, snap.root(), name, 0, self.policy.flatten_depth, &mut features);
            }
        }
        features
    }

    /// One `X` row; features the trial did not produce take the snapshot's
    /// value.
    fn output_row(&self, record: &TrialRecord, keys: &[String]) -> Vec<f64> {
        let names: BTreeSet<String> = record.observed.keys().cloned().collect();
        let observed: BTreeMap<String, f64> =
            self.observed_features(record, &names).into_iter().collect();
        keys.iter()
            .map(|k| observed.get(k).copied().unwrap_or(self.target[k]))
            .collect()
    }
}

/// Numeric mutated paths, in first-seen order.
fn input_keys(rows: &[&TrialRecord]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for record in rows {
        for (path, value) in &record.mutated {
            if to_number(value).is_some() && !keys.contains(path) {
                keys.push(path.clone());
            }
        }
    }
    keys
}

/// One `Y` row; paths this trial did not mutate are read from its entry.
fn input_row(record: &TrialRecord, keys: &[String], decl: &FunctionDecl) -> Option<Vec<f64>> {
    keys.iter()
        .map(|k| match record.mutated.get(k) {
            Some(v) => to_number(v),
            None => record.entry.get_path(k, decl).as_ref().and_then(to_number),
        })
        .collect()
}

/// Try `Y[j] = X[i] + c` and then `Y[j] = X[i] * c` for every output
/// column `i`, output columns under the same root first. The observed
/// column must vary for a relation to count.
fn relation(
    xs: &[Vec<f64>],
    ys: &[Vec<f64>],
    j: usize,
    x_keys: &[String],
    y_key: &str,
    target_x: &[f64],
) -> Option<(f64, Method)> {
    let y_root = root(y_key);
    let mut order: Vec<usize> = (0..x_keys.len()).collect();
    order.sort_by_key(|&i| root(&x_keys[i]) != y_root);

    for i in order {
        let column: Vec<f64> = xs.iter().map(|row| row[i]).collect();
        if constant(&column).is_some() {
            continue;
        }
        let offsets: Vec<f64> = ys.iter().zip(&column).map(|(y, x)| y[j] - x).collect();
        if let Some(c) = constant(&offsets) {
            return Some((target_x[i] + c, Method::Offset));
        }
        if column.iter().all(|x| *x != 0.0) {
            let ratios: Vec<f64> = ys.iter().zip(&column).map(|(y, x)| y[j] / x).collect();
            if let Some(c) = constant(&ratios) {
                return Some((target_x[i] * c, Method::Scale));
            }
        }
    }
    None
}

fn root(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// The shared value if every element agrees within a relative tolerance.
fn constant(values: &[f64]) -> Option<f64> {
    let first = *values.first()?;
    let tolerance = 1e-9 * first.abs().max(1.0);
    values
        .iter()
        .all(|v| (v - first).abs() <= tolerance)
        .then_some(first)
}

#[allow(clippy::cast_precision_loss)]
fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) if f.is_finite() => Some(*f),
        Value::Enum(e) => Some(e.index() as f64),
        _ => None,
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn from_number(number: f64, like: &Value) -> Option<Value> {
    if !number.is_finite() {
        return None;
    }
    match like {
        Value::Bool(_) => Some(Value::Bool(number >= 0.5)),
        Value::Int(_) => Some(Value::Int(number.round() as i64)),
        Value::Float(_) => Some(Value::Float(number)),
        Value::Enum(e) => {
            let last = e.members().len().saturating_sub(1) as f64;
            e.with_index(number.round().clamp(0.0, last) as usize)
                .map(Value::Enum)
        }
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn atom_number(atom: &Atom) -> Option<f64> {
    match atom {
        Atom::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Atom::Int(i) => Some(*i as f64),
        Atom::Float(f) if f.is_finite() => Some(*f),
        Atom::Member { index, .. } => Some(*index as f64),
        _ => None,
    }
}

/// Numeric leaves under `id`, keyed by dotted path, down to `limit` levels.
fn flatten(
    snap: &CanonicalSnapshot,
    id: NodeId,
    path: &str,
    depth: usize,
    limit: usize,
    out: &mut Vec<(String, f64)>,
) {
    match snap.node(id) {
        SnapshotNode::Atomic { atom, .. } => {
            if let Some(x) = atom_number(atom) {
                out.push((path.to_string(), x));
            }
        }
        SnapshotNode::Composite { children, .. } if depth < limit => {
            for (key, child) in children {
                flatten(snap, *child, &join_path(path, key), depth + 1, limit, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use recrash_kernel::snapshot::canonicalize;
    use recrash_kernel::snapshot::compare::BindingDiff;
    use recrash_kernel::value::{Bindings, EnumValue};

    use crate::contract::{CallContext, ExceptionSite, Raised, TargetFunction};

    struct Noop;

    impl TargetFunction for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn call(&self, _ctx: &mut CallContext) -> Result<Value, Raised> {
            Ok(Value::None)
        }
    }

    fn snapshot(global: &str, value: Value) -> CrashSnapshot {
        CrashSnapshot::new(
            Rc::new(Noop),
            EntryState::default(),
            ExceptionSite::new("RuntimeError", "", 1),
            &Bindings::new(),
            &Bindings::from([(global.to_string(), value)]),
        )
    }

    /// A trial where global `name` went in as `input` and came out as
    /// `output`.
    fn record(name: &str, input: Value, output: &Value, mutated: bool) -> TrialRecord {
        let entry = EntryState::new(
            vec![],
            Bindings::new(),
            Bindings::from([(name.to_string(), input.clone())]),
        );
        TrialRecord {
            entry,
            mutated: if mutated {
                BTreeMap::from([(name.to_string(), input)])
            } else {
                BTreeMap::new()
            },
            local_diff: BindingDiff::default(),
            global_diff: BindingDiff {
                changed: BTreeSet::from([name.to_string()]),
                ..BindingDiff::default()
            },
            observed: BTreeMap::from([(name.to_string(), canonicalize(output))]),
        }
    }

    fn names(name: &str) -> BTreeSet<String> {
        BTreeSet::from([name.to_string()])
    }

    #[test]
    fn offset_relation_predicts_the_entry_value() {
        let decl = FunctionDecl::opaque("noop");
        let mut assistant =
            RegressionAssistant::new(AssistantPolicy::default(), &snapshot("level", Value::Int(107)));
        assistant.observe(&record("level", Value::Int(5), &Value::Int(12), false));
        assert!(!assistant.is_ready(&names("level")));
        assistant.observe(&record("level", Value::Int(21), &Value::Int(28), true));
        assert!(assistant.is_ready(&names("level")));

        let current = record("level", Value::Int(21), &Value::Int(28), true).entry;
        let prediction = assistant.predict(&names("level"), &current, &decl).unwrap();
        assert_eq!(prediction.values["level"], Value::Int(100));
        assert_eq!(prediction.methods["level"], Method::Offset);
    }

    #[test]
    fn scale_relation_predicts_the_entry_value() {
        let decl = FunctionDecl::opaque("noop");
        let mut assistant =
            RegressionAssistant::new(AssistantPolicy::default(), &snapshot("rate", Value::Float(30.0)));
        assistant.observe(&record("rate", Value::Float(2.0), &Value::Float(4.0), true));
        assistant.observe(&record("rate", Value::Float(5.0), &Value::Float(10.0), true));
        let current = record("rate", Value::Float(5.0), &Value::Float(10.0), true).entry;
        let prediction = assistant.predict(&names("rate"), &current, &decl).unwrap();
        assert_eq!(prediction.values["rate"], Value::Float(15.0));
        assert_eq!(prediction.methods["rate"], Method::Scale);
    }

    #[test]
    fn records_with_other_diffs_are_ignored() {
        let mut assistant =
            RegressionAssistant::new(AssistantPolicy::default(), &snapshot("level", Value::Int(107)));
        assistant.observe(&record("level", Value::Int(5), &Value::Int(12), true));
        assistant.observe(&record("other", Value::Int(1), &Value::Int(2), true));
        assert!(!assistant.is_ready(&names("level")));
        assert_eq!(assistant.len(), 2);
    }

    #[test]
    fn unrelated_columns_fall_back_to_the_network() {
        let decl = FunctionDecl::opaque("noop");
        let mut assistant =
            RegressionAssistant::new(AssistantPolicy::default(), &snapshot("v", Value::Float(9.0)));
        for (input, output) in [(1.0, 1.0), (2.0, 4.0), (3.0, 9.0), (4.0, 16.0)] {
            assistant.observe(&record("v", Value::Float(input), &Value::Float(output), true));
        }
        let current = record("v", Value::Float(4.0), &Value::Float(16.0), true).entry;
        let prediction = assistant.predict(&names("v"), &current, &decl).unwrap();
        assert_eq!(prediction.methods["v"], Method::Network);
        assert!(matches!(prediction.values["v"], Value::Float(x) if x.is_finite()));
    }

    #[test]
    fn enum_predictions_snap_to_a_member() {
        let colour = |i| Value::Enum(EnumValue::new("Colour", &["Red", "Green", "Blue"], i).unwrap());
        assert_eq!(from_number(1.4, &colour(0)), Some(colour(1)));
        assert_eq!(from_number(9.0, &colour(0)), Some(colour(2)));
        assert_eq!(from_number(-3.0, &colour(2)), Some(colour(0)));
        assert_eq!(from_number(0.7, &Value::Bool(false)), Some(Value::Bool(true)));
        assert_eq!(from_number(2.5, &Value::Int(0)), Some(Value::Int(3)));
        assert_eq!(from_number(f64::NAN, &Value::Int(0)), None);
        assert_eq!(from_number(1.0, &Value::text("a")), None);
    }

    #[test]
    fn record_fields_are_flattened_to_dotted_features() {
        let value = Value::record(
            "Point",
            vec![("x", Value::Int(1)), ("tag", Value::text("t")), ("on", Value::Bool(true))],
        );
        let snap = canonicalize(&value);
        let mut out = Vec::new();
        flatten(&snap, snap.root(), "p", 0, 2, &mut out);
        out.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(out, vec![("p.on".to_string(), 1.0), ("p.x".to_string(), 1.0)]);
        out.clear();
        flatten(&snap, snap.root(), "p", 0, 0, &mut out);
        assert!(out.is_empty());
    }
}
