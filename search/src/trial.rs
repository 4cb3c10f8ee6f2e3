//! Per-trial diagnostics and the assistant's training records.

use std::collections::{BTreeMap, BTreeSet};

use recrash_kernel::snapshot::compare::BindingDiff;
use recrash_kernel::snapshot::hash::ContentHash;
use recrash_kernel::snapshot::CanonicalSnapshot;
use recrash_kernel::value::Value;
use serde::{Deserialize, Serialize};

use crate::contract::ExceptionSite;
use crate::state::{CandidateSets, EntryState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    CrashSearch,
    EntrySearch,
}

/// Where a trial's entry state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialSource {
    /// Replayed unmodified.
    Seed,
    /// Blind mutation.
    Mutation,
    /// Regression assistant prediction.
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialVerdict {
    /// Returned normally.
    Returned,
    Panicked,
    /// Raised, but not the captured exception.
    WrongException,
    /// Raised the captured exception (crash phase success).
    Reproduced,
    /// Raised the captured exception with a different final state.
    StateMismatch,
    /// Raised the captured exception with the captured final state.
    Converged,
}

/// One line of diagnostic output per trial. No schema guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialEvent {
    pub phase: Phase,
    pub trial: u64,
    pub source: TrialSource,
    pub entry_fingerprint: ContentHash,
    pub verdict: TrialVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionSite>,
    /// Paths written by the mutation or prediction that produced this
    /// trial.
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub mutated: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_diff: Option<BindingDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_diff: Option<BindingDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<CandidateSets>,
}

/// Receiver of per-trial events.
pub trait TrialSink {
    fn record(&mut self, event: &TrialEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TrialSink for NullSink {
    fn record(&mut self, _event: &TrialEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub events: Vec<TrialEvent>,
}

impl TrialSink for MemorySink {
    fn record(&mut self, event: &TrialEvent) {
        self.events.push(event.clone());
    }
}

/// One entry-search iteration that raised the captured exception.
///
/// Kept only as training data for the regression assistant.
#[derive(Debug, Clone)]
pub struct TrialRecord {
    /// The entry state that was run.
    pub entry: EntryState,
    /// Paths written to produce `entry`, with the values written.
    pub mutated: BTreeMap<String, Value>,
    pub local_diff: BindingDiff,
    pub global_diff: BindingDiff,
    /// Observed final state of every diffing variable present at raise.
    pub observed: BTreeMap<String, CanonicalSnapshot>,
}

impl TrialRecord {
    /// Names that differed from the captured state.
    #[must_use]
    pub fn diff_names(&self) -> BTreeSet<String> {
        let mut names = self.local_diff.names();
        names.extend(self.global_diff.names());
        names
    }
}
