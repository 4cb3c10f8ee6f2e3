//! Entry-state search: from a crash-reproducing entry state to one whose
//! replay also leaves every variable in its captured final state.
//!
//! Each trial that raises the captured exception is diffed against the
//! snapshot. Diffing names are resolved through the function's dependency
//! map to candidate input paths, and the next trial mutates only those;
//! when that writes nothing, one random data root is mutated instead.
//! The regression assistant is consulted between mutations once it has
//! enough consistent history.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use recrash_kernel::analysis::FunctionDecl;
use recrash_kernel::mutate::{MutationReport, Mutator};
use recrash_kernel::snapshot::compare::diff_bindings;
use recrash_kernel::snapshot::{canonicalize_bindings, CanonicalSnapshot};
use recrash_kernel::value::{prune_environment, split_path};

use crate::assistant::RegressionAssistant;
use crate::contract::Raised;
use crate::corpus::MutationCorpus;
use crate::error::SearchError;
use crate::execute::{invoke, TrialOutcome};
use crate::policy::EntrySearchPolicy;
use crate::snapshot::CrashSnapshot;
use crate::state::{CandidateSets, EntryState};
use crate::trial::{Phase, TrialEvent, TrialRecord, TrialSink, TrialSource, TrialVerdict};

/// How the entry-state phase ended.
#[derive(Debug, Clone)]
pub enum EntrySearchResult {
    /// Replaying `entry` raised the captured exception with the captured
    /// final state, on trial `trial` (1-based).
    Converged { entry: EntryState, trial: u64 },
    /// Budget exhausted.
    Timeout { trials: u64 },
}

impl EntrySearchResult {
    #[must_use]
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

#[derive(Debug, Clone)]
pub struct EntryStateSearcher {
    policy: EntrySearchPolicy,
}

/// Loop state carried between trials.
struct Cursor {
    entry: EntryState,
    written: MutationReport,
    source: TrialSource,
}

impl EntryStateSearcher {
    #[must_use]
    pub fn new(policy: EntrySearchPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &EntrySearchPolicy {
        &self.policy
    }

    /// Search from `seed`, which should already reproduce the crash.
    ///
    /// Trials that raise the captured exception with a wrong final state
    /// are appended to `corpus`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidPolicy`] before any trial runs if the
    /// policy does not validate.
    pub fn reproduce(
        &self,
        seed: &EntryState,
        snapshot: &CrashSnapshot,
        decl: &FunctionDecl,
        corpus: &mut MutationCorpus,
        sink: &mut dyn TrialSink,
    ) -> Result<EntrySearchResult, SearchError> {
        self.policy.validate()?;
        let span = tracing::info_span!("entry_search", function = snapshot.function_name());
        let _guard = span.enter();

        let seed = seed.deep_copy();
        let mut mutator = Mutator::new(self.policy.mutation.clone(), self.policy.seed);
        let mut assistant = self
            .policy
            .assistant
            .enabled
            .then(|| RegressionAssistant::new(self.policy.assistant.clone(), snapshot));
        let mut candidates = CandidateSets::default();
        let mut last_consult: Option<u64> = None;
        let mut cursor = Cursor {
            entry: seed.deep_copy(),
            written: MutationReport::default(),
            source: TrialSource::Seed,
        };

        for trial in 1..=self.policy.max_trials {
            let outcome = invoke(snapshot.target(), &cursor.entry);
            let mut event = TrialEvent {
                phase: Phase::EntrySearch,
                trial,
                source: cursor.source,
                entry_fingerprint: cursor.entry.fingerprint(),
                verdict: TrialVerdict::Returned,
                exception: None,
                mutated: cursor.written.paths(),
                local_diff: None,
                global_diff: None,
                candidates: None,
            };

            let raised = match outcome {
                TrialOutcome::Raised(raised) if raised.site.matches(snapshot.exception()) => {
                    raised
                }
                other => {
                    match other {
                        TrialOutcome::Raised(raised) => {
                            event.verdict = TrialVerdict::WrongException;
                            event.exception = Some(raised.site);
                        }
                        TrialOutcome::Panicked { .. } => event.verdict = TrialVerdict::Panicked,
                        TrialOutcome::Returned(_) => {}
                    }
                    tracing::debug!(trial, verdict = ?event.verdict, "entry trial missed the crash");
                    sink.record(&event);
                    cursor = restart_from_seed(&mut mutator, &seed, &candidates, decl);
                    continue;
                }
            };

            let observed = final_state(snapshot, &raised);
            let local_diff = diff_bindings(&observed.0, snapshot.bug_locals(), &self.policy.compare);
            let global_diff =
                diff_bindings(&observed.1, snapshot.bug_globals(), &self.policy.compare);
            event.exception = Some(raised.site);

            if local_diff.is_empty() && global_diff.is_empty() {
                event.verdict = TrialVerdict::Converged;
                sink.record(&event);
                tracing::info!(trial, "entry state converged");
                return Ok(EntrySearchResult::Converged {
                    entry: cursor.entry,
                    trial,
                });
            }

            let mut diff_names = local_diff.names();
            diff_names.extend(global_diff.names());
            let found = resolve_candidates(&diff_names, &cursor.entry, decl);
            if found.is_empty() {
                tracing::warn!(trial, names = ?diff_names, "no candidates for diffing variables");
            }
            candidates.extend(&found);

            let record = TrialRecord {
                entry: cursor.entry.deep_copy(),
                mutated: cursor.written.changes.clone(),
                local_diff: local_diff.clone(),
                global_diff: global_diff.clone(),
                observed: diff_names
                    .iter()
                    .filter_map(|name| {
                        observed
                            .0
                            .get(name)
                            .or_else(|| observed.1.get(name))
                            .map(|snap| (name.clone(), snap.clone()))
                    })
                    .collect(),
            };
            if let Some(assistant) = assistant.as_mut() {
                assistant.observe(&record);
            }

            event.verdict = TrialVerdict::StateMismatch;
            event.local_diff = Some(local_diff);
            event.global_diff = Some(global_diff);
            event.candidates = Some(found.clone());
            tracing::debug!(trial, names = ?diff_names, "entry trial state mismatch");
            sink.record(&event);
            corpus.push(cursor.entry.deep_copy());

            let consult_due = !matches!(
                last_consult,
                Some(at) if trial - at < self.policy.assistant.consult_interval
            );
            let predicted = assistant
                .as_ref()
                .filter(|a| consult_due && a.is_ready(&diff_names))
                .and_then(|a| a.predict(&diff_names, &cursor.entry, decl));
            cursor = if let Some(prediction) = predicted {
                last_consult = Some(trial);
                let mut entry = cursor.entry.deep_copy();
                let mut written = MutationReport::default();
                for (path, value) in prediction.values {
                    if entry.set_path(&path, value.clone(), decl) {
                        written.changes.insert(path, value);
                    }
                }
                Cursor {
                    entry,
                    written,
                    source: TrialSource::Assistant,
                }
            } else {
                let paths = if found.is_empty() {
                    candidates.all()
                } else {
                    found.all()
                };
                let mut entry = cursor.entry.deep_copy();
                let mut written = mutate_candidates(&mut mutator, &mut entry, &paths, decl);
                if !written.changed() {
                    written = mutate_random_root(&mut mutator, &mut entry, decl);
                }
                Cursor {
                    entry,
                    written,
                    source: TrialSource::Mutation,
                }
            };
        }

        tracing::info!(trials = self.policy.max_trials, "entry state search timed out");
        Ok(EntrySearchResult::Timeout {
            trials: self.policy.max_trials,
        })
    }
}

/// Pruned, canonical locals and globals of the raising application frame.
fn final_state(
    snapshot: &CrashSnapshot,
    raised: &Raised,
) -> (
    BTreeMap<String, CanonicalSnapshot>,
    BTreeMap<String, CanonicalSnapshot>,
) {
    let Some(frame) = raised.innermost_application_frame() else {
        return (BTreeMap::new(), BTreeMap::new());
    };
    let name = snapshot.function_name();
    (
        canonicalize_bindings(&prune_environment(&frame.locals, name)),
        canonicalize_bindings(&prune_environment(&frame.globals, name)),
    )
}

/// Map diffing names to the entry-state paths that may influence them.
fn resolve_candidates(
    diff_names: &BTreeSet<String>,
    entry: &EntryState,
    decl: &FunctionDecl,
) -> CandidateSets {
    let mut found = CandidateSets::default();
    for name in diff_names {
        for path in decl
            .dependencies
            .influencers(name, |root| entry.slot(root, decl).is_some())
        {
            let Some(root) = split_path(&path).first().copied() else {
                continue;
            };
            if let Some(slot) = entry.slot(root, decl) {
                found.insert(slot.category(), path.clone());
            }
        }
    }
    found
}

/// Mutate every candidate root along its candidate paths.
fn mutate_candidates(
    mutator: &mut Mutator,
    entry: &mut EntryState,
    paths: &BTreeSet<String>,
    decl: &FunctionDecl,
) -> MutationReport {
    let mut by_root: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for path in paths {
        if let Some(root) = split_path(path).first() {
            by_root
                .entry((*root).to_string())
                .or_default()
                .insert(path.clone());
        }
    }
    let mut report = MutationReport::default();
    for (root, listed) in by_root {
        let Some(slot) = entry.slot(&root, decl) else {
            continue;
        };
        if let Some(value) = entry.value_mut(&slot) {
            mutator.mutate_path(value, &root, &listed, &mut report);
        }
    }
    report
}

/// Next trial after a miss: the seed again, mutated along everything
/// discovered so far, or at one random data root when that writes nothing.
fn restart_from_seed(
    mutator: &mut Mutator,
    seed: &EntryState,
    candidates: &CandidateSets,
    decl: &FunctionDecl,
) -> Cursor {
    let mut entry = seed.deep_copy();
    let mut written = mutate_candidates(mutator, &mut entry, &candidates.all(), decl);
    if !written.changed() {
        written = mutate_random_root(mutator, &mut entry, decl);
    }
    Cursor {
        entry,
        written,
        source: TrialSource::Mutation,
    }
}

/// Shallow mutation of one data root, tried in random order until one
/// changes. Used whenever the candidate paths write nothing.
fn mutate_random_root(
    mutator: &mut Mutator,
    entry: &mut EntryState,
    decl: &FunctionDecl,
) -> MutationReport {
    let mut roots = entry.data_roots(decl);
    roots.shuffle(mutator.rng_mut());
    let mut report = MutationReport::default();
    for (root, slot) in roots {
        let Some(value) = entry.value_mut(&slot) else {
            continue;
        };
        if mutator.mutate_shallow(value, &root, &mut report) {
            break;
        }
    }
    report
}
