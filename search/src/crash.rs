//! Crash reproduction: find an entry state that raises the captured
//! exception at the captured line.
//!
//! Corpus-based mutation search. The first trial replays the original seed
//! unmodified. After a trial that does not raise, the next one mutates the
//! original seed again; after a trial that raises something else, the next
//! seed is drawn from the corpus, which that trial has just joined.

use rand::seq::SliceRandom;
use rand::Rng;
use recrash_kernel::mutate::{MutationReport, Mutator};
use recrash_kernel::snapshot::canonicalize_bindings;
use recrash_kernel::snapshot::compare::{diff_bindings, BindingDiff};
use recrash_kernel::value::{is_environment_binding, join_path, prune_environment};

use crate::contract::Raised;
use crate::corpus::MutationCorpus;
use crate::error::SearchError;
use crate::execute::{invoke, TrialOutcome};
use crate::policy::CrashSearchPolicy;
use crate::snapshot::CrashSnapshot;
use crate::state::{Category, EntryState};
use crate::trial::{Phase, TrialEvent, TrialSink, TrialSource, TrialVerdict};

/// How the crash phase ended.
#[derive(Debug, Clone)]
pub enum CrashSearchResult {
    /// `entry` raised the captured exception on trial `trial` (1-based).
    Reproduced { entry: EntryState, trial: u64 },
    /// Budget exhausted.
    NotFound { trials: u64 },
}

impl CrashSearchResult {
    #[must_use]
    pub fn is_reproduced(&self) -> bool {
        matches!(self, Self::Reproduced { .. })
    }
}

/// Which parts of the state differed after the last wrong raise.
#[derive(Debug, Clone, Copy, Default)]
struct DiffShape {
    locals: bool,
    globals: bool,
}

#[derive(Debug, Clone)]
pub struct CrashReproducer {
    policy: CrashSearchPolicy,
}

impl CrashReproducer {
    #[must_use]
    pub fn new(policy: CrashSearchPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &CrashSearchPolicy {
        &self.policy
    }

    /// Search for a crash-reproducing entry state.
    ///
    /// Seeds `corpus` with the snapshot's original entry state and appends
    /// every trial that raised a different exception.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidPolicy`] before any trial runs if the
    /// policy does not validate.
    pub fn search(
        &self,
        snapshot: &CrashSnapshot,
        corpus: &mut MutationCorpus,
        sink: &mut dyn TrialSink,
    ) -> Result<CrashSearchResult, SearchError> {
        self.policy.validate()?;
        let span = tracing::info_span!("crash_search", function = snapshot.function_name());
        let _guard = span.enter();

        let original = snapshot.original().deep_copy();
        corpus.push(original.deep_copy());
        let mut mutator = Mutator::new(self.policy.mutation.clone(), self.policy.seed);
        let mut last_diff: Option<DiffShape> = None;
        let mut reseed_from_original = true;

        for trial in 1..=self.policy.max_trials {
            let (entry, report, source) = if trial == 1 {
                (original.deep_copy(), MutationReport::default(), TrialSource::Seed)
            } else {
                let seed = if reseed_from_original {
                    &original
                } else {
                    corpus.draw(mutator.rng_mut()).unwrap_or(&original)
                };
                let mut entry = seed.deep_copy();
                let report = mutate_entry(&mut mutator, &mut entry, snapshot, last_diff);
                (entry, report, TrialSource::Mutation)
            };

            let outcome = invoke(snapshot.target(), &entry);
            let mut event = TrialEvent {
                phase: Phase::CrashSearch,
                trial,
                source,
                entry_fingerprint: entry.fingerprint(),
                verdict: TrialVerdict::Returned,
                exception: None,
                mutated: report.paths(),
                local_diff: None,
                global_diff: None,
                candidates: None,
            };

            match outcome {
                TrialOutcome::Raised(raised) if raised.site.matches(snapshot.exception()) => {
                    event.verdict = TrialVerdict::Reproduced;
                    event.exception = Some(raised.site);
                    sink.record(&event);
                    tracing::info!(trial, "crash reproduced");
                    return Ok(CrashSearchResult::Reproduced { entry, trial });
                }
                TrialOutcome::Raised(raised) => {
                    let (locals, globals) = state_diff(snapshot, &raised, &self.policy);
                    last_diff = Some(DiffShape {
                        locals: !locals.is_empty(),
                        globals: !globals.is_empty(),
                    });
                    reseed_from_original = false;
                    event.verdict = TrialVerdict::WrongException;
                    event.exception = Some(raised.site);
                    event.local_diff = Some(locals);
                    event.global_diff = Some(globals);
                    corpus.push(entry);
                }
                TrialOutcome::Returned(_) => {
                    last_diff = None;
                    reseed_from_original = true;
                }
                TrialOutcome::Panicked { .. } => {
                    last_diff = None;
                    reseed_from_original = true;
                    event.verdict = TrialVerdict::Panicked;
                }
            }
            tracing::debug!(trial, verdict = ?event.verdict, mutated = ?event.mutated, "crash trial");
            sink.record(&event);
        }

        tracing::info!(trials = self.policy.max_trials, "crash not reproduced");
        Ok(CrashSearchResult::NotFound {
            trials: self.policy.max_trials,
        })
    }
}

/// Diff a wrong raise's innermost application frame against the snapshot.
fn state_diff(
    snapshot: &CrashSnapshot,
    raised: &Raised,
    policy: &CrashSearchPolicy,
) -> (BindingDiff, BindingDiff) {
    let Some(frame) = raised.innermost_application_frame() else {
        return (BindingDiff::default(), BindingDiff::default());
    };
    let name = snapshot.function_name();
    let locals = canonicalize_bindings(&prune_environment(&frame.locals, name));
    let globals = canonicalize_bindings(&prune_environment(&frame.globals, name));
    (
        diff_bindings(&locals, snapshot.bug_locals(), &policy.compare),
        diff_bindings(&globals, snapshot.bug_globals(), &policy.compare),
    )
}

/// Categories that have something to mutate.
///
/// Arguments count only when some argument is a composite with a data
/// field; globals count when any data global exists.
fn mutable_categories(entry: &EntryState, function_name: &str) -> Vec<Category> {
    let mut out = Vec::new();
    if entry.args.iter().any(recrash_kernel::value::Value::has_data_children) {
        out.push(Category::Args);
    }
    if entry
        .kwargs
        .iter()
        .any(|(k, v)| !is_environment_binding(k, v) && v.has_data_children())
    {
        out.push(Category::Kwargs);
    }
    if entry
        .globals
        .iter()
        .any(|(k, v)| k != function_name && !is_environment_binding(k, v))
    {
        out.push(Category::Globals);
    }
    out
}

/// Pick the categories to mutate this trial.
///
/// No previous diff: one category, uniformly. A locals diff favours the
/// argument categories, a globals diff favours globals; both pick globals
/// plus one argument category.
fn choose_categories<R: Rng + ?Sized>(
    mutable: &[Category],
    last_diff: Option<DiffShape>,
    rng: &mut R,
) -> Vec<Category> {
    let argument: Vec<Category> = mutable
        .iter()
        .copied()
        .filter(|c| *c != Category::Globals)
        .collect();
    let globals = mutable.contains(&Category::Globals);
    let uniform = |rng: &mut R| mutable.choose(rng).copied().into_iter().collect::<Vec<_>>();

    match last_diff {
        Some(DiffShape {
            locals: true,
            globals: true,
        }) => {
            let mut chosen: Vec<Category> = argument.choose(rng).copied().into_iter().collect();
            if globals {
                chosen.push(Category::Globals);
            }
            if chosen.is_empty() {
                uniform(rng)
            } else {
                chosen
            }
        }
        Some(DiffShape {
            locals: true,
            globals: false,
        }) if !argument.is_empty() => argument.choose(rng).copied().into_iter().collect(),
        Some(DiffShape {
            locals: false,
            globals: true,
        }) if globals => vec![Category::Globals],
        _ => uniform(rng),
    }
}

/// Mutate one eligible field in each chosen category.
fn mutate_entry(
    mutator: &mut Mutator,
    entry: &mut EntryState,
    snapshot: &CrashSnapshot,
    last_diff: Option<DiffShape>,
) -> MutationReport {
    let function_name = snapshot.function_name();
    let mutable = mutable_categories(entry, function_name);
    let chosen = choose_categories(&mutable, last_diff, mutator.rng_mut());
    let mut report = MutationReport::default();

    for category in chosen {
        let mut eligible: Vec<(String, usize, String)> = match category {
            Category::Args => entry
                .args
                .iter()
                .enumerate()
                .filter(|(_, v)| v.has_data_children())
                .map(|(i, _)| (join_path("args", &i.to_string()), i, String::new()))
                .collect(),
            Category::Kwargs => entry
                .kwargs
                .iter()
                .filter(|(k, v)| !is_environment_binding(k, v) && v.has_data_children())
                .map(|(k, _)| (join_path("kwargs", k), 0, k.clone()))
                .collect(),
            Category::Globals => entry
                .globals
                .iter()
                .filter(|(k, v)| k.as_str() != function_name && !is_environment_binding(k, v))
                .map(|(k, _)| (join_path("globals", k), 0, k.clone()))
                .collect(),
        };
        eligible.shuffle(mutator.rng_mut());
        for (path, index, key) in eligible {
            let value = match category {
                Category::Args => entry.args.get_mut(index),
                Category::Kwargs => entry.kwargs.get_mut(&key),
                Category::Globals => entry.globals.get_mut(&key),
            };
            let Some(value) = value else { continue };
            if mutator.mutate_shallow(value, &path, &mut report) {
                break;
            }
        }
    }
    report
}
