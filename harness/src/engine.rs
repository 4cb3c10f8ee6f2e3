//! Engine: runs crash reproduction and then entry-state search for one
//! captured crash.
//!
//! # Pipeline
//!
//! ```text
//! EnginePolicy::validate() → analyze(target source)
//!   → CrashReproducer::search() → EntryStateSearcher::reproduce()
//!   → EngineReport
//! ```
//!
//! Both phases share one [`MutationCorpus`] and one [`TrialSink`]. Search
//! outcomes (including failure to reproduce) are reported in
//! [`EngineOutcome`]; only pre-flight problems are errors.

use std::rc::Rc;

use recrash_kernel::analysis::{analyze, AnalysisError, FunctionDecl};
use recrash_kernel::value::{Bindings, Value};
use recrash_search::contract::{CallContext, Environment, TargetFunction};
use recrash_search::corpus::MutationCorpus;
use recrash_search::crash::{CrashReproducer, CrashSearchResult};
use recrash_search::entry::{EntrySearchResult, EntryStateSearcher};
use recrash_search::error::SearchError;
use recrash_search::execute::{invoke_in, TrialOutcome};
use recrash_search::policy::{CrashSearchPolicy, EntrySearchPolicy};
use recrash_search::snapshot::CrashSnapshot;
use recrash_search::state::EntryState;
use recrash_search::trial::TrialSink;
use serde::{Deserialize, Serialize};

/// Configuration for one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginePolicy {
    pub crash: CrashSearchPolicy,
    pub entry: EntrySearchPolicy,
    /// Fail the run when the target's source is missing or unparseable.
    /// When `false` the engine continues with an empty dependency map.
    pub require_analysis: bool,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            crash: CrashSearchPolicy::default(),
            entry: EntrySearchPolicy::default(),
            require_analysis: true,
        }
    }
}

impl EnginePolicy {
    /// Load from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PolicyJson`] for malformed JSON and
    /// [`EngineError::Search`] if the loaded policy does not validate.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let policy: Self = serde_json::from_str(json).map_err(|e| EngineError::PolicyJson {
            detail: e.to_string(),
        })?;
        policy.validate()?;
        Ok(policy)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Search`] if either phase policy is invalid.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.crash.validate()?;
        self.entry.validate()?;
        Ok(())
    }
}

/// Pre-flight failure. Search results are never errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("invalid engine policy JSON: {detail}")]
    PolicyJson { detail: String },
    /// `source` is `None` when the target provides no source text.
    #[error("cannot analyze `{function}`")]
    Analysis {
        function: String,
        source: Option<AnalysisError>,
    },
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    /// Replaying this entry state reproduces the exception and the final
    /// state.
    Reproduced(EntryState),
    /// The crash phase exhausted its budget.
    CrashNotReproduced,
    /// The crash was reproduced but the final state was not.
    StateTimeout,
}

/// Outcome plus trial accounting.
#[derive(Debug, Clone)]
pub struct EngineReport {
    pub outcome: EngineOutcome,
    pub crash_trials: u64,
    /// Zero when the crash phase failed.
    pub entry_trials: u64,
    pub corpus_len: usize,
}

impl EngineReport {
    /// The reproduced entry state, if any.
    #[must_use]
    pub fn entry(&self) -> Option<&EntryState> {
        match &self.outcome {
            EngineOutcome::Reproduced(entry) => Some(entry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    policy: EnginePolicy,
}

impl Engine {
    /// # Errors
    ///
    /// Returns [`EngineError::Search`] if `policy` does not validate.
    pub fn new(policy: EnginePolicy) -> Result<Self, EngineError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    #[must_use]
    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// Reproduce `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Analysis`] when the target cannot be analyzed
    /// and `require_analysis` is set, or [`EngineError::Search`] if a
    /// phase rejects its policy.
    pub fn run(
        &self,
        snapshot: &CrashSnapshot,
        sink: &mut dyn TrialSink,
    ) -> Result<EngineReport, EngineError> {
        let decl = self.declaration(snapshot.target())?;
        let span = tracing::info_span!("engine", function = snapshot.function_name());
        let _guard = span.enter();

        let mut corpus = MutationCorpus::new();
        let crash = CrashReproducer::new(self.policy.crash.clone()).search(
            snapshot,
            &mut corpus,
            sink,
        )?;
        let (seed, crash_trials) = match crash {
            CrashSearchResult::Reproduced { entry, trial } => (entry, trial),
            CrashSearchResult::NotFound { trials } => {
                tracing::info!(trials, "crash not reproduced");
                return Ok(EngineReport {
                    outcome: EngineOutcome::CrashNotReproduced,
                    crash_trials: trials,
                    entry_trials: 0,
                    corpus_len: corpus.len(),
                });
            }
        };

        let entry = EntryStateSearcher::new(self.policy.entry.clone()).reproduce(
            &seed,
            snapshot,
            &decl,
            &mut corpus,
            sink,
        )?;
        let (outcome, entry_trials) = match entry {
            EntrySearchResult::Converged { entry, trial } => {
                (EngineOutcome::Reproduced(entry), trial)
            }
            EntrySearchResult::Timeout { trials } => (EngineOutcome::StateTimeout, trials),
        };
        tracing::info!(crash_trials, entry_trials, corpus = corpus.len(), "engine run finished");
        Ok(EngineReport {
            outcome,
            crash_trials,
            entry_trials,
            corpus_len: corpus.len(),
        })
    }

    fn declaration(&self, target: &dyn TargetFunction) -> Result<FunctionDecl, EngineError> {
        let name = target.name();
        let analyzed = match target.source() {
            Some(source) => analyze(source, name).map_err(Some),
            None => Err(None),
        };
        match analyzed {
            Ok(decl) => Ok(decl),
            Err(source) if self.policy.require_analysis => Err(EngineError::Analysis {
                function: name.to_string(),
                source,
            }),
            Err(source) => {
                tracing::warn!(
                    function = name,
                    error = ?source,
                    "continuing without dependency analysis"
                );
                Ok(FunctionDecl::opaque(name))
            }
        }
    }
}

/// Result of one intercepted call.
#[derive(Debug, Clone)]
pub enum Capture {
    Returned(Value),
    /// The call raised; the snapshot holds the call's inputs and the
    /// raising frame.
    Crashed(CrashSnapshot),
    Panicked { detail: String },
}

/// Run `target` once against a persistent environment, capturing a
/// [`CrashSnapshot`] if it raises.
///
/// The call runs on the live `args` and `env`: globals it writes stay in
/// `env` and records it mutates stay mutated, so a sequence of calls
/// behaves like a running program. The snapshot's original entry state is
/// a deep copy taken before the call.
pub fn capture_call(
    target: &Rc<dyn TargetFunction>,
    args: Vec<Value>,
    kwargs: Bindings,
    env: &mut Environment,
) -> Capture {
    let before = EntryState::new(args.clone(), kwargs.clone(), env.bindings().clone()).deep_copy();
    let mut ctx = CallContext::new(target.name(), args, kwargs, std::mem::take(env));
    let outcome = invoke_in(target.as_ref(), &mut ctx);
    *env = ctx.env;
    match outcome {
        TrialOutcome::Returned(value) => Capture::Returned(value),
        TrialOutcome::Panicked { detail } => Capture::Panicked { detail },
        TrialOutcome::Raised(raised) => {
            match CrashSnapshot::from_raised(Rc::clone(target), before, &raised) {
                Some(snapshot) => Capture::Crashed(snapshot),
                None => Capture::Panicked {
                    detail: format!("{} raised outside application code", raised.site),
                },
            }
        }
    }
}
