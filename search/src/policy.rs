//! Search policy types.
//!
//! Every policy loads from JSON with missing fields taking their defaults,
//! and every RNG seed lives in a policy so a run is reproducible from its
//! configuration alone.

use recrash_kernel::mutate::MutationPolicy;
use recrash_kernel::snapshot::compare::ComparePolicy;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Budget and operators for the crash-reproduction phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashSearchPolicy {
    /// Hard cap on target invocations.
    pub max_trials: u64,
    pub seed: u64,
    pub mutation: MutationPolicy,
    pub compare: ComparePolicy,
}

impl Default for CrashSearchPolicy {
    fn default() -> Self {
        Self {
            max_trials: 100,
            seed: 0,
            mutation: MutationPolicy::default(),
            compare: ComparePolicy::default(),
        }
    }
}

impl CrashSearchPolicy {
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidPolicy`] for a zero budget or an
    /// invalid nested policy.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_trials == 0 {
            return Err(SearchError::InvalidPolicy {
                detail: "crash search max_trials must be at least 1".into(),
            });
        }
        self.mutation.validate()?;
        self.compare.validate()?;
        Ok(())
    }
}

/// Budget, operators and assistant settings for the entry-state phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntrySearchPolicy {
    /// Hard cap on target invocations.
    pub max_trials: u64,
    pub seed: u64,
    pub mutation: MutationPolicy,
    pub compare: ComparePolicy,
    pub assistant: AssistantPolicy,
}

impl Default for EntrySearchPolicy {
    fn default() -> Self {
        Self {
            max_trials: 300,
            seed: 0,
            mutation: MutationPolicy::default(),
            compare: ComparePolicy::default(),
            assistant: AssistantPolicy::default(),
        }
    }
}

impl EntrySearchPolicy {
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidPolicy`] for a zero budget or an
    /// invalid nested policy.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_trials == 0 {
            return Err(SearchError::InvalidPolicy {
                detail: "entry search max_trials must be at least 1".into(),
            });
        }
        self.mutation.validate()?;
        self.compare.validate()?;
        self.assistant.validate()
    }
}

/// Regression assistant configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantPolicy {
    pub enabled: bool,
    /// Records sharing the current diff-name set needed before predicting.
    pub min_trials: usize,
    /// Minimum trials between two consultations.
    pub consult_interval: u64,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Width of each of the two hidden layers.
    pub hidden_width: usize,
    /// How deep record fields and list elements are flattened into
    /// numeric features.
    pub flatten_depth: usize,
    /// Seed for network weight initialization.
    pub seed: u64,
}

impl Default for AssistantPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_trials: 2,
            consult_interval: 2,
            epochs: 60,
            learning_rate: 0.05,
            hidden_width: 16,
            flatten_depth: 2,
            seed: 0,
        }
    }
}

impl AssistantPolicy {
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidPolicy`] if an enabled assistant has a
    /// zero sample floor, interval, epoch count or hidden width, or a
    /// non-positive learning rate.
    pub fn validate(&self) -> Result<(), SearchError> {
        if !self.enabled {
            return Ok(());
        }
        let invalid = |detail: &str| {
            Err(SearchError::InvalidPolicy {
                detail: detail.to_string(),
            })
        };
        if self.min_trials < 2 {
            return invalid("assistant min_trials must be at least 2");
        }
        if self.consult_interval == 0 {
            return invalid("assistant consult_interval must be at least 1");
        }
        if self.epochs == 0 || self.hidden_width == 0 {
            return invalid("assistant epochs and hidden_width must be non-zero");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid("assistant learning_rate must be positive and finite");
        }
        Ok(())
    }
}
