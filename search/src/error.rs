//! Typed search errors.
//!
//! `SearchError` represents pre-flight failures only. Runtime terminations
//! (budget exhaustion, targets that never raise, caught panics) are
//! expressed through [`crate::crash::CrashSearchResult`] and
//! [`crate::entry::EntrySearchResult`].

use recrash_kernel::policy::InvalidPolicy;

/// Typed failure for pre-flight search validation.
///
/// Returned before the first trial runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// A policy field is out of range.
    #[error("invalid search policy: {detail}")]
    InvalidPolicy { detail: String },
}

impl From<InvalidPolicy> for SearchError {
    fn from(err: InvalidPolicy) -> Self {
        Self::InvalidPolicy { detail: err.detail }
    }
}
