//! Mutation corpus: the seeds both phases draw from.

use std::collections::HashSet;

use rand::Rng;
use recrash_kernel::snapshot::hash::ContentHash;

use crate::state::EntryState;

/// Append-only, fingerprint-deduplicated list of entry states.
///
/// The first entry is the original seed.
#[derive(Debug, Clone, Default)]
pub struct MutationCorpus {
    entries: Vec<EntryState>,
    fingerprints: HashSet<ContentHash>,
}

impl MutationCorpus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless an equal entry state is already present. Returns
    /// `true` if appended.
    pub fn push(&mut self, entry: EntryState) -> bool {
        if !self.fingerprints.insert(entry.fingerprint()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&EntryState> {
        self.entries.get(index)
    }

    #[must_use]
    pub fn original(&self) -> Option<&EntryState> {
        self.entries.first()
    }

    /// A uniformly random entry.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&EntryState> {
        if self.entries.is_empty() {
            return None;
        }
        self.entries.get(rng.gen_range(0..self.entries.len()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntryState> {
        self.entries.iter()
    }
}
