//! Entry state: the inputs of one call.

use std::collections::{BTreeMap, BTreeSet};

use recrash_kernel::analysis::FunctionDecl;
use recrash_kernel::snapshot::encode::canonical_bindings_bytes;
use recrash_kernel::snapshot::hash::{canonical_hash, ContentHash, DOMAIN_ENTRY_STATE};
use recrash_kernel::snapshot::{canonicalize, CanonicalSnapshot};
use recrash_kernel::value::{is_environment_binding, split_path, Bindings, DeepCopier, Value};
use serde::{Deserialize, Serialize};

/// Which part of an entry state a binding lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Args,
    Kwargs,
    Globals,
}

/// A resolved top-level binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSlot {
    Arg(usize),
    Kwarg(String),
    Global(String),
}

impl BindingSlot {
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::Arg(_) => Category::Args,
            Self::Kwarg(_) => Category::Kwargs,
            Self::Global(_) => Category::Globals,
        }
    }
}

/// Positional arguments, keyword arguments and globals for one call.
///
/// Paths address into it by root name: the root is a positional parameter
/// name (`arg{i}` when the declaration does not name it), a keyword, or a
/// global, tried in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryState {
    pub args: Vec<Value>,
    pub kwargs: Bindings,
    pub globals: Bindings,
}

impl EntryState {
    #[must_use]
    pub fn new(args: Vec<Value>, kwargs: Bindings, globals: Bindings) -> Self {
        Self {
            args,
            kwargs,
            globals,
        }
    }

    /// Copy all three parts through one copier, so a record shared between
    /// an argument and a global stays shared in the copy.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let mut copier = DeepCopier::new();
        Self {
            args: self.args.iter().map(|v| copier.copy(v)).collect(),
            kwargs: copier.copy_bindings(&self.kwargs),
            globals: copier.copy_bindings(&self.globals),
        }
    }

    /// Canonical snapshots keyed `args.<i>`, `kwargs.<name>`, `globals.<name>`.
    #[must_use]
    pub fn canonical(&self) -> BTreeMap<String, CanonicalSnapshot> {
        let mut out = BTreeMap::new();
        for (i, v) in self.args.iter().enumerate() {
            out.insert(format!("args.{i}"), canonicalize(v));
        }
        for (k, v) in &self.kwargs {
            out.insert(format!("kwargs.{k}"), canonicalize(v));
        }
        for (k, v) in &self.globals {
            out.insert(format!("globals.{k}"), canonicalize(v));
        }
        out
    }

    /// Content fingerprint; equal graphs give equal fingerprints.
    #[must_use]
    pub fn fingerprint(&self) -> ContentHash {
        canonical_hash(DOMAIN_ENTRY_STATE, &canonical_bindings_bytes(&self.canonical()))
    }

    /// Display name of positional argument `index`.
    #[must_use]
    pub fn arg_name(index: usize, decl: &FunctionDecl) -> String {
        decl.positional_name(index)
            .map_or_else(|| format!("arg{index}"), str::to_string)
    }

    /// Resolve a root name.
    #[must_use]
    pub fn slot(&self, root: &str, decl: &FunctionDecl) -> Option<BindingSlot> {
        if let Some(i) = (0..self.args.len()).find(|&i| Self::arg_name(i, decl) == root) {
            return Some(BindingSlot::Arg(i));
        }
        if self.kwargs.contains_key(root) {
            return Some(BindingSlot::Kwarg(root.to_string()));
        }
        if self.globals.contains_key(root) {
            return Some(BindingSlot::Global(root.to_string()));
        }
        None
    }

    #[must_use]
    pub fn value(&self, slot: &BindingSlot) -> Option<&Value> {
        match slot {
            BindingSlot::Arg(i) => self.args.get(*i),
            BindingSlot::Kwarg(k) => self.kwargs.get(k),
            BindingSlot::Global(g) => self.globals.get(g),
        }
    }

    pub fn value_mut(&mut self, slot: &BindingSlot) -> Option<&mut Value> {
        match slot {
            BindingSlot::Arg(i) => self.args.get_mut(*i),
            BindingSlot::Kwarg(k) => self.kwargs.get_mut(k),
            BindingSlot::Global(g) => self.globals.get_mut(g),
        }
    }

    /// Every addressable root that is program data, in category order.
    #[must_use]
    pub fn data_roots(&self, decl: &FunctionDecl) -> Vec<(String, BindingSlot)> {
        let mut roots = Vec::new();
        for (i, v) in self.args.iter().enumerate() {
            if !v.is_furniture() {
                roots.push((Self::arg_name(i, decl), BindingSlot::Arg(i)));
            }
        }
        for (k, v) in &self.kwargs {
            if !is_environment_binding(k, v) {
                roots.push((k.clone(), BindingSlot::Kwarg(k.clone())));
            }
        }
        for (k, v) in &self.globals {
            if !is_environment_binding(k, v) && k != &decl.name {
                roots.push((k.clone(), BindingSlot::Global(k.clone())));
            }
        }
        roots
    }

    /// Read the value at `root.field.field`.
    #[must_use]
    pub fn get_path(&self, path: &str, decl: &FunctionDecl) -> Option<Value> {
        let segments = split_path(path);
        let (root, rest) = segments.split_first()?;
        let slot = self.slot(root, decl)?;
        self.value(&slot)?.get_path(rest)
    }

    /// Write the value at `root.field.field`. Returns `false` if the path
    /// does not resolve.
    pub fn set_path(&mut self, path: &str, value: Value, decl: &FunctionDecl) -> bool {
        let segments = split_path(path);
        let Some((root, rest)) = segments.split_first() else {
            return false;
        };
        let Some(slot) = self.slot(root, decl) else {
            return false;
        };
        self.value_mut(&slot)
            .is_some_and(|target| target.set_path(rest, value))
    }

    /// JSON rendering for diagnostics and reports.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "args": self.args.iter().map(Value::to_json).collect::<Vec<_>>(),
            "kwargs": self.kwargs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<serde_json::Map<_, _>>(),
            "globals": self.globals.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<serde_json::Map<_, _>>(),
        })
    }
}

/// Candidate paths per category, rooted at entry-state names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSets {
    pub args: BTreeSet<String>,
    pub kwargs: BTreeSet<String>,
    pub globals: BTreeSet<String>,
}

impl CandidateSets {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty() && self.globals.is_empty()
    }

    pub fn insert(&mut self, category: Category, path: String) {
        match category {
            Category::Args => self.args.insert(path),
            Category::Kwargs => self.kwargs.insert(path),
            Category::Globals => self.globals.insert(path),
        };
    }

    pub fn extend(&mut self, other: &CandidateSets) {
        self.args.extend(other.args.iter().cloned());
        self.kwargs.extend(other.kwargs.iter().cloned());
        self.globals.extend(other.globals.iter().cloned());
    }

    /// Every path across categories.
    #[must_use]
    pub fn all(&self) -> BTreeSet<String> {
        self.args
            .iter()
            .chain(&self.kwargs)
            .chain(&self.globals)
            .cloned()
            .collect()
    }
}
