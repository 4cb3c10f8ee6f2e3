//! The captured crash: the immutable input to both search phases.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use recrash_kernel::snapshot::{canonicalize_bindings, CanonicalSnapshot};
use recrash_kernel::value::{prune_environment, Bindings};

use crate::contract::{ExceptionSite, Raised, TargetFunction};
use crate::state::EntryState;

/// Record of one failing call.
///
/// Built once when the crash is intercepted and never mutated afterwards.
/// Environment bindings and the function's own name are pruned from the
/// bug maps at construction.
#[derive(Clone)]
pub struct CrashSnapshot {
    target: Rc<dyn TargetFunction>,
    original: EntryState,
    exception: ExceptionSite,
    bug_locals: BTreeMap<String, CanonicalSnapshot>,
    bug_globals: BTreeMap<String, CanonicalSnapshot>,
}

impl CrashSnapshot {
    /// `original` holds the arguments of the failing call and the globals
    /// visible when it was intercepted; `locals` and `globals` are the
    /// bindings of the raising frame.
    #[must_use]
    pub fn new(
        target: Rc<dyn TargetFunction>,
        original: EntryState,
        exception: ExceptionSite,
        locals: &Bindings,
        globals: &Bindings,
    ) -> Self {
        let name = target.name().to_string();
        let original = original.deep_copy();
        Self {
            target,
            original,
            exception,
            bug_locals: canonicalize_bindings(&prune_environment(locals, &name)),
            bug_globals: canonicalize_bindings(&prune_environment(globals, &name)),
        }
    }

    /// Build from an intercepted raise, using its innermost application
    /// frame. Returns `None` if every frame is synthetic.
    #[must_use]
    pub fn from_raised(
        target: Rc<dyn TargetFunction>,
        original: EntryState,
        raised: &Raised,
    ) -> Option<Self> {
        let frame = raised.innermost_application_frame()?;
        Some(Self::new(
            target,
            original,
            raised.site.clone(),
            &frame.locals,
            &frame.globals,
        ))
    }

    /// A copy with a different recorded entry state, for captures whose
    /// inputs were read at the wrong moment.
    #[must_use]
    pub fn with_original(&self, original: EntryState) -> Self {
        Self {
            original: original.deep_copy(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn target(&self) -> &dyn TargetFunction {
        self.target.as_ref()
    }

    #[must_use]
    pub fn function_name(&self) -> &str {
        self.target.name()
    }

    /// Arguments and globals as captured.
    #[must_use]
    pub fn original(&self) -> &EntryState {
        &self.original
    }

    #[must_use]
    pub fn exception(&self) -> &ExceptionSite {
        &self.exception
    }

    #[must_use]
    pub fn bug_locals(&self) -> &BTreeMap<String, CanonicalSnapshot> {
        &self.bug_locals
    }

    #[must_use]
    pub fn bug_globals(&self) -> &BTreeMap<String, CanonicalSnapshot> {
        &self.bug_globals
    }
}

impl fmt::Debug for CrashSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashSnapshot")
            .field("function", &self.function_name())
            .field("exception", &self.exception)
            .field("bug_locals", &self.bug_locals.keys().collect::<Vec<_>>())
            .field("bug_globals", &self.bug_globals.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
