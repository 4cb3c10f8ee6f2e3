//! Target function contract.
//!
//! A target is any in-process function the engine can call with explicit
//! arguments and an explicit global environment. It either returns a value
//! or reports a raised exception together with the frames that were live
//! when it was raised.

use recrash_kernel::value::{Bindings, Value};
use serde::{Deserialize, Serialize};

/// Where and what was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionSite {
    /// Exception type name (`"ValueError"`).
    pub kind: String,
    pub message: String,
    /// Source line of the raise.
    pub line: u32,
}

impl ExceptionSite {
    #[must_use]
    pub fn new(kind: &str, message: &str, line: u32) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.to_string(),
            line,
        }
    }

    /// Same kind at the same line. Messages often embed state and are
    /// ignored.
    #[must_use]
    pub fn matches(&self, other: &ExceptionSite) -> bool {
        self.kind == other.kind && self.line == other.line
    }
}

impl std::fmt::Display for ExceptionSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at line {}: {}", self.kind, self.line, self.message)
    }
}

/// One live frame at raise time.
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: String,
    /// Engine or library frame rather than application code.
    pub synthetic: bool,
    pub locals: Bindings,
    pub globals: Bindings,
}

/// A raised exception and its frame stack, innermost last.
#[derive(Debug, Clone)]
pub struct Raised {
    pub site: ExceptionSite,
    pub frames: Vec<Frame>,
}

impl Raised {
    /// The innermost frame that belongs to application code.
    #[must_use]
    pub fn innermost_application_frame(&self) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| !f.synthetic)
    }

    /// Push a frame inside the current innermost one.
    #[must_use]
    pub fn within(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }
}

/// Globals visible to one call.
///
/// Built from a deep copy for every trial; nothing is read back out of it
/// into application state.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: Bindings,
}

impl Environment {
    #[must_use]
    pub fn new(bindings: Bindings) -> Self {
        Self { bindings }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.bindings.get_mut(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    #[must_use]
    pub fn into_bindings(self) -> Bindings {
        self.bindings
    }
}

/// Everything a target sees during one call.
#[derive(Debug, Clone)]
pub struct CallContext {
    function: String,
    pub args: Vec<Value>,
    pub kwargs: Bindings,
    pub env: Environment,
}

impl CallContext {
    #[must_use]
    pub fn new(function: &str, args: Vec<Value>, kwargs: Bindings, env: Environment) -> Self {
        Self {
            function: function.to_string(),
            args,
            kwargs,
            env,
        }
    }

    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Argument bound to a parameter: positional `index` if supplied,
    /// otherwise keyword `name`.
    #[must_use]
    pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }

    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.env.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.env.set(name, value);
    }

    /// Build a [`Raised`] whose only frame is this call, with `locals` and
    /// the current globals.
    #[must_use]
    pub fn raise(&self, kind: &str, message: &str, line: u32, locals: Bindings) -> Raised {
        Raised {
            site: ExceptionSite::new(kind, message, line),
            frames: vec![Frame {
                function: self.function.clone(),
                synthetic: false,
                locals,
                globals: self.env.bindings().clone(),
            }],
        }
    }
}

/// A function the engine can run.
pub trait TargetFunction {
    /// Name used to find the definition in [`TargetFunction::source`] and
    /// pruned from captured globals.
    fn name(&self) -> &str;

    /// Python-style source of the function, for dependency analysis.
    fn source(&self) -> Option<&str> {
        None
    }

    /// Run once.
    ///
    /// # Errors
    ///
    /// Returns [`Raised`] when the function raises.
    fn call(&self, ctx: &mut CallContext) -> Result<Value, Raised>;
}
