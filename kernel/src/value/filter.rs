//! Default/environment binding filter.
//!
//! Dunder-style names and callables are language furniture rather than
//! program data. They are excluded from comparison and from mutation.

use super::{Bindings, Value};

/// True if a binding is furniture and must be ignored.
#[must_use]
pub fn is_environment_binding(name: &str, value: &Value) -> bool {
    is_dunder(name) || value.is_furniture()
}

/// Drop furniture bindings, plus the target function's own name.
#[must_use]
pub fn prune_environment(bindings: &Bindings, function_name: &str) -> Bindings {
    bindings
        .iter()
        .filter(|(name, value)| name.as_str() != function_name && !is_environment_binding(name, value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}
