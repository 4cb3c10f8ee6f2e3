//! Controlled invocation of a target.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use recrash_kernel::value::Value;

use crate::contract::{CallContext, Environment, Raised, TargetFunction};
use crate::state::EntryState;

/// How one call ended.
#[derive(Debug, Clone)]
pub enum TrialOutcome {
    Returned(Value),
    Raised(Raised),
    /// The target panicked; the panic was contained.
    Panicked { detail: String },
}

/// Run `target` on a fresh deep copy of `entry`.
pub fn invoke(target: &dyn TargetFunction, entry: &EntryState) -> TrialOutcome {
    let copy = entry.deep_copy();
    let mut ctx = CallContext::new(
        target.name(),
        copy.args,
        copy.kwargs,
        Environment::new(copy.globals),
    );
    invoke_in(target, &mut ctx)
}

/// Run `target` in a caller-owned context. Globals written by the call stay
/// in `ctx.env`, so repeated calls observe each other.
pub fn invoke_in(target: &dyn TargetFunction, ctx: &mut CallContext) -> TrialOutcome {
    match catch_unwind(AssertUnwindSafe(|| target.call(ctx))) {
        Ok(Ok(value)) => TrialOutcome::Returned(value),
        Ok(Err(raised)) => TrialOutcome::Raised(raised),
        Err(payload) => {
            let detail = panic_detail(payload.as_ref());
            tracing::warn!(function = target.name(), %detail, "target panicked");
            TrialOutcome::Panicked { detail }
        }
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
