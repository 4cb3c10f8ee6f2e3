//! `drift(x)`: shifts global `level` by a constant, then always raises.
//!
//! Any entry state reproduces the crash; only `level == target - 7`
//! reproduces the final state, which makes it a fixture for the assistant.

use recrash_kernel::value::{Bindings, Value};
use recrash_search::contract::{CallContext, Raised, TargetFunction};

pub const SOURCE: &str = "\
def drift(x):
    global level
    level = level + 7
    raise RuntimeError(\"drift\")
";

pub const RAISE_LINE: u32 = 4;

/// What one call adds to `level`.
pub const STEP: i64 = 7;

#[derive(Debug, Clone, Copy, Default)]
pub struct Drift;

impl TargetFunction for Drift {
    fn name(&self) -> &str {
        "drift"
    }

    fn source(&self) -> Option<&str> {
        Some(SOURCE)
    }

    fn call(&self, ctx: &mut CallContext) -> Result<Value, Raised> {
        let x = ctx.arg(0, "x").cloned().unwrap_or(Value::None);
        let locals = Bindings::from([("x".to_string(), x)]);
        let Some(Value::Int(level)) = ctx.global("level").cloned() else {
            return Err(ctx.raise("NameError", "name 'level' is not defined", 3, locals));
        };
        ctx.set_global("level", Value::Int(level.wrapping_add(STEP)));
        Err(ctx.raise("RuntimeError", "drift", RAISE_LINE, locals))
    }
}
