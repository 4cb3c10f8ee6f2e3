//! `bump(a)`: increments global `g` and raises once it reaches 3.

use recrash_kernel::value::{Bindings, Value};
use recrash_search::contract::{CallContext, Raised, TargetFunction};

pub const SOURCE: &str = "\
def bump(a):
    global g
    g = g + 1
    if g == 3:
        raise ValueError(\"g reached 3\")
    return a + g
";

/// Line of the `raise` in [`SOURCE`].
pub const RAISE_LINE: u32 = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct Counter;

impl TargetFunction for Counter {
    fn name(&self) -> &str {
        "bump"
    }

    fn source(&self) -> Option<&str> {
        Some(SOURCE)
    }

    fn call(&self, ctx: &mut CallContext) -> Result<Value, Raised> {
        let Some(Value::Int(g)) = ctx.global("g").cloned() else {
            return Err(ctx.raise("NameError", "name 'g' is not defined", 3, Bindings::new()));
        };
        let g = g.wrapping_add(1);
        ctx.set_global("g", Value::Int(g));
        if g == 3 {
            return Err(ctx.raise("ValueError", "g reached 3", RAISE_LINE, Bindings::new()));
        }
        match ctx.arg(0, "a") {
            Some(Value::Int(a)) => Ok(Value::Int(a.wrapping_add(g))),
            _ => Err(ctx.raise("TypeError", "unsupported operand", 6, Bindings::new())),
        }
    }
}
