//! `settle(book, fee)`: debits a shared account record and audits it.
//!
//! The account is reachable both as the `book` argument and through the
//! `registry` global, and the overdraft is raised from inside a library
//! helper frame.

use recrash_kernel::value::{Bindings, Value};
use recrash_search::contract::{CallContext, Frame, Raised, TargetFunction};

pub const SOURCE: &str = "\
def settle(book, fee):
    book.balance = book.balance - fee
    audit(book)
    return book.balance
";

/// Line of the `audit` call in [`SOURCE`]; the raise inside the helper is
/// attributed to it.
pub const RAISE_LINE: u32 = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ledger;

/// An account record.
#[must_use]
pub fn book(balance: i64, owner: &str) -> Value {
    Value::record(
        "Book",
        vec![
            ("balance", Value::Int(balance)),
            ("owner", Value::record("Owner", vec![("name", Value::text(owner))])),
        ],
    )
}

/// Globals holding `book` under `registry.main`.
#[must_use]
pub fn globals(book: &Value) -> Bindings {
    Bindings::from([(
        "registry".to_string(),
        Value::Map([("main".to_string(), book.clone())].into()),
    )])
}

impl TargetFunction for Ledger {
    fn name(&self) -> &str {
        "settle"
    }

    fn source(&self) -> Option<&str> {
        Some(SOURCE)
    }

    fn call(&self, ctx: &mut CallContext) -> Result<Value, Raised> {
        let (Some(Value::Record(account)), Some(Value::Int(fee))) =
            (ctx.arg(0, "book").cloned(), ctx.arg(1, "fee").cloned())
        else {
            return Err(ctx.raise("TypeError", "bad arguments", 2, Bindings::new()));
        };
        let Some(Value::Int(balance)) = account.field("balance") else {
            return Err(ctx.raise("AttributeError", "balance", 2, Bindings::new()));
        };
        let balance = balance.wrapping_sub(fee);
        account.set_field("balance", Value::Int(balance));

        if balance < 0 {
            let locals = Bindings::from([
                ("book".to_string(), Value::Record(account.clone())),
                ("fee".to_string(), Value::Int(fee)),
            ]);
            let audit = Frame {
                function: "audit".to_string(),
                synthetic: true,
                locals: Bindings::from([("account".to_string(), Value::Record(account))]),
                globals: Bindings::new(),
            };
            return Err(ctx
                .raise("ValueError", "overdrawn", RAISE_LINE, locals)
                .within(audit));
        }
        Ok(Value::Int(balance))
    }
}
