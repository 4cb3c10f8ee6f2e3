//! Bundled target programs.
//!
//! Each program is a small Python-style function with its source text, so
//! dependency analysis runs on the same code the implementation follows.
//! Line numbers in raised exceptions refer to that source.

pub mod counter;
pub mod drift;
pub mod ledger;

pub use counter::Counter;
pub use drift::Drift;
pub use ledger::Ledger;
