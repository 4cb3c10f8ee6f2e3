//! Recrash Harness: end-to-end orchestration over the search crate.
//!
//! The harness runs a captured crash through both search phases
//! (`CrashReproducer` → `EntryStateSearcher`) and reports the reproduced
//! entry state or an explicit failure outcome.
//!
//! The harness does NOT implement search logic; it delegates to
//! `recrash_search`. Target programs provide behavior and source text only.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod engine;
pub mod programs;
pub mod telemetry;
pub mod trial_log;

pub use engine::{
    capture_call, Capture, Engine, EngineError, EngineOutcome, EnginePolicy, EngineReport,
};
pub use telemetry::init_tracing;
pub use trial_log::{JsonlTrialLog, TrialLogError};
