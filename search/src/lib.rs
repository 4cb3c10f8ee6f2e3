//! Recrash Search: the two search phases that turn a captured crash into a
//! replayable entry state.
//!
//! This crate depends only on `recrash_kernel`. It does NOT depend on
//! `recrash_harness`.
//!
//! # Crate dependency graph
//!
//! ```text
//! recrash_kernel  ←  recrash_search  ←  recrash_harness
//! (values, diffs)    (phases, corpus)    (engine, log, programs)
//! ```
//!
//! # Key types
//!
//! - [`TargetFunction`]: the function under repair, called in-process
//! - [`CrashSnapshot`]: immutable record of the failing call
//! - [`EntryState`]: arguments, keyword arguments and globals of one call
//! - [`CrashReproducer`]: phase 1: reproduce the exception kind and line
//! - [`EntryStateSearcher`]: phase 2: also reproduce the final state
//! - [`RegressionAssistant`]: numeric shortcut consulted during phase 2
//! - [`TrialSink`]: per-trial diagnostics receiver

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod assistant;
pub mod contract;
pub mod corpus;
pub mod crash;
pub mod entry;
pub mod error;
pub mod execute;
pub mod mlp;
pub mod policy;
pub mod snapshot;
pub mod state;
pub mod trial;

pub use assistant::RegressionAssistant;
pub use contract::{CallContext, ExceptionSite, Frame, Raised, TargetFunction};
pub use corpus::MutationCorpus;
pub use crash::{CrashReproducer, CrashSearchResult};
pub use entry::{EntrySearchResult, EntryStateSearcher};
pub use error::SearchError;
pub use policy::{AssistantPolicy, CrashSearchPolicy, EntrySearchPolicy};
pub use snapshot::CrashSnapshot;
pub use state::EntryState;
pub use trial::{MemorySink, NullSink, TrialEvent, TrialSink};
