//! Recrash Kernel: value model, mutation, canonical snapshots and
//! dependency analysis for crash-state reproduction.
//!
//! The kernel holds no search logic. It answers three questions for the
//! search layer: what a program value looks like (`value`), how to perturb
//! it (`mutate`), and whether two values are the same state (`snapshot`).
//! `analysis` narrows which inputs are worth perturbing.
//!
//! # Module Dependency Direction
//!
//! `value` ← `snapshot`, `value` ← `mutate`; `analysis` depends on nothing
//! internal.
//!
//! One-way only. No cycles.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod analysis;
pub mod mutate;
pub mod policy;
pub mod snapshot;
pub mod value;
