//! # typemend
//!
//! Source-to-source integer type repair for C and C++: infers the widest
//! type every mutable declaration needs and rewrites declarations, macros,
//! template arguments, and format specifiers to match — or reports the
//! changes in audit mode.
//!
//! The binary front door lives in `main.rs`; this library exposes the
//! per-translation-unit session and the cross-translation-unit driver so
//! integration tests can run the pipeline in-process.

pub mod ctu;
pub mod session;

pub use ctu::{per_tu_facts_path, run_iterative, run_reduce};
pub use session::{Phase, SessionConfig, TuOutcome};
