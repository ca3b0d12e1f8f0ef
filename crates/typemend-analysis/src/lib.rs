//! # typemend-analysis
//!
//! The analysis core of typemend:
//! - Boundary classification of files and declarations (`boundary`)
//! - Value ranges (`range`)
//! - The constraint graph and type solver (`solver`)
//! - The AST walk that feeds the solver (`collector`)

pub mod boundary;
pub mod collector;
pub mod format;
pub mod range;
pub mod solver;

pub use boundary::{BoundaryAnalyzer, BoundaryConfig, BoundaryStatus};
pub use collector::{
    unit_ptrdiff_type, unit_size_type, CallArgUse, CastRecord, Collected, Collector, ExprTyper,
};
pub use format::{parse_format_string, specifier_for, FormatSpec, FormatUsage};
pub use range::ValueRange;
pub use solver::{wider_type, Node, OpKind, TypeSolver};
