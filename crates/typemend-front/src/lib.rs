//! # typemend-front
//!
//! A simplified C/C++ front end feeding the typemend analysis.
//!
//! This front end handles the subset the integer-type analysis cares about:
//! - typedefs, function prototypes and definitions, variable declarations
//!   (including multi-declarator statements), struct/union fields
//! - statements: compound, expression, `return`, `for`, `while`, `if`
//! - expressions: calls, member calls, assignments, arithmetic and
//!   comparisons, subscripts, explicit casts, `sizeof`, address-of
//! - object-like `#define` with expansion tracking, `#include` against the
//!   in-memory source registry (and the disk as a fallback)
//!
//! It does NOT handle:
//! - Conditional compilation (`#if`; include guards are tolerated)
//! - Templates beyond written template-ids like `std::vector<int>`
//! - Overloading, namespaces beyond `std::` qualification, or exceptions
//!
//! Anything outside the subset is a [`ParseError`], never a panic.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod preprocess;

pub use error::{ParseError, ParseResult};
pub use parser::{parse_translation_unit, ParseOptions};
