//! # typemend-ast
//!
//! The typed syntax tree and source model consumed by the typemend analysis
//! pipeline.
//!
//! This crate provides:
//! - Source files, byte spans, and the include graph (`SourceManager`)
//! - The C type model and an integer width oracle (`CType`, `TypeOracle`)
//! - The declaration/expression/statement arena (`Tu`)
//! - Text-edit primitives used by the rewriter (`SourceEditor`, `TextEdits`)
//!
//! The front end (`typemend-front`) is one producer of this tree; tests may
//! also construct trees programmatically.

pub mod ast;
pub mod ctype;
pub mod editor;
pub mod error;
pub mod oracle;
pub mod source;
pub mod span;

pub use ast::{
    BinOp, CastStyle, Decl, DeclId, DeclKind, Expr, ExprId, ExprKind, MacroDef, MacroOrigin,
    Stmt, StmtId, StmtKind, Tu, UnaryOp,
};
pub use ctype::{CType, IntType, IntWidth};
pub use editor::{RecordingEditor, SourceEditor, TextEdits};
pub use error::Error;
pub use oracle::TypeOracle;
pub use source::{FileOrigin, SourceFile, SourceManager};
pub use span::{FileId, Span};
