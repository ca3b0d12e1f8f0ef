//! # typemend-rewrite
//!
//! Converts solver results into ordered textual edits: redundant-cast
//! removal, template-argument rewrites, macro-body rewrites, base
//! declaration rewrites (with multi-declarator splitting and auto/decltype
//! handling), cast injection at unfixable call sites, and format-specifier
//! updates. Every edit yields a [`ChangeRecord`] for audit and report
//! output.

pub mod change;
pub mod macro_scan;
pub mod rewriter;

pub use change::{append_json_report, markdown_table, ChangeRecord, ReportError};
pub use macro_scan::find_object_macro_body;
pub use rewriter::{collect_facts, rewrite_unit, RewriteOptions};
