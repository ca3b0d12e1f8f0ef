//! Error types for typemend-ast.

use thiserror::Error;

/// Errors raised by the source model and edit primitives.
#[derive(Error, Debug)]
pub enum Error {
    /// A span does not lie within its file's text.
    #[error("span {0:?} is out of bounds")]
    SpanOutOfBounds(crate::Span),

    /// Flushing rewritten buffers to disk failed.
    #[error("cannot write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
