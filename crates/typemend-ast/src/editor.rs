//! Text-edit primitives.
//!
//! The rewriter talks to a [`SourceEditor`]; the buffered [`TextEdits`]
//! implementation accumulates edits and splices them into file text on
//! demand, and [`RecordingEditor`] is the audit-mode stand-in that records
//! the calls without producing any text.

use crate::error::Error;
use crate::source::SourceManager;
use crate::span::{FileId, Span};
use indexmap::IndexMap;

/// Sink for textual edits against registered source files.
pub trait SourceEditor {
    /// Replaces the text under `span`.
    fn replace(&mut self, span: Span, text: &str);

    /// Inserts text at a byte offset, before anything already there.
    fn insert_before(&mut self, file: FileId, offset: usize, text: &str);

    /// Inserts text immediately after the token ending at `offset`.
    fn insert_after(&mut self, file: FileId, offset: usize, text: &str);

    /// True if any edit touches the file.
    fn has_changes(&self, file: FileId) -> bool;
}

#[derive(Debug, Clone)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Buffered edits, applied by splicing in descending offset order.
#[derive(Debug, Default)]
pub struct TextEdits {
    edits: IndexMap<FileId, Vec<Edit>>,
}

impl TextEdits {
    /// Creates an empty edit set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Files that have at least one edit.
    pub fn changed_files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.edits
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| *k)
    }

    /// The rewritten text of a file, or `None` when it has no edits.
    ///
    /// Overlapping edits are resolved in favor of the earlier-registered
    /// edit; a later edit that would splice into an already-replaced region
    /// is dropped.
    pub fn rewritten_text(&self, sm: &SourceManager, file: FileId) -> Option<String> {
        let edits = self.edits.get(&file)?;
        if edits.is_empty() {
            return None;
        }
        let original = sm.text(file);

        // Registration order is the priority order: a later edit that
        // overlaps an accepted range is dropped.
        let mut accepted: Vec<&Edit> = Vec::new();
        for edit in edits {
            if edit.end > original.len() {
                continue;
            }
            let overlaps = accepted
                .iter()
                .any(|a| edit.start < a.end && a.start < edit.end);
            if !overlaps {
                accepted.push(edit);
            }
        }

        // Stable by start offset so equal-offset inserts keep registration
        // order once the reverse pass runs.
        accepted.sort_by_key(|e| (e.start, e.end));

        let mut text = original.to_string();
        for edit in accepted.iter().rev() {
            text.replace_range(edit.start..edit.end, &edit.text);
        }
        Some(text)
    }

    /// Writes every changed buffer back to its registered path.
    pub fn flush_changed_files(&self, sm: &SourceManager) -> Result<Vec<String>, Error> {
        let mut written = Vec::new();
        for file in self.changed_files() {
            let Some(text) = self.rewritten_text(sm, file) else {
                continue;
            };
            let path = sm.file(file).map(|f| f.path.clone()).unwrap_or_default();
            std::fs::write(&path, text).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        Ok(written)
    }
}

impl SourceEditor for TextEdits {
    fn replace(&mut self, span: Span, text: &str) {
        if !span.is_valid() {
            return;
        }
        self.edits.entry(span.file).or_default().push(Edit {
            start: span.start,
            end: span.end,
            text: text.to_string(),
        });
    }

    fn insert_before(&mut self, file: FileId, offset: usize, text: &str) {
        self.edits.entry(file).or_default().push(Edit {
            start: offset,
            end: offset,
            text: text.to_string(),
        });
    }

    fn insert_after(&mut self, file: FileId, offset: usize, text: &str) {
        self.insert_before(file, offset, text);
    }

    fn has_changes(&self, file: FileId) -> bool {
        self.edits.get(&file).is_some_and(|v| !v.is_empty())
    }
}

/// One recorded editor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Replace { span: Span, text: String },
    Insert { file: FileId, offset: usize, text: String },
}

/// Audit-mode editor: records every call, changes nothing.
#[derive(Debug, Default)]
pub struct RecordingEditor {
    /// Recorded operations in call order.
    pub ops: Vec<EditOp>,
}

impl RecordingEditor {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SourceEditor for RecordingEditor {
    fn replace(&mut self, span: Span, text: &str) {
        if !span.is_valid() {
            return;
        }
        self.ops.push(EditOp::Replace {
            span,
            text: text.to_string(),
        });
    }

    fn insert_before(&mut self, file: FileId, offset: usize, text: &str) {
        self.ops.push(EditOp::Insert {
            file,
            offset,
            text: text.to_string(),
        });
    }

    fn insert_after(&mut self, file: FileId, offset: usize, text: &str) {
        self.insert_before(file, offset, text);
    }

    fn has_changes(&self, file: FileId) -> bool {
        self.ops.iter().any(|op| match op {
            EditOp::Replace { span, .. } => span.file == file,
            EditOp::Insert { file: f, .. } => *f == file,
        })
    }
}
