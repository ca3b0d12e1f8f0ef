//! Source file registry and include graph.
//!
//! A `SourceManager` owns the text of every file making up one translation
//! unit: the main source file, user headers, system headers, and synthetic
//! buffers. Include relationships are recorded so the boundary analyzer can
//! walk "who included me" chains without re-parsing anything.

use crate::span::{FileId, Span};
use std::path::Path;

/// Provenance of a registered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrigin {
    /// The translation unit's main source file.
    Main,
    /// A user header pulled in by `#include`.
    User,
    /// A header the front end marks as a system header.
    System,
    /// An in-memory buffer with no backing file entry.
    Buffer,
}

/// One registered source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// This file's id.
    pub id: FileId,
    /// Path as registered. For buffers this is a display name only.
    pub path: String,
    /// Full text.
    pub text: String,
    /// Provenance.
    pub origin: FileOrigin,
    /// The file whose `#include` brought this one in, if any.
    pub included_from: Option<FileId>,
}

/// Registry of the files making up one translation unit.
#[derive(Debug, Default)]
pub struct SourceManager {
    files: Vec<SourceFile>,
    main: Option<FileId>,
}

impl SourceManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file and returns its id. The first file registered with
    /// [`FileOrigin::Main`] becomes the main file.
    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        text: impl Into<String>,
        origin: FileOrigin,
    ) -> FileId {
        let id = FileId::new(self.files.len() as u32);
        self.files.push(SourceFile {
            id,
            path: path.into(),
            text: text.into(),
            origin,
            included_from: None,
        });
        if origin == FileOrigin::Main && self.main.is_none() {
            self.main = Some(id);
        }
        id
    }

    /// Records that `file` was included from `includer`.
    pub fn set_included_from(&mut self, file: FileId, includer: FileId) {
        if let Some(f) = self.files.get_mut(file.index()) {
            f.included_from = Some(includer);
        }
    }

    /// The main file of this translation unit.
    pub fn main_file(&self) -> Option<FileId> {
        self.main
    }

    /// Looks up a file by id.
    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.index())
    }

    /// Looks up a registered file by its path.
    pub fn file_by_path(&self, path: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Iterates over all registered files.
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter()
    }

    /// Full text of a file. Empty for unknown ids.
    pub fn text(&self, id: FileId) -> &str {
        self.file(id).map(|f| f.text.as_str()).unwrap_or("")
    }

    /// The source text under a span, or `None` if the span is invalid or out
    /// of bounds.
    pub fn snippet(&self, span: Span) -> Option<&str> {
        if !span.is_valid() {
            return None;
        }
        self.file(span.file)?.text.get(span.start..span.end)
    }

    /// True if the span lies in the main file.
    pub fn is_in_main_file(&self, span: Span) -> bool {
        span.is_valid() && Some(span.file) == self.main
    }

    /// True if the file is marked as a system header.
    pub fn is_system(&self, id: FileId) -> bool {
        matches!(self.file(id), Some(f) if f.origin == FileOrigin::System)
    }

    /// True if the file has an underlying file entry (not a synthetic buffer).
    pub fn has_file_entry(&self, id: FileId) -> bool {
        matches!(self.file(id), Some(f) if f.origin != FileOrigin::Buffer)
    }

    /// 1-based line number of the span's start, for change records.
    pub fn line_number(&self, span: Span) -> u32 {
        if !span.is_valid() {
            return 0;
        }
        let Some(file) = self.file(span.file) else {
            return 0;
        };
        let upto = &file.text[..span.start.min(file.text.len())];
        upto.bytes().filter(|&b| b == b'\n').count() as u32 + 1
    }

    /// Display path of the file containing the span.
    pub fn path_of(&self, span: Span) -> &str {
        self.file(span.file).map(|f| f.path.as_str()).unwrap_or("")
    }

    /// File name (no directory) of the file containing the span.
    pub fn file_name_of(&self, span: Span) -> String {
        Path::new(self.path_of(span))
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
