//! Change records and their audit/report renderings.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// One proposed or applied source modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// File the change lands in.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// Name of the symbol being modified.
    pub symbol: String,
    /// Original type spelling.
    pub old: String,
    /// New type spelling.
    pub new: String,
}

/// Report-output errors.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The report file could not be opened or written.
    #[error("cannot write report {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Renders the audit table printed to stdout in `--audit` mode.
pub fn markdown_table(changes: &[ChangeRecord]) -> String {
    let mut out = String::from("| File | Line | Symbol | Old Type | New Type |\n");
    out.push_str("|---|---|---|---|---|\n");
    for c in changes {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            c.file, c.line, c.symbol, c.old, c.new
        ));
    }
    out
}

/// Appends one JSON object per change to the report file. Consumers parse
/// line by line; records accumulate across translation units.
pub fn append_json_report(path: impl AsRef<Path>, changes: &[ChangeRecord]) -> Result<(), ReportError> {
    let path = path.as_ref();
    let io_err = |source| ReportError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    for change in changes {
        let line = serde_json::to_string(change).expect("records serialize");
        writeln!(file, "{}", line).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChangeRecord {
        ChangeRecord {
            file: "main.c".to_string(),
            line: 3,
            symbol: "n".to_string(),
            old: "int".to_string(),
            new: "size_t".to_string(),
        }
    }

    #[test]
    fn test_markdown_table_layout() {
        let table = markdown_table(&[sample()]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "| File | Line | Symbol | Old Type | New Type |");
        assert_eq!(lines[2], "| main.c | 3 | n | int | size_t |");
    }

    #[test]
    fn test_markdown_table_empty() {
        let table = markdown_table(&[]);
        assert_eq!(table.lines().count(), 2);
    }

    #[test]
    fn test_json_report_appends_line_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        append_json_report(&path, &[sample()]).unwrap();
        append_json_report(&path, &[sample()]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: ChangeRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, sample());
        assert!(lines[0].contains("\"file\":\"main.c\""));
        assert!(lines[0].contains("\"line\":3"));
    }

    #[test]
    fn test_json_report_unwritable_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = append_json_report(dir.path().join("no/dir/report.json"), &[sample()]);
        assert!(matches!(err, Err(ReportError::Io { .. })));
    }
}
