//! Per-translation-unit processing.
//!
//! A session runs one file through the whole pipeline: front end, boundary
//! analysis, constraint collection, solve, rewrite. The outcome carries the
//! change records, the rewritten main buffer (when anything changed), and
//! the facts the Map phase exports.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use typemend_analysis::{BoundaryAnalyzer, BoundaryConfig, Collector, TypeSolver};
use typemend_ast::{FileOrigin, RecordingEditor, SourceManager, TextEdits, TypeOracle};
use typemend_facts::FactMap;
use typemend_front::{parse_translation_unit, ParseOptions};
use typemend_rewrite::{collect_facts, rewrite_unit, ChangeRecord, RewriteOptions};

/// Cross-translation-unit execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Single pass; no facts read or written.
    Standalone,
    /// Process each unit and write its facts.
    Map,
    /// Pre-seed each unit from the merged global facts.
    Apply,
    /// Loop Map and Reduce until the global facts stop changing.
    Iterative,
}

impl Phase {
    /// True when units should pre-seed from `global.facts`.
    pub fn reads_global_facts(self) -> bool {
        matches!(self, Phase::Apply | Phase::Iterative)
    }

    /// True when units should export per-unit facts.
    pub fn writes_facts(self) -> bool {
        matches!(self, Phase::Map | Phase::Iterative)
    }
}

/// Everything the driver needs to process one unit.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub project_root: Option<PathBuf>,
    pub exclude: Option<Regex>,
    pub in_place: bool,
    pub enable_abi_breaking_changes: bool,
    pub force_rewrite: bool,
    pub audit: bool,
    pub use_decltype: bool,
    pub expand_auto: bool,
    pub phase: Phase,
    pub facts_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            exclude: None,
            in_place: false,
            enable_abi_breaking_changes: false,
            force_rewrite: false,
            audit: false,
            use_decltype: false,
            expand_auto: false,
            phase: Phase::Standalone,
            facts_dir: None,
        }
    }
}

/// Result of processing one translation unit.
#[derive(Debug)]
pub struct TuOutcome {
    /// Path of the processed main file.
    pub source: PathBuf,
    /// Every change applied or (in audit mode) proposed.
    pub changes: Vec<ChangeRecord>,
    /// The rewritten main buffer, `None` when nothing changed or when
    /// buffers were flushed in place.
    pub rewritten_main: Option<String>,
    /// Files written to disk by `--in-place`.
    pub written_files: Vec<String>,
    /// Facts to export in Map/Iterative phases.
    pub facts: FactMap,
}

/// Processes one source file from disk.
pub fn process_file(
    path: &Path,
    config: &SessionConfig,
    global_facts: Option<&FactMap>,
) -> Result<TuOutcome> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read source file {}", path.display()))?;
    let mut sm = SourceManager::new();
    let main = sm.add_file(path.to_string_lossy().into_owned(), text, FileOrigin::Main);
    process_unit(sm, main, path.to_path_buf(), config, global_facts)
}

/// Processes a unit whose files are already registered; the entry point for
/// in-process tests.
pub fn process_unit(
    mut sm: SourceManager,
    main: typemend_ast::FileId,
    source: PathBuf,
    config: &SessionConfig,
    global_facts: Option<&FactMap>,
) -> Result<TuOutcome> {
    let options = ParseOptions {
        resolve_includes_from_disk: true,
        force_cpp: None,
    };
    let tu = parse_translation_unit(&mut sm, main, &options)
        .with_context(|| format!("cannot parse {}", source.display()))?;

    let oracle = TypeOracle::lp64();
    let boundary_config = BoundaryConfig {
        allow_abi_changes: config.enable_abi_breaking_changes,
        force_rewrite: config.force_rewrite,
        project_root: config.project_root.clone(),
        exclude: config.exclude.clone(),
    };
    let mut boundary = BoundaryAnalyzer::new(&sm, boundary_config, oracle);

    let size_ty = Collector::unit_size_type(&tu, &oracle);
    let ptrdiff_ty = Collector::unit_ptrdiff_type(&tu, &oracle);
    let mut solver = TypeSolver::new(oracle, size_ty, ptrdiff_ty);
    let collected = Collector::new(&tu, &sm, oracle).collect(&mut solver, &mut boundary, global_facts);
    let updates = solver.solve();

    let rewrite_options = RewriteOptions {
        use_decltype: config.use_decltype,
        expand_auto: config.expand_auto,
    };

    let facts = if config.phase.writes_facts() {
        collect_facts(&tu, &updates)
    } else {
        FactMap::new()
    };

    if config.audit {
        let mut recorder = RecordingEditor::new();
        let changes = rewrite_unit(
            &tu,
            &sm,
            oracle,
            &updates,
            &collected,
            &mut boundary,
            &mut recorder,
            &rewrite_options,
        );
        return Ok(TuOutcome {
            source,
            changes,
            rewritten_main: None,
            written_files: Vec::new(),
            facts,
        });
    }

    let mut edits = TextEdits::new();
    let changes = rewrite_unit(
        &tu,
        &sm,
        oracle,
        &updates,
        &collected,
        &mut boundary,
        &mut edits,
        &rewrite_options,
    );

    let mut written_files = Vec::new();
    let mut rewritten_main = None;
    if config.in_place {
        written_files = edits
            .flush_changed_files(&sm)
            .context("cannot write rewritten files")?;
    } else {
        rewritten_main = edits.rewritten_text(&sm, main);
    }

    Ok(TuOutcome {
        source,
        changes,
        rewritten_main,
        written_files,
        facts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(src: &str) -> (SourceManager, typemend_ast::FileId) {
        let mut sm = SourceManager::new();
        let main = sm.add_file("main.c", src, FileOrigin::Main);
        (sm, main)
    }

    const PRELUDE: &str =
        "typedef unsigned long size_t;\nsize_t strlen(const char *s);\n";

    #[test]
    fn test_standalone_rewrites_buffer() {
        let src = format!(
            "{}int main() {{ const int n = strlen(\"FOO\"); return 0; }}",
            PRELUDE
        );
        let (sm, main) = unit(&src);
        let outcome = process_unit(
            sm,
            main,
            PathBuf::from("main.c"),
            &SessionConfig::default(),
            None,
        )
        .unwrap();

        let rewritten = outcome.rewritten_main.unwrap();
        assert!(rewritten.contains("const size_t n"));
        assert_eq!(outcome.changes.len(), 1);
        assert!(outcome.facts.is_empty());
    }

    #[test]
    fn test_unchanged_unit_produces_no_buffer() {
        let (sm, main) = unit("int main() { return 0; }");
        let outcome = process_unit(
            sm,
            main,
            PathBuf::from("main.c"),
            &SessionConfig::default(),
            None,
        )
        .unwrap();
        assert!(outcome.rewritten_main.is_none());
        assert!(outcome.changes.is_empty());
    }

    #[test]
    fn test_audit_mode_only_records() {
        let src = format!(
            "{}int main() {{ const int n = strlen(\"FOO\"); return 0; }}",
            PRELUDE
        );
        let (sm, main) = unit(&src);
        let config = SessionConfig {
            audit: true,
            ..Default::default()
        };
        let outcome =
            process_unit(sm, main, PathBuf::from("main.c"), &config, None).unwrap();
        assert!(outcome.rewritten_main.is_none());
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].new, "size_t");
    }

    #[test]
    fn test_map_phase_exports_facts() {
        let src = format!(
            "{}int main() {{ const int n = strlen(\"FOO\"); return 0; }}",
            PRELUDE
        );
        let (sm, main) = unit(&src);
        let config = SessionConfig {
            phase: Phase::Map,
            ..Default::default()
        };
        let outcome =
            process_unit(sm, main, PathBuf::from("main.c"), &config, None).unwrap();
        assert_eq!(outcome.facts.len(), 1);
        let fact = outcome.facts.values().next().unwrap();
        assert_eq!(fact.type_name, "size_t");
    }

    #[test]
    fn test_parse_failure_propagates() {
        let (sm, main) = unit("int = ;");
        let result = process_unit(
            sm,
            main,
            PathBuf::from("main.c"),
            &SessionConfig::default(),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_phase_flags() {
        assert!(!Phase::Standalone.reads_global_facts());
        assert!(Phase::Apply.reads_global_facts());
        assert!(Phase::Iterative.reads_global_facts());
        assert!(Phase::Map.writes_facts());
        assert!(Phase::Iterative.writes_facts());
        assert!(!Phase::Apply.writes_facts());
    }
}
