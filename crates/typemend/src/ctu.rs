//! Cross-translation-unit driving: Map fan-out, the Reduce merge, and the
//! iterative fixed-point loop.
//!
//! Units never share memory; everything crosses through fact files in
//! `facts_dir`. `global.facts` is reserved for the Reduce output.

use crate::session::{process_file, SessionConfig};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use typemend_facts::{is_converged, merge_facts, read_facts, write_facts, FactError, FactMap};

/// Name reserved for the merged fact file.
pub const GLOBAL_FACTS: &str = "global.facts";

/// Where one source's per-unit facts live.
pub fn per_tu_facts_path(facts_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unit".to_string());
    facts_dir.join(format!("{}.facts", stem))
}

/// Loads the merged global facts if a previous Reduce produced them.
pub fn load_global_facts(facts_dir: &Path) -> Option<FactMap> {
    match read_facts(facts_dir.join(GLOBAL_FACTS)) {
        Ok(raw) => Some(merge_facts(&raw)),
        Err(FactError::NotFound(_)) => None,
        Err(err) => {
            eprintln!("warning: {}", err);
            None
        }
    }
}

/// Merges every `*.facts` file except `global.facts` and writes the result.
/// Returns true if the global state changed (shell loops branch on this).
pub fn run_reduce(facts_dir: &Path) -> Result<bool> {
    let mut raw = Vec::new();
    let entries = std::fs::read_dir(facts_dir)
        .with_context(|| format!("cannot read facts dir {}", facts_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_none_or(|e| e != "facts") {
            continue;
        }
        if path.file_name().is_some_and(|n| n == GLOBAL_FACTS) {
            continue;
        }
        match read_facts(&path) {
            Ok(mut facts) => raw.append(&mut facts),
            Err(err) => eprintln!("warning: failed to read facts from {}: {}", path.display(), err),
        }
    }

    let merged = merge_facts(&raw);
    let global_path = facts_dir.join(GLOBAL_FACTS);
    if is_converged(&global_path, &merged) {
        return Ok(false);
    }

    write_facts(&global_path, &merged)
        .with_context(|| format!("cannot write {}", global_path.display()))?;
    println!("Global facts updated at {}", global_path.display());
    Ok(true)
}

/// One Map pass: every unit in parallel, facts written per unit. Any unit
/// failure aborts the pass.
pub fn run_map_pass(
    sources: &[PathBuf],
    config: &SessionConfig,
    facts_dir: &Path,
    global_facts: Option<&FactMap>,
) -> Result<()> {
    let outcomes: Vec<Result<(PathBuf, FactMap)>> = sources
        .par_iter()
        .map(|source| {
            let outcome = process_file(source, config, global_facts)?;
            Ok((outcome.source, outcome.facts))
        })
        .collect();

    for outcome in outcomes {
        let (source, facts) = outcome?;
        let path = per_tu_facts_path(facts_dir, &source);
        if let Err(err) = write_facts(&path, &facts) {
            // A lost fact file must not fake convergence; the next Reduce
            // sees the stale state and forces another iteration.
            eprintln!("warning: {}", err);
        }
    }
    Ok(())
}

/// The fixed-point loop: Map then Reduce until the global facts stop
/// changing, bounded by `max_iterations`.
pub fn run_iterative(
    sources: &[PathBuf],
    config: &SessionConfig,
    facts_dir: &Path,
    max_iterations: u32,
) -> Result<()> {
    let mut converged = false;

    for iteration in 1..=max_iterations {
        println!("=== Iteration {} ===", iteration);

        let global = load_global_facts(facts_dir);
        run_map_pass(sources, config, facts_dir, global.as_ref())?;

        if !run_reduce(facts_dir)? {
            println!("Convergence reached after {} iterations.", iteration);
            converged = true;
            break;
        }
        println!("Facts changed, continuing...");
    }

    if !converged {
        eprintln!("Warning: max iterations reached without convergence.");
    }
    Ok(())
}
