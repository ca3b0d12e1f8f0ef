//! typemend - integer type repair for C and C++ sources
//!
//! Usage:
//!   typemend file.c                      Print the rewritten unit to stdout
//!   typemend -i file.c                   Apply changes in place
//!   typemend --audit src/*.c             Report would-be changes as a table
//!   typemend --phase=iterative --facts-dir=facts src/*.c
//!                                        Converge types across units

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use regex::Regex;
use std::path::PathBuf;
use std::process::ExitCode;
use typemend::session::{process_file, Phase, SessionConfig};
use typemend::{per_tu_facts_path, run_iterative, run_reduce};
use typemend_facts::write_facts;
use typemend_rewrite::{append_json_report, markdown_table, ChangeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PhaseArg {
    Standalone,
    Map,
    Reduce,
    Apply,
    Iterative,
}

#[derive(Parser)]
#[command(name = "typemend")]
#[command(about = "Repairs integer type inconsistencies in C/C++ sources", long_about = None)]
struct Cli {
    /// Source files to process
    sources: Vec<PathBuf>,

    /// Absolute path to the project root; files outside it are external
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Regex pattern excluding files from rewriting, e.g. "(test|legacy)"
    #[arg(long)]
    exclude: Option<String>,

    /// Apply changes directly to source files on disk
    #[arg(long, short = 'i')]
    in_place: bool,

    /// Allow rewriting struct/class member fields (changes memory layout)
    #[arg(long)]
    enable_abi_breaking_changes: bool,

    /// Bypass external-path heuristics; system headers stay protected
    #[arg(long)]
    force_rewrite: bool,

    /// Calculate changes and print a Markdown table without modifying files
    #[arg(long)]
    audit: bool,

    /// Append line-delimited JSON change records to this file
    #[arg(long)]
    report_file: Option<PathBuf>,

    /// Execution phase for cross-translation-unit analysis
    #[arg(long, value_enum, default_value_t = PhaseArg::Standalone)]
    phase: PhaseArg,

    /// Directory for intermediate fact files
    #[arg(long)]
    facts_dir: Option<PathBuf>,

    /// Iteration bound for fixed-point convergence in iterative mode
    #[arg(long, default_value_t = 10)]
    max_iterations: u32,

    /// Prefer decltype(expr) over canonical type spellings
    #[arg(long)]
    use_decltype: bool,

    /// Rewrite auto even when the initializer is a function call
    #[arg(long)]
    expand_auto: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("typemend: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let exclude = cli
        .exclude
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid --exclude pattern")?;

    let phase = match cli.phase {
        PhaseArg::Standalone => Phase::Standalone,
        PhaseArg::Map => Phase::Map,
        PhaseArg::Apply => Phase::Apply,
        PhaseArg::Iterative => Phase::Iterative,
        // Reduce never processes sources; handled below.
        PhaseArg::Reduce => Phase::Standalone,
    };

    let config = SessionConfig {
        project_root: cli.project_root.clone(),
        exclude,
        in_place: cli.in_place,
        enable_abi_breaking_changes: cli.enable_abi_breaking_changes,
        force_rewrite: cli.force_rewrite,
        audit: cli.audit,
        use_decltype: cli.use_decltype,
        expand_auto: cli.expand_auto,
        phase,
        facts_dir: cli.facts_dir.clone(),
    };

    if cli.phase == PhaseArg::Reduce {
        let facts_dir = cli
            .facts_dir
            .as_deref()
            .context("--facts-dir is required for the reduce phase")?;
        let changed = run_reduce(facts_dir)?;
        return Ok(if changed {
            ExitCode::from(1)
        } else {
            ExitCode::SUCCESS
        });
    }

    if cli.sources.is_empty() {
        bail!("no source files given");
    }

    if cli.phase == PhaseArg::Iterative {
        let facts_dir = cli
            .facts_dir
            .as_deref()
            .context("--facts-dir is required for iterative mode")?;
        run_iterative(&cli.sources, &config, facts_dir, cli.max_iterations)?;
        return Ok(ExitCode::SUCCESS);
    }

    let global_facts = if phase.reads_global_facts() {
        let facts_dir = cli
            .facts_dir
            .as_deref()
            .context("--facts-dir is required for the apply phase")?;
        typemend::ctu::load_global_facts(facts_dir)
    } else {
        None
    };

    let mut all_changes: Vec<ChangeRecord> = Vec::new();
    for source in &cli.sources {
        let outcome = process_file(source, &config, global_facts.as_ref())?;

        if phase.writes_facts() {
            let facts_dir = cli
                .facts_dir
                .as_deref()
                .context("--facts-dir is required for the map phase")?;
            let path = per_tu_facts_path(facts_dir, source);
            if let Err(err) = write_facts(&path, &outcome.facts) {
                eprintln!("warning: {}", err);
            }
        }

        if !cli.audit && !cli.in_place {
            // Default output: the rewritten main buffer, or the original
            // when nothing changed.
            match &outcome.rewritten_main {
                Some(text) => print!("{}", text),
                None => {
                    let original = std::fs::read_to_string(source).with_context(|| {
                        format!("cannot read source file {}", source.display())
                    })?;
                    print!("{}", original);
                }
            }
        }

        all_changes.extend(outcome.changes);
    }

    if cli.audit {
        print!("{}", markdown_table(&all_changes));
    }
    if let Some(report) = &cli.report_file {
        if let Err(err) = append_json_report(report, &all_changes) {
            // A broken report sink never fails the run.
            eprintln!("warning: {}", err);
        }
    }

    Ok(ExitCode::SUCCESS)
}
