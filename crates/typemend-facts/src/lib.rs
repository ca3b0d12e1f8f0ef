//! # typemend-facts
//!
//! The cross-translation-unit fact store.
//!
//! Each translation unit's Map run writes the types it resolved as one fact
//! file; the Reduce step merges every per-TU file into `global.facts`, which
//! the Apply phase reads back to pre-seed its solver. Facts are plain text,
//! one TAB-separated record per line:
//!
//! ```text
//! <USR>\t<type_name>\t<is_field 0|1>\t<is_typedef 0|1>
//! ```
//!
//! Blank lines and `#` comments are skipped. Three-column records are the
//! legacy format and imply `is_typedef = 0`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

/// Fact-store errors.
#[derive(Error, Debug)]
pub enum FactError {
    /// The fact file does not exist. Callers usually treat this as "no
    /// facts yet", not as a failure.
    #[error("fact file not found: {0}")]
    NotFound(String),

    /// Any other I/O failure while reading or writing a fact file.
    #[error("fact file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One resolved-symbol fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFact {
    /// Stable identifier of the declaration across translation units.
    pub usr: String,
    /// Canonical spelling of the resolved type.
    pub type_name: String,
    /// The declaration is a struct/class field.
    pub is_field: bool,
    /// The declaration is a typedef alias.
    pub is_typedef: bool,
}

impl SymbolFact {
    /// Creates a variable/function fact.
    pub fn new(usr: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            usr: usr.into(),
            type_name: type_name.into(),
            is_field: false,
            is_typedef: false,
        }
    }
}

/// Map of facts keyed by USR.
pub type FactMap = IndexMap<String, SymbolFact>;

/// Integer width rank used by [`merge_facts`] when no type oracle is in
/// reach (facts carry spellings only). Higher is wider; 0 is unknown.
pub fn type_rank(type_name: &str) -> u32 {
    match type_name {
        "char" | "unsigned char" | "signed char" => 1,
        "short" | "unsigned short" => 2,
        "int" | "unsigned int" | "unsigned" => 3,
        "long" | "unsigned long" => 4,
        "size_t" | "std::size_t" | "ptrdiff_t" | "std::ptrdiff_t" => 5,
        "long long" | "unsigned long long" => 6,
        _ => 0,
    }
}

/// Writes facts, one record per line, sorted by USR for stable diffs.
pub fn write_facts(path: impl AsRef<Path>, facts: &FactMap) -> Result<(), FactError> {
    let path = path.as_ref();
    let mut out = String::new();
    let mut usrs: Vec<&String> = facts.keys().collect();
    usrs.sort();
    for usr in usrs {
        let f = &facts[usr.as_str()];
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}",
            f.usr,
            f.type_name,
            if f.is_field { 1 } else { 0 },
            if f.is_typedef { 1 } else { 0 },
        );
    }
    std::fs::write(path, out).map_err(|source| FactError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Reads raw facts from a file. Malformed records (fewer than three
/// columns) are skipped silently; an absent file is [`FactError::NotFound`].
pub fn read_facts(path: impl AsRef<Path>) -> Result<Vec<SymbolFact>, FactError> {
    let path = path.as_ref();
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(FactError::NotFound(path.display().to_string()));
        }
        Err(source) => {
            return Err(FactError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };

    let mut facts = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 3 {
            continue;
        }
        facts.push(SymbolFact {
            usr: parts[0].to_string(),
            type_name: parts[1].to_string(),
            is_field: parts[2] == "1",
            is_typedef: parts.get(3).is_some_and(|p| *p == "1"),
        });
    }
    Ok(facts)
}

/// Merges raw facts into a map keyed by USR.
///
/// Conflicts resolve by [`type_rank`]: the wider type wins, ties keep the
/// first write. `is_typedef` survives if any input carried it; `is_field`
/// keeps the first write.
pub fn merge_facts(raw: &[SymbolFact]) -> FactMap {
    let mut merged = FactMap::new();
    for fact in raw {
        match merged.get_mut(&fact.usr) {
            None => {
                merged.insert(fact.usr.clone(), fact.clone());
            }
            Some(existing) => {
                if type_rank(&fact.type_name) > type_rank(&existing.type_name) {
                    existing.type_name = fact.type_name.clone();
                }
                existing.is_typedef |= fact.is_typedef;
            }
        }
    }
    merged
}

/// True iff reading `path` yields exactly `facts` under whole-record
/// equality. An absent file means "not yet converged".
pub fn is_converged(path: impl AsRef<Path>, facts: &FactMap) -> bool {
    let on_disk = match read_facts(path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut disk_map = FactMap::new();
    for fact in on_disk {
        disk_map.entry(fact.usr.clone()).or_insert(fact);
    }

    if disk_map.len() != facts.len() {
        return false;
    }
    facts
        .iter()
        .all(|(usr, fact)| disk_map.get(usr) == Some(fact))
}
