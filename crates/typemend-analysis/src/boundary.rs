//! System-boundary detection.
//!
//! Decides, for any named declaration, whether rewriting it is safe. A file
//! is `Fixed` when it is a system header, has no backing file entry, lies on
//! an external-looking path, or is (transitively) included from a `Fixed`
//! file. Field rewrites additionally gate on ABI policy, bit-fields, unions,
//! packing, and truncation analysis. All decisions err toward "do not
//! rewrite" and are cached per analyzer instance.

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::path::{Path, PathBuf};
use typemend_ast::{Decl, DeclId, DeclKind, ExprKind, FileId, SourceManager, Tu, TypeOracle};

/// Classification of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryStatus {
    /// Not yet analyzed.
    Unknown,
    /// User code, safe to rewrite.
    Modifiable,
    /// System/third-party/locked, never rewritten.
    Fixed,
}

/// Boundary policy knobs, straight from the CLI.
#[derive(Debug, Clone, Default)]
pub struct BoundaryConfig {
    /// Allow struct/class field rewrites (memory-layout changes).
    pub allow_abi_changes: bool,
    /// Bypass path heuristics. System headers are still respected.
    pub force_rewrite: bool,
    /// Files outside this root are external.
    pub project_root: Option<PathBuf>,
    /// Files matching this pattern are excluded from rewriting.
    pub exclude: Option<Regex>,
}

/// Path fragments that mark third-party or system locations.
const EXTERNAL_FRAGMENTS: &[&str] = &[
    "/usr/",
    "/opt/",
    "node_modules",
    "bower_components",
    "third_party",
    "external",
    "build/_deps",
    "CMake/Modules",
];

/// The safety engine for declarations.
pub struct BoundaryAnalyzer<'a> {
    sm: &'a SourceManager,
    config: BoundaryConfig,
    oracle: TypeOracle,
    build_file_pattern: Regex,
    file_cache: IndexMap<FileId, BoundaryStatus>,
    cmake_cache: IndexMap<String, bool>,
    truncation_unsafe: IndexSet<DeclId>,
    analyzed_pairs: IndexSet<(DeclId, DeclId)>,
}

impl<'a> BoundaryAnalyzer<'a> {
    /// Creates an analyzer over one translation unit's files.
    pub fn new(sm: &'a SourceManager, config: BoundaryConfig, oracle: TypeOracle) -> Self {
        let build_file_pattern =
            Regex::new("(?i)(FetchContent|ExternalProject_Add|vendor|third_party)")
                .expect("pattern is valid");
        Self {
            sm,
            config,
            oracle,
            build_file_pattern,
            file_cache: IndexMap::new(),
            cmake_cache: IndexMap::new(),
            truncation_unsafe: IndexSet::new(),
            analyzed_pairs: IndexSet::new(),
        }
    }

    /// The single gate used by the collector and the rewriter: true when
    /// the declaration must not be changed.
    pub fn is_boundary_fixed(&mut self, decl: &Decl) -> bool {
        if self.config.force_rewrite {
            // System headers stay protected even in force mode.
            return decl.span.is_valid() && self.sm.is_system(decl.span.file);
        }
        if !decl.span.is_valid() {
            return true;
        }
        self.check_file_boundary(decl.span.file) == BoundaryStatus::Fixed
    }

    /// Field-level safety: boundary plus ABI, bit-field, union, packing,
    /// and truncation gates.
    pub fn can_rewrite_field(&mut self, decl: &Decl) -> bool {
        let DeclKind::Field {
            is_bitfield,
            in_union,
            packed,
            ..
        } = &decl.kind
        else {
            return false;
        };

        if self.config.force_rewrite {
            return true;
        }
        if self.is_boundary_fixed(decl) {
            return false;
        }
        if !self.config.allow_abi_changes {
            return false;
        }
        if *is_bitfield || *in_union || *packed {
            return false;
        }
        if self.truncation_unsafe.contains(&decl.id) {
            return false;
        }
        true
    }

    /// Typedef rewrites gate on the boundary only.
    pub fn can_rewrite_typedef(&mut self, decl: &Decl) -> bool {
        matches!(decl.kind, DeclKind::Typedef) && !self.is_boundary_fixed(decl)
    }

    /// Classifies one file, walking the include chain as needed.
    pub fn check_file_boundary(&mut self, file: FileId) -> BoundaryStatus {
        if let Some(&status) = self.file_cache.get(&file) {
            if status != BoundaryStatus::Unknown {
                return status;
            }
        }

        let status = self.compute_file_boundary(file);
        self.file_cache.insert(file, status);
        status
    }

    fn compute_file_boundary(&mut self, file: FileId) -> BoundaryStatus {
        // The main file is always rewritable, including synthetic buffers
        // used by tests.
        if self.sm.main_file() == Some(file) {
            return BoundaryStatus::Modifiable;
        }
        if self.sm.is_system(file) {
            return BoundaryStatus::Fixed;
        }
        if !self.sm.has_file_entry(file) {
            return BoundaryStatus::Fixed;
        }

        let path = self
            .sm
            .file(file)
            .map(|f| f.path.clone())
            .unwrap_or_default();
        if self.is_external_path(&path) {
            return BoundaryStatus::Fixed;
        }

        // Viral fixedness: a header pulled in by external code must keep
        // the layout that code sees.
        if let Some(includer) = self.sm.file(file).and_then(|f| f.included_from) {
            if includer != file {
                // Provisional entry breaks include cycles.
                self.file_cache.insert(file, BoundaryStatus::Modifiable);
                if self.check_file_boundary(includer) == BoundaryStatus::Fixed {
                    return BoundaryStatus::Fixed;
                }
            }
        }

        BoundaryStatus::Modifiable
    }

    /// Path-level heuristics: known fragments, the exclude pattern, the
    /// project root, and the CMake dependency walk.
    pub fn is_external_path(&mut self, path: &str) -> bool {
        if self.config.force_rewrite {
            return false;
        }
        if let Some(exclude) = &self.config.exclude {
            if exclude.is_match(path) {
                return true;
            }
        }
        for fragment in EXTERNAL_FRAGMENTS {
            if path.contains(fragment) {
                return true;
            }
        }

        if let Some(root) = self.config.project_root.clone() {
            let abs = absolute_path(Path::new(path));
            if !abs.starts_with(absolute_path(&root)) {
                return true;
            }
        }

        if let Some(dir) = Path::new(path).parent() {
            let dir = dir.to_path_buf();
            if self.analyze_cmake_dependency(&dir) {
                return true;
            }
        }

        false
    }

    /// Walks from `dir` toward the filesystem root looking for a build
    /// file that pulls in external content. Results are cached per
    /// directory; unreadable build files are "no signal".
    pub fn analyze_cmake_dependency(&mut self, dir: &Path) -> bool {
        let key = dir.to_string_lossy().into_owned();
        if key.is_empty() {
            return false;
        }
        if let Some(&cached) = self.cmake_cache.get(&key) {
            return cached;
        }
        if key == "/" || key == "." {
            self.cmake_cache.insert(key, false);
            return false;
        }

        let build_file = dir.join("CMakeLists.txt");
        let mut is_fixed = false;

        if build_file.exists() {
            // Reaching the project root's own build file means user code.
            if let Some(root) = &self.config.project_root {
                if absolute_path(&build_file) == absolute_path(&root.join("CMakeLists.txt")) {
                    self.cmake_cache.insert(key, false);
                    return false;
                }
            }
            if let Ok(content) = std::fs::read_to_string(&build_file) {
                if self.build_file_pattern.is_match(&content) {
                    is_fixed = true;
                }
            }
        }

        if !is_fixed {
            if let Some(parent) = dir.parent() {
                if parent != dir {
                    if let Some(root) = self.config.project_root.clone() {
                        if !absolute_path(parent).starts_with(absolute_path(&root)) {
                            self.cmake_cache.insert(key, true);
                            return true;
                        }
                    }
                    is_fixed = self.analyze_cmake_dependency(parent);
                }
            }
        }

        self.cmake_cache.insert(key, is_fixed);
        is_fixed
    }

    /// Flags a field as unsafe to widen.
    pub fn mark_truncation_unsafe(&mut self, decl: DeclId) {
        self.truncation_unsafe.insert(decl);
    }

    /// Fields flagged by truncation analysis.
    pub fn likely_unsafe_fields(&self) -> &IndexSet<DeclId> {
        &self.truncation_unsafe
    }

    /// Scans uses of `field` for stores into narrower declarations; such a
    /// store would truncate after widening, so the field is flagged.
    pub fn analyze_truncation_safety(&mut self, field: &Decl, func: &Decl, tu: &Tu) {
        if !self.analyzed_pairs.insert((field.id, func.id)) {
            return;
        }
        let Some(field_bits) = self.oracle.bit_width(&field.ty) else {
            return;
        };

        let narrower = |target: DeclId| {
            self.oracle
                .bit_width(&tu.decl(target).ty)
                .is_some_and(|bits| bits < field_bits)
        };

        let mut unsafe_found = false;
        for expr in tu.exprs() {
            if let ExprKind::Assign { lhs, rhs } = &expr.kind {
                let reads_field = tu.expr_as_decl_ref(*rhs) == Some(field.id);
                if !reads_field {
                    continue;
                }
                if let Some(target) = tu.expr_as_decl_ref(*lhs) {
                    if target != field.id && narrower(target) {
                        unsafe_found = true;
                    }
                }
            }
        }
        for decl in tu.decls() {
            if let Some(init) = decl.init() {
                if tu.expr_as_decl_ref(init) == Some(field.id)
                    && decl.id != field.id
                    && narrower(decl.id)
                {
                    unsafe_found = true;
                }
            }
        }

        if unsafe_found {
            self.truncation_unsafe.insert(field.id);
        }
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
