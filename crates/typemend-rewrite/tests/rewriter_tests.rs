//! End-to-end rewrite tests: parse, collect, solve, rewrite, and check the
//! produced source text.

use typemend_analysis::{BoundaryAnalyzer, BoundaryConfig, Collector, TypeSolver};
use typemend_ast::{FileOrigin, RecordingEditor, SourceManager, TextEdits, TypeOracle};
use typemend_front::{parse_translation_unit, ParseOptions};
use typemend_rewrite::{rewrite_unit, ChangeRecord, RewriteOptions};

fn rewrite_named(file_name: &str, src: &str, options: RewriteOptions) -> (String, Vec<ChangeRecord>) {
    let mut sm = SourceManager::new();
    let main = sm.add_file(file_name, src, FileOrigin::Main);
    let tu = parse_translation_unit(&mut sm, main, &ParseOptions::default()).unwrap();

    let oracle = TypeOracle::lp64();
    let size_ty = Collector::unit_size_type(&tu, &oracle);
    let ptrdiff_ty = Collector::unit_ptrdiff_type(&tu, &oracle);
    let mut solver = TypeSolver::new(oracle, size_ty, ptrdiff_ty);
    let mut boundary = BoundaryAnalyzer::new(&sm, BoundaryConfig::default(), oracle);
    let collected = Collector::new(&tu, &sm, oracle).collect(&mut solver, &mut boundary, None);
    let updates = solver.solve();

    let mut edits = TextEdits::new();
    let changes = rewrite_unit(
        &tu,
        &sm,
        oracle,
        &updates,
        &collected,
        &mut boundary,
        &mut edits,
        &options,
    );
    let out = edits
        .rewritten_text(&sm, main)
        .unwrap_or_else(|| src.to_string());
    (out, changes)
}

fn rewrite(src: &str) -> (String, Vec<ChangeRecord>) {
    rewrite_named("main.c", src, RewriteOptions::default())
}

fn rewrite_cpp(src: &str) -> (String, Vec<ChangeRecord>) {
    rewrite_named("main.cpp", src, RewriteOptions::default())
}

const PRELUDE: &str = "typedef unsigned long size_t;\nsize_t strlen(const char *s);\nsize_t get_size(void);\n";

#[test]
fn test_const_variable_widens_to_size_t() {
    let src = format!(
        "{}int main() {{ const int n = strlen(\"FOO\"); return 0; }}",
        PRELUDE
    );
    let (out, changes) = rewrite(&src);
    assert!(out.contains("const size_t n"), "got: {}", out);
    assert!(!out.contains("const int n"));
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].symbol, "n");
    assert_eq!(changes[0].old, "int");
    assert_eq!(changes[0].new, "size_t");
}

#[test]
fn test_loop_variable_widens() {
    let src = format!(
        "{}int main() {{ for(int i=0; i<strlen(\"FOO\"); i++){{}} return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite(&src);
    assert!(out.contains("for(size_t i=0"), "got: {}", out);
}

#[test]
fn test_function_return_type_widens() {
    let (out, _) = rewrite("int f(long b) { return b; }");
    assert!(out.contains("long f(long b)"), "got: {}", out);
}

#[test]
fn test_call_argument_widens_declaration() {
    let src = format!(
        "{}void my_memset(void *dst, int value, size_t count);\nint main() {{ char buf[16]; int n = 10; my_memset(buf, 0, n); return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite(&src);
    assert!(out.contains("size_t n = 10"), "got: {}", out);
    // The declaration was widened, so no cast is needed at the call.
    assert!(!out.contains("(size_t)(n)"));
}

#[test]
fn test_whole_declaration_macro_gets_cast_injection() {
    let src = format!(
        "{}void my_memset(void *dst, int value, size_t count);\n#define DEF_VAR int n = 10\nint main() {{ char buf[16]; DEF_VAR; my_memset(buf, 0, n); return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite_named("main.cpp", &src, RewriteOptions::default());
    assert!(out.contains("static_cast<size_t>(n)"), "got: {}", out);
    // The macro body stays as written.
    assert!(out.contains("#define DEF_VAR int n = 10"));
}

#[test]
fn test_cast_injection_uses_c_style_in_c() {
    let src = format!(
        "{}void take(size_t count);\n#define DEF_VAR int n = 10\nint main() {{ DEF_VAR; take(n); return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite(&src);
    assert!(out.contains("take((size_t)(n))"), "got: {}", out);
}

#[test]
fn test_negative_value_keeps_signed_declaration() {
    let src = format!(
        "{}int main() {{ int i = -1; i = get_size(); return 0; }}",
        PRELUDE
    );
    let (out, changes) = rewrite(&src);
    assert!(out.contains("int i = -1"), "got: {}", out);
    assert!(changes.is_empty());
}

#[test]
fn test_format_specifier_follows_declaration() {
    let src = format!(
        "{}int printf(const char *fmt, ...);\nint main() {{ int i = 0; i = get_size(); printf(\"%d\", i); return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite(&src);
    assert!(out.contains("size_t i"), "got: {}", out);
    assert!(out.contains("printf(\"%zu\", i)"), "got: {}", out);
}

#[test]
fn test_scanf_specifier_follows_declaration() {
    let src = format!(
        "{}int scanf(const char *fmt, ...);\nint main() {{ int i = 0; i = get_size(); scanf(\"%d\", &i); return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite(&src);
    assert!(out.contains("scanf(\"%zu\", &i)"), "got: {}", out);
}

#[test]
fn test_multi_declarator_statement_splits() {
    let src = format!(
        "{}int main() {{ int a = get_size(), b = 0; return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite(&src);
    assert!(out.contains("size_t a = get_size();"), "got: {}", out);
    assert!(out.contains("int b = 0;"), "got: {}", out);
}

#[test]
fn test_multi_declarator_uniform_update_keeps_statement() {
    let src = format!(
        "{}int main() {{ int a = get_size(), b = get_size(); return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite(&src);
    assert!(out.contains("size_t a = get_size(), b = get_size();"), "got: {}", out);
}

#[test]
fn test_pointer_difference_widens() {
    let (out, _) = rewrite("int main() { char *p; char *q; int i = p - q; return 0; }");
    assert!(out.contains("long i = p - q"), "got: {}", out);
}

#[test]
fn test_macro_type_body_rewritten_in_place() {
    let src = format!(
        "{}#define INT_TYPE int\nint main() {{ INT_TYPE x = strlen(\"FOO\"); return 0; }}",
        PRELUDE
    );
    let (out, changes) = rewrite(&src);
    assert!(out.contains("#define INT_TYPE size_t"), "got: {}", out);
    // The use site keeps the macro name.
    assert!(out.contains("INT_TYPE x"), "got: {}", out);
    assert!(changes.iter().any(|c| c.symbol == "INT_TYPE"));
}

#[test]
fn test_redundant_cast_removed() {
    let (out, _) = rewrite("int main() { int x = 0; int y = (int)x; return 0; }");
    assert!(out.contains("int y = x;"), "got: {}", out);
}

#[test]
fn test_non_redundant_cast_kept() {
    let src = format!(
        "{}int main() {{ int x = 0; long y = (long)x; return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite(&src);
    assert!(out.contains("(long)x"), "got: {}", out);
}

#[test]
fn test_template_argument_rewritten() {
    let (out, changes) =
        rewrite_cpp("int main() { std::vector<int> v; long x = 5; v.push_back(x); return 0; }");
    assert!(out.contains("std::vector<long> v"), "got: {}", out);
    assert!(changes.iter().any(|c| c.symbol == "v"));
}

#[test]
fn test_auto_preserved_for_call_initializer() {
    let src = format!(
        "{}int main() {{ auto z = get_size(); return 0; }}",
        PRELUDE
    );
    let (out, _) = rewrite_named("main.cpp", &src, RewriteOptions::default());
    assert!(out.contains("auto z"), "got: {}", out);
}

#[test]
fn test_auto_expanded_when_requested() {
    let src = format!(
        "{}int main() {{ auto z = get_size(); return 0; }}",
        PRELUDE
    );
    let options = RewriteOptions {
        expand_auto: true,
        ..Default::default()
    };
    let (out, _) = rewrite_named("main.cpp", &src, options);
    assert!(out.contains("size_t z"), "got: {}", out);
}

#[test]
fn test_decltype_generation() {
    let src = format!(
        "{}int main() {{ const int n = strlen(\"FOO\"); return 0; }}",
        PRELUDE
    );
    let options = RewriteOptions {
        use_decltype: true,
        ..Default::default()
    };
    let (out, _) = rewrite_named("main.c", &src, options);
    assert!(
        out.contains("const decltype(strlen(\"FOO\")) n"),
        "got: {}",
        out
    );
}

#[test]
fn test_recording_editor_changes_nothing() {
    let src = format!(
        "{}int main() {{ const int n = strlen(\"FOO\"); return 0; }}",
        PRELUDE
    );
    let mut sm = SourceManager::new();
    let main = sm.add_file("main.c", src.as_str(), FileOrigin::Main);
    let tu = parse_translation_unit(&mut sm, main, &ParseOptions::default()).unwrap();

    let oracle = TypeOracle::lp64();
    let size_ty = Collector::unit_size_type(&tu, &oracle);
    let ptrdiff_ty = Collector::unit_ptrdiff_type(&tu, &oracle);
    let mut solver = TypeSolver::new(oracle, size_ty, ptrdiff_ty);
    let mut boundary = BoundaryAnalyzer::new(&sm, BoundaryConfig::default(), oracle);
    let collected = Collector::new(&tu, &sm, oracle).collect(&mut solver, &mut boundary, None);
    let updates = solver.solve();

    let mut recorder = RecordingEditor::new();
    let changes = rewrite_unit(
        &tu,
        &sm,
        oracle,
        &updates,
        &collected,
        &mut boundary,
        &mut recorder,
        &RewriteOptions::default(),
    );
    assert_eq!(changes.len(), 1);
    assert!(!recorder.ops.is_empty());
    // No buffer was produced: the original text is untouched.
    assert_eq!(sm.text(main), src);
}

#[test]
fn test_rewrite_is_idempotent() {
    let src = format!(
        "{}int main() {{ int i = 0; i = get_size(); return 0; }}",
        PRELUDE
    );
    let (first, _) = rewrite(&src);
    let (second, changes) = rewrite(&first);
    assert_eq!(first, second);
    assert!(changes.is_empty());
}
