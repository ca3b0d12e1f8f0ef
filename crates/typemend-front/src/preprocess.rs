//! Token-level preprocessing.
//!
//! Directive lines are masked out of the text before lexing (byte offsets
//! are preserved), then replayed in offset order while the token stream is
//! assembled: `#define` updates the macro table, `#include` splices the
//! included file's tokens in place. Object-like macro uses are expanded
//! inline; every substituted token keeps the use-site span and records the
//! expansion it came from. Function-like macros are recorded but never
//! expanded. Conditional directives are ignored, which makes ordinary
//! include guards harmless.

use crate::error::{ParseError, ParseResult};
use crate::lexer::{Lexer, MacroRef, Token, TokenKind};
use indexmap::IndexMap;
use std::path::Path;
use typemend_ast::{FileId, FileOrigin, MacroDef, SourceManager, Span};

enum Directive {
    Define(MacroDef),
    Include { path: String, angled: bool },
    Other,
}

struct PendingDirective {
    /// Byte offset of the directive's line start.
    offset: usize,
    directive: Directive,
}

/// The preprocessor: expands macros and splices includes into one token
/// stream per translation unit.
pub struct Preprocessor<'a> {
    sm: &'a mut SourceManager,
    /// Every macro definition seen, in definition order.
    pub macros: Vec<MacroDef>,
    table: IndexMap<String, usize>,
    expansion_serial: u32,
    resolve_disk: bool,
    active: Vec<FileId>,
}

impl<'a> Preprocessor<'a> {
    /// Creates a preprocessor over the registry. `resolve_disk` permits
    /// quoted includes to be read from the filesystem relative to the
    /// including file.
    pub fn new(sm: &'a mut SourceManager, resolve_disk: bool) -> Self {
        Self {
            sm,
            macros: Vec::new(),
            table: IndexMap::new(),
            expansion_serial: 0,
            resolve_disk,
            active: Vec::new(),
        }
    }

    /// Produces the preprocessed token stream of `file` and everything it
    /// includes. The stream has no trailing Eof token.
    pub fn process(&mut self, file: FileId) -> ParseResult<Vec<Token>> {
        if self.active.contains(&file) {
            return Ok(Vec::new());
        }
        self.active.push(file);

        let text = self.sm.text(file).to_string();
        let (masked, directives) = mask_directives(&text, file);

        let raw = Lexer::new(&masked, file).tokenize()?;
        let mut out = Vec::new();
        let mut pending = directives.into_iter().peekable();

        for token in raw {
            while pending
                .peek()
                .is_some_and(|d| d.offset < token.span.start)
            {
                let d = pending.next().unwrap();
                self.apply_directive(d, file, &mut out)?;
            }
            self.emit(token, &mut out)?;
        }
        while let Some(d) = pending.next() {
            self.apply_directive(d, file, &mut out)?;
        }

        self.active.pop();
        Ok(out)
    }

    fn apply_directive(
        &mut self,
        d: PendingDirective,
        includer: FileId,
        out: &mut Vec<Token>,
    ) -> ParseResult<()> {
        match d.directive {
            Directive::Define(def) => {
                self.table.insert(def.name.clone(), self.macros.len());
                self.macros.push(def);
            }
            Directive::Include { path, angled } => {
                if let Some(target) = self.resolve_include(&path, angled, includer) {
                    if self.sm.file(target).and_then(|f| f.included_from).is_none()
                        && target != includer
                    {
                        self.sm.set_included_from(target, includer);
                    }
                    let mut included = self.process(target)?;
                    out.append(&mut included);
                }
            }
            Directive::Other => {}
        }
        Ok(())
    }

    fn emit(&mut self, token: Token, out: &mut Vec<Token>) -> ParseResult<()> {
        let name = match &token.kind {
            TokenKind::Ident(name) => name.clone(),
            _ => {
                out.push(token);
                return Ok(());
            }
        };

        let Some(&index) = self.table.get(&name) else {
            out.push(token);
            return Ok(());
        };
        let def = self.macros[index].clone();
        if def.function_like {
            out.push(token);
            return Ok(());
        }
        if def.body.is_empty() {
            // Include-guard style definition: the use expands to nothing.
            return Ok(());
        }

        self.expansion_serial += 1;
        let serial = self.expansion_serial;
        let expanded = Lexer::new(&def.body, token.span.file).tokenize()?;
        for mut t in expanded {
            t.span = token.span;
            t.macro_of = Some(MacroRef {
                name: name.clone(),
                expansion: serial,
            });
            out.push(t);
        }
        Ok(())
    }

    fn resolve_include(&mut self, path: &str, angled: bool, includer: FileId) -> Option<FileId> {
        // Exact registered path, then registered basename.
        if let Some(f) = self.sm.file_by_path(path) {
            return Some(f.id);
        }
        if let Some(f) = self
            .sm
            .files()
            .find(|f| Path::new(&f.path).file_name().is_some_and(|n| n == path))
        {
            return Some(f.id);
        }

        if self.resolve_disk && !angled {
            let base = self
                .sm
                .file(includer)
                .map(|f| f.path.clone())
                .unwrap_or_default();
            let candidate = Path::new(&base)
                .parent()
                .map(|p| p.join(path))
                .unwrap_or_else(|| Path::new(path).to_path_buf());
            if let Ok(text) = std::fs::read_to_string(&candidate) {
                let id = self.sm.add_file(
                    candidate.to_string_lossy().into_owned(),
                    text,
                    FileOrigin::User,
                );
                return Some(id);
            }
        }

        // Unresolvable includes contribute no declarations.
        None
    }
}

/// Splits directive lines out of the text, replacing them with spaces so
/// byte offsets survive, and returns the parsed directives in line order.
fn mask_directives(text: &str, file: FileId) -> (String, Vec<PendingDirective>) {
    let mut masked = String::with_capacity(text.len());
    let mut directives = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let indent = line.len() - trimmed.len();
            let directive = parse_directive(trimmed, offset + indent, file);
            directives.push(PendingDirective { offset, directive });
            for ch in line.chars() {
                masked.push(if ch == '\n' { '\n' } else { ' ' });
            }
        } else {
            masked.push_str(line);
        }
        offset += line.len();
    }

    (masked, directives)
}

/// Parses one directive line. `line_offset` is the byte offset of the `#`.
fn parse_directive(line: &str, line_offset: usize, file: FileId) -> Directive {
    let rest = line[1..].trim_start();
    let consumed = line.len() - rest.len();

    if let Some(after) = rest.strip_prefix("include") {
        let after = after.trim();
        let (path, angled) = if after.starts_with('"') {
            (after.trim_matches('"').to_string(), false)
        } else if after.starts_with('<') {
            (
                after
                    .trim_start_matches('<')
                    .trim_end_matches(|c: char| c != '>')
                    .trim_end_matches('>')
                    .to_string(),
                true,
            )
        } else {
            return Directive::Other;
        };
        let path = path
            .split(['"', '>'])
            .next()
            .unwrap_or_default()
            .to_string();
        return Directive::Include { path, angled };
    }

    if let Some(after) = rest.strip_prefix("define") {
        let after_start = line_offset + consumed + "define".len();
        let name_rel = after.len() - after.trim_start().len();
        let after_trim = after.trim_start();

        let name_len = after_trim
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after_trim.len());
        if name_len == 0 {
            return Directive::Other;
        }
        let name = after_trim[..name_len].to_string();
        let post_name = &after_trim[name_len..];
        let function_like = post_name.starts_with('(');

        let body_text = if function_like {
            match post_name.find(')') {
                Some(close) => &post_name[close + 1..],
                None => "",
            }
        } else {
            post_name
        };

        let body = strip_trailing_comment(body_text).trim();
        let body_rel = body_text.len() - body_text.trim_start().len();
        let body_abs = after_start + name_rel + name_len + (post_name.len() - body_text.len())
            + body_rel;
        let body_span = Span::new(file, body_abs, body_abs + body.len());

        let line_end = line_offset + line.trim_end_matches(['\n', '\r']).len();
        return Directive::Define(MacroDef {
            name,
            body: body.to_string(),
            function_like,
            span: Span::new(file, line_offset, line_end),
            body_span,
        });
    }

    Directive::Other
}

/// Drops a trailing `//` or `/*` comment from a macro body.
fn strip_trailing_comment(body: &str) -> &str {
    let cut = match (body.find("//"), body.find("/*")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    match cut {
        Some(i) => &body[..i],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(text: &str) -> (SourceManager, Vec<Token>, Vec<MacroDef>) {
        let mut sm = SourceManager::new();
        let main = sm.add_file("main.c", text, FileOrigin::Main);
        let mut pp = Preprocessor::new(&mut sm, false);
        let tokens = pp.process(main).unwrap();
        let macros = pp.macros;
        (sm, tokens, macros)
    }

    #[test]
    fn test_plain_text_passes_through() {
        let (_, tokens, macros) = process("int n = 1;\n");
        assert_eq!(tokens.len(), 5);
        assert!(macros.is_empty());
    }

    #[test]
    fn test_define_records_macro() {
        let (sm, tokens, macros) = process("#define WIDTH int\nWIDTH n;\n");
        assert_eq!(macros.len(), 1);
        assert_eq!(macros[0].name, "WIDTH");
        assert_eq!(macros[0].body, "int");
        assert!(!macros[0].function_like);
        assert_eq!(sm.snippet(macros[0].body_span), Some("int"));

        // WIDTH expanded to `int` carrying the use-site span.
        assert_eq!(tokens[0].kind, TokenKind::Int);
        let use_text = sm.snippet(tokens[0].span).unwrap();
        assert_eq!(use_text, "WIDTH");
        assert_eq!(tokens[0].macro_of.as_ref().unwrap().name, "WIDTH");
    }

    #[test]
    fn test_whole_declaration_macro_shares_expansion() {
        let (_, tokens, _) = process("#define DEF_VAR int n = 10\nDEF_VAR;\n");
        let serials: Vec<u32> = tokens
            .iter()
            .filter_map(|t| t.macro_of.as_ref().map(|m| m.expansion))
            .collect();
        // int, n, =, 10 all come from the same expansion instance.
        assert_eq!(serials.len(), 4);
        assert!(serials.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Semicolon);
        assert!(tokens.last().unwrap().macro_of.is_none());
    }

    #[test]
    fn test_two_uses_get_distinct_expansions() {
        let (_, tokens, _) = process("#define W int\nW a; W b;\n");
        let serials: Vec<u32> = tokens
            .iter()
            .filter_map(|t| t.macro_of.as_ref().map(|m| m.expansion))
            .collect();
        assert_eq!(serials.len(), 2);
        assert_ne!(serials[0], serials[1]);
    }

    #[test]
    fn test_function_like_macro_not_expanded() {
        let (_, tokens, macros) = process("#define SQR(x) ((x)*(x))\nSQR(3);\n");
        assert!(macros[0].function_like);
        assert!(matches!(&tokens[0].kind, TokenKind::Ident(n) if n == "SQR"));
    }

    #[test]
    fn test_empty_body_macro_disappears() {
        let (_, tokens, _) = process("#define GUARD\nGUARD int n;\n");
        assert_eq!(tokens[0].kind, TokenKind::Int);
    }

    #[test]
    fn test_body_trailing_comment_stripped() {
        let (_, _, macros) = process("#define W long // widened\n");
        assert_eq!(macros[0].body, "long");
    }

    #[test]
    fn test_include_splices_registered_header() {
        let mut sm = SourceManager::new();
        let header = sm.add_file("defs.h", "typedef unsigned long size_t;\n", FileOrigin::User);
        let main = sm.add_file("main.c", "#include \"defs.h\"\nint n;\n", FileOrigin::Main);
        let mut pp = Preprocessor::new(&mut sm, false);
        let tokens = pp.process(main).unwrap();

        assert_eq!(tokens[0].kind, TokenKind::Typedef);
        assert_eq!(tokens[0].span.file, header);
        assert_eq!(sm.file(header).unwrap().included_from, Some(main));
    }

    #[test]
    fn test_unresolved_include_is_skipped() {
        let (_, tokens, _) = process("#include <stdio.h>\nint n;\n");
        assert_eq!(tokens[0].kind, TokenKind::Int);
    }

    #[test]
    fn test_include_cycle_guard() {
        let mut sm = SourceManager::new();
        let main = sm.add_file("a.h", "#include \"a.h\"\nint n;\n", FileOrigin::Main);
        let mut pp = Preprocessor::new(&mut sm, false);
        let tokens = pp.process(main).unwrap();
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_offsets_survive_masking() {
        let text = "#define W int\nlong n;\n";
        let (sm, tokens, _) = process(text);
        assert_eq!(sm.snippet(tokens[0].span), Some("long"));
    }
}
