//! Applies solver results to source text.
//!
//! Edits are committed in a fixed order per translation unit: redundant
//! casts, template arguments, macro bodies, base declarations, cast
//! injection, format specifiers. Every edit target must be a valid span in
//! a file the boundary analyzer classifies as modifiable; macro-typed
//! declarations route to the `#define` body instead of the use site.

use crate::change::ChangeRecord;
use crate::macro_scan::find_object_macro_body;
use indexmap::{IndexMap, IndexSet};
use typemend_analysis::{
    specifier_for, wider_type, BoundaryAnalyzer, BoundaryStatus, Collected, ExprTyper, Node,
};
use typemend_ast::{
    CType, Decl, DeclId, DeclKind, ExprKind, SourceEditor, SourceManager, Span, Tu, TypeOracle,
};
use typemend_facts::{FactMap, SymbolFact};

/// Rewriter configuration from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// Prefer `decltype(<expr>)` over the canonical spelling when the
    /// driving expression's type matches.
    pub use_decltype: bool,
    /// Rewrite `auto` even when the initializer is a call.
    pub expand_auto: bool,
}

/// Rewrites one translation unit and returns the change records.
///
/// The editor decides what "apply" means: the buffered editor produces
/// text, the recording editor makes this a pure audit pass.
pub fn rewrite_unit(
    tu: &Tu,
    sm: &SourceManager,
    oracle: TypeOracle,
    updates: &IndexMap<DeclId, Node>,
    collected: &Collected,
    boundary: &mut BoundaryAnalyzer,
    editor: &mut dyn SourceEditor,
    options: &RewriteOptions,
) -> Vec<ChangeRecord> {
    let mut pass = RewritePass {
        tu,
        sm,
        oracle,
        typer: ExprTyper::new(tu, oracle),
        updates,
        collected,
        options,
        changes: Vec::new(),
    };

    pass.remove_redundant_casts(editor);

    let staged = pass.stage_updates(boundary);
    pass.apply_template_updates(boundary, editor);
    pass.apply_macro_updates(&staged.macros, editor);
    pass.apply_base_updates(&staged.base, boundary, editor);
    pass.inject_call_casts(boundary, editor);
    pass.apply_format_updates(&staged.gated_out, boundary, editor);

    pass.changes
}

/// Facts the Map phase exports: one record per resolved update.
pub fn collect_facts(tu: &Tu, updates: &IndexMap<DeclId, Node>) -> FactMap {
    let mut facts = FactMap::new();
    for (decl_id, node) in updates {
        let decl = tu.decl(*decl_id);
        facts.insert(
            decl.usr.clone(),
            SymbolFact {
                usr: decl.usr.clone(),
                type_name: node.constraint.spelling(),
                is_field: matches!(decl.kind, DeclKind::Field { .. }),
                is_typedef: node.is_typedef,
            },
        );
    }
    facts
}

struct StagedUpdates {
    base: Vec<DeclId>,
    macros: IndexMap<String, CType>,
    gated_out: IndexSet<DeclId>,
}

struct RewritePass<'a> {
    tu: &'a Tu,
    sm: &'a SourceManager,
    oracle: TypeOracle,
    typer: ExprTyper<'a>,
    updates: &'a IndexMap<DeclId, Node>,
    collected: &'a Collected,
    options: &'a RewriteOptions,
    changes: Vec<ChangeRecord>,
}

impl<'a> RewritePass<'a> {
    fn record(&mut self, span: Span, symbol: &str, old: String, new: String) {
        self.changes.push(ChangeRecord {
            file: self.sm.path_of(span).to_string(),
            line: self.sm.line_number(span),
            symbol: symbol.to_string(),
            old,
            new,
        });
    }

    fn modifiable(&self, boundary: &mut BoundaryAnalyzer, span: Span) -> bool {
        span.is_valid() && boundary.check_file_boundary(span.file) == BoundaryStatus::Modifiable
    }

    // --- 1. Redundant explicit casts ---

    fn remove_redundant_casts(&mut self, editor: &mut dyn SourceEditor) {
        for cast in &self.collected.casts {
            let expr = self.tu.expr(cast.expr);
            let ExprKind::Cast { ty, operand, .. } = &expr.kind else {
                continue;
            };
            if cast.operand_type.canonical() != ty.canonical() {
                continue;
            }

            let operand_span = self.tu.expr(*operand).span;
            if !expr.span.is_valid()
                || !operand_span.is_valid()
                || !self.sm.is_in_main_file(expr.span)
                || !self.sm.is_in_main_file(operand_span)
            {
                continue;
            }
            let Some(text) = self.sm.snippet(operand_span) else {
                continue;
            };
            editor.replace(expr.span, &text.to_string());
        }
    }

    // --- 2. Staging ---

    /// Splits solver updates into base-declaration targets and coalesced
    /// macro-body targets, dropping anything the safety gates refuse.
    fn stage_updates(&mut self, boundary: &mut BoundaryAnalyzer) -> StagedUpdates {
        let mut base = Vec::new();
        let mut macros: IndexMap<String, CType> = IndexMap::new();
        let mut gated_out: IndexSet<DeclId> = IndexSet::new();

        for (decl_id, node) in self.updates {
            let decl = self.tu.decl(*decl_id);

            match &decl.kind {
                DeclKind::Field { .. } => {
                    if !boundary.can_rewrite_field(decl) {
                        gated_out.insert(*decl_id);
                        continue;
                    }
                }
                DeclKind::Typedef => {
                    if !boundary.can_rewrite_typedef(decl) {
                        gated_out.insert(*decl_id);
                        continue;
                    }
                }
                _ => {}
            }

            if let Some(origin) = &decl.macro_origin {
                if origin.covers_type_only {
                    // Multiple uses of the same macro coalesce to its
                    // widest desired type.
                    let entry = macros
                        .entry(origin.name.clone())
                        .or_insert_with(|| node.constraint.clone());
                    *entry = wider_type(&self.oracle, entry, &node.constraint);
                }
                continue;
            }

            // Preserve `auto` for call-initialized variables unless asked
            // to expand.
            if matches!(decl.ty, CType::Auto) && !self.options.expand_auto {
                let call_init = decl.init().is_some_and(|init| {
                    matches!(
                        self.tu.expr(init).kind,
                        ExprKind::Call { .. } | ExprKind::MemberCall { .. }
                    )
                });
                if call_init {
                    continue;
                }
            }

            base.push(*decl_id);
        }

        StagedUpdates {
            base,
            macros,
            gated_out,
        }
    }

    // --- 3. Template arguments ---

    fn apply_template_updates(
        &mut self,
        boundary: &mut BoundaryAnalyzer,
        editor: &mut dyn SourceEditor,
    ) {
        for (var, desired_arg) in &self.collected.container_pushes {
            let decl = self.tu.decl(*var);
            if boundary.is_boundary_fixed(decl) || decl.macro_origin.is_some() {
                continue;
            }
            let CType::Template { name, args } = &decl.ty else {
                continue;
            };
            let Some(current) = args.first() else { continue };
            if current == desired_arg {
                continue;
            }
            let Some(&arg_span) = decl.template_arg_spans.first() else {
                continue;
            };
            if !self.modifiable(boundary, arg_span) {
                continue;
            }

            editor.replace(arg_span, &desired_arg.spelling());

            let mut new_args = args.clone();
            new_args[0] = desired_arg.clone();
            let new_ty = CType::Template {
                name: name.clone(),
                args: new_args,
            };
            let (old, name_span, symbol) =
                (decl.ty.spelling(), decl.name_span, decl.name.clone());
            self.record(name_span, &symbol, old, new_ty.spelling());
        }
    }

    // --- 4. Macro bodies ---

    fn apply_macro_updates(
        &mut self,
        macro_updates: &IndexMap<String, CType>,
        editor: &mut dyn SourceEditor,
    ) {
        let Some(main) = self.sm.main_file() else {
            return;
        };
        let text = self.sm.text(main).to_string();

        for (name, desired) in macro_updates {
            let Some((range, old_body)) = find_object_macro_body(&text, name) else {
                continue;
            };
            let span = Span::new(main, range.start, range.end);
            editor.replace(span, &desired.spelling());
            self.record(span, name, old_body, desired.spelling());
        }
    }

    // --- 5. Base declarations ---

    fn apply_base_updates(
        &mut self,
        base_updates: &[DeclId],
        boundary: &mut BoundaryAnalyzer,
        editor: &mut dyn SourceEditor,
    ) {
        // Variables that share their written type tokens belong to one
        // multi-declarator statement.
        let mut groups: IndexMap<Span, Vec<DeclId>> = IndexMap::new();
        for decl in self.tu.decls() {
            if matches!(decl.kind, DeclKind::Var { .. }) && decl.type_span.is_valid() {
                groups.entry(decl.type_span).or_default().push(decl.id);
            }
        }

        let mut consumed: IndexSet<DeclId> = IndexSet::new();
        let mut replaced_spans: IndexSet<Span> = IndexSet::new();

        for decl_id in base_updates {
            if consumed.contains(decl_id) {
                continue;
            }
            let decl = self.tu.decl(*decl_id);
            let node = &self.updates[decl_id];

            if !self.modifiable(boundary, decl.type_span) {
                continue;
            }

            let group = groups.get(&decl.type_span).cloned().unwrap_or_default();
            if group.len() > 1 {
                let finals: Vec<CType> = group
                    .iter()
                    .map(|d| self.final_type(*d))
                    .collect();
                let uniform = finals.windows(2).all(|w| w[0] == w[1]);
                if !uniform {
                    self.split_multi_decl(&group, &finals, editor);
                    consumed.extend(group);
                    continue;
                }
                // Same resolved type for every declarator: one replacement
                // of the shared type tokens covers them all.
                consumed.extend(group);
            }

            if replaced_spans.insert(decl.type_span) {
                let new_text = self.base_replacement_text(decl, node);
                editor.replace(decl.type_span, &new_text);
                let (span, symbol, old) =
                    (decl.name_span, decl.name.clone(), decl.ty.spelling());
                self.record(span, &symbol, old, new_text);
            }
        }
    }

    /// The declaration's post-solve type: its update, or the written type.
    fn final_type(&self, decl: DeclId) -> CType {
        match self.updates.get(&decl) {
            Some(node) => node.constraint.clone(),
            None => self.tu.decl(decl).ty.clone(),
        }
    }

    fn base_replacement_text(&self, decl: &Decl, node: &Node) -> String {
        if self.options.use_decltype {
            if let Some(base) = node.base_expr {
                let base_ty = self.typer.type_of_expr(base);
                if base_ty == node.constraint {
                    if let Some(text) = self.sm.snippet(self.tu.expr(base).span) {
                        return format!("decltype({})", text);
                    }
                }
            }
        }
        node.constraint.spelling()
    }

    /// Rewrites `int a = f(), b = 0;` into one statement per declarator so
    /// each can carry its own resolved type.
    fn split_multi_decl(
        &mut self,
        group: &[DeclId],
        finals: &[CType],
        editor: &mut dyn SourceEditor,
    ) {
        let first = self.tu.decl(group[0]);
        let file = first.type_span.file;
        let text = self.sm.text(file);

        // The statement runs from the type tokens through the semicolon.
        let last_end = group
            .iter()
            .map(|d| self.tu.decl(*d).span.end)
            .max()
            .unwrap_or(first.type_span.end);
        let semi = text[last_end..]
            .find(';')
            .map(|i| last_end + i + 1)
            .unwrap_or(last_end);
        let stmt_span = Span::new(file, first.type_span.start, semi);

        // Keep the statement's indentation for the split lines.
        let line_start = text[..stmt_span.start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let indent: String = text[line_start..stmt_span.start]
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect();

        let mut parts = Vec::new();
        for (decl_id, final_ty) in group.iter().zip(finals) {
            let decl = self.tu.decl(*decl_id);
            let declarator = self.sm.snippet(decl.span).unwrap_or(decl.name.as_str());
            let mut quals = String::new();
            if decl.is_const {
                quals.push_str("const ");
            }
            if decl.is_volatile {
                quals.push_str("volatile ");
            }
            parts.push(format!("{}{} {};", quals, final_ty.spelling(), declarator));

            if *final_ty != decl.ty {
                let (span, symbol, old) =
                    (decl.name_span, decl.name.clone(), decl.ty.spelling());
                self.record(span, &symbol, old, final_ty.spelling());
            }
        }

        editor.replace(stmt_span, &parts.join(&format!("\n{}", indent)));
    }

    // --- 6. Cast injection ---

    /// When an argument's declaration kept its narrow type, wrap the
    /// argument expression instead.
    fn inject_call_casts(&mut self, boundary: &mut BoundaryAnalyzer, editor: &mut dyn SourceEditor) {
        for use_ in &self.collected.call_args {
            let final_ty = self.final_type(use_.decl);
            if final_ty.canonical() == use_.param_type.canonical() {
                continue;
            }
            let final_bits = self.oracle.bit_width(&final_ty).unwrap_or(0);
            let param_bits = self.oracle.bit_width(&use_.param_type).unwrap_or(0);
            if param_bits < final_bits {
                continue;
            }

            let arg = self.tu.expr(use_.arg);
            // Already wrapped (a previous run, or the user): keep it.
            if let ExprKind::Cast { ty, .. } = &arg.kind {
                if ty.canonical() == use_.param_type.canonical() {
                    continue;
                }
            }
            if !self.modifiable(boundary, arg.span) {
                continue;
            }
            let Some(text) = self.sm.snippet(arg.span) else {
                continue;
            };

            let target = use_.param_type.spelling();
            let wrapped = if self.tu.is_cpp {
                format!("static_cast<{}>({})", target, text)
            } else {
                format!("({})({})", target, text)
            };
            editor.replace(arg.span, &wrapped);

            let (span, symbol, old) = (
                arg.span,
                self.tu.decl(use_.decl).name.clone(),
                final_ty.spelling(),
            );
            self.record(span, &symbol, old, target);
        }
    }

    // --- 7. Format specifiers ---

    fn apply_format_updates(
        &mut self,
        gated_out: &IndexSet<DeclId>,
        boundary: &mut BoundaryAnalyzer,
        editor: &mut dyn SourceEditor,
    ) {
        let mut staged: Vec<(Span, String)> = Vec::new();
        for (decl_id, node) in self.updates {
            if gated_out.contains(decl_id) {
                continue;
            }
            let Some(usages) = self.collected.format_usages.get(decl_id) else {
                continue;
            };
            let Some(spec) = specifier_for(&node.constraint) else {
                continue;
            };
            for usage in usages {
                if self.modifiable(boundary, usage.spec_span) {
                    staged.push((usage.spec_span, format!("%{}", spec)));
                }
            }
        }
        for (span, text) in staged {
            editor.replace(span, &text);
        }
    }
}
