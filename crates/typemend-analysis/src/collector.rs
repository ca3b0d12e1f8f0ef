//! The constraint collector.
//!
//! One walk over the typed AST translates every pattern the solver cares
//! about into solver operations: nodes for all declarations, constraints
//! from initializers/assignments/returns/call arguments, edges for
//! decl-to-decl flow, symbolic records for arithmetic, pointer-offset flags
//! for subscripts and pointer arithmetic, and loop-bound constraints. Along
//! the way it records the material the rewriter needs later: explicit
//! casts, container pushes, format-specifier locations, and call-argument
//! uses eligible for cast injection.

use crate::boundary::BoundaryAnalyzer;
use crate::format::{parse_format_string, FormatUsage};
use crate::range::ValueRange;
use crate::solver::{wider_type, OpKind, TypeSolver};
use indexmap::IndexMap;
use typemend_ast::{
    BinOp, CType, DeclId, DeclKind, ExprId, ExprKind, SourceManager, Span, StmtId, StmtKind, Tu,
    TypeOracle, UnaryOp,
};
use typemend_facts::FactMap;

/// A call argument backed by a named declaration; the cast-injection
/// fallback fires here when the declaration cannot be rewritten.
#[derive(Debug, Clone)]
pub struct CallArgUse {
    /// The argument expression.
    pub arg: ExprId,
    /// The declaration behind it.
    pub decl: DeclId,
    /// The callee parameter's type.
    pub param_type: CType,
}

/// An explicit cast seen during the walk, with its operand's type for the
/// redundancy check.
#[derive(Debug, Clone)]
pub struct CastRecord {
    /// The cast expression.
    pub expr: ExprId,
    /// Type of the subexpression being cast.
    pub operand_type: CType,
}

/// Everything the walk produced for the rewriter.
#[derive(Debug, Default)]
pub struct Collected {
    /// Format-specifier locations per argument declaration.
    pub format_usages: IndexMap<DeclId, Vec<FormatUsage>>,
    /// Explicit casts, candidates for redundancy removal.
    pub casts: Vec<CastRecord>,
    /// Desired template argument per container variable.
    pub container_pushes: IndexMap<DeclId, CType>,
    /// Integer call arguments backed by declarations.
    pub call_args: Vec<CallArgUse>,
}

/// Printf-family functions with the index of their format argument.
const PRINTF_FAMILY: &[(&str, usize)] = &[
    ("printf", 0),
    ("fprintf", 1),
    ("sprintf", 1),
    ("snprintf", 2),
];

/// Scanf-family functions with the index of their format argument.
const SCANF_FAMILY: &[(&str, usize)] = &[("scanf", 0), ("fscanf", 1), ("sscanf", 1)];

/// Types expressions against one unit. Shared between the collector and
/// the rewriter so both agree on what an expression contributes.
pub struct ExprTyper<'a> {
    tu: &'a Tu,
    oracle: TypeOracle,
    size_ty: CType,
    ptrdiff_ty: CType,
}

impl<'a> ExprTyper<'a> {
    /// Creates a typer; `size_t`/`ptrdiff_t` spellings prefer typedefs
    /// declared in the unit over the oracle's canonical types.
    pub fn new(tu: &'a Tu, oracle: TypeOracle) -> Self {
        let size_ty = unit_size_type(tu, &oracle);
        let ptrdiff_ty = unit_ptrdiff_type(tu, &oracle);
        Self {
            tu,
            oracle,
            size_ty,
            ptrdiff_ty,
        }
    }

    /// `size_t` as this unit spells it.
    pub fn size_type(&self) -> &CType {
        &self.size_ty
    }

    /// `ptrdiff_t` as this unit spells it.
    pub fn ptrdiff_type(&self) -> &CType {
        &self.ptrdiff_ty
    }

    /// The type an expression contributes as a constraint.
    pub fn type_of_expr(&self, expr: ExprId) -> CType {
        match &self.tu.expr(expr).kind {
            ExprKind::IntLit(v) => {
                if *v > i32::MAX as i64 || *v < i32::MIN as i64 {
                    CType::longlong()
                } else {
                    CType::int_()
                }
            }
            ExprKind::StrLit(_) => CType::ptr(CType::char_()),
            ExprKind::CharLit(_) => CType::char_(),
            ExprKind::DeclRef(d) => self.tu.decl(*d).ty.clone(),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::AddrOf => CType::ptr(self.type_of_expr(*operand)),
                UnaryOp::Deref => self
                    .type_of_expr(*operand)
                    .pointee()
                    .cloned()
                    .unwrap_or(CType::Unknown),
                _ => self.type_of_expr(*operand),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_comparison() {
                    return CType::int_();
                }
                let lt = self.type_of_expr(*lhs);
                let rt = self.type_of_expr(*rhs);
                if *op == BinOp::Sub && lt.is_pointer() && rt.is_pointer() {
                    return self.ptrdiff_ty.clone();
                }
                if lt.is_pointer() {
                    return lt;
                }
                if rt.is_pointer() {
                    return rt;
                }
                wider_type(&self.oracle, &lt, &rt)
            }
            ExprKind::Assign { lhs, .. } => self.type_of_expr(*lhs),
            ExprKind::Call { callee, .. } => match callee {
                Some(callee) => self.tu.decl(*callee).ty.clone(),
                None => CType::Unknown,
            },
            ExprKind::MemberCall { method, .. } => match method.as_str() {
                "size" | "length" => self.size_ty.clone(),
                _ => CType::Unknown,
            },
            ExprKind::Member { field_decl, .. } => match field_decl {
                Some(f) => self.tu.decl(*f).ty.clone(),
                None => CType::Unknown,
            },
            ExprKind::Index { base, .. } => self
                .type_of_expr(*base)
                .pointee()
                .cloned()
                .unwrap_or(CType::Unknown),
            // Explicit casts are transparent to constraint typing; the
            // redundancy pass deals with the cast itself.
            ExprKind::Cast { operand, .. } => self.type_of_expr(*operand),
            ExprKind::SizeOf => self.size_ty.clone(),
        }
    }

    /// The literal value of `expr`, looking through one unary minus.
    pub fn int_literal_value(&self, expr: ExprId) -> Option<i64> {
        match &self.tu.expr(expr).kind {
            ExprKind::IntLit(v) => Some(*v),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match &self.tu.expr(*operand).kind {
                ExprKind::IntLit(v) => Some(-*v),
                _ => None,
            },
            _ => None,
        }
    }

    /// Maps a fact's type spelling back to a type, preferring the unit's
    /// own typedefs. Unknown spellings degrade to `Unknown`.
    pub fn parse_type_spelling(&self, name: &str) -> CType {
        match name {
            "char" => CType::char_(),
            "signed char" => CType::schar(),
            "unsigned char" => CType::uchar(),
            "short" | "short int" => CType::short_(),
            "unsigned short" => CType::ushort(),
            "int" => CType::int_(),
            "unsigned" | "unsigned int" => CType::uint(),
            "long" | "long int" => CType::long_(),
            "unsigned long" => CType::ulong(),
            "long long" => CType::longlong(),
            "unsigned long long" => CType::ulonglong(),
            "bool" => CType::Bool,
            "size_t" | "std::size_t" => self.size_ty.clone(),
            "ptrdiff_t" | "std::ptrdiff_t" => self.ptrdiff_ty.clone(),
            other => match self.tu.lookup_typedef(other) {
                Some(target) => CType::named(other, target.clone()),
                None => CType::Unknown,
            },
        }
    }
}

/// `size_t` as the unit spells it.
pub fn unit_size_type(tu: &Tu, oracle: &TypeOracle) -> CType {
    match tu.lookup_typedef("size_t") {
        Some(target) => CType::named("size_t", target.clone()),
        None => oracle.size_type_target(),
    }
}

/// `ptrdiff_t` as the unit spells it.
pub fn unit_ptrdiff_type(tu: &Tu, oracle: &TypeOracle) -> CType {
    match tu.lookup_typedef("ptrdiff_t") {
        Some(target) => CType::named("ptrdiff_t", target.clone()),
        None => oracle.ptrdiff_type_target(),
    }
}

/// Walks one translation unit and feeds the solver.
pub struct Collector<'a> {
    tu: &'a Tu,
    sm: &'a SourceManager,
    oracle: TypeOracle,
    typer: ExprTyper<'a>,
    out: Collected,
}

impl<'a> Collector<'a> {
    /// Creates a collector over a parsed unit.
    pub fn new(tu: &'a Tu, sm: &'a SourceManager, oracle: TypeOracle) -> Self {
        Self {
            tu,
            sm,
            oracle,
            typer: ExprTyper::new(tu, oracle),
            out: Collected::default(),
        }
    }

    /// `size_t` as this unit spells it.
    pub fn unit_size_type(tu: &Tu, oracle: &TypeOracle) -> CType {
        unit_size_type(tu, oracle)
    }

    /// `ptrdiff_t` as this unit spells it.
    pub fn unit_ptrdiff_type(tu: &Tu, oracle: &TypeOracle) -> CType {
        unit_ptrdiff_type(tu, oracle)
    }

    /// Runs the walk: registers every declaration, pre-seeds global facts,
    /// then traverses initializers and function bodies.
    pub fn collect(
        mut self,
        solver: &mut TypeSolver,
        boundary: &mut BoundaryAnalyzer,
        global_facts: Option<&FactMap>,
    ) -> Collected {
        // 1. Nodes for every declaration, with their anchor flags.
        for decl in self.tu.decls() {
            let whole_decl_macro = decl
                .macro_origin
                .as_ref()
                .is_some_and(|m| !m.covers_type_only);
            let is_fixed = boundary.is_boundary_fixed(decl) || whole_decl_macro;
            let is_typedef = matches!(decl.kind, DeclKind::Typedef);
            solver.add_node(decl.id, decl.ty.clone(), is_fixed, is_typedef);
        }

        // 2. Pre-seed constraints from the global fact map (Apply phase).
        if let Some(facts) = global_facts {
            for decl in self.tu.decls() {
                if let Some(fact) = facts.get(&decl.usr) {
                    let ty = self.typer.parse_type_spelling(&fact.type_name);
                    if !matches!(ty, CType::Unknown) {
                        solver.add_global_constraint(decl.id, ty);
                    }
                }
            }
        }

        // 3. Traverse top-level initializers and function bodies.
        for &item in &self.tu.items {
            let decl = self.tu.decl(item);
            match &decl.kind {
                DeclKind::Var { init: Some(init) } => {
                    let init = *init;
                    self.handle_init(item, init, solver);
                    self.walk_expr(init, item, solver, boundary);
                }
                DeclKind::Function {
                    body: Some(body), ..
                } => {
                    let body = *body;
                    self.walk_stmt(body, item, solver, boundary);
                }
                _ => {}
            }
        }

        self.out
    }

    // --- Declarations and statements ---

    fn handle_init(&mut self, var: DeclId, init: ExprId, solver: &mut TypeSolver) {
        let candidate = self.typer.type_of_expr(init);
        solver.add_constraint(var, candidate, Some(init));
        if let Some(source) = self.tu.expr_as_decl_ref(init) {
            solver.add_edge(var, source);
        }
        if let Some(value) = self.typer.int_literal_value(init) {
            solver.add_range_constraint(var, ValueRange::single(value));
        }
    }

    fn walk_stmt(
        &mut self,
        stmt: StmtId,
        func: DeclId,
        solver: &mut TypeSolver,
        boundary: &mut BoundaryAnalyzer,
    ) {
        match &self.tu.stmt(stmt).kind {
            StmtKind::Compound(stmts) => {
                for &s in stmts {
                    self.walk_stmt(s, func, solver, boundary);
                }
            }
            StmtKind::Decl(decls) => {
                for &d in decls {
                    if let Some(init) = self.tu.decl(d).init() {
                        self.handle_init(d, init, solver);
                        self.walk_expr(init, func, solver, boundary);
                    }
                }
            }
            StmtKind::Expr(e) => {
                self.walk_expr(*e, func, solver, boundary);
            }
            StmtKind::Return(Some(e)) => {
                let e = *e;
                self.walk_expr(e, func, solver, boundary);
                let candidate = self.typer.type_of_expr(e);
                solver.add_constraint(func, candidate, Some(e));
            }
            StmtKind::Return(None) => {}
            StmtKind::For {
                init,
                cond,
                inc,
                body,
            } => {
                let (init, cond, inc, body) = (*init, *cond, *inc, *body);
                if let Some(init) = init {
                    self.walk_stmt(init, func, solver, boundary);
                }
                if let Some(cond) = cond {
                    self.walk_expr(cond, func, solver, boundary);
                    self.handle_loop_condition(cond, solver);
                }
                if let Some(inc) = inc {
                    self.walk_expr(inc, func, solver, boundary);
                }
                self.walk_stmt(body, func, solver, boundary);
            }
            StmtKind::While { cond, body } => {
                let (cond, body) = (*cond, *body);
                self.walk_expr(cond, func, solver, boundary);
                self.walk_stmt(body, func, solver, boundary);
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let (cond, then_branch, else_branch) = (*cond, *then_branch, *else_branch);
                self.walk_expr(cond, func, solver, boundary);
                self.walk_stmt(then_branch, func, solver, boundary);
                if let Some(else_branch) = else_branch {
                    self.walk_stmt(else_branch, func, solver, boundary);
                }
            }
            StmtKind::Empty => {}
        }
    }

    /// `for (i; i < bound; ...)`: the bound's type constrains the induction
    /// variable, and a named bound links the two nodes.
    fn handle_loop_condition(&mut self, cond: ExprId, solver: &mut TypeSolver) {
        let ExprKind::Binary { op, lhs, rhs } = &self.tu.expr(cond).kind else {
            return;
        };
        if !op.is_comparison() {
            return;
        }
        let (lhs, rhs) = (*lhs, *rhs);

        let as_int_var = |e: ExprId| {
            self.tu
                .expr_as_decl_ref(e)
                .filter(|d| self.tu.decl(*d).ty.is_integer())
        };

        let (induction, bound) = if let Some(var) = as_int_var(lhs) {
            (var, rhs)
        } else if let Some(var) = as_int_var(rhs) {
            (var, lhs)
        } else {
            return;
        };

        let bound_type = self.typer.type_of_expr(bound);
        let bound_decl = self.tu.expr_as_decl_ref(bound).filter(|d| *d != induction);
        solver.add_loop_comparison_constraint(induction, bound_type, bound_decl, Some(bound));
    }

    // --- Expressions ---

    fn walk_expr(
        &mut self,
        expr: ExprId,
        func: DeclId,
        solver: &mut TypeSolver,
        boundary: &mut BoundaryAnalyzer,
    ) {
        match self.tu.expr(expr).kind.clone() {
            ExprKind::Assign { lhs, rhs } => {
                self.walk_expr(lhs, func, solver, boundary);
                self.walk_expr(rhs, func, solver, boundary);
                self.handle_assignment(lhs, rhs, solver);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.walk_expr(lhs, func, solver, boundary);
                self.walk_expr(rhs, func, solver, boundary);
                if matches!(op, BinOp::Add | BinOp::Sub) {
                    self.flag_pointer_arithmetic(lhs, rhs, solver);
                }
            }
            ExprKind::Unary { operand, .. } => {
                self.walk_expr(operand, func, solver, boundary);
            }
            ExprKind::Index { base, index } => {
                self.walk_expr(base, func, solver, boundary);
                self.walk_expr(index, func, solver, boundary);
                if self.typer.type_of_expr(base).is_pointer() {
                    if let Some(idx_decl) = self.tu.expr_as_decl_ref(index) {
                        solver.add_pointer_offset_usage(idx_decl);
                    }
                }
            }
            ExprKind::Call { callee, name, args } => {
                for &arg in &args {
                    self.walk_expr(arg, func, solver, boundary);
                }
                if self.scan_format_call(&name, &args) {
                    return;
                }
                if let Some(callee) = callee {
                    self.handle_call_arguments(callee, &args, solver);
                }
            }
            ExprKind::MemberCall {
                receiver,
                method,
                args,
            } => {
                self.walk_expr(receiver, func, solver, boundary);
                for &arg in &args {
                    self.walk_expr(arg, func, solver, boundary);
                }
                if matches!(method.as_str(), "push_back" | "emplace_back") {
                    self.handle_container_push(receiver, &args, solver);
                }
            }
            ExprKind::Member {
                base, field_decl, ..
            } => {
                self.walk_expr(base, func, solver, boundary);
                if let Some(field) = field_decl {
                    let field = self.tu.decl(field).clone();
                    let func_decl = self.tu.decl(func).clone();
                    boundary.analyze_truncation_safety(&field, &func_decl, self.tu);
                }
            }
            ExprKind::Cast { operand, .. } => {
                self.out.casts.push(CastRecord {
                    expr,
                    operand_type: self.typer.type_of_expr(operand),
                });
                self.walk_expr(operand, func, solver, boundary);
            }
            ExprKind::IntLit(_)
            | ExprKind::StrLit(_)
            | ExprKind::CharLit(_)
            | ExprKind::DeclRef(_)
            | ExprKind::SizeOf => {}
        }
    }

    fn handle_assignment(&mut self, lhs: ExprId, rhs: ExprId, solver: &mut TypeSolver) {
        let Some(target) = self.tu.expr_as_decl_ref(lhs) else {
            return;
        };

        // Arithmetic of two named declarations goes in symbolically; the
        // fixpoint propagates width both ways.
        if let ExprKind::Binary { op, lhs: a, rhs: b } = &self.tu.expr(rhs).kind {
            if op.is_arithmetic() {
                let a_decl = self.tu.expr_as_decl_ref(*a);
                let b_decl = self.tu.expr_as_decl_ref(*b);
                if let (Some(a_decl), Some(b_decl)) = (a_decl, b_decl) {
                    let op = match op {
                        BinOp::Add => OpKind::Add,
                        BinOp::Sub => OpKind::Sub,
                        BinOp::Mul => OpKind::Mul,
                        _ => OpKind::Div,
                    };
                    solver.add_symbolic_constraint(target, op, a_decl, b_decl);
                    return;
                }
            }
        }

        let candidate = self.typer.type_of_expr(rhs);
        solver.add_constraint(target, candidate, Some(rhs));
        if let Some(source) = self.tu.expr_as_decl_ref(rhs) {
            solver.add_edge(target, source);
        }
        if let Some(value) = self.typer.int_literal_value(rhs) {
            solver.add_range_constraint(target, ValueRange::single(value));
        }
    }

    /// `p + i` / `p - i`: the integer operand is a pointer offset.
    fn flag_pointer_arithmetic(&mut self, lhs: ExprId, rhs: ExprId, solver: &mut TypeSolver) {
        let lhs_ptr = self.typer.type_of_expr(lhs).is_pointer();
        let rhs_ptr = self.typer.type_of_expr(rhs).is_pointer();
        if lhs_ptr && !rhs_ptr {
            if let Some(d) = self.tu.expr_as_decl_ref(rhs) {
                if self.tu.decl(d).ty.is_integer() {
                    solver.add_pointer_offset_usage(d);
                }
            }
        } else if rhs_ptr && !lhs_ptr {
            if let Some(d) = self.tu.expr_as_decl_ref(lhs) {
                if self.tu.decl(d).ty.is_integer() {
                    solver.add_pointer_offset_usage(d);
                }
            }
        }
    }

    fn handle_call_arguments(&mut self, callee: DeclId, args: &[ExprId], solver: &mut TypeSolver) {
        let DeclKind::Function { params, .. } = &self.tu.decl(callee).kind else {
            return;
        };
        let params = params.clone();
        for (i, &arg) in args.iter().enumerate() {
            let Some(&param) = params.get(i) else { break };
            let param_type = self.tu.decl(param).ty.clone();
            if !param_type.is_integer() {
                continue;
            }
            let Some(arg_decl) = self.tu.expr_as_decl_ref(arg) else {
                continue;
            };
            if !self.tu.decl(arg_decl).ty.is_integer() {
                continue;
            }
            solver.add_constraint(arg_decl, param_type.clone(), Some(arg));
            self.out.call_args.push(CallArgUse {
                arg,
                decl: arg_decl,
                param_type,
            });
        }
    }

    fn handle_container_push(
        &mut self,
        receiver: ExprId,
        args: &[ExprId],
        solver: &mut TypeSolver,
    ) {
        let Some(var) = self.tu.expr_as_decl_ref(receiver) else {
            return;
        };
        let CType::Template { args: targs, .. } = &self.tu.decl(var).ty else {
            return;
        };
        let Some(current_arg) = targs.first().cloned() else {
            return;
        };
        let Some(&pushed) = args.first() else { return };

        let pushed_ty = self.typer.type_of_expr(pushed);
        let desired = solver.wider(&current_arg, &pushed_ty);
        let entry = self
            .out
            .container_pushes
            .entry(var)
            .or_insert_with(|| current_arg.clone());
        *entry = wider_type(&self.oracle, entry, &desired);
    }

    // --- Format strings ---

    /// Dispatches printf/scanf calls; true if the call was one.
    fn scan_format_call(&mut self, name: &str, args: &[ExprId]) -> bool {
        if let Some(&(_, fmt_idx)) = PRINTF_FAMILY.iter().find(|(n, _)| *n == name) {
            self.scan_format_args(args, fmt_idx);
            return true;
        }
        if let Some(&(_, fmt_idx)) = SCANF_FAMILY.iter().find(|(n, _)| *n == name) {
            self.scan_format_args(args, fmt_idx);
            return true;
        }
        false
    }

    fn scan_format_args(&mut self, args: &[ExprId], fmt_idx: usize) {
        let Some(&fmt) = args.get(fmt_idx) else { return };
        let fmt_expr = self.tu.expr(fmt);
        let ExprKind::StrLit(content) = &fmt_expr.kind else {
            return;
        };
        let content = content.clone();
        let lit_span = fmt_expr.span;

        let mut varargs = args[fmt_idx + 1..].iter();
        for spec in parse_format_string(&content) {
            if !spec.consumes_arg {
                continue;
            }
            let Some(&arg) = varargs.next() else { break };
            if !spec.is_integer {
                continue;
            }
            // `&var` in scanf calls resolves through the address-of.
            let Some(decl) = self.tu.expr_as_decl_ref(arg) else {
                continue;
            };
            // The literal's span includes the quotes; content starts one
            // byte in.
            let start = lit_span.start + 1 + spec.offset;
            let spec_span = Span::new(lit_span.file, start, start + spec.len);
            self.out
                .format_usages
                .entry(decl)
                .or_default()
                .push(FormatUsage { spec_span });
        }
    }

    /// Shared read access for the session once collection is done.
    pub fn source_manager(&self) -> &SourceManager {
        self.sm
    }
}
