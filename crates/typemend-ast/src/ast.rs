//! The typed syntax tree.
//!
//! Declarations, expressions, and statements live in flat arenas on the
//! [`Tu`] (translation unit) and refer to each other by index ids. The
//! analysis keys its constraint graph on [`DeclId`], never on references
//! into the arena, so the tree can be shared read-only across the collector
//! and the rewriter.

use crate::ctype::CType;
use crate::span::Span;
use indexmap::IndexMap;

/// Index of a declaration in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

/// Index of an expression in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

/// Index of a statement in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub u32);

/// How a declaration's type text relates to a preprocessor macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroOrigin {
    /// Name of the object-like macro the tokens were expanded from.
    pub name: String,
    /// True if the expansion covers exactly the written type tokens
    /// (`#define INT_TYPE int`). Only then may the macro body be rewritten
    /// in place of the declaration site.
    pub covers_type_only: bool,
}

/// An object-like or function-like macro definition seen in a file.
#[derive(Debug, Clone)]
pub struct MacroDef {
    /// Macro name.
    pub name: String,
    /// Replacement text, trailing comments stripped.
    pub body: String,
    /// True for `#define NAME(args) ...`.
    pub function_like: bool,
    /// Span of the whole `#define` directive.
    pub span: Span,
    /// Span of the replacement text.
    pub body_span: Span,
}

/// Declaration kinds, with the common fields lifted out into [`Decl`].
#[derive(Debug, Clone)]
pub enum DeclKind {
    /// A local or global variable.
    Var {
        /// Initializer, if any.
        init: Option<ExprId>,
    },
    /// A function parameter.
    Param {
        /// Position in the parameter list.
        index: usize,
    },
    /// A struct/class/union field.
    Field {
        /// Tag of the enclosing record.
        record: String,
        /// Declared with a bit width.
        is_bitfield: bool,
        /// Member of a union.
        in_union: bool,
        /// The field or its record carries a packed attribute.
        packed: bool,
    },
    /// A function. `ty` on the [`Decl`] is the return type.
    Function {
        /// Parameter declarations, in order.
        params: Vec<DeclId>,
        /// Body, absent for prototypes.
        body: Option<StmtId>,
        /// Declared with a trailing `...`.
        variadic: bool,
    },
    /// A typedef alias. `ty` is the aliased type.
    Typedef,
}

/// One declaration.
#[derive(Debug, Clone)]
pub struct Decl {
    /// Arena id.
    pub id: DeclId,
    /// Declared name.
    pub name: String,
    /// Stable unit-crossing identifier.
    pub usr: String,
    /// Declared type (return type for functions).
    pub ty: CType,
    /// Kind-specific data.
    pub kind: DeclKind,
    /// Span of the whole declarator, including any initializer.
    pub span: Span,
    /// Span of the written type tokens.
    pub type_span: Span,
    /// Span of the name token.
    pub name_span: Span,
    /// `const` appears on the declaration.
    pub is_const: bool,
    /// `volatile` appears on the declaration.
    pub is_volatile: bool,
    /// Set when the type tokens came out of a macro expansion.
    pub macro_origin: Option<MacroOrigin>,
    /// Source ranges of template arguments when the written type is a
    /// template-id like `std::vector<int>`. Parallel to the `Template` args.
    pub template_arg_spans: Vec<Span>,
}

impl Decl {
    /// True for variables and parameters.
    pub fn is_var(&self) -> bool {
        matches!(self.kind, DeclKind::Var { .. } | DeclKind::Param { .. })
    }

    /// The initializer expression, if this is an initialized variable.
    pub fn init(&self) -> Option<ExprId> {
        match self.kind {
            DeclKind::Var { init } => init,
            _ => None,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `&x`
    AddrOf,
    /// `*x`
    Deref,
    /// `++x` / `x++`
    Inc,
    /// `--x` / `x--`
    Dec,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    /// True for the relational and equality operators.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    /// True for `+ - * /`, the operators the solver tracks symbolically.
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }
}

/// Spelling of an explicit cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastStyle {
    /// `(T)x`
    CStyle,
    /// `static_cast<T>(x)`
    Static,
}

/// Expression kinds.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer literal.
    IntLit(i64),
    /// String literal (unescaped content).
    StrLit(String),
    /// Character literal.
    CharLit(char),
    /// Reference to a named declaration.
    DeclRef(DeclId),
    /// Unary operation.
    Unary { op: UnaryOp, operand: ExprId },
    /// Binary operation.
    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
    /// Assignment `lhs = rhs`.
    Assign { lhs: ExprId, rhs: ExprId },
    /// Call to a free function. `callee` is present when the name resolved.
    Call {
        callee: Option<DeclId>,
        name: String,
        args: Vec<ExprId>,
    },
    /// Member call `receiver.method(args)`.
    MemberCall {
        receiver: ExprId,
        method: String,
        args: Vec<ExprId>,
    },
    /// Member access `base.field` / `base->field`. `field_decl` is present
    /// when the base's record type and the field resolved.
    Member {
        base: ExprId,
        field: String,
        field_decl: Option<DeclId>,
    },
    /// Array subscript `base[index]`.
    Index { base: ExprId, index: ExprId },
    /// Explicit cast.
    Cast {
        ty: CType,
        style: CastStyle,
        operand: ExprId,
    },
    /// `sizeof(...)`.
    SizeOf,
}

/// One expression.
#[derive(Debug, Clone)]
pub struct Expr {
    /// Arena id.
    pub id: ExprId,
    /// Kind and children.
    pub kind: ExprKind,
    /// Source range of the whole expression.
    pub span: Span,
}

/// Statement kinds.
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `{ ... }`
    Compound(Vec<StmtId>),
    /// Expression statement.
    Expr(ExprId),
    /// Declaration statement; more than one id for `int a, b;`.
    Decl(Vec<DeclId>),
    /// `return` with optional value.
    Return(Option<ExprId>),
    /// `for (init; cond; inc) body`
    For {
        init: Option<StmtId>,
        cond: Option<ExprId>,
        inc: Option<ExprId>,
        body: StmtId,
    },
    /// `while (cond) body`
    While { cond: ExprId, body: StmtId },
    /// `if (cond) then else`
    If {
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    /// `;`
    Empty,
}

/// One statement.
#[derive(Debug, Clone)]
pub struct Stmt {
    /// Arena id.
    pub id: StmtId,
    /// Kind and children.
    pub kind: StmtKind,
    /// Source range, including the terminating `;` for simple statements.
    pub span: Span,
}

/// A translation unit: the arenas plus unit-level tables.
#[derive(Debug, Default)]
pub struct Tu {
    decls: Vec<Decl>,
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    /// Top-level declarations in source order.
    pub items: Vec<DeclId>,
    /// Typedef table, written name to aliased type.
    pub typedefs: IndexMap<String, CType>,
    /// Macro definitions seen while preprocessing.
    pub macros: Vec<MacroDef>,
    /// True when the unit was parsed as C++ (drives cast spelling).
    pub is_cpp: bool,
}

impl Tu {
    /// Creates an empty unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a declaration, assigning its id.
    pub fn alloc_decl(&mut self, mut decl: Decl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        decl.id = id;
        self.decls.push(decl);
        id
    }

    /// Adds an expression, assigning its id.
    pub fn alloc_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { id, kind, span });
        id
    }

    /// Adds a statement, assigning its id.
    pub fn alloc_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt { id, kind, span });
        id
    }

    /// Looks up a declaration.
    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0 as usize]
    }

    /// Mutable access to a declaration (used during parsing only).
    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.0 as usize]
    }

    /// Looks up an expression.
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    /// Mutable access to an expression (used during parsing only).
    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    /// Iterates over every expression in the arena.
    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        self.exprs.iter()
    }

    /// Looks up a statement.
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    /// Iterates over every declaration in the arena.
    pub fn decls(&self) -> impl Iterator<Item = &Decl> {
        self.decls.iter()
    }

    /// Number of declarations.
    pub fn num_decls(&self) -> usize {
        self.decls.len()
    }

    /// Finds a declaration by name; test helper and macro-rewrite lookup.
    pub fn decl_by_name(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|d| d.name == name)
    }

    /// The aliased type of a typedef declared in this unit.
    pub fn lookup_typedef(&self, name: &str) -> Option<&CType> {
        self.typedefs.get(name)
    }

    /// Strips casts and resolves the expression to a declaration reference,
    /// if it is one.
    pub fn expr_as_decl_ref(&self, expr: ExprId) -> Option<DeclId> {
        match &self.expr(expr).kind {
            ExprKind::DeclRef(d) => Some(*d),
            ExprKind::Cast { operand, .. } => self.expr_as_decl_ref(*operand),
            ExprKind::Unary {
                op: UnaryOp::AddrOf,
                operand,
            } => self.expr_as_decl_ref(*operand),
            ExprKind::Member { field_decl, .. } => *field_decl,
            _ => None,
        }
    }
}
