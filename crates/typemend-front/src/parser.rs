//! Recursive-descent parser for the C/C++ subset.
//!
//! The parser consumes the preprocessed token stream and builds the typed
//! AST arena. Name resolution happens inline through a scope stack, so
//! `DeclRef` nodes point at their declarations by id the moment they are
//! built. Declarations keep the spans the rewriter needs: the written type
//! tokens, the declarator, and template arguments.

use crate::error::{ParseError, ParseResult};
use crate::lexer::{MacroRef, Token, TokenKind};
use crate::preprocess::Preprocessor;
use indexmap::IndexMap;
use std::path::Path;
use typemend_ast::{
    BinOp, CType, CastStyle, Decl, DeclId, DeclKind, ExprId, ExprKind, FileId, MacroOrigin,
    SourceManager, Span, StmtId, StmtKind, Tu, UnaryOp,
};

/// Front-end configuration.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Allow quoted `#include`s to be read from disk.
    pub resolve_includes_from_disk: bool,
    /// Force the language; otherwise it is inferred from the main file's
    /// extension.
    pub force_cpp: Option<bool>,
}

/// Parses one translation unit out of the registry.
pub fn parse_translation_unit(
    sm: &mut SourceManager,
    main: FileId,
    options: &ParseOptions,
) -> ParseResult<Tu> {
    let mut pp = Preprocessor::new(sm, options.resolve_includes_from_disk);
    let tokens = pp.process(main)?;
    let macros = std::mem::take(&mut pp.macros);

    let main_path = sm.file(main).map(|f| f.path.clone()).unwrap_or_default();
    let is_cpp = options.force_cpp.unwrap_or_else(|| {
        matches!(
            Path::new(&main_path).extension().and_then(|e| e.to_str()),
            Some("cpp" | "cc" | "cxx" | "hpp" | "hh")
        )
    });
    let unit_name = Path::new(&main_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut parser = Parser {
        tokens,
        pos: 0,
        eof_file: main,
        tu: Tu::new(),
        scopes: vec![IndexMap::new()],
        record_fields: IndexMap::new(),
        unit_name,
        current_function: None,
    };
    parser.tu.is_cpp = is_cpp;
    parser.tu.macros = macros;
    parser.parse_unit()?;
    Ok(parser.tu)
}

struct ParsedType {
    ty: CType,
    type_span: Span,
    is_const: bool,
    is_volatile: bool,
    /// Uniform macro origin of the base type tokens, if any.
    macro_ref: Option<MacroRef>,
    template_arg_spans: Vec<Span>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    eof_file: FileId,
    tu: Tu,
    /// Innermost scope last. Scope 0 holds file-scope names.
    scopes: Vec<IndexMap<String, DeclId>>,
    /// (record tag, field name) -> field decl.
    record_fields: IndexMap<(String, String), DeclId>,
    unit_name: String,
    current_function: Option<String>,
}

impl Parser {
    fn current(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek(&self, ahead: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + ahead)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn current_token(&self) -> Token {
        self.tokens
            .get(self.pos)
            .cloned()
            .unwrap_or_else(|| Token::eof(self.eof_file, 0))
    }

    fn current_span(&self) -> Span {
        self.current_token().span
    }

    fn advance(&mut self) -> Token {
        let token = self.current_token();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.current() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if *self.current() == kind {
            Ok(self.advance())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: kind.describe(),
                got: self.current().describe(),
            })
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.current(), TokenKind::Eof) || self.pos >= self.tokens.len()
    }

    // --- Scopes ---

    fn declare(&mut self, name: &str, id: DeclId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), id);
        }
    }

    fn lookup(&self, name: &str) -> Option<DeclId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn usr_for(&self, name: &str, kind: &DeclKind) -> String {
        match kind {
            DeclKind::Function { .. } => format!("c:@F@{}", name),
            DeclKind::Typedef => format!("c:@T@{}", name),
            DeclKind::Field { record, .. } => format!("c:@S@{}@FI@{}", record, name),
            DeclKind::Var { .. } | DeclKind::Param { .. } => match &self.current_function {
                Some(func) => format!("c:{}@F@{}@{}", self.unit_name, func, name),
                None => format!("c:@{}", name),
            },
        }
    }

    fn alloc_named_decl(
        &mut self,
        name: String,
        ty: CType,
        kind: DeclKind,
        span: Span,
        parsed: &ParsedType,
        name_span: Span,
        macro_origin: Option<MacroOrigin>,
    ) -> DeclId {
        let usr = self.usr_for(&name, &kind);
        let id = self.tu.alloc_decl(Decl {
            id: DeclId(0),
            name: name.clone(),
            usr,
            ty,
            kind,
            span,
            type_span: parsed.type_span,
            name_span,
            is_const: parsed.is_const,
            is_volatile: parsed.is_volatile,
            macro_origin,
            template_arg_spans: parsed.template_arg_spans.clone(),
        });
        if !name.is_empty() {
            self.declare(&name, id);
        }
        id
    }

    // --- Unit structure ---

    fn parse_unit(&mut self) -> ParseResult<()> {
        while !self.at_eof() {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            self.parse_top_level()?;
        }
        Ok(())
    }

    fn parse_top_level(&mut self) -> ParseResult<()> {
        while matches!(self.current(), TokenKind::Static | TokenKind::Extern) {
            self.advance();
        }

        match self.current() {
            TokenKind::Typedef => self.parse_typedef(),
            TokenKind::Struct | TokenKind::Union if self.is_record_definition() => {
                self.parse_record_definition()
            }
            TokenKind::Enum if matches!(self.peek(1), TokenKind::Ident(_)) => {
                self.skip_enum_definition()
            }
            _ => {
                let ids = self.parse_declaration(true)?;
                self.tu.items.extend(ids);
                Ok(())
            }
        }
    }

    /// True when `struct`/`union` at the cursor opens a definition rather
    /// than naming a type in a declaration.
    fn is_record_definition(&self) -> bool {
        if self.is_attribute_at(1) {
            return true;
        }
        matches!(self.peek(1), TokenKind::Ident(_))
            && (matches!(self.peek(2), TokenKind::OpenBrace) || self.is_attribute_at(2))
    }

    fn parse_typedef(&mut self) -> ParseResult<()> {
        let start = self.current_span();
        self.expect(TokenKind::Typedef)?;
        let parsed = self.parse_type()?;

        let mut ty = parsed.ty.clone();
        while self.eat(&TokenKind::Star) {
            ty = CType::ptr(ty);
        }

        let name_token = self.advance();
        let name = match name_token.kind.clone() {
            TokenKind::Ident(n) => n,
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "typedef name".to_string(),
                    got: other.describe(),
                })
            }
        };
        let end = self.expect(TokenKind::Semicolon)?;

        self.tu.typedefs.insert(name.clone(), ty.clone());
        let macro_origin = self.macro_origin_for(&parsed, &name_token);
        let id = self.alloc_named_decl(
            name,
            ty,
            DeclKind::Typedef,
            start.to(end.span),
            &parsed,
            name_token.span,
            macro_origin,
        );
        self.tu.items.push(id);
        Ok(())
    }

    fn is_attribute_at(&self, ahead: usize) -> bool {
        matches!(self.peek(ahead), TokenKind::Ident(n) if n == "__attribute__")
    }

    /// Consumes `__attribute__((...))` if present; true if it named `packed`.
    fn eat_attribute(&mut self) -> ParseResult<bool> {
        if !matches!(self.current(), TokenKind::Ident(n) if n == "__attribute__") {
            return Ok(false);
        }
        self.advance();
        self.expect(TokenKind::OpenParen)?;
        self.expect(TokenKind::OpenParen)?;
        let mut packed = false;
        let mut depth = 2usize;
        while depth > 0 && !self.at_eof() {
            match self.advance().kind {
                TokenKind::OpenParen => depth += 1,
                TokenKind::CloseParen => depth -= 1,
                TokenKind::Ident(n) if n == "packed" => packed = true,
                _ => {}
            }
        }
        Ok(packed)
    }

    fn parse_record_definition(&mut self) -> ParseResult<()> {
        let in_union = matches!(self.current(), TokenKind::Union);
        self.advance(); // struct/union

        let record_packed_pre = self.eat_attribute()?;
        let tag = match self.advance().kind {
            TokenKind::Ident(n) => n,
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "record tag".to_string(),
                    got: other.describe(),
                })
            }
        };
        let record_packed_post = self.eat_attribute()?;
        let record_packed = record_packed_pre || record_packed_post;

        self.expect(TokenKind::OpenBrace)?;
        while !matches!(self.current(), TokenKind::CloseBrace | TokenKind::Eof) {
            let parsed = self.parse_type()?;
            loop {
                let mut ty = parsed.ty.clone();
                while self.eat(&TokenKind::Star) {
                    ty = CType::ptr(ty);
                }
                let name_token = self.advance();
                let name = match name_token.kind.clone() {
                    TokenKind::Ident(n) => n,
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "field name".to_string(),
                            got: other.describe(),
                        })
                    }
                };
                while self.eat(&TokenKind::OpenBracket) {
                    while !self.eat(&TokenKind::CloseBracket) {
                        if self.at_eof() {
                            return Err(ParseError::UnexpectedEof);
                        }
                        self.advance();
                    }
                    ty = CType::ptr(ty);
                }

                let is_bitfield = if self.eat(&TokenKind::Colon) {
                    self.advance(); // width
                    true
                } else {
                    false
                };
                let field_packed = self.eat_attribute()?;

                let span = parsed.type_span.to(name_token.span);
                let macro_origin = self.macro_origin_for(&parsed, &name_token);
                let id = self.alloc_named_decl(
                    name.clone(),
                    ty,
                    DeclKind::Field {
                        record: tag.clone(),
                        is_bitfield,
                        in_union,
                        packed: record_packed || field_packed,
                    },
                    span,
                    &parsed,
                    name_token.span,
                    macro_origin,
                );
                self.record_fields.insert((tag.clone(), name), id);

                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Semicolon)?;
        }
        self.expect(TokenKind::CloseBrace)?;
        self.eat(&TokenKind::Semicolon);
        Ok(())
    }

    fn skip_enum_definition(&mut self) -> ParseResult<()> {
        while !matches!(self.current(), TokenKind::Semicolon | TokenKind::Eof) {
            self.advance();
        }
        self.eat(&TokenKind::Semicolon);
        Ok(())
    }

    // --- Types ---

    fn is_type_start(&self) -> bool {
        match self.current() {
            TokenKind::Const
            | TokenKind::Volatile
            | TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Void
            | TokenKind::Bool
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Auto
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum => true,
            TokenKind::Ident(name) => {
                name == "std" || self.tu.typedefs.contains_key(name.as_str())
            }
            _ => false,
        }
    }

    fn parse_type(&mut self) -> ParseResult<ParsedType> {
        let mut is_const = false;
        let mut is_volatile = false;

        loop {
            match self.current() {
                TokenKind::Const => {
                    is_const = true;
                    self.advance();
                }
                TokenKind::Volatile => {
                    is_volatile = true;
                    self.advance();
                }
                _ => break,
            }
        }

        let first = self.current_token();
        let mut last = first.clone();
        let mut template_arg_spans = Vec::new();

        let mut signed = true;
        let mut have_sign = false;
        if matches!(self.current(), TokenKind::Signed) {
            have_sign = true;
            last = self.advance();
        } else if matches!(self.current(), TokenKind::Unsigned) {
            signed = false;
            have_sign = true;
            last = self.advance();
        }

        let ty = match self.current().clone() {
            TokenKind::Void => {
                last = self.advance();
                CType::Void
            }
            TokenKind::Bool => {
                last = self.advance();
                CType::Bool
            }
            TokenKind::Auto => {
                last = self.advance();
                CType::Auto
            }
            TokenKind::Char => {
                last = self.advance();
                if signed {
                    CType::char_()
                } else {
                    CType::uchar()
                }
            }
            TokenKind::Short => {
                last = self.advance();
                if matches!(self.current(), TokenKind::Int) {
                    last = self.advance();
                }
                if signed {
                    CType::short_()
                } else {
                    CType::ushort()
                }
            }
            TokenKind::Int => {
                last = self.advance();
                if signed {
                    CType::int_()
                } else {
                    CType::uint()
                }
            }
            TokenKind::Long => {
                last = self.advance();
                let long_long = if matches!(self.current(), TokenKind::Long) {
                    last = self.advance();
                    true
                } else {
                    false
                };
                if matches!(self.current(), TokenKind::Int) {
                    last = self.advance();
                }
                match (long_long, signed) {
                    (true, true) => CType::longlong(),
                    (true, false) => CType::ulonglong(),
                    (false, true) => CType::long_(),
                    (false, false) => CType::ulong(),
                }
            }
            TokenKind::Float => {
                last = self.advance();
                CType::Float { size: 4 }
            }
            TokenKind::Double => {
                last = self.advance();
                CType::double_()
            }
            TokenKind::Struct | TokenKind::Union | TokenKind::Enum => {
                self.advance();
                let tag = match self.advance() {
                    Token {
                        kind: TokenKind::Ident(n),
                        span,
                        ..
                    } => {
                        last = Token {
                            kind: TokenKind::Ident(n.clone()),
                            span,
                            macro_of: None,
                        };
                        n
                    }
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "tag name".to_string(),
                            got: other.kind.describe(),
                        })
                    }
                };
                CType::Record { name: tag }
            }
            TokenKind::Ident(name) => {
                let mut qualified = name.clone();
                last = self.advance();
                while matches!(self.current(), TokenKind::ColonColon) {
                    self.advance();
                    match self.advance() {
                        Token {
                            kind: TokenKind::Ident(seg),
                            span,
                            ..
                        } => {
                            qualified = format!("{}::{}", qualified, seg);
                            last = Token {
                                kind: TokenKind::Ident(seg),
                                span,
                                macro_of: None,
                            };
                        }
                        other => {
                            return Err(ParseError::UnexpectedToken {
                                expected: "name after '::'".to_string(),
                                got: other.kind.describe(),
                            })
                        }
                    }
                }

                if matches!(self.current(), TokenKind::Lt) {
                    self.advance();
                    let mut args = Vec::new();
                    loop {
                        let arg = self.parse_type()?;
                        let mut arg_ty = arg.ty;
                        let mut arg_span = arg.type_span;
                        while matches!(self.current(), TokenKind::Star) {
                            arg_span = arg_span.to(self.current_span());
                            self.advance();
                            arg_ty = CType::ptr(arg_ty);
                        }
                        template_arg_spans.push(arg_span);
                        args.push(arg_ty);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    last = self.expect(TokenKind::Gt)?;
                    CType::Template {
                        name: qualified,
                        args,
                    }
                } else if let Some(target) = self.tu.lookup_typedef(&qualified) {
                    CType::named(qualified, target.clone())
                } else if qualified.contains("::") {
                    CType::named(qualified, CType::Unknown)
                } else if have_sign {
                    // `unsigned x` style: back up so the ident is the
                    // declarator name.
                    self.pos -= 1;
                    last = self.tokens[self.pos.saturating_sub(1)].clone();
                    if signed {
                        CType::int_()
                    } else {
                        CType::uint()
                    }
                } else {
                    return Err(ParseError::InvalidType(qualified));
                }
            }
            other if have_sign => {
                // Bare `signed`/`unsigned` means int.
                let _ = other;
                if signed {
                    CType::int_()
                } else {
                    CType::uint()
                }
            }
            other => return Err(ParseError::InvalidType(other.describe())),
        };

        // Trailing const (`int const n`) folds into the qualifier flags.
        loop {
            match self.current() {
                TokenKind::Const => {
                    is_const = true;
                    self.advance();
                }
                TokenKind::Volatile => {
                    is_volatile = true;
                    self.advance();
                }
                _ => break,
            }
        }

        let macro_ref = match (&first.macro_of, &last.macro_of) {
            (Some(a), _) => Some(a.clone()),
            _ => None,
        };

        Ok(ParsedType {
            ty,
            type_span: first.span.to(last.span),
            is_const,
            is_volatile,
            macro_ref,
            template_arg_spans,
        })
    }

    fn macro_origin_for(&self, parsed: &ParsedType, name_token: &Token) -> Option<MacroOrigin> {
        let macro_ref = parsed.macro_ref.as_ref()?;
        let covers_type_only = match &name_token.macro_of {
            Some(name_ref) => name_ref.expansion != macro_ref.expansion,
            None => true,
        };
        Some(MacroOrigin {
            name: macro_ref.name.clone(),
            covers_type_only,
        })
    }

    // --- Declarations ---

    /// Parses a declaration after any storage specifiers: either a function
    /// (top level only) or one or more variable declarators. Returns the
    /// declared ids.
    fn parse_declaration(&mut self, top_level: bool) -> ParseResult<Vec<DeclId>> {
        let parsed = self.parse_type()?;
        let mut ids = Vec::new();

        loop {
            let declarator_start = self.current_span();
            let mut ty = parsed.ty.clone();
            while self.eat(&TokenKind::Star) {
                ty = CType::ptr(ty);
            }

            let name_token = self.advance();
            let name = match name_token.kind.clone() {
                TokenKind::Ident(n) => n,
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "declarator name".to_string(),
                        got: other.describe(),
                    })
                }
            };

            if top_level && ids.is_empty() && matches!(self.current(), TokenKind::OpenParen) {
                let id = self.parse_function(parsed, ty, name, name_token)?;
                return Ok(vec![id]);
            }

            let mut decl_end = name_token.span;
            while self.eat(&TokenKind::OpenBracket) {
                while !matches!(self.current(), TokenKind::CloseBracket | TokenKind::Eof) {
                    self.advance();
                }
                decl_end = self.expect(TokenKind::CloseBracket)?.span;
                ty = CType::ptr(ty);
            }

            let init = if self.eat(&TokenKind::Assign) {
                let expr = self.parse_assignment()?;
                decl_end = self.tu.expr(expr).span;
                Some(expr)
            } else {
                None
            };

            let macro_origin = self.macro_origin_for(&parsed, &name_token);
            let span = declarator_start.to(decl_end);
            let id = self.alloc_named_decl(
                name,
                ty,
                DeclKind::Var { init },
                span,
                &parsed,
                name_token.span,
                macro_origin,
            );
            ids.push(id);

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::Semicolon)?;
        Ok(ids)
    }

    fn parse_function(
        &mut self,
        parsed: ParsedType,
        return_ty: CType,
        name: String,
        name_token: Token,
    ) -> ParseResult<DeclId> {
        // Allocate the function first so recursive calls resolve, then fill
        // in the params and body.
        let macro_origin = self.macro_origin_for(&parsed, &name_token);
        let func_id = self.alloc_named_decl(
            name.clone(),
            return_ty,
            DeclKind::Function {
                params: Vec::new(),
                body: None,
                variadic: false,
            },
            parsed.type_span.to(name_token.span),
            &parsed,
            name_token.span,
            macro_origin,
        );

        let saved_function = self.current_function.replace(name);
        self.scopes.push(IndexMap::new());

        self.expect(TokenKind::OpenParen)?;
        let mut params = Vec::new();
        let mut variadic = false;
        if matches!(self.current(), TokenKind::Void)
            && matches!(self.peek(1), TokenKind::CloseParen)
        {
            self.advance();
        }
        while !matches!(self.current(), TokenKind::CloseParen | TokenKind::Eof) {
            if self.eat(&TokenKind::Ellipsis) {
                variadic = true;
                break;
            }
            let p = self.parse_type()?;
            let mut pty = p.ty.clone();
            while self.eat(&TokenKind::Star) {
                pty = CType::ptr(pty);
            }
            let (pname, pname_span) = match self.current().clone() {
                TokenKind::Ident(n) => {
                    let t = self.advance();
                    (n, t.span)
                }
                _ => (String::new(), p.type_span),
            };
            let index = params.len();
            let id = self.alloc_named_decl(
                pname,
                pty,
                DeclKind::Param { index },
                p.type_span.to(pname_span),
                &p,
                pname_span,
                None,
            );
            params.push(id);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen)?;

        let body = if matches!(self.current(), TokenKind::OpenBrace) {
            Some(self.parse_compound()?)
        } else {
            self.expect(TokenKind::Semicolon)?;
            None
        };

        self.scopes.pop();
        self.current_function = saved_function;

        if let DeclKind::Function {
            params: slot_params,
            body: slot_body,
            variadic: slot_variadic,
        } = &mut self.tu.decl_mut(func_id).kind
        {
            *slot_params = params;
            *slot_body = body;
            *slot_variadic = variadic;
        }
        Ok(func_id)
    }

    // --- Statements ---

    fn parse_compound(&mut self) -> ParseResult<StmtId> {
        let start = self.expect(TokenKind::OpenBrace)?.span;
        self.scopes.push(IndexMap::new());
        let mut stmts = Vec::new();
        while !matches!(self.current(), TokenKind::CloseBrace | TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        let end = self.expect(TokenKind::CloseBrace)?.span;
        self.scopes.pop();
        Ok(self
            .tu
            .alloc_stmt(StmtKind::Compound(stmts), start.to(end)))
    }

    fn parse_stmt(&mut self) -> ParseResult<StmtId> {
        match self.current() {
            TokenKind::OpenBrace => self.parse_compound(),
            TokenKind::Semicolon => {
                let span = self.advance().span;
                Ok(self.tu.alloc_stmt(StmtKind::Empty, span))
            }
            TokenKind::Return => {
                let start = self.advance().span;
                let value = if matches!(self.current(), TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let end = self.expect(TokenKind::Semicolon)?.span;
                Ok(self.tu.alloc_stmt(StmtKind::Return(value), start.to(end)))
            }
            TokenKind::For => self.parse_for(),
            TokenKind::While => {
                let start = self.advance().span;
                self.expect(TokenKind::OpenParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                let body = self.parse_stmt()?;
                let end = self.tu.stmt(body).span;
                Ok(self
                    .tu
                    .alloc_stmt(StmtKind::While { cond, body }, start.to(end)))
            }
            TokenKind::If => {
                let start = self.advance().span;
                self.expect(TokenKind::OpenParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                let then_branch = self.parse_stmt()?;
                let else_branch = if self.eat(&TokenKind::Else) {
                    Some(self.parse_stmt()?)
                } else {
                    None
                };
                let end = else_branch
                    .map(|s| self.tu.stmt(s).span)
                    .unwrap_or_else(|| self.tu.stmt(then_branch).span);
                Ok(self.tu.alloc_stmt(
                    StmtKind::If {
                        cond,
                        then_branch,
                        else_branch,
                    },
                    start.to(end),
                ))
            }
            _ if self.is_type_start() => self.parse_decl_stmt(),
            _ => {
                let expr = self.parse_expr()?;
                let start = self.tu.expr(expr).span;
                let end = self.expect(TokenKind::Semicolon)?.span;
                Ok(self.tu.alloc_stmt(StmtKind::Expr(expr), start.to(end)))
            }
        }
    }

    fn parse_decl_stmt(&mut self) -> ParseResult<StmtId> {
        let start = self.current_span();
        let ids = self.parse_declaration(false)?;
        let end = self.tokens[self.pos - 1].span; // the semicolon
        Ok(self.tu.alloc_stmt(StmtKind::Decl(ids), start.to(end)))
    }

    fn parse_for(&mut self) -> ParseResult<StmtId> {
        let start = self.advance().span; // for
        self.expect(TokenKind::OpenParen)?;
        self.scopes.push(IndexMap::new());

        let init = if self.eat(&TokenKind::Semicolon) {
            None
        } else if self.is_type_start() {
            Some(self.parse_decl_stmt()?)
        } else {
            let expr = self.parse_expr()?;
            let span = self.tu.expr(expr).span;
            self.expect(TokenKind::Semicolon)?;
            Some(self.tu.alloc_stmt(StmtKind::Expr(expr), span))
        };

        let cond = if matches!(self.current(), TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;

        let inc = if matches!(self.current(), TokenKind::CloseParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::CloseParen)?;

        let body = self.parse_stmt()?;
        self.scopes.pop();
        let end = self.tu.stmt(body).span;
        Ok(self.tu.alloc_stmt(
            StmtKind::For {
                init,
                cond,
                inc,
                body,
            },
            start.to(end),
        ))
    }

    // --- Expressions ---

    fn parse_expr(&mut self) -> ParseResult<ExprId> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> ParseResult<ExprId> {
        let lhs = self.parse_comparison()?;
        if matches!(self.current(), TokenKind::Assign) {
            self.advance();
            let rhs = self.parse_assignment()?;
            let span = self.tu.expr(lhs).span.to(self.tu.expr(rhs).span);
            return Ok(self.tu.alloc_expr(ExprKind::Assign { lhs, rhs }, span));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> ParseResult<ExprId> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.current() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            let span = self.tu.expr(lhs).span.to(self.tu.expr(rhs).span);
            lhs = self.tu.alloc_expr(ExprKind::Binary { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> ParseResult<ExprId> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            let span = self.tu.expr(lhs).span.to(self.tu.expr(rhs).span);
            lhs = self.tu.alloc_expr(ExprKind::Binary { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<ExprId> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            let span = self.tu.expr(lhs).span.to(self.tu.expr(rhs).span);
            lhs = self.tu.alloc_expr(ExprKind::Binary { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<ExprId> {
        let op = match self.current() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::PlusPlus => Some(UnaryOp::Inc),
            TokenKind::MinusMinus => Some(UnaryOp::Dec),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance().span;
            let operand = self.parse_unary()?;
            let span = start.to(self.tu.expr(operand).span);
            return Ok(self.tu.alloc_expr(ExprKind::Unary { op, operand }, span));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<ExprId> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current() {
                TokenKind::OpenParen => {
                    // Call on a primary: only decl refs are callable here.
                    let (callee, name) = match &self.tu.expr(expr).kind {
                        ExprKind::DeclRef(d) => (Some(*d), self.tu.decl(*d).name.clone()),
                        _ => (None, String::new()),
                    };
                    self.advance();
                    let args = self.parse_args()?;
                    let end = self.expect(TokenKind::CloseParen)?.span;
                    let span = self.tu.expr(expr).span.to(end);
                    expr = self
                        .tu
                        .alloc_expr(ExprKind::Call { callee, name, args }, span);
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    self.advance();
                    let member_token = self.advance();
                    let member = match member_token.kind {
                        TokenKind::Ident(n) => n,
                        other => {
                            return Err(ParseError::UnexpectedToken {
                                expected: "member name".to_string(),
                                got: other.describe(),
                            })
                        }
                    };
                    if matches!(self.current(), TokenKind::OpenParen) {
                        self.advance();
                        let args = self.parse_args()?;
                        let end = self.expect(TokenKind::CloseParen)?.span;
                        let span = self.tu.expr(expr).span.to(end);
                        expr = self.tu.alloc_expr(
                            ExprKind::MemberCall {
                                receiver: expr,
                                method: member,
                                args,
                            },
                            span,
                        );
                    } else {
                        let field_decl = self.resolve_field(expr, &member);
                        let span = self.tu.expr(expr).span.to(member_token.span);
                        expr = self.tu.alloc_expr(
                            ExprKind::Member {
                                base: expr,
                                field: member,
                                field_decl,
                            },
                            span,
                        );
                    }
                }
                TokenKind::OpenBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    let end = self.expect(TokenKind::CloseBracket)?.span;
                    let span = self.tu.expr(expr).span.to(end);
                    expr = self
                        .tu
                        .alloc_expr(ExprKind::Index { base: expr, index }, span);
                }
                TokenKind::PlusPlus => {
                    let end = self.advance().span;
                    let span = self.tu.expr(expr).span.to(end);
                    expr = self.tu.alloc_expr(
                        ExprKind::Unary {
                            op: UnaryOp::Inc,
                            operand: expr,
                        },
                        span,
                    );
                }
                TokenKind::MinusMinus => {
                    let end = self.advance().span;
                    let span = self.tu.expr(expr).span.to(end);
                    expr = self.tu.alloc_expr(
                        ExprKind::Unary {
                            op: UnaryOp::Dec,
                            operand: expr,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn resolve_field(&self, base: ExprId, field: &str) -> Option<DeclId> {
        let base_decl = self.tu.expr_as_decl_ref(base)?;
        let record = match self.tu.decl(base_decl).ty.canonical() {
            CType::Record { name } => name.clone(),
            CType::Pointer(inner) => match inner.canonical() {
                CType::Record { name } => name.clone(),
                _ => return None,
            },
            _ => return None,
        };
        self.record_fields.get(&(record, field.to_string())).copied()
    }

    fn parse_args(&mut self) -> ParseResult<Vec<ExprId>> {
        let mut args = Vec::new();
        if matches!(self.current(), TokenKind::CloseParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_assignment()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<ExprId> {
        let token = self.current_token();
        match token.kind.clone() {
            TokenKind::Number(value) => {
                self.advance();
                Ok(self.tu.alloc_expr(ExprKind::IntLit(value), token.span))
            }
            TokenKind::StrLit(content) => {
                self.advance();
                Ok(self.tu.alloc_expr(ExprKind::StrLit(content), token.span))
            }
            TokenKind::CharLit(c) => {
                self.advance();
                Ok(self.tu.alloc_expr(ExprKind::CharLit(c), token.span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                match self.lookup(&name) {
                    Some(id) => Ok(self.tu.alloc_expr(ExprKind::DeclRef(id), token.span)),
                    None if matches!(self.current(), TokenKind::OpenParen) => {
                        // Call to an undeclared function.
                        self.advance();
                        let args = self.parse_args()?;
                        let end = self.expect(TokenKind::CloseParen)?.span;
                        Ok(self.tu.alloc_expr(
                            ExprKind::Call {
                                callee: None,
                                name,
                                args,
                            },
                            token.span.to(end),
                        ))
                    }
                    None => Err(ParseError::SyntaxError {
                        pos: token.span.start,
                        message: format!("use of undeclared identifier '{}'", name),
                    }),
                }
            }
            TokenKind::StaticCast => {
                self.advance();
                self.expect(TokenKind::Lt)?;
                let target = self.parse_type()?;
                let mut ty = target.ty;
                while self.eat(&TokenKind::Star) {
                    ty = CType::ptr(ty);
                }
                self.expect(TokenKind::Gt)?;
                self.expect(TokenKind::OpenParen)?;
                let operand = self.parse_expr()?;
                let end = self.expect(TokenKind::CloseParen)?.span;
                Ok(self.tu.alloc_expr(
                    ExprKind::Cast {
                        ty,
                        style: CastStyle::Static,
                        operand,
                    },
                    token.span.to(end),
                ))
            }
            TokenKind::SizeOf => {
                self.advance();
                self.expect(TokenKind::OpenParen)?;
                if self.is_type_start() {
                    let _ = self.parse_type()?;
                    while self.eat(&TokenKind::Star) {}
                } else {
                    let _ = self.parse_expr()?;
                }
                let end = self.expect(TokenKind::CloseParen)?.span;
                Ok(self.tu.alloc_expr(ExprKind::SizeOf, token.span.to(end)))
            }
            TokenKind::OpenParen => {
                self.advance();
                if self.is_type_start() {
                    // C-style cast.
                    let target = self.parse_type()?;
                    let mut ty = target.ty;
                    while self.eat(&TokenKind::Star) {
                        ty = CType::ptr(ty);
                    }
                    self.expect(TokenKind::CloseParen)?;
                    let operand = self.parse_unary()?;
                    let span = token.span.to(self.tu.expr(operand).span);
                    Ok(self.tu.alloc_expr(
                        ExprKind::Cast {
                            ty,
                            style: CastStyle::CStyle,
                            operand,
                        },
                        span,
                    ))
                } else {
                    let inner = self.parse_expr()?;
                    let close = self.expect(TokenKind::CloseParen)?;
                    // Grow the span over the parentheses so enclosing casts
                    // cover their full source text.
                    let grown = token.span.to(close.span);
                    self.tu.expr_mut(inner).span = grown;
                    Ok(inner)
                }
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                got: other.describe(),
            }),
        }
    }
}
