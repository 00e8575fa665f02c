//! Recursive descent parser for Aster with Pratt-style precedence climbing.
//!
//! The grammar has three ambiguous prefixes: `{` opens both blocks and record
//! literals, `(` opens both subexpressions and `()`, and a lower-case name
//! opens both identifiers and lambda parameter lists. These are resolved by
//! trying alternatives in a fixed order and rewinding the cursor when an
//! alternative fails before its commit point. Once an alternative has
//! consumed its uniquely-identifying prefix (the `if` of a conditional, the
//! `=>` of a lambda, the `[` of an array destructure), its failures are
//! committed and propagate to the caller.

use aster_ast::{
    BinOp, Decl, DeclKind, Expr, ExprKind, IdForm, Import, ImportSpecifier, LitKind, MatchArm,
    Module, Pattern, Position, Span, Spanned, TemplatePatternSegment, TemplateSegment, Type,
    TypeDef,
};

use crate::cursor::{self, Cursor};
use crate::error::{Commit, Context, Failure, Parse, ParseError, ParseErrorKind};

/// Infix operator table: spelling, operator, and Pratt binding powers.
/// Left-associative operators have `right > left`; right-associative ones
/// have `right < left`, so the recursive call re-admits the same operator.
/// Longer spellings come first so `|>` is never read as `|` + `>`.
const INFIX_OPS: &[(&str, BinOp, u8, u8)] = &[
    ("|>", BinOp::Pipe, 2, 3),
    ("||", BinOp::Or, 4, 3),
    (">>", BinOp::Compose, 18, 17),
    ("==", BinOp::Eq, 8, 9),
    ("!=", BinOp::NotEq, 8, 9),
    ("<=", BinOp::Lte, 8, 9),
    (">=", BinOp::Gte, 8, 9),
    ("::", BinOp::Cons, 10, 9),
    ("++", BinOp::Join, 10, 9),
    ("&&", BinOp::And, 6, 5),
    ("<", BinOp::Lt, 8, 9),
    (">", BinOp::Gt, 8, 9),
    ("+", BinOp::Add, 12, 13),
    ("-", BinOp::Sub, 12, 13),
    ("*", BinOp::Mul, 14, 15),
    ("^", BinOp::Pow, 14, 13),
    ("%", BinOp::Mod, 14, 13),
];

/// Combine an infix node. The span is recomputed from the operand spans, so
/// it is exact regardless of what the operator matcher consumed.
fn infix_expr(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = Span::new(left.span.start, right.span.end);
    Spanned::new(
        ExprKind::Infix {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

pub(crate) fn parse_module(name: &str, source: &str) -> Result<Module, ParseError> {
    let mut parser = Parser::new(source);
    parser.module(name).map_err(|failure| failure.error)
}

pub(crate) fn parse_expr(source: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(source);
    parser
        .standalone(Parser::expression)
        .map_err(|failure| failure.error)
}

pub(crate) fn parse_type(source: &str) -> Result<Type, ParseError> {
    let mut parser = Parser::new(source);
    parser
        .standalone(Parser::type_expr)
        .map_err(|failure| failure.error)
}

pub(crate) fn parse_pattern(source: &str) -> Result<Pattern, ParseError> {
    let mut parser = Parser::new(source);
    parser
        .standalone(Parser::pattern)
        .map_err(|failure| failure.error)
}

pub(crate) struct Parser {
    cursor: Cursor,
    contexts: Vec<Context>,
    /// When true, the `annotation` and `lambda` prefix alternatives are
    /// disabled. Set while parsing a match-arm guard, whose `=>` belongs to
    /// the arm and must not be claimed by a lambda.
    in_guard: bool,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            cursor: Cursor::new(source),
            contexts: Vec::new(),
            in_guard: false,
        }
    }

    // -- Failure plumbing --

    fn position(&self) -> Position {
        self.cursor.position()
    }

    fn span_from(&self, start: Position) -> Span {
        Span::new(start, self.position())
    }

    fn fail<T>(&self, kind: ParseErrorKind) -> Parse<T> {
        self.fail_at(kind, self.position())
    }

    fn fail_at<T>(&self, kind: ParseErrorKind, position: Position) -> Parse<T> {
        Err(Failure::soft(ParseError {
            kind,
            position,
            contexts: self.contexts.clone(),
        }))
    }

    fn with_context<T>(
        &mut self,
        context: Context,
        f: impl FnOnce(&mut Self) -> Parse<T>,
    ) -> Parse<T> {
        self.contexts.push(context);
        let result = f(self);
        self.contexts.pop();
        result
    }

    /// Try one alternative. A soft failure rewinds the cursor and is
    /// remembered if it reached further than any failure before it; a
    /// committed failure propagates.
    fn alternative<T>(
        &mut self,
        furthest: &mut Option<Failure>,
        f: fn(&mut Self) -> Parse<T>,
    ) -> Parse<Option<T>> {
        let checkpoint = self.cursor.checkpoint();
        match f(self) {
            Ok(value) => Ok(Some(value)),
            Err(failure) if failure.committed => Err(failure),
            Err(failure) => {
                self.cursor.rewind(checkpoint);
                let is_further = furthest
                    .as_ref()
                    .map_or(true, |best| failure.error.position > best.error.position);
                if is_further {
                    *furthest = Some(failure);
                }
                Ok(None)
            }
        }
    }

    /// Try an optional piece: a soft failure rewinds the cursor and yields
    /// `None`; a committed failure propagates.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Parse<T>) -> Parse<Option<T>> {
        let checkpoint = self.cursor.checkpoint();
        match f(self) {
            Ok(value) => Ok(Some(value)),
            Err(failure) if failure.committed => Err(failure),
            Err(_) => {
                self.cursor.rewind(checkpoint);
                Ok(None)
            }
        }
    }

    /// All alternatives failed softly: report the one that reached furthest.
    fn give_up<T>(&self, furthest: Option<Failure>, what: &str) -> Parse<T> {
        match furthest {
            Some(failure) => Err(failure),
            None => self.fail(ParseErrorKind::Internal(format!(
                "no alternative for {what} recorded a failure"
            ))),
        }
    }

    // -- Token helpers --

    fn symbol(&mut self, expected: &str) -> Parse<()> {
        let position = self.position();
        if self.cursor.eat_str(expected) {
            Ok(())
        } else {
            self.fail_at(ParseErrorKind::ExpectingSymbol(expected.into()), position)
        }
    }

    fn keyword(&mut self, expected: &str) -> Parse<()> {
        let position = self.position();
        if self.cursor.eat_keyword(expected) {
            Ok(())
        } else {
            self.fail_at(ParseErrorKind::ExpectingKeyword(expected.into()), position)
        }
    }

    fn operator(&mut self, expected: &str) -> Parse<()> {
        let position = self.position();
        if self.cursor.eat_str(expected) {
            Ok(())
        } else {
            self.fail_at(ParseErrorKind::ExpectingOperator(expected.into()), position)
        }
    }

    /// A lower-case name that is not a keyword.
    fn lower_name(&mut self) -> Parse<String> {
        let position = self.position();
        let checkpoint = self.cursor.checkpoint();
        match self.cursor.lower_name() {
            Some(name) if !cursor::is_keyword(&name) => Ok(name),
            Some(_) => {
                self.cursor.rewind(checkpoint);
                self.fail_at(ParseErrorKind::ExpectingCamelCase, position)
            }
            None => self.fail_at(ParseErrorKind::ExpectingCamelCase, position),
        }
    }

    fn upper_name(&mut self) -> Parse<String> {
        let position = self.position();
        match self.cursor.upper_name() {
            Some(name) => Ok(name),
            None => self.fail_at(ParseErrorKind::ExpectingCapitalCase, position),
        }
    }

    fn ignorables(&mut self) {
        self.cursor.skip_ignorables();
    }

    fn whitespace(&mut self) {
        self.cursor.skip_inline_whitespace();
    }

    /// Run a sub-grammar against the whole input, requiring end-of-input
    /// after trailing ignorables.
    fn standalone<T>(&mut self, f: fn(&mut Self) -> Parse<T>) -> Parse<T> {
        self.ignorables();
        let value = f(self)?;
        self.ignorables();
        if !self.cursor.is_eof() {
            return self.fail(ParseErrorKind::ExpectingEof);
        }
        Ok(value)
    }

    // -- Modules and imports --

    fn module(&mut self, name: &str) -> Parse<Module> {
        self.ignorables();
        let mut imports = Vec::new();
        while let Some(import) = self.attempt(Self::import_clause)? {
            imports.push(import);
            self.ignorables();
        }
        let mut declarations = Vec::new();
        while let Some(declaration) = self.attempt(Self::declaration)? {
            declarations.push(declaration);
            self.ignorables();
        }
        if !self.cursor.is_eof() {
            return self.fail(ParseErrorKind::ExpectingEof);
        }
        Ok(Module {
            name: name.to_string(),
            imports,
            declarations,
        })
    }

    fn import_clause(&mut self) -> Parse<Import> {
        self.keyword("import")?;
        self.with_context(Context::InImport, |p| {
            p.whitespace();
            let specifier = p.import_specifier().commit()?;
            let alias = p.attempt(Self::import_alias)?.unwrap_or_default();
            let exposing = p.attempt(Self::import_exposing)?.unwrap_or_default();
            Ok(Import {
                specifier,
                alias,
                exposing,
            })
        })
    }

    fn import_specifier(&mut self) -> Parse<ImportSpecifier> {
        if self.attempt(|p| p.keyword("ext"))?.is_some() {
            self.whitespace();
            return Ok(ImportSpecifier::External(self.quoted_path().commit()?));
        }
        if self.attempt(|p| p.keyword("pkg"))?.is_some() {
            self.whitespace();
            return Ok(ImportSpecifier::Package(self.quoted_path().commit()?));
        }
        Ok(ImportSpecifier::Local(self.quoted_path()?))
    }

    /// The raw text between quotes; no escape processing.
    fn quoted_path(&mut self) -> Parse<String> {
        self.symbol("\"")?;
        let mut path = String::new();
        loop {
            match self.cursor.peek() {
                Some('"') => {
                    self.cursor.bump();
                    return Ok(path);
                }
                Some(c) => {
                    path.push(c);
                    self.cursor.bump();
                }
                None => return self.fail(ParseErrorKind::ExpectingChar).commit(),
            }
        }
    }

    /// `as Upper(.Upper)*` — each further segment is attempted so the path
    /// can end on any bare name.
    fn import_alias(&mut self) -> Parse<Vec<String>> {
        self.whitespace();
        self.keyword("as")?;
        self.whitespace();
        let mut path = vec![self.upper_name().commit()?];
        while let Some(segment) = self.attempt(|p| {
            p.symbol(".")?;
            p.upper_name()
        })? {
            path.push(segment);
        }
        Ok(path)
    }

    /// `exposing { a, b }` — at least one name, trailing comma forbidden.
    fn import_exposing(&mut self) -> Parse<Vec<String>> {
        self.whitespace();
        self.keyword("exposing")?;
        self.whitespace();
        self.symbol("{").commit()?;
        self.ignorables();
        let mut names = vec![self.lower_name().commit()?];
        loop {
            self.ignorables();
            if !self.cursor.eat_char(',') {
                break;
            }
            self.ignorables();
            names.push(self.lower_name().commit()?);
        }
        self.symbol("}").commit()?;
        Ok(names)
    }

    // -- Declarations --

    fn declaration(&mut self) -> Parse<Decl> {
        self.with_context(Context::InDeclaration, |p| {
            let mut furthest = None;
            let alternatives: [fn(&mut Self) -> Parse<Decl>; 4] = [
                Self::run_decl,
                Self::ext_decl,
                Self::let_decl,
                Self::type_decl,
            ];
            for alternative in alternatives {
                if let Some(declaration) = p.alternative(&mut furthest, alternative)? {
                    return Ok(declaration);
                }
            }
            p.give_up(furthest, "a declaration")
        })
    }

    fn run_decl(&mut self) -> Parse<Decl> {
        let start = self.position();
        self.keyword("run")?;
        self.ignorables();
        let expr = self.expression().commit()?;
        let span = self.span_from(start);
        Ok(Spanned::new(DeclKind::Run(expr), span))
    }

    /// `pub` marker shared by `ext`, `let`, and `type`. The caller's
    /// alternative rewinds past it when the following keyword is wrong.
    fn pub_marker(&mut self) -> Parse<bool> {
        if self.attempt(|p| p.keyword("pub"))?.is_some() {
            self.ignorables();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn ext_decl(&mut self) -> Parse<Decl> {
        let start = self.position();
        let public = self.pub_marker()?;
        self.keyword("ext")?;
        self.whitespace();
        let name = self.lower_name().commit()?;
        let ty = self.attempt(Self::type_annotation)?.unwrap_or(Type::Any);
        Ok(Spanned::new(
            DeclKind::Ext { public, name, ty },
            self.span_from(start),
        ))
    }

    /// `: type` — the optional annotation on `ext` and `let` declarations.
    fn type_annotation(&mut self) -> Parse<Type> {
        self.ignorables();
        self.symbol(":")?;
        self.ignorables();
        self.type_expr().commit()
    }

    fn let_decl(&mut self) -> Parse<Decl> {
        let start = self.position();
        let public = self.pub_marker()?;
        self.keyword("let")?;
        self.whitespace();
        let name = self.lower_name().commit()?;
        let ty = self.attempt(Self::type_annotation)?.unwrap_or(Type::Any);
        self.ignorables();
        self.symbol("=").commit()?;
        self.ignorables();
        let body = self.expression().commit()?;
        let span = self.span_from(start);
        Ok(Spanned::new(
            DeclKind::Let {
                public,
                name,
                ty,
                body,
            },
            span,
        ))
    }

    fn type_decl(&mut self) -> Parse<Decl> {
        let start = self.position();
        let public = self.pub_marker()?;
        self.keyword("type")?;
        self.whitespace();
        let name_position = self.position();
        let name = self.upper_name().commit()?;
        if cursor::RESERVED_TYPE_NAMES.contains(&name.as_str()) {
            return self
                .fail_at(ParseErrorKind::ExpectingCapitalCase, name_position)
                .commit();
        }
        let mut vars = Vec::new();
        while let Some(var) = self.attempt(|p| {
            p.whitespace();
            p.lower_name()
        })? {
            vars.push(var);
        }
        let body = match self.attempt(|p| {
            p.ignorables();
            p.symbol("=")
        })? {
            Some(()) => {
                self.ignorables();
                match self.attempt(Self::enum_body)? {
                    Some(body) => body,
                    None => self.record_type_body().commit()?,
                }
            }
            None => TypeDef::Abstract,
        };
        Ok(Spanned::new(
            DeclKind::Type {
                public,
                name,
                vars,
                body,
            },
            self.span_from(start),
        ))
    }

    fn enum_body(&mut self) -> Parse<TypeDef> {
        let mut variants = vec![self.enum_variant()?];
        while let Some(variant) = self.attempt(|p| {
            p.ignorables();
            p.symbol("|")?;
            p.ignorables();
            p.enum_variant().commit()
        })? {
            variants.push(variant);
        }
        Ok(TypeDef::Enum(variants))
    }

    fn enum_variant(&mut self) -> Parse<(String, Vec<Type>)> {
        self.symbol("#")?;
        let tag = self.lower_name().commit()?;
        let mut params = Vec::new();
        while let Some(param) = self.attempt(|p| {
            p.whitespace();
            p.sum_param()
        })? {
            params.push(param);
        }
        Ok((tag, params))
    }

    fn record_type_body(&mut self) -> Parse<TypeDef> {
        Ok(TypeDef::Record(self.rec_fields()?))
    }

    // -- Expressions --

    /// Full expression grammar. Clears any guard restriction for the
    /// duration: nested constructs always re-admit lambdas and annotations.
    fn expression(&mut self) -> Parse<Expr> {
        let saved = self.in_guard;
        self.in_guard = false;
        let result = self.with_context(Context::InExpr, |p| p.pratt_expr(0));
        self.in_guard = saved;
        result
    }

    /// Match-arm guard: the full Pratt grammar minus `annotation` and minus
    /// `lambda`, so `=>` terminates the guard.
    fn guard_expression(&mut self) -> Parse<Expr> {
        let saved = self.in_guard;
        self.in_guard = true;
        let result = self.with_context(Context::InExpr, |p| p.pratt_expr(0));
        self.in_guard = saved;
        result
    }

    /// Pratt precedence climbing over [`INFIX_OPS`].
    fn pratt_expr(&mut self, min_bp: u8) -> Parse<Expr> {
        let mut lhs = self.prefix_expr()?;
        loop {
            let checkpoint = self.cursor.checkpoint();
            self.ignorables();
            let Some((op, left_bp, right_bp)) = self.match_infix_op() else {
                self.cursor.rewind(checkpoint);
                break;
            };
            if left_bp < min_bp {
                self.cursor.rewind(checkpoint);
                break;
            }
            self.ignorables();
            let rhs = self.pratt_expr(right_bp).commit()?;
            lhs = infix_expr(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn match_infix_op(&mut self) -> Option<(BinOp, u8, u8)> {
        for (spelling, op, left_bp, right_bp) in INFIX_OPS {
            if self.cursor.eat_str(spelling) {
                return Some((*op, *left_bp, *right_bp));
            }
        }
        None
    }

    /// The ordered prefix alternatives of the expression grammar. The second
    /// element of each entry is whether the alternative is admitted inside a
    /// match-arm guard.
    fn prefix_expr(&mut self) -> Parse<Expr> {
        const ALTERNATIVES: [(fn(&mut Parser) -> Parse<Expr>, bool); 10] = [
            (Parser::conditional, true),
            (Parser::match_expr, true),
            (Parser::annotation, false),
            (Parser::lambda, false),
            (Parser::application, true),
            (Parser::access, true),
            (Parser::identifier_expr, true),
            (Parser::subexpression, true),
            (Parser::block, true),
            (Parser::literal, true),
        ];
        let mut furthest = None;
        for (alternative, allowed_in_guard) in ALTERNATIVES {
            if self.in_guard && !allowed_in_guard {
                continue;
            }
            if let Some(expr) = self.alternative(&mut furthest, alternative)? {
                return Ok(expr);
            }
        }
        self.give_up(furthest, "an expression")
    }

    fn conditional(&mut self) -> Parse<Expr> {
        let start = self.position();
        self.keyword("if")?;
        self.ignorables();
        let condition = self.expression().commit()?;
        self.ignorables();
        self.keyword("then").commit()?;
        self.ignorables();
        let then_branch = self.expression().commit()?;
        self.ignorables();
        self.keyword("else").commit()?;
        self.ignorables();
        let else_branch = self.expression().commit()?;
        let span = self.span_from(start);
        Ok(Spanned::new(
            ExprKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        ))
    }

    fn match_expr(&mut self) -> Parse<Expr> {
        let start = self.position();
        self.keyword("where")?;
        self.ignorables();
        let scrutinee = self.expression().commit()?;
        let mut arms = Vec::new();
        while let Some(arm) = self.attempt(Self::match_arm)? {
            arms.push(arm);
        }
        Ok(Spanned::new(
            ExprKind::Match {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            self.span_from(start),
        ))
    }

    fn match_arm(&mut self) -> Parse<MatchArm> {
        self.ignorables();
        self.keyword("is")?;
        self.ignorables();
        let pattern = self.pattern().commit()?;
        let guard = self.attempt(|p| {
            p.ignorables();
            p.keyword("if")?;
            p.ignorables();
            p.guard_expression().commit()
        })?;
        self.ignorables();
        self.operator("=>").commit()?;
        self.ignorables();
        let body = self.expression().commit()?;
        Ok(MatchArm {
            pattern,
            guard,
            body,
        })
    }

    fn annotation(&mut self) -> Parse<Expr> {
        let start = self.position();
        let expr = self.parenthesised()?;
        self.whitespace();
        self.keyword("as")?;
        self.ignorables();
        let ty = self.type_expr().commit()?;
        Ok(Spanned::new(
            ExprKind::Annotation {
                expr: Box::new(expr),
                ty,
            },
            self.span_from(start),
        ))
    }

    fn lambda(&mut self) -> Parse<Expr> {
        let start = self.position();
        let mut params = vec![self.pattern()?];
        while let Some(param) = self.attempt(|p| {
            p.whitespace();
            p.pattern()
        })? {
            params.push(param);
        }
        self.whitespace();
        self.operator("=>")?;
        self.ignorables();
        let body = self.expression().commit()?;
        let span = self.span_from(start);
        Ok(Spanned::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn application(&mut self) -> Parse<Expr> {
        let start = self.position();
        let mut furthest = None;
        let callee_alternatives: [fn(&mut Self) -> Parse<Expr>; 4] = [
            Self::access,
            Self::block,
            Self::subexpression,
            Self::identifier_expr,
        ];
        let mut callee = None;
        for alternative in callee_alternatives {
            if let Some(expr) = self.alternative(&mut furthest, alternative)? {
                callee = Some(expr);
                break;
            }
        }
        let Some(callee) = callee else {
            return self.give_up(furthest, "an application");
        };
        // The first argument is required; its soft failure is the
        // application's, so the bare callee can win as a plain identifier.
        let checkpoint = self.cursor.checkpoint();
        self.whitespace();
        let first = match self.parenthesised() {
            Ok(arg) => arg,
            Err(failure) => {
                if !failure.committed {
                    self.cursor.rewind(checkpoint);
                }
                return Err(failure);
            }
        };
        let mut args = vec![first];
        while let Some(arg) = self.attempt(|p| {
            p.whitespace();
            p.parenthesised()
        })? {
            args.push(arg);
        }
        Ok(Spanned::new(
            ExprKind::Apply {
                func: Box::new(callee),
                args,
            },
            self.span_from(start),
        ))
    }

    fn access(&mut self) -> Parse<Expr> {
        let start = self.position();
        let expr = self.parenthesised()?;
        self.symbol(".")?;
        let mut fields = vec![self.lower_name().commit()?];
        while let Some(field) = self.attempt(|p| {
            p.symbol(".")?;
            p.lower_name().commit()
        })? {
            fields.push(field);
        }
        Ok(Spanned::new(
            ExprKind::Access {
                expr: Box::new(expr),
                fields,
            },
            self.span_from(start),
        ))
    }

    fn identifier_expr(&mut self) -> Parse<Expr> {
        let start = self.position();
        let form = self.id_form()?;
        Ok(Spanned::new(
            ExprKind::Identifier(form),
            self.span_from(start),
        ))
    }

    fn id_form(&mut self) -> Parse<IdForm> {
        if self.cursor.eat_char('_') {
            let name = self.attempt(Self::lower_name)?;
            return Ok(IdForm::Placeholder(name));
        }
        if self.cursor.peek().is_some_and(cursor::is_upper_start) {
            return self.scoped_id();
        }
        Ok(IdForm::Local(self.lower_name()?))
    }

    /// One or more dotted upper-case segments terminated by a local name.
    fn scoped_id(&mut self) -> Parse<IdForm> {
        let mut path = vec![self.upper_name()?];
        loop {
            self.symbol(".")?;
            if self.cursor.peek().is_some_and(cursor::is_upper_start) {
                path.push(self.upper_name()?);
            } else {
                let inner = IdForm::Local(self.lower_name()?);
                return Ok(IdForm::Scoped {
                    path,
                    inner: Box::new(inner),
                });
            }
        }
    }

    fn subexpression(&mut self) -> Parse<Expr> {
        self.symbol("(")?;
        self.ignorables();
        let inner = self.expression()?;
        self.ignorables();
        self.symbol(")").commit()?;
        // The inner node keeps its own span; the parentheses are covered by
        // whichever enclosing production consumed this operand.
        Ok(inner)
    }

    fn block(&mut self) -> Parse<Expr> {
        let start = self.position();
        self.symbol("{")?;
        let mut bindings = Vec::new();
        while let Some(binding) = self.attempt(Self::block_binding)? {
            bindings.push(binding);
        }
        self.ignorables();
        self.keyword("ret")?;
        self.ignorables();
        let ret = self.expression().commit()?;
        self.ignorables();
        self.symbol("}").commit()?;
        Ok(Spanned::new(
            ExprKind::Block {
                bindings,
                ret: Box::new(ret),
            },
            self.span_from(start),
        ))
    }

    /// `run expr` (bound to `"_"`) or `let name = expr`.
    fn block_binding(&mut self) -> Parse<(String, Expr)> {
        self.ignorables();
        if self.attempt(|p| p.keyword("run"))?.is_some() {
            self.ignorables();
            let value = self.expression().commit()?;
            return Ok(("_".to_string(), value));
        }
        self.keyword("let")?;
        self.whitespace();
        let name = self.lower_name().commit()?;
        self.ignorables();
        self.symbol("=").commit()?;
        self.ignorables();
        let value = self.expression().commit()?;
        Ok((name, value))
    }

    /// Restricted operand grammar used by `access`, `application`, and
    /// variant-literal arguments. Keeping the full expression grammar out of
    /// argument position stops an argument list from swallowing the rest of
    /// the input.
    fn parenthesised(&mut self) -> Parse<Expr> {
        let mut furthest = None;
        let alternatives: [fn(&mut Self) -> Parse<Expr>; 4] = [
            Self::block,
            Self::non_variant_literal,
            Self::identifier_expr,
            Self::subexpression,
        ];
        for alternative in alternatives {
            if let Some(expr) = self.alternative(&mut furthest, alternative)? {
                return Ok(expr);
            }
        }
        self.give_up(furthest, "an operand")
    }

    // -- Literals --

    fn literal(&mut self) -> Parse<Expr> {
        let mut furthest = None;
        if let Some(expr) = self.alternative(&mut furthest, Self::non_variant_literal)? {
            return Ok(expr);
        }
        if let Some(expr) = self.alternative(&mut furthest, Self::variant_literal)? {
            return Ok(expr);
        }
        self.give_up(furthest, "a literal")
    }

    fn non_variant_literal(&mut self) -> Parse<Expr> {
        let mut furthest = None;
        let alternatives: [fn(&mut Self) -> Parse<Expr>; 7] = [
            Self::boolean_literal,
            Self::number_literal,
            Self::string_expr,
            Self::template_literal,
            Self::undefined_literal,
            Self::array_literal,
            Self::record_literal,
        ];
        for alternative in alternatives {
            if let Some(expr) = self.alternative(&mut furthest, alternative)? {
                return Ok(expr);
            }
        }
        self.give_up(furthest, "a literal")
    }

    fn boolean_literal(&mut self) -> Parse<Expr> {
        let start = self.position();
        if self.cursor.eat_keyword("true") {
            return Ok(Spanned::new(
                ExprKind::Lit(LitKind::Boolean(true)),
                self.span_from(start),
            ));
        }
        if self.cursor.eat_keyword("false") {
            return Ok(Spanned::new(
                ExprKind::Lit(LitKind::Boolean(false)),
                self.span_from(start),
            ));
        }
        self.fail_at(ParseErrorKind::ExpectingKeyword("true".into()), start)
    }

    fn number_literal(&mut self) -> Parse<Expr> {
        let start = self.position();
        let value = self.number()?;
        Ok(Spanned::new(
            ExprKind::Lit(LitKind::Number(value)),
            self.span_from(start),
        ))
    }

    /// Numeric literal: optional `-`, then integer, hex, octal, binary, or
    /// decimal float. A number running straight into a letter is an error
    /// (`123abc` must not parse as `123`).
    fn number(&mut self) -> Parse<f64> {
        let start = self.position();
        let checkpoint = self.cursor.checkpoint();
        let negative = self.cursor.eat_char('-');
        let value = if self.cursor.eat_str("0x") {
            self.radix_digits(16).commit()?
        } else if self.cursor.eat_str("0o") {
            self.radix_digits(8).commit()?
        } else if self.cursor.eat_str("0b") {
            self.radix_digits(2).commit()?
        } else {
            let mut text = String::new();
            while let Some(c) = self.cursor.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                text.push(c);
                self.cursor.bump();
            }
            if text.is_empty() {
                self.cursor.rewind(checkpoint);
                return self.fail_at(ParseErrorKind::ExpectingNumber, start);
            }
            if self.cursor.peek() == Some('.')
                && self.cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit())
            {
                text.push('.');
                self.cursor.bump();
                while let Some(c) = self.cursor.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    text.push(c);
                    self.cursor.bump();
                }
            }
            match text.parse::<f64>() {
                Ok(value) => value,
                Err(_) => {
                    return self
                        .fail_at(
                            ParseErrorKind::Internal(format!("unparseable number '{text}'")),
                            start,
                        )
                        .commit()
                }
            }
        };
        if let Some(c) = self.cursor.peek() {
            if c.is_ascii_alphabetic() {
                return self.fail(ParseErrorKind::UnexpectedChar(c)).commit();
            }
        }
        Ok(if negative { -value } else { value })
    }

    /// At least one digit in `radix`, folded into a float so large literals
    /// degrade in precision rather than overflow.
    fn radix_digits(&mut self, radix: u32) -> Parse<f64> {
        let mut value = 0.0f64;
        let mut any = false;
        while let Some(digit) = self.cursor.peek().and_then(|c| c.to_digit(radix)) {
            value = value * f64::from(radix) + f64::from(digit);
            any = true;
            self.cursor.bump();
        }
        if any {
            Ok(value)
        } else {
            self.fail(ParseErrorKind::ExpectingNumber)
        }
    }

    fn string_expr(&mut self) -> Parse<Expr> {
        let start = self.position();
        let value = self.string_literal()?;
        Ok(Spanned::new(
            ExprKind::Lit(LitKind::String(value)),
            self.span_from(start),
        ))
    }

    /// Double-quoted string. A literal back-tick is permitted; an unescaped
    /// `"` terminates.
    fn string_literal(&mut self) -> Parse<String> {
        self.symbol("\"")?;
        let mut value = String::new();
        loop {
            let Some(c) = self.cursor.bump() else {
                return self.fail(ParseErrorKind::ExpectingChar).commit();
            };
            match c {
                '"' => return Ok(value),
                '\\' => value.push(self.escape_char(false).commit()?),
                _ => value.push(c),
            }
        }
    }

    /// The character named by an escape sequence, after the `\`.
    fn escape_char(&mut self, in_template: bool) -> Parse<char> {
        let position = self.position();
        let Some(c) = self.cursor.bump() else {
            return self.fail(ParseErrorKind::ExpectingChar);
        };
        match c {
            '\\' => Ok('\\'),
            '"' => Ok('"'),
            '\'' => Ok('\''),
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            '`' if in_template => Ok('`'),
            _ => self.fail_at(ParseErrorKind::UnexpectedChar(c), position),
        }
    }

    /// Back-tick template: character runs and `${…}` interpolations.
    fn template_literal(&mut self) -> Parse<Expr> {
        let start = self.position();
        self.symbol("`")?;
        let mut segments = Vec::new();
        let mut text = String::new();
        loop {
            if self.cursor.eat_char('`') {
                break;
            }
            if self.cursor.eat_str("${") {
                if !text.is_empty() {
                    segments.push(TemplateSegment::Text(std::mem::take(&mut text)));
                }
                self.ignorables();
                let expr = self.expression().commit()?;
                self.ignorables();
                self.symbol("}").commit()?;
                segments.push(TemplateSegment::Expr(expr));
                continue;
            }
            let Some(c) = self.cursor.bump() else {
                return self.fail(ParseErrorKind::ExpectingChar).commit();
            };
            if c == '\\' {
                text.push(self.escape_char(true).commit()?);
            } else {
                text.push(c);
            }
        }
        if !text.is_empty() {
            segments.push(TemplateSegment::Text(text));
        }
        Ok(Spanned::new(
            ExprKind::Lit(LitKind::Template(segments)),
            self.span_from(start),
        ))
    }

    fn undefined_literal(&mut self) -> Parse<Expr> {
        let start = self.position();
        self.symbol("()")?;
        Ok(Spanned::new(
            ExprKind::Lit(LitKind::Undefined),
            self.span_from(start),
        ))
    }

    fn array_literal(&mut self) -> Parse<Expr> {
        let start = self.position();
        self.symbol("[")?;
        self.ignorables();
        let mut items = Vec::new();
        if self.attempt(|p| p.symbol("]"))?.is_none() {
            loop {
                items.push(self.expression().commit()?);
                self.ignorables();
                if !self.cursor.eat_char(',') {
                    break;
                }
                self.ignorables();
            }
            self.symbol("]").commit()?;
        }
        Ok(Spanned::new(
            ExprKind::Lit(LitKind::Array(items)),
            self.span_from(start),
        ))
    }

    /// `{ field: expr, … }` with shorthand `{ foo }` for `{ foo: foo }`.
    /// The expanded identifier's span is the shorthand's own extent.
    fn record_literal(&mut self) -> Parse<Expr> {
        let start = self.position();
        self.symbol("{")?;
        self.ignorables();
        let mut fields: Vec<(String, Expr)> = Vec::new();
        if self.attempt(|p| p.symbol("}"))?.is_none() {
            loop {
                let field_start = self.position();
                let name = if fields.is_empty() {
                    self.lower_name()?
                } else {
                    self.lower_name().commit()?
                };
                let field_span = self.span_from(field_start);
                self.ignorables();
                let value = if self.cursor.eat_char(':') {
                    self.ignorables();
                    self.expression().commit()?
                } else {
                    Spanned::new(ExprKind::Identifier(IdForm::Local(name.clone())), field_span)
                };
                fields.push((name, value));
                self.ignorables();
                if !self.cursor.eat_char(',') {
                    break;
                }
                self.ignorables();
            }
            self.symbol("}").commit()?;
        }
        Ok(Spanned::new(
            ExprKind::Lit(LitKind::Record(fields)),
            self.span_from(start),
        ))
    }

    /// `#tag arg…` — arguments use the restricted operand grammar, so an
    /// adjacent variant is never swallowed as an argument.
    fn variant_literal(&mut self) -> Parse<Expr> {
        let start = self.position();
        self.symbol("#")?;
        let tag = self.lower_name().commit()?;
        let mut args = Vec::new();
        while let Some(arg) = self.attempt(|p| {
            p.whitespace();
            p.parenthesised()
        })? {
            args.push(arg);
        }
        Ok(Spanned::new(
            ExprKind::Lit(LitKind::Variant { tag, args }),
            self.span_from(start),
        ))
    }

    // -- Patterns --

    fn pattern(&mut self) -> Parse<Pattern> {
        let mut furthest = None;
        let alternatives: [fn(&mut Self) -> Parse<Pattern>; 9] = [
            Self::array_destructure,
            Self::literal_pattern,
            Self::wildcard_pattern,
            Self::name_pattern,
            Self::record_destructure,
            Self::template_destructure,
            Self::typeof_pattern,
            Self::variant_destructure,
            Self::subpattern,
        ];
        for alternative in alternatives {
            if let Some(pattern) = self.alternative(&mut furthest, alternative)? {
                return Ok(pattern);
            }
        }
        self.give_up(furthest, "a pattern")
    }

    /// `[p, q, ...rest]` — committed from the opening `[`; a spread must be
    /// the final element.
    fn array_destructure(&mut self) -> Parse<Pattern> {
        self.symbol("[")?;
        self.ignorables();
        let mut items = Vec::new();
        if self.attempt(|p| p.symbol("]"))?.is_none() {
            loop {
                if self.cursor.eat_str("...") {
                    items.push(Pattern::Spread(self.lower_name().commit()?));
                    self.ignorables();
                    break;
                }
                items.push(self.pattern().commit()?);
                self.ignorables();
                if !self.cursor.eat_char(',') {
                    break;
                }
                self.ignorables();
            }
            self.symbol("]").commit()?;
        }
        Ok(Pattern::ArrayDestructure(items))
    }

    /// Literal patterns are restricted to booleans, numbers, strings, and
    /// undefined; arrays, records, and templates destructure instead.
    fn literal_pattern(&mut self) -> Parse<Pattern> {
        let start = self.position();
        if self.cursor.eat_keyword("true") {
            return Ok(Pattern::Literal(LitKind::Boolean(true)));
        }
        if self.cursor.eat_keyword("false") {
            return Ok(Pattern::Literal(LitKind::Boolean(false)));
        }
        if let Some(value) = self.attempt(Self::number)? {
            return Ok(Pattern::Literal(LitKind::Number(value)));
        }
        if let Some(value) = self.attempt(Self::string_literal)? {
            return Ok(Pattern::Literal(LitKind::String(value)));
        }
        if self.cursor.eat_str("()") {
            return Ok(Pattern::Literal(LitKind::Undefined));
        }
        self.fail_at(ParseErrorKind::ExpectingNumber, start)
    }

    fn wildcard_pattern(&mut self) -> Parse<Pattern> {
        self.symbol("_")?;
        let name = self.attempt(Self::lower_name)?;
        Ok(Pattern::Wildcard(name))
    }

    fn name_pattern(&mut self) -> Parse<Pattern> {
        Ok(Pattern::Name(self.lower_name()?))
    }

    /// `{ key, other: p, ...rest }` — shorthand entries carry no pattern;
    /// the spread entry is stored under its bound name.
    fn record_destructure(&mut self) -> Parse<Pattern> {
        self.symbol("{")?;
        self.ignorables();
        let mut entries: Vec<(String, Option<Pattern>)> = Vec::new();
        if self.attempt(|p| p.symbol("}"))?.is_none() {
            loop {
                if self.cursor.eat_str("...") {
                    let name = self.lower_name().commit()?;
                    entries.push((name.clone(), Some(Pattern::Spread(name))));
                    self.ignorables();
                    break;
                }
                let name = if entries.is_empty() {
                    self.lower_name()?
                } else {
                    self.lower_name().commit()?
                };
                self.ignorables();
                let value = if self.cursor.eat_char(':') {
                    self.ignorables();
                    Some(self.pattern().commit()?)
                } else {
                    None
                };
                entries.push((name, value));
                self.ignorables();
                if !self.cursor.eat_char(',') {
                    break;
                }
                self.ignorables();
            }
            self.symbol("}").commit()?;
        }
        Ok(Pattern::RecordDestructure(entries))
    }

    fn template_destructure(&mut self) -> Parse<Pattern> {
        self.symbol("`")?;
        let mut segments = Vec::new();
        let mut text = String::new();
        loop {
            if self.cursor.eat_char('`') {
                break;
            }
            if self.cursor.eat_str("${") {
                if !text.is_empty() {
                    segments.push(TemplatePatternSegment::Text(std::mem::take(&mut text)));
                }
                self.ignorables();
                let pattern = self.pattern().commit()?;
                self.ignorables();
                self.symbol("}").commit()?;
                segments.push(TemplatePatternSegment::Pattern(pattern));
                continue;
            }
            let Some(c) = self.cursor.bump() else {
                return self.fail(ParseErrorKind::ExpectingChar).commit();
            };
            if c == '\\' {
                text.push(self.escape_char(true).commit()?);
            } else {
                text.push(c);
            }
        }
        if !text.is_empty() {
            segments.push(TemplatePatternSegment::Text(text));
        }
        Ok(Pattern::TemplateDestructure(segments))
    }

    fn typeof_pattern(&mut self) -> Parse<Pattern> {
        self.symbol("@")?;
        let name = self.upper_name().commit()?;
        self.whitespace();
        let inner = self.pattern().commit()?;
        Ok(Pattern::Typeof(name, Box::new(inner)))
    }

    /// `#tag p…` — argument patterns are consumed greedily; parenthesise to
    /// control nesting.
    fn variant_destructure(&mut self) -> Parse<Pattern> {
        self.symbol("#")?;
        let tag = self.lower_name().commit()?;
        let mut args = Vec::new();
        while let Some(arg) = self.attempt(|p| {
            p.whitespace();
            p.pattern()
        })? {
            args.push(arg);
        }
        Ok(Pattern::VariantDestructure { tag, args })
    }

    fn subpattern(&mut self) -> Parse<Pattern> {
        self.symbol("(")?;
        self.ignorables();
        let pattern = self.pattern()?;
        self.ignorables();
        self.symbol(")").commit()?;
        Ok(pattern)
    }

    // -- Types --

    fn type_expr(&mut self) -> Parse<Type> {
        let start = self.position();
        let mut furthest = None;
        let alternatives: [fn(&mut Self) -> Parse<Type>; 9] = [
            Self::fun_type,
            Self::app_type,
            Self::var_type,
            Self::con_type,
            Self::any_type,
            Self::rec_type,
            Self::sum_type,
            Self::hole_type,
            Self::subtype,
        ];
        for alternative in alternatives {
            if let Some(ty) = self.alternative(&mut furthest, alternative)? {
                return Ok(ty);
            }
        }
        match furthest {
            Some(failure) if failure.error.position > start => Err(failure),
            _ => self.fail_at(ParseErrorKind::ExpectingType, start),
        }
    }

    /// `from -> to`, right-associative: the right operand is a full type.
    fn fun_type(&mut self) -> Parse<Type> {
        let from = self.fun_operand()?;
        self.ignorables();
        let position = self.position();
        if !self.cursor.eat_str("->") && !self.cursor.eat_str("→") {
            return self.fail_at(ParseErrorKind::ExpectingOperator("->".into()), position);
        }
        self.ignorables();
        let to = self.type_expr().commit()?;
        Ok(Type::Fun {
            from: Box::new(from),
            to: Box::new(to),
        })
    }

    fn fun_operand(&mut self) -> Parse<Type> {
        match self.attempt(Self::app_type)? {
            Some(ty) => Ok(ty),
            None => self.atomic_type(),
        }
    }

    /// Two or more adjacent atoms: a head applied to arguments.
    fn app_type(&mut self) -> Parse<Type> {
        let head = self.atomic_type()?;
        let mut args = Vec::new();
        while let Some(arg) = self.attempt(|p| {
            p.whitespace();
            p.atomic_type()
        })? {
            args.push(arg);
        }
        if args.is_empty() {
            return self.fail(ParseErrorKind::ExpectingType);
        }
        Ok(Type::App {
            head: Box::new(head),
            args,
        })
    }

    fn atomic_type(&mut self) -> Parse<Type> {
        let start = self.position();
        let mut furthest = None;
        let alternatives: [fn(&mut Self) -> Parse<Type>; 7] = [
            Self::subtype,
            Self::var_type,
            Self::con_type,
            Self::rec_type,
            Self::sum_type,
            Self::any_type,
            Self::hole_type,
        ];
        for alternative in alternatives {
            if let Some(ty) = self.alternative(&mut furthest, alternative)? {
                return Ok(ty);
            }
        }
        match furthest {
            Some(failure) if failure.error.position > start => Err(failure),
            _ => self.fail_at(ParseErrorKind::ExpectingType, start),
        }
    }

    fn var_type(&mut self) -> Parse<Type> {
        Ok(Type::Var(self.lower_name()?))
    }

    /// An upper-case constructor, or the unit constructor `()`.
    fn con_type(&mut self) -> Parse<Type> {
        if self.cursor.eat_str("()") {
            return Ok(Type::Con("()".to_string()));
        }
        Ok(Type::Con(self.upper_name()?))
    }

    fn any_type(&mut self) -> Parse<Type> {
        self.symbol("*")?;
        Ok(Type::Any)
    }

    fn hole_type(&mut self) -> Parse<Type> {
        self.symbol("?")?;
        Ok(Type::Hole)
    }

    fn rec_type(&mut self) -> Parse<Type> {
        Ok(Type::Rec(self.rec_fields()?))
    }

    /// `{ field: type, … }` — trailing comma forbidden.
    fn rec_fields(&mut self) -> Parse<Vec<(String, Type)>> {
        self.symbol("{")?;
        self.ignorables();
        let mut fields = Vec::new();
        if self.attempt(|p| p.symbol("}"))?.is_none() {
            loop {
                let name = if fields.is_empty() {
                    self.lower_name()?
                } else {
                    self.lower_name().commit()?
                };
                self.ignorables();
                self.symbol(":").commit()?;
                self.ignorables();
                let ty = self.type_expr().commit()?;
                fields.push((name, ty));
                self.ignorables();
                if !self.cursor.eat_char(',') {
                    break;
                }
                self.ignorables();
            }
            self.symbol("}").commit()?;
        }
        Ok(fields)
    }

    /// One or more `#tag params` clauses.
    fn sum_type(&mut self) -> Parse<Type> {
        let mut variants = vec![self.sum_variant()?];
        while let Some(variant) = self.attempt(|p| {
            p.ignorables();
            p.sum_variant()
        })? {
            variants.push(variant);
        }
        Ok(Type::Sum(variants))
    }

    fn sum_variant(&mut self) -> Parse<(String, Vec<Type>)> {
        self.symbol("#")?;
        let tag = self.lower_name().commit()?;
        let mut params = Vec::new();
        while let Some(param) = self.attempt(|p| {
            p.whitespace();
            p.sum_param()
        })? {
            params.push(param);
        }
        Ok((tag, params))
    }

    /// Sum parameters are atoms that are not themselves sums, so an adjacent
    /// tag starts the next clause instead of being swallowed as a parameter.
    fn sum_param(&mut self) -> Parse<Type> {
        let start = self.position();
        let mut furthest = None;
        let alternatives: [fn(&mut Self) -> Parse<Type>; 6] = [
            Self::subtype,
            Self::var_type,
            Self::con_type,
            Self::rec_type,
            Self::any_type,
            Self::hole_type,
        ];
        for alternative in alternatives {
            if let Some(ty) = self.alternative(&mut furthest, alternative)? {
                return Ok(ty);
            }
        }
        match furthest {
            Some(failure) if failure.error.position > start => Err(failure),
            _ => self.fail_at(ParseErrorKind::ExpectingType, start),
        }
    }

    fn subtype(&mut self) -> Parse<Type> {
        self.symbol("(")?;
        self.ignorables();
        let ty = self.type_expr()?;
        self.ignorables();
        self.symbol(")").commit()?;
        Ok(ty)
    }
}
