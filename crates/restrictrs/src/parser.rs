//! Recursive-descent parser producing the [`ast`](crate::ast) tree.
//!
//! The grammar is Python 2 flavoured: `print` and `exec` are statements and
//! `raise E, msg` is accepted. A `print(...)` whose parenthesized group ends
//! the statement is read call-style, so `print(a, b)` prints two values and
//! `file=` selects the target.

use crate::ast::{
    Alias, BoolOp, Comprehension, Constant, ExceptHandler, Expr, ExprContext, ExprKind,
    Expression, FunctionDef, Keyword, Module, Param, Parameters, Stmt, StmtKind,
};
use crate::bytecode::{BinOp, CmpOp, UnaryOp};
use crate::diagnostic::{Loc, Span};
use crate::error::SyntaxError;
use crate::lexer::{syntax_error, tokenize};
use crate::token::{AugOp, Token, TokenKind};

type PResult<T> = Result<T, SyntaxError>;

/// Bracket, operator and block nesting the parser recurses through.
pub const MAX_NESTING: usize = 30;

/// Deepest tree handed to the restriction pass and the code generator,
/// counting statements and expressions. Also caps operator and trailer
/// chains and `elif` ladders, which the parser builds without recursing.
pub const MAX_DEPTH: usize = 100;

const TOO_MANY_PARENS: &str = "too many nested parentheses";
const TOO_MANY_INDENTS: &str = "too many levels of indentation";
const TOO_DEEP: &str = "too deeply nested";

/// Parse a whole program.
pub fn parse_module(source: &str, filename: &str) -> PResult<Module> {
    let mut parser = Parser::new(source, filename)?;
    let body = parser.parse_file()?;
    let module = Module { body };
    if let Some(loc) = module.too_deep(MAX_DEPTH) {
        return Err(parser.error_at(loc, TOO_DEEP));
    }
    Ok(module)
}

/// Parse a single expression, as used by `eval` mode.
pub fn parse_expression(source: &str, filename: &str) -> PResult<Expression> {
    let mut parser = Parser::new(source, filename)?;
    while matches!(parser.peek(), TokenKind::Indent | TokenKind::Newline) {
        parser.advance();
    }
    let body = parser.parse_testlist()?;
    while matches!(parser.peek(), TokenKind::Newline | TokenKind::Dedent) {
        parser.advance();
    }
    if parser.peek() != &TokenKind::EndOfFile {
        return Err(parser.error_here("invalid syntax"));
    }
    let expression = Expression { body };
    if let Some(loc) = expression.too_deep(MAX_DEPTH) {
        return Err(parser.error_at(loc, TOO_DEEP));
    }
    Ok(expression)
}

/// Remove a leading string-literal statement from `body` and return it.
pub(crate) fn take_docstring(body: &mut Vec<Stmt>) -> Option<String> {
    match body.first() {
        Some(Stmt {
            kind:
                StmtKind::Expr(Expr {
                    kind: ExprKind::Constant(Constant::Str(doc)),
                    ..
                }),
            ..
        }) => {
            let doc = doc.clone();
            body.remove(0);
            Some(doc)
        }
        _ => None,
    }
}

pub struct Parser<'a> {
    source: &'a str,
    filename: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Current recursion through nested brackets, operators and blocks.
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, filename: &'a str) -> PResult<Self> {
        let tokens = tokenize(source, filename)?;
        Ok(Self {
            source,
            filename,
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    // -----------------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------------

    fn token(&self) -> &Token {
        // The lexer always ends the stream with EndOfFile.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &TokenKind {
        &self.token().kind
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.token().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(self.error_here("invalid syntax"))
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        match self.peek().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("invalid syntax")),
        }
    }

    fn enter(&mut self, message: &str) -> PResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here(message));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let token = self.token();
        syntax_error(self.source, self.filename, message, token.span.start)
    }

    fn error_at(&self, loc: Option<Loc>, message: &str) -> SyntaxError {
        let offset = loc.map_or(self.token().span.start, |l| l.span.start);
        syntax_error(self.source, self.filename, message, offset)
    }

    fn loc_of(token: &Token) -> Loc {
        Loc::new(token.line, token.span)
    }

    /// Location spanning from token index `start` to the last consumed token.
    fn loc_from(&self, start: usize) -> Option<Loc> {
        let first = &self.tokens[start];
        let last = &self.tokens[self.pos.saturating_sub(1).max(start)];
        Some(Loc::new(first.line, Span::new(first.span.start, last.span.end)))
    }

    /// Can the current token begin an expression?
    fn starts_expr(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Name(_)
                | TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::None
                | TokenKind::True
                | TokenKind::False
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Tilde
                | TokenKind::Not
                | TokenKind::Lambda
        )
    }

    /// Does the statement end right after the bracket group starting here?
    fn group_ends_statement(&self) -> bool {
        let mut depth = 0usize;
        let mut idx = self.pos;
        while idx < self.tokens.len() {
            match self.tokens[idx].kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(idx + 1).map(|t| &t.kind),
                            Some(TokenKind::Newline | TokenKind::Semicolon | TokenKind::EndOfFile)
                        );
                    }
                }
                TokenKind::EndOfFile => return false,
                _ => {}
            }
            idx += 1;
        }
        false
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn parse_file(&mut self) -> PResult<Vec<Stmt>> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Indent => return Err(self.error_here("unexpected indent")),
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> PResult<Vec<Stmt>> {
        let stmt = match self.peek() {
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Try => self.parse_try()?,
            TokenKind::Def => self.parse_def()?,
            TokenKind::Class => self.parse_class()?,
            TokenKind::With | TokenKind::At => return Err(self.error_here("invalid syntax")),
            _ => return self.parse_simple_line(),
        };
        Ok(vec![stmt])
    }

    /// `small_stmt (';' small_stmt)* [';'] NEWLINE`
    fn parse_simple_line(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_stmt()?];
        while self.eat(&TokenKind::Semicolon) {
            if self.peek() == &TokenKind::Newline {
                break;
            }
            stmts.push(self.parse_small_stmt()?);
        }
        self.expect(&TokenKind::Newline)?;
        Ok(stmts)
    }

    /// `':' suite`, where a suite is either an indented block or a simple
    /// statement line.
    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::Colon)?;
        if !self.eat(&TokenKind::Newline) {
            return self.parse_simple_line();
        }
        if !self.eat(&TokenKind::Indent) {
            return Err(self.error_here("expected an indented block"));
        }
        self.enter(TOO_MANY_INDENTS)?;
        let body = self.parse_indented_body();
        self.leave();
        body
    }

    fn parse_indented_body(&mut self) -> PResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.eat(&TokenKind::Dedent) {
            if self.peek() == &TokenKind::EndOfFile {
                break;
            }
            if self.peek() == &TokenKind::Indent {
                return Err(self.error_here("unexpected indent"));
            }
            body.extend(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_small_stmt(&mut self) -> PResult<Stmt> {
        let start = self.pos;
        let kind = match self.peek() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.starts_expr() {
                    Some(self.parse_testlist()?)
                } else {
                    None
                };
                StmtKind::Return(value)
            }
            TokenKind::Del => {
                self.advance();
                let mut targets = Vec::new();
                loop {
                    let mut target = self.parse_expr()?;
                    if !target.set_context(ExprContext::Del) {
                        return Err(self.error_at(target.loc, "can't delete expression"));
                    }
                    targets.push(target);
                    if !self.eat(&TokenKind::Comma) || !self.starts_expr() {
                        break;
                    }
                }
                StmtKind::Delete(targets)
            }
            TokenKind::Global => {
                self.advance();
                let mut names = vec![self.expect_name()?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.expect_name()?);
                }
                StmtKind::Global(names)
            }
            TokenKind::Import => self.parse_import()?,
            TokenKind::From => self.parse_from_import()?,
            TokenKind::Raise => {
                self.advance();
                let mut exc = None;
                let mut msg = None;
                if self.starts_expr() {
                    exc = Some(self.parse_test()?);
                    if self.eat(&TokenKind::Comma) {
                        msg = Some(self.parse_test()?);
                    }
                }
                StmtKind::Raise { exc, msg }
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_test()?;
                let msg = if self.eat(&TokenKind::Comma) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Print => self.parse_print()?,
            TokenKind::Exec => {
                self.advance();
                let body = self.parse_expr()?;
                let mut globals = None;
                let mut locals = None;
                if self.eat(&TokenKind::In) {
                    globals = Some(self.parse_test()?);
                    if self.eat(&TokenKind::Comma) {
                        locals = Some(self.parse_test()?);
                    }
                }
                StmtKind::Exec {
                    body,
                    globals,
                    locals,
                }
            }
            _ => self.parse_expr_stmt()?,
        };
        Ok(Stmt::new(kind, self.loc_from(start)))
    }

    fn parse_expr_stmt(&mut self) -> PResult<StmtKind> {
        let first = self.parse_testlist_or_yield()?;

        if let TokenKind::AugAssign(op) = *self.peek() {
            self.advance();
            let mut target = first;
            let assignable = matches!(
                target.kind,
                ExprKind::Name { .. } | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
            );
            if !assignable || !target.set_context(ExprContext::Store) {
                return Err(self.error_at(target.loc, "illegal expression for augmented assignment"));
            }
            let value = self.parse_testlist_or_yield()?;
            return Ok(StmtKind::AugAssign {
                target,
                op: translate_augop(op),
                value,
            });
        }

        if self.peek() != &TokenKind::Equal {
            return Ok(StmtKind::Expr(first));
        }

        let mut exprs = vec![first];
        while self.eat(&TokenKind::Equal) {
            exprs.push(self.parse_testlist_or_yield()?);
        }
        let value = exprs.pop().unwrap_or_else(|| Expr::constant(Constant::None));
        for target in &mut exprs {
            if !target.set_context(ExprContext::Store) {
                let what = describe_target(target);
                return Err(self.error_at(target.loc, &format!("can't assign to {}", what)));
            }
        }
        Ok(StmtKind::Assign {
            targets: exprs,
            value,
        })
    }

    fn parse_print(&mut self) -> PResult<StmtKind> {
        self.advance();

        if self.peek() == &TokenKind::LParen && self.group_ends_statement() {
            self.advance();
            let mut values = Vec::new();
            let mut dest = None;
            while self.peek() != &TokenKind::RParen {
                if matches!(self.peek(), TokenKind::Name(_)) && self.peek_at(1) == &TokenKind::Equal {
                    let keyword = self.expect_name()?;
                    self.advance();
                    let value = self.parse_test()?;
                    if keyword != "file" {
                        return Err(self.error_at(value.loc, "unsupported print keyword"));
                    }
                    dest = Some(value);
                } else {
                    values.push(self.parse_test()?);
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
            return Ok(StmtKind::Print {
                dest,
                values,
                newline: true,
            });
        }

        let mut dest = None;
        let mut values = Vec::new();
        let mut newline = true;
        if self.eat(&TokenKind::RightShift) {
            dest = Some(self.parse_test()?);
            if !self.eat(&TokenKind::Comma) {
                return Ok(StmtKind::Print {
                    dest,
                    values,
                    newline,
                });
            }
            newline = false;
        }
        while self.starts_expr() {
            values.push(self.parse_test()?);
            newline = true;
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            newline = false;
        }
        Ok(StmtKind::Print {
            dest,
            values,
            newline,
        })
    }

    fn parse_dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_name()?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_import(&mut self) -> PResult<StmtKind> {
        self.advance();
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let asname = if self.eat(&TokenKind::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn parse_from_import(&mut self) -> PResult<StmtKind> {
        self.advance();
        let module = self.parse_dotted_name()?;
        self.expect(&TokenKind::Import)?;
        if self.peek() == &TokenKind::Star {
            return Err(self.error_here("import * is not supported"));
        }
        let parenthesized = self.eat(&TokenKind::LParen);
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let asname = if self.eat(&TokenKind::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if parenthesized && self.peek() == &TokenKind::RParen {
                break;
            }
        }
        if parenthesized {
            self.expect(&TokenKind::RParen)?;
        }
        Ok(StmtKind::ImportFrom { module, names })
    }

    /// `if` with its `elif` ladder, read in a loop and folded into nested
    /// `If` statements from the last branch up.
    fn parse_if(&mut self) -> PResult<Stmt> {
        let (if_start, if_test, if_body) = self.parse_if_branch()?;
        let mut elifs = Vec::new();
        while self.peek() == &TokenKind::Elif {
            if elifs.len() >= MAX_DEPTH {
                return Err(self.error_here(TOO_DEEP));
            }
            elifs.push(self.parse_if_branch()?);
        }
        let mut orelse = self.parse_else_block()?;
        for (start, test, body) in elifs.into_iter().rev() {
            let branch = Stmt::new(StmtKind::If { test, body, orelse }, self.loc_from(start));
            orelse = vec![branch];
        }
        Ok(Stmt::new(
            StmtKind::If {
                test: if_test,
                body: if_body,
                orelse,
            },
            self.loc_from(if_start),
        ))
    }

    /// `if test: block` or `elif test: block`, keeping the keyword's index.
    fn parse_if_branch(&mut self) -> PResult<(usize, Expr, Vec<Stmt>)> {
        let start = self.pos;
        self.advance();
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        Ok((start, test, body))
    }

    fn parse_else_block(&mut self) -> PResult<Vec<Stmt>> {
        if self.eat(&TokenKind::Else) {
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let start = self.pos;
        self.advance();
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::new(
            StmtKind::While { test, body, orelse },
            self.loc_from(start),
        ))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let start = self.pos;
        self.advance();
        let target = self.parse_target_list()?;
        self.expect(&TokenKind::In)?;
        let iter = self.parse_testlist()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::new(
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            self.loc_from(start),
        ))
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let start = self.pos;
        self.advance();
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while self.peek() == &TokenKind::Except {
            let handler_start = self.pos;
            self.advance();
            let mut type_ = None;
            let mut name = None;
            if self.peek() != &TokenKind::Colon {
                type_ = Some(self.parse_test()?);
                if self.eat(&TokenKind::As) || self.eat(&TokenKind::Comma) {
                    name = Some(self.expect_name()?);
                }
            }
            let loc = self.loc_from(handler_start);
            let handler_body = self.parse_block()?;
            handlers.push(ExceptHandler {
                type_,
                name,
                body: handler_body,
                loc,
            });
        }

        let orelse = if handlers.is_empty() {
            Vec::new()
        } else {
            self.parse_else_block()?
        };
        let finalbody = if self.eat(&TokenKind::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error_here("invalid syntax"));
        }

        Ok(Stmt::new(
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            self.loc_from(start),
        ))
    }

    fn parse_def(&mut self) -> PResult<Stmt> {
        let start = self.pos;
        self.advance();
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_parameters(&TokenKind::RParen)?;
        self.expect(&TokenKind::RParen)?;
        let loc = self.loc_from(start);
        let mut body = self.parse_block()?;
        let doc = take_docstring(&mut body);
        Ok(Stmt::new(
            StmtKind::FunctionDef(FunctionDef {
                name,
                params,
                body,
                doc,
            }),
            loc,
        ))
    }

    fn parse_class(&mut self) -> PResult<Stmt> {
        let start = self.pos;
        self.advance();
        let name = self.expect_name()?;
        let mut bases = Vec::new();
        if self.eat(&TokenKind::LParen) {
            while self.peek() != &TokenKind::RParen {
                bases.push(self.parse_test()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }
        let loc = self.loc_from(start);
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::ClassDef { name, bases, body }, loc))
    }

    /// Parameter list up to (not including) `end`.
    fn parse_parameters(&mut self, end: &TokenKind) -> PResult<Parameters> {
        let mut params = Parameters::default();
        let mut seen_default = false;
        while self.peek() != end {
            if self.eat(&TokenKind::Star) {
                params.vararg = Some(self.expect_name()?);
            } else if self.eat(&TokenKind::DoubleStar) {
                params.kwarg = Some(self.expect_name()?);
            } else {
                if params.vararg.is_some() || params.kwarg.is_some() {
                    return Err(self.error_here("invalid syntax"));
                }
                let name = self.expect_name()?;
                let default = if self.eat(&TokenKind::Equal) {
                    seen_default = true;
                    Some(self.parse_test()?)
                } else {
                    if seen_default {
                        return Err(self.error_here("non-default argument follows default argument"));
                    }
                    None
                };
                params.args.push(Param { name, default });
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// `testlist`, or a `yield` expression.
    fn parse_testlist_or_yield(&mut self) -> PResult<Expr> {
        if self.peek() == &TokenKind::Yield {
            self.parse_yield()
        } else {
            self.parse_testlist()
        }
    }

    fn parse_yield(&mut self) -> PResult<Expr> {
        let start = self.pos;
        self.advance();
        let value = if self.starts_expr() {
            Some(Box::new(self.parse_testlist()?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Yield(value), self.loc_from(start)))
    }

    /// `test (',' test)* [',']`, producing a tuple when a comma appears.
    pub fn parse_testlist(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let first = self.parse_test()?;
        if self.peek() != &TokenKind::Comma {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if !self.starts_expr() {
                break;
            }
            elts.push(self.parse_test()?);
        }
        Ok(Expr::new(
            ExprKind::Tuple {
                elts,
                ctx: ExprContext::Load,
            },
            self.loc_from(start),
        ))
    }

    /// Assignment targets of `for` and comprehensions: `expr (',' expr)*`.
    fn parse_target_list(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let first = self.parse_expr()?;
        let mut target = if self.peek() == &TokenKind::Comma {
            let mut elts = vec![first];
            while self.eat(&TokenKind::Comma) {
                if !self.starts_expr() {
                    break;
                }
                elts.push(self.parse_expr()?);
            }
            Expr::new(
                ExprKind::Tuple {
                    elts,
                    ctx: ExprContext::Store,
                },
                self.loc_from(start),
            )
        } else {
            first
        };
        if !target.set_context(ExprContext::Store) {
            let what = describe_target(&target);
            return Err(self.error_at(target.loc, &format!("can't assign to {}", what)));
        }
        Ok(target)
    }

    /// `test`: every bracket, call, subscript, lambda body and conditional
    /// branch comes back through here, so this is where nesting is counted.
    pub fn parse_test(&mut self) -> PResult<Expr> {
        self.enter(TOO_MANY_PARENS)?;
        let expr = self.parse_test_inner();
        self.leave();
        expr
    }

    fn parse_test_inner(&mut self) -> PResult<Expr> {
        if self.peek() == &TokenKind::Lambda {
            return self.parse_lambda();
        }
        let start = self.pos;
        let body = self.parse_or_test()?;
        if !self.eat(&TokenKind::If) {
            return Ok(body);
        }
        let test = self.parse_or_test()?;
        self.expect(&TokenKind::Else)?;
        let orelse = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            self.loc_from(start),
        ))
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let start = self.pos;
        self.advance();
        let params = self.parse_parameters(&TokenKind::Colon)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            self.loc_from(start),
        ))
    }

    fn parse_or_test(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let first = self.parse_and_test()?;
        if self.peek() != &TokenKind::Or {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::Or) {
            values.push(self.parse_and_test()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::Or,
                values,
            },
            self.loc_from(start),
        ))
    }

    fn parse_and_test(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let first = self.parse_not_test()?;
        if self.peek() != &TokenKind::And {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::And) {
            values.push(self.parse_not_test()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::And,
                values,
            },
            self.loc_from(start),
        ))
    }

    fn parse_not_test(&mut self) -> PResult<Expr> {
        if self.peek() == &TokenKind::Not {
            let start = self.pos;
            self.advance();
            self.enter(TOO_MANY_PARENS)?;
            let operand = self.parse_not_test();
            self.leave();
            let operand = operand?;
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                self.loc_from(start),
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let left = self.parse_expr()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Less => CmpOp::Lt,
                TokenKind::Greater => CmpOp::Gt,
                TokenKind::EqEqual => CmpOp::Eq,
                TokenKind::GreaterEqual => CmpOp::GtE,
                TokenKind::LessEqual => CmpOp::LtE,
                TokenKind::NotEqual => CmpOp::NotEq,
                TokenKind::In => CmpOp::In,
                TokenKind::Not if self.peek_at(1) == &TokenKind::In => {
                    self.advance();
                    CmpOp::NotIn
                }
                TokenKind::Is => {
                    if self.peek_at(1) == &TokenKind::Not {
                        self.advance();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.advance();
            ops.push(op);
            comparators.push(self.parse_expr()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            self.loc_from(start),
        ))
    }

    /// `expr`: the bitwise-or level of the precedence ladder.
    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary(0)
    }

    /// Precedence climbing: operands joined by any operator binding at
    /// `min_level` or tighter, left-associative.
    fn parse_binary(&mut self, min_level: usize) -> PResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_factor()?;
        let mut chain = 0;
        while let Some((level, op)) = self.binary_op(min_level) {
            chain += 1;
            if chain > MAX_DEPTH {
                return Err(self.error_here(TOO_DEEP));
            }
            self.advance();
            let right = self.parse_binary(level + 1)?;
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                self.loc_from(start),
            );
        }
        Ok(left)
    }

    /// The binary operator at the current token, if it binds at
    /// `min_level` or tighter.
    fn binary_op(&self, min_level: usize) -> Option<(usize, BinOp)> {
        binary_level(self.peek()).filter(|(level, _)| *level >= min_level)
    }

    fn starts_trailer(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot
        )
    }

    fn parse_factor(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            TokenKind::Plus => UnaryOp::Pos,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        let start = self.pos;
        self.advance();
        self.enter(TOO_MANY_PARENS)?;
        let operand = self.parse_factor();
        self.leave();
        let operand = operand?;
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            self.loc_from(start),
        ))
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let base = self.parse_atom_expr()?;
        if !self.eat(&TokenKind::DoubleStar) {
            return Ok(base);
        }
        self.enter(TOO_MANY_PARENS)?;
        let exponent = self.parse_factor();
        self.leave();
        let exponent = exponent?;
        Ok(Expr::new(
            ExprKind::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            },
            self.loc_from(start),
        ))
    }

    /// An atom followed by any number of call, subscript and attribute trailers.
    fn parse_atom_expr(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut expr = self.parse_atom()?;
        for trailers in 0.. {
            if trailers >= MAX_DEPTH && self.starts_trailer() {
                return Err(self.error_here(TOO_DEEP));
            }
            match self.peek() {
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_args()?;
                    self.expect(&TokenKind::RParen)?;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        self.loc_from(start),
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_subscript_list()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                            ctx: ExprContext::Load,
                        },
                        self.loc_from(start),
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                            ctx: ExprContext::Load,
                        },
                        self.loc_from(start),
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> PResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while self.peek() != &TokenKind::RParen {
            let start = self.pos;
            if self.eat(&TokenKind::Star) {
                let value = self.parse_test()?;
                args.push(Expr::new(
                    ExprKind::Starred(Box::new(value)),
                    self.loc_from(start),
                ));
            } else if self.eat(&TokenKind::DoubleStar) {
                let value = self.parse_test()?;
                keywords.push(Keyword { arg: None, value });
            } else if matches!(self.peek(), TokenKind::Name(_))
                && self.peek_at(1) == &TokenKind::Equal
            {
                let arg = self.expect_name()?;
                self.advance();
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    arg: Some(arg),
                    value,
                });
            } else {
                let value = self.parse_test()?;
                if self.peek() == &TokenKind::For {
                    let generators = self.parse_comprehension_clauses()?;
                    args.push(Expr::new(
                        ExprKind::GeneratorExp {
                            elt: Box::new(value),
                            generators,
                        },
                        self.loc_from(start),
                    ));
                } else {
                    if !keywords.is_empty() {
                        return Err(self.error_at(value.loc, "non-keyword arg after keyword arg"));
                    }
                    args.push(value);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok((args, keywords))
    }

    /// `subscript (',' subscript)* [',']`; several subscripts form a tuple key.
    fn parse_subscript_list(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let first = self.parse_subscript()?;
        if self.peek() != &TokenKind::Comma {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.peek() == &TokenKind::RBracket {
                break;
            }
            elts.push(self.parse_subscript()?);
        }
        Ok(Expr::new(
            ExprKind::Tuple {
                elts,
                ctx: ExprContext::Load,
            },
            self.loc_from(start),
        ))
    }

    fn parse_subscript(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let lower = if self.peek() != &TokenKind::Colon {
            let index = self.parse_test()?;
            if self.peek() != &TokenKind::Colon {
                return Ok(index);
            }
            Some(Box::new(index))
        } else {
            None
        };
        self.expect(&TokenKind::Colon)?;
        let upper = if self.starts_expr() {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        let step = if self.eat(&TokenKind::Colon) && self.starts_expr() {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::Slice { lower, upper, step },
            self.loc_from(start),
        ))
    }

    /// `comp_for (comp_for | comp_if)*`
    fn parse_comprehension_clauses(&mut self) -> PResult<Vec<Comprehension>> {
        let mut generators: Vec<Comprehension> = Vec::new();
        while self.eat(&TokenKind::For) {
            let target = self.parse_target_list()?;
            self.expect(&TokenKind::In)?;
            let iter = self.parse_or_test()?;
            let mut ifs = Vec::new();
            while self.eat(&TokenKind::If) {
                ifs.push(self.parse_or_test()?);
            }
            generators.push(Comprehension { target, iter, ifs });
        }
        Ok(generators)
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let token = self.token().clone();
        let loc = Some(Self::loc_of(&token));
        match token.kind {
            TokenKind::Name(id) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Name {
                        id,
                        ctx: ExprContext::Load,
                    },
                    loc,
                ))
            }
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(Constant::Int(v)), loc))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(Constant::Float(v)), loc))
            }
            TokenKind::Str(_) => {
                let mut value = String::new();
                while let TokenKind::Str(part) = self.peek() {
                    value.push_str(part);
                    self.advance();
                }
                Ok(Expr::new(
                    ExprKind::Constant(Constant::Str(value)),
                    self.loc_from(start),
                ))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(Constant::None), loc))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(Constant::Bool(true)), loc))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(Constant::Bool(false)), loc))
            }
            TokenKind::LParen => self.parse_paren_atom(),
            TokenKind::LBracket => self.parse_list_atom(),
            TokenKind::LBrace => self.parse_dict_atom(),
            _ => Err(self.error_here("invalid syntax")),
        }
    }

    fn parse_paren_atom(&mut self) -> PResult<Expr> {
        let start = self.pos;
        self.advance();
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::new(
                ExprKind::Tuple {
                    elts: Vec::new(),
                    ctx: ExprContext::Load,
                },
                self.loc_from(start),
            ));
        }
        if self.peek() == &TokenKind::Yield {
            let value = self.parse_yield()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(value);
        }

        let first = self.parse_test()?;
        if self.peek() == &TokenKind::For {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(Expr::new(
                ExprKind::GeneratorExp {
                    elt: Box::new(first),
                    generators,
                },
                self.loc_from(start),
            ));
        }
        if self.eat(&TokenKind::RParen) {
            return Ok(first);
        }

        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.peek() == &TokenKind::RParen {
                break;
            }
            elts.push(self.parse_test()?);
        }
        self.expect(&TokenKind::RParen)?;
        Ok(Expr::new(
            ExprKind::Tuple {
                elts,
                ctx: ExprContext::Load,
            },
            self.loc_from(start),
        ))
    }

    fn parse_list_atom(&mut self) -> PResult<Expr> {
        let start = self.pos;
        self.advance();
        let mut elts = Vec::new();
        if self.peek() != &TokenKind::RBracket {
            let first = self.parse_test()?;
            if self.peek() == &TokenKind::For {
                let generators = self.parse_comprehension_clauses()?;
                self.expect(&TokenKind::RBracket)?;
                return Ok(Expr::new(
                    ExprKind::ListComp {
                        elt: Box::new(first),
                        generators,
                    },
                    self.loc_from(start),
                ));
            }
            elts.push(first);
            while self.eat(&TokenKind::Comma) {
                if self.peek() == &TokenKind::RBracket {
                    break;
                }
                elts.push(self.parse_test()?);
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Expr::new(
            ExprKind::List {
                elts,
                ctx: ExprContext::Load,
            },
            self.loc_from(start),
        ))
    }

    fn parse_dict_atom(&mut self) -> PResult<Expr> {
        let start = self.pos;
        self.advance();
        let mut keys = Vec::new();
        let mut values = Vec::new();
        if self.peek() != &TokenKind::RBrace {
            let key = self.parse_test()?;
            if self.peek() != &TokenKind::Colon {
                return Err(self.error_at(key.loc, "set displays are not supported"));
            }
            self.advance();
            let value = self.parse_test()?;
            if self.peek() == &TokenKind::For {
                let generators = self.parse_comprehension_clauses()?;
                self.expect(&TokenKind::RBrace)?;
                return Ok(Expr::new(
                    ExprKind::DictComp {
                        key: Box::new(key),
                        value: Box::new(value),
                        generators,
                    },
                    self.loc_from(start),
                ));
            }
            keys.push(key);
            values.push(value);
            while self.eat(&TokenKind::Comma) {
                if self.peek() == &TokenKind::RBrace {
                    break;
                }
                keys.push(self.parse_test()?);
                self.expect(&TokenKind::Colon)?;
                values.push(self.parse_test()?);
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::new(ExprKind::Dict { keys, values }, self.loc_from(start)))
    }
}

fn translate_augop(op: AugOp) -> BinOp {
    match op {
        AugOp::Add => BinOp::Add,
        AugOp::Sub => BinOp::Sub,
        AugOp::Mult => BinOp::Mult,
        AugOp::Div => BinOp::Div,
        AugOp::FloorDiv => BinOp::FloorDiv,
        AugOp::Mod => BinOp::Mod,
        AugOp::Pow => BinOp::Pow,
        AugOp::BitAnd => BinOp::BitAnd,
        AugOp::BitOr => BinOp::BitOr,
        AugOp::BitXor => BinOp::BitXor,
        AugOp::LShift => BinOp::LShift,
        AugOp::RShift => BinOp::RShift,
    }
}

/// Binary operator for a token with its binding level, loosest first.
/// Unary operators and `**` bind tighter than the last level.
fn binary_level(token: &TokenKind) -> Option<(usize, BinOp)> {
    let entry = match token {
        TokenKind::Pipe => (0, BinOp::BitOr),
        TokenKind::Caret => (1, BinOp::BitXor),
        TokenKind::Amper => (2, BinOp::BitAnd),
        TokenKind::LeftShift => (3, BinOp::LShift),
        TokenKind::RightShift => (3, BinOp::RShift),
        TokenKind::Plus => (4, BinOp::Add),
        TokenKind::Minus => (4, BinOp::Sub),
        TokenKind::Star => (5, BinOp::Mult),
        TokenKind::Slash => (5, BinOp::Div),
        TokenKind::DoubleSlash => (5, BinOp::FloorDiv),
        TokenKind::Percent => (5, BinOp::Mod),
        _ => return None,
    };
    Some(entry)
}

/// Describe an invalid assignment target the way CPython does.
fn describe_target(expr: &Expr) -> &'static str {
    match expr.kind {
        ExprKind::Call { .. } => "function call",
        ExprKind::Constant(_) => "literal",
        ExprKind::Lambda { .. } => "lambda",
        ExprKind::ListComp { .. } => "list comprehension",
        ExprKind::GeneratorExp { .. } => "generator expression",
        ExprKind::Yield(_) => "yield expression",
        ExprKind::Compare { .. } => "comparison",
        ExprKind::IfExp { .. } => "conditional expression",
        _ => "operator",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Vec<Stmt> {
        parse_module(source, "<test>").unwrap().body
    }

    fn kind(source: &str) -> StmtKind {
        parse(source).remove(0).kind
    }

    #[test]
    fn test_assignment_targets() {
        match kind("a = b = 1") {
            StmtKind::Assign { targets, value } => {
                assert_eq!(targets.len(), 2);
                assert_eq!(value.kind, ExprKind::Constant(Constant::Int(1)));
                assert!(matches!(
                    targets[0].kind,
                    ExprKind::Name { ref id, ctx: ExprContext::Store } if id == "a"
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tuple_unpacking_target() {
        match kind("a, b = 1, 2") {
            StmtKind::Assign { targets, .. } => match &targets[0].kind {
                ExprKind::Tuple { elts, ctx } => {
                    assert_eq!(*ctx, ExprContext::Store);
                    assert_eq!(elts.len(), 2);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_print_forms() {
        match kind("print x, y,") {
            StmtKind::Print {
                dest,
                values,
                newline,
            } => {
                assert!(dest.is_none());
                assert_eq!(values.len(), 2);
                assert!(!newline);
            }
            other => panic!("unexpected {:?}", other),
        }
        match kind("print >> out, 'a'") {
            StmtKind::Print { dest, values, newline } => {
                assert!(dest.is_some());
                assert_eq!(values.len(), 1);
                assert!(newline);
            }
            other => panic!("unexpected {:?}", other),
        }
        match kind("print(1, 2)") {
            StmtKind::Print { values, .. } => assert_eq!(values.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        match kind("print(x, file=out)") {
            StmtKind::Print { dest, values, .. } => {
                assert!(dest.is_some());
                assert_eq!(values.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_print_parenthesized_expression_is_not_call_style() {
        match kind("print (1) + 2") {
            StmtKind::Print { values, .. } => {
                assert_eq!(values.len(), 1);
                assert!(matches!(values[0].kind, ExprKind::BinOp { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_subscript_keys() {
        let StmtKind::Expr(expr) = kind("a[1:2, ::3]") else {
            panic!("expected expression statement");
        };
        let ExprKind::Subscript { index, .. } = expr.kind else {
            panic!("expected subscript");
        };
        match index.kind {
            ExprKind::Tuple { elts, .. } => {
                assert!(matches!(elts[0].kind, ExprKind::Slice { .. }));
                assert!(matches!(
                    elts[1].kind,
                    ExprKind::Slice { lower: None, upper: None, step: Some(_) }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_call_arguments() {
        let StmtKind::Expr(expr) = kind("f(1, *rest, key=2, **opts)") else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { args, keywords, .. } = expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(args[1].kind, ExprKind::Starred(_)));
        assert_eq!(keywords[0].arg.as_deref(), Some("key"));
        assert_eq!(keywords[1].arg, None);
    }

    #[test]
    fn test_function_def_with_docstring() {
        let stmts = parse("def f(a, b=1, *args, **kw):\n    'doc'\n    return a\n");
        let StmtKind::FunctionDef(def) = &stmts[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.name, "f");
        assert_eq!(def.doc.as_deref(), Some("doc"));
        assert_eq!(def.body.len(), 1);
        assert_eq!(
            def.params.names().collect::<Vec<_>>(),
            vec!["a", "b", "args", "kw"]
        );
    }

    #[test]
    fn test_if_elif_else_nests() {
        let StmtKind::If { orelse, .. } = kind("if a:\n  x\nelif b:\n  y\nelse:\n  z\n") else {
            panic!("expected if");
        };
        assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn test_try_except_forms() {
        let source = "try:\n  a\nexcept ValueError, e:\n  b\nexcept (KeyError, IndexError) as e:\n  c\nelse:\n  d\n";
        let StmtKind::Try {
            handlers, orelse, ..
        } = kind(source)
        else {
            panic!("expected try");
        };
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].name.as_deref(), Some("e"));
        assert_eq!(orelse.len(), 1);
    }

    #[test]
    fn test_comprehensions() {
        let StmtKind::Expr(expr) = kind("[x * 2 for x in xs if x for y in ys]") else {
            panic!("expected expression statement");
        };
        let ExprKind::ListComp { generators, .. } = expr.kind else {
            panic!("expected list comprehension");
        };
        assert_eq!(generators.len(), 2);
        assert_eq!(generators[0].ifs.len(), 1);

        let StmtKind::Expr(expr) = kind("sum(x for x in xs)") else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { args, .. } = expr.kind else {
            panic!("expected call");
        };
        assert!(matches!(args[0].kind, ExprKind::GeneratorExp { .. }));
    }

    #[test]
    fn test_exec_and_yield_parse() {
        assert!(matches!(kind("exec 'x = 1' in ns"), StmtKind::Exec { .. }));
        let StmtKind::Expr(expr) = kind("yield 1") else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr.kind, ExprKind::Yield(Some(_))));
    }

    #[test]
    fn test_line_numbers() {
        let stmts = parse("a = 1\n\nif a:\n    b = 2\n");
        assert_eq!(stmts[0].line(), Some(1));
        assert_eq!(stmts[1].line(), Some(3));
        let StmtKind::If { body, .. } = &stmts[1].kind else {
            panic!("expected if");
        };
        assert_eq!(body[0].line(), Some(4));
    }

    #[test]
    fn test_expression_mode() {
        let expr = parse_expression("  a.b + 1\n", "<test>").unwrap();
        assert!(matches!(expr.body.kind, ExprKind::BinOp { op: BinOp::Add, .. }));
        assert!(parse_expression("a = 1", "<test>").is_err());
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse_module("x = = 1\n", "script.py").unwrap_err();
        assert_eq!(err.message, "invalid syntax");
        assert_eq!((err.line, err.column, err.offset), (1, 5, 4));
        assert_eq!(err.filename, "script.py");

        let err = parse_module("if x:\npass\n", "<test>").unwrap_err();
        assert_eq!(err.message, "expected an indented block");
        assert_eq!(err.line, 2);

        let err = parse_module("f() = 1\n", "<test>").unwrap_err();
        assert_eq!(err.message, "can't assign to function call");

        let err = parse_module("s = {1, 2}\n", "<test>").unwrap_err();
        assert_eq!(err.message, "set displays are not supported");
    }
}
