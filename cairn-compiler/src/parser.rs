//! Recursive-descent parser
//!
//! Parsing is total and side-effect-free: it builds an AST and performs no
//! identifier resolution. Errors carry a precise location and a
//! human-readable expectation message.

use crate::ast::{
    BinOp, BoolAtom, BoolExpr, CodeElement, CodeElementKind, Expr, ExprKind, ImportItem,
    TypeExpr, TypedName,
};
use crate::error::ParserError;
use crate::lexer::Token;
use cairn_spec::{Location, Register, ScopedName};
use logos::Logos;
use std::ops::Range;

type Result<T> = std::result::Result<T, ParserError>;

/// Maps byte offsets to 1-based line/column pairs
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex { line_starts }
    }

    fn position(&self, offset: usize) -> (u32, u32) {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let col = offset - self.line_starts[line] + 1;
        (line as u32 + 1, col as u32)
    }
}

pub struct Parser {
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    file: String,
    line_index: LineIndex,
    source_len: usize,
}

/// Parse a whole source file into its top-level code elements
pub fn parse_file(file: &str, source: &str) -> Result<Vec<CodeElement>> {
    let mut parser = Parser::new(file, source)?;
    let elements = parser.parse_block(&[])?;
    parser.expect_eof()?;
    Ok(elements)
}

/// Parse a single expression (secondary grammar entry point)
pub fn parse_expr(file: &str, source: &str) -> Result<Expr> {
    let mut parser = Parser::new(file, source)?;
    parser.skip_newlines();
    let expr = parser.parse_expression()?;
    parser.skip_newlines();
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse a single statement line (used by the disassembly round-trip)
pub fn parse_statement(file: &str, source: &str) -> Result<CodeElement> {
    let mut parser = Parser::new(file, source)?;
    parser.skip_newlines();
    let element = parser.parse_code_element()?;
    parser.skip_newlines();
    parser.expect_eof()?;
    Ok(element)
}

impl Parser {
    fn new(file: &str, source: &str) -> Result<Self> {
        let line_index = LineIndex::new(source);
        let mut tokens = Vec::new();
        let mut lexer = Token::lexer(source);
        while let Some(item) = lexer.next() {
            let span = lexer.span();
            match item {
                Ok(token) => tokens.push((token, span)),
                Err(()) => {
                    let (start_line, start_col) = line_index.position(span.start);
                    let (end_line, end_col) = line_index.position(span.end);
                    let location = Location {
                        file: file.to_string(),
                        start_line,
                        start_col,
                        end_line,
                        end_col,
                    };
                    if lexer.slice().starts_with("%{") {
                        return Err(ParserError::UnterminatedHint { location });
                    }
                    return Err(ParserError::InvalidToken { location });
                }
            }
        }
        Ok(Parser {
            tokens,
            pos: 0,
            file: file.to_string(),
            line_index,
            source_len: source.len(),
        })
    }

    // ---- token plumbing ----

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn span_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| s.start)
            .unwrap_or(self.source_len)
    }

    fn prev_span_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].1.end
        }
    }

    fn location(&self, start: usize, end: usize) -> Location {
        let (start_line, start_col) = self.line_index.position(start);
        let (end_line, end_col) = self.line_index.position(end);
        Location {
            file: self.file.clone(),
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    fn here(&self) -> Location {
        let start = self.span_start();
        self.location(start, start + 1)
    }

    fn error_expected(&self, expected: &str) -> ParserError {
        match self.peek() {
            Some(token) => ParserError::UnexpectedToken {
                location: self.here(),
                found: token.describe(),
                expected: expected.to_string(),
            },
            None => ParserError::UnexpectedEof {
                location: self.location(self.source_len, self.source_len),
                expected: expected.to_string(),
            },
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<()> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error_expected(expected))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Identifier(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_expected(expected)),
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        self.skip_newlines();
        if self.peek().is_some() {
            return Err(self.error_expected("end of file"));
        }
        Ok(())
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn expect_end_of_line(&mut self) -> Result<()> {
        match self.peek() {
            Some(Token::Newline) => {
                self.pos += 1;
                Ok(())
            }
            None => Ok(()),
            _ => Err(self.error_expected("end of line")),
        }
    }

    // ---- statements ----

    /// Parse code elements until one of `terminators` (or EOF) is reached.
    /// The terminator is not consumed.
    fn parse_block(&mut self, terminators: &[Token]) -> Result<Vec<CodeElement>> {
        let mut elements = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => break,
                Some(token) if terminators.contains(token) => break,
                Some(_) => elements.push(self.parse_code_element()?),
            }
        }
        Ok(elements)
    }

    fn parse_code_element(&mut self) -> Result<CodeElement> {
        let start = self.span_start();
        let kind = match self.peek() {
            Some(Token::Func) => self.parse_func()?,
            Some(Token::Struct) => self.parse_struct()?,
            Some(Token::Namespace) => self.parse_namespace()?,
            Some(Token::If) => self.parse_if()?,
            Some(Token::Const) => {
                self.pos += 1;
                let name = self.expect_identifier("constant name")?;
                self.expect(Token::Eq, "'='")?;
                let value = self.parse_expression()?;
                self.expect_end_of_line()?;
                CodeElementKind::Const { name, value }
            }
            Some(Token::Let) => {
                self.pos += 1;
                let name = self.expect_identifier("reference name")?;
                let ty = if self.eat(&Token::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                self.expect(Token::Eq, "'='")?;
                let value = self.parse_expression()?;
                self.expect_end_of_line()?;
                CodeElementKind::Let { name, ty, value }
            }
            Some(Token::TempVar) => {
                self.pos += 1;
                let name = self.expect_identifier("tempvar name")?;
                self.expect(Token::Eq, "'='")?;
                let value = self.parse_expression()?;
                self.expect_end_of_line()?;
                CodeElementKind::TempVar { name, value }
            }
            Some(Token::Local) => {
                self.pos += 1;
                let name = self.expect_identifier("local name")?;
                let ty = if self.eat(&Token::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let value = if self.eat(&Token::Eq) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.expect_end_of_line()?;
                CodeElementKind::Local { name, ty, value }
            }
            Some(Token::AllocLocals) => {
                self.pos += 1;
                self.expect_end_of_line()?;
                CodeElementKind::AllocLocals
            }
            Some(Token::Jmp) => self.parse_jump()?,
            Some(Token::Call) => {
                self.pos += 1;
                match self.peek() {
                    Some(Token::Rel) | Some(Token::Abs) => {
                        let relative = self.peek() == Some(&Token::Rel);
                        self.pos += 1;
                        let target = self.parse_expression()?;
                        self.expect_end_of_line()?;
                        CodeElementKind::CallToExpr { target, relative }
                    }
                    _ => {
                        let target = self.parse_scoped_name()?;
                        self.expect_end_of_line()?;
                        CodeElementKind::Call { target }
                    }
                }
            }
            Some(Token::Ret) => {
                self.pos += 1;
                self.expect_end_of_line()?;
                CodeElementKind::Ret
            }
            Some(Token::Return) => {
                self.pos += 1;
                self.expect(Token::LParen, "'('")?;
                let mut values = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        values.push(self.parse_expression()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen, "')'")?;
                self.expect_end_of_line()?;
                CodeElementKind::Return { values }
            }
            Some(Token::Ap) if self.peek_at(1) == Some(&Token::PlusEq) => {
                self.pos += 2;
                let value = self.parse_expression()?;
                self.expect_end_of_line()?;
                CodeElementKind::ApAdd { value }
            }
            Some(Token::BuiltinsDirective) => {
                self.pos += 1;
                let mut builtins = Vec::new();
                while let Some(Token::Identifier(_)) = self.peek() {
                    builtins.push(self.expect_identifier("builtin name")?);
                }
                if builtins.is_empty() {
                    return Err(self.error_expected("builtin name"));
                }
                self.expect_end_of_line()?;
                CodeElementKind::BuiltinsDirective { builtins }
            }
            Some(Token::From) => self.parse_import()?,
            Some(Token::Hint(_)) => {
                let Some(Token::Hint(code)) = self.advance() else {
                    unreachable!()
                };
                self.expect_end_of_line()?;
                CodeElementKind::Hint { code }
            }
            Some(Token::Identifier(_)) if self.peek_at(1) == Some(&Token::Colon) => {
                let name = self.expect_identifier("label name")?;
                self.pos += 1; // colon
                self.expect_end_of_line()?;
                CodeElementKind::Label { name }
            }
            Some(_) => {
                // Assert-equal statement: expr = expr [; ap++]
                let lhs = self.parse_expression()?;
                self.expect(Token::Eq, "'='")?;
                let rhs = self.parse_expression()?;
                let ap_inc = if self.eat(&Token::Semicolon) {
                    self.expect(Token::Ap, "'ap++'")?;
                    self.expect(Token::PlusPlus, "'ap++'")?;
                    true
                } else {
                    false
                };
                self.expect_end_of_line()?;
                CodeElementKind::AssertEq { lhs, rhs, ap_inc }
            }
            None => return Err(self.error_expected("a statement")),
        };
        let loc = self.location(start, self.prev_span_end());
        Ok(CodeElement::new(kind, Some(loc)))
    }

    fn parse_func(&mut self) -> Result<CodeElementKind> {
        self.expect(Token::Func, "'func'")?;
        let name = self.expect_identifier("function name")?;
        self.expect(Token::LParen, "'('")?;
        let args = self.parse_typed_name_list(Token::RParen)?;
        self.expect(Token::RParen, "')'")?;
        let rets = if self.eat(&Token::Arrow) {
            self.expect(Token::LParen, "'('")?;
            let rets = self.parse_typed_name_list(Token::RParen)?;
            self.expect(Token::RParen, "')'")?;
            rets
        } else {
            Vec::new()
        };
        self.expect(Token::Colon, "':'")?;
        self.expect_end_of_line()?;
        let body = self.parse_block(&[Token::End])?;
        self.expect(Token::End, "'end'")?;
        self.expect_end_of_line()?;
        Ok(CodeElementKind::Func {
            name,
            args,
            rets,
            body,
        })
    }

    fn parse_struct(&mut self) -> Result<CodeElementKind> {
        self.expect(Token::Struct, "'struct'")?;
        let name = self.expect_identifier("struct name")?;
        self.expect(Token::Colon, "':'")?;
        self.expect_end_of_line()?;
        let mut members = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&Token::End) {
                break;
            }
            self.expect(Token::Member, "'member' or 'end'")?;
            let member_name = self.expect_identifier("member name")?;
            self.expect(Token::Colon, "':'")?;
            let ty = self.parse_type()?;
            self.expect_end_of_line()?;
            members.push(TypedName {
                name: member_name,
                ty: Some(ty),
            });
        }
        self.expect_end_of_line()?;
        Ok(CodeElementKind::StructDef { name, members })
    }

    fn parse_namespace(&mut self) -> Result<CodeElementKind> {
        self.expect(Token::Namespace, "'namespace'")?;
        let name = self.expect_identifier("namespace name")?;
        self.expect(Token::Colon, "':'")?;
        self.expect_end_of_line()?;
        let body = self.parse_block(&[Token::End])?;
        self.expect(Token::End, "'end'")?;
        self.expect_end_of_line()?;
        Ok(CodeElementKind::NamespaceDef { name, body })
    }

    fn parse_if(&mut self) -> Result<CodeElementKind> {
        self.expect(Token::If, "'if'")?;
        let condition = self.parse_bool_expr()?;
        self.expect(Token::Colon, "':'")?;
        self.expect_end_of_line()?;
        let body = self.parse_block(&[Token::End, Token::Else])?;
        let else_body = if self.eat(&Token::Else) {
            self.expect(Token::Colon, "':'")?;
            self.expect_end_of_line()?;
            Some(self.parse_block(&[Token::End])?)
        } else {
            None
        };
        self.expect(Token::End, "'end'")?;
        self.expect_end_of_line()?;
        Ok(CodeElementKind::If {
            condition,
            body,
            else_body,
            label_neq: None,
            label_end: None,
        })
    }

    fn parse_jump(&mut self) -> Result<CodeElementKind> {
        self.expect(Token::Jmp, "'jmp'")?;
        match self.peek() {
            Some(Token::Rel) | Some(Token::Abs) => {
                let relative = self.peek() == Some(&Token::Rel);
                self.pos += 1;
                let target = self.parse_expression()?;
                let condition = if self.eat(&Token::If) {
                    let cond = self.parse_expression()?;
                    self.expect(Token::Neq, "'!='")?;
                    match self.peek() {
                        Some(Token::Int(v)) if v.is_zero() => {
                            self.pos += 1;
                        }
                        _ => return Err(self.error_expected("'0'")),
                    }
                    Some(cond)
                } else {
                    None
                };
                self.expect_end_of_line()?;
                Ok(CodeElementKind::JumpToExpr {
                    target,
                    relative,
                    condition,
                })
            }
            _ => {
                let target = self.parse_scoped_name()?;
                let condition = if self.eat(&Token::If) {
                    let cond = self.parse_expression()?;
                    self.expect(Token::Neq, "'!='")?;
                    match self.peek() {
                        Some(Token::Int(v)) if v.is_zero() => {
                            self.pos += 1;
                        }
                        _ => return Err(self.error_expected("'0'")),
                    }
                    Some(cond)
                } else {
                    None
                };
                self.expect_end_of_line()?;
                Ok(CodeElementKind::Jump { target, condition })
            }
        }
    }

    fn parse_import(&mut self) -> Result<CodeElementKind> {
        self.expect(Token::From, "'from'")?;
        let module = self.parse_scoped_name()?;
        self.expect(Token::Import, "'import'")?;
        let mut items = Vec::new();
        loop {
            let name = self.expect_identifier("imported name")?;
            let alias = if self.eat(&Token::As) {
                Some(self.expect_identifier("alias name")?)
            } else {
                None
            };
            items.push(ImportItem { name, alias });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect_end_of_line()?;
        Ok(CodeElementKind::Import { module, items })
    }

    fn parse_typed_name_list(&mut self, terminator: Token) -> Result<Vec<TypedName>> {
        let mut names = Vec::new();
        if self.peek() == Some(&terminator) {
            return Ok(names);
        }
        loop {
            let name = self.expect_identifier("argument name")?;
            let ty = if self.eat(&Token::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            names.push(TypedName { name, ty });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(names)
    }

    // ---- conditions ----

    fn parse_bool_expr(&mut self) -> Result<BoolExpr> {
        let mut atoms = vec![self.parse_bool_atom()?];
        while self.eat(&Token::And) {
            atoms.push(self.parse_bool_atom()?);
        }
        Ok(BoolExpr { atoms })
    }

    fn parse_bool_atom(&mut self) -> Result<BoolAtom> {
        let lhs = self.parse_expression()?;
        let eq = match self.peek() {
            Some(Token::EqEq) => true,
            Some(Token::Neq) => false,
            _ => return Err(self.error_expected("'==' or '!='")),
        };
        self.pos += 1;
        let rhs = self.parse_expression()?;
        Ok(BoolAtom { lhs, rhs, eq })
    }

    // ---- expressions ----

    pub(crate) fn parse_expression(&mut self) -> Result<Expr> {
        let start = self.span_start();
        let mut lhs = self.parse_term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinOp::Add),
            Some(Token::Minus) => Some(BinOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.parse_term()?;
            let loc = self.location(start, self.prev_span_end());
            lhs = Expr::new(
                ExprKind::BinOp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                Some(loc),
            );
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let start = self.span_start();
        let mut lhs = self.parse_unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinOp::Mul),
            Some(Token::Slash) => Some(BinOp::Div),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            let loc = self.location(start, self.prev_span_end());
            lhs = Expr::new(
                ExprKind::BinOp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                Some(loc),
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.span_start();
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                let inner = self.parse_unary()?;
                let loc = self.location(start, self.prev_span_end());
                Ok(Expr::new(ExprKind::Neg(Box::new(inner)), Some(loc)))
            }
            Some(Token::Ampersand) => {
                self.pos += 1;
                let inner = self.parse_unary()?;
                let loc = self.location(start, self.prev_span_end());
                Ok(Expr::new(ExprKind::AddrOf(Box::new(inner)), Some(loc)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let start = self.span_start();
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_expression()?;
                    self.expect(Token::RBracket, "']'")?;
                    let loc = self.location(start, self.prev_span_end());
                    expr = Expr::new(
                        ExprKind::Subscript {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        Some(loc),
                    );
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    let member = self.expect_identifier("member name")?;
                    let loc = self.location(start, self.prev_span_end());
                    expr = Expr::new(
                        ExprKind::Dot {
                            base: Box::new(expr),
                            member,
                        },
                        Some(loc),
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.span_start();
        let kind = match self.peek() {
            Some(Token::Int(_)) | Some(Token::Hex(_)) => {
                let value = match self.advance() {
                    Some(Token::Int(v)) | Some(Token::Hex(v)) => v,
                    _ => unreachable!(),
                };
                ExprKind::Int(value)
            }
            Some(Token::Ap) => {
                self.pos += 1;
                ExprKind::Reg(Register::AP)
            }
            Some(Token::Fp) => {
                self.pos += 1;
                ExprKind::Reg(Register::FP)
            }
            Some(Token::Cast) => {
                self.pos += 1;
                self.expect(Token::LParen, "'('")?;
                let expr = self.parse_expression()?;
                self.expect(Token::Comma, "','")?;
                let ty = self.parse_type()?;
                self.expect(Token::RParen, "')'")?;
                ExprKind::Cast {
                    expr: Box::new(expr),
                    ty,
                }
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let inner = self.parse_expression()?;
                self.expect(Token::RBracket, "']'")?;
                ExprKind::Deref(Box::new(inner))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                if self.eat(&Token::RParen) {
                    ExprKind::Tuple(Vec::new())
                } else {
                    let first = self.parse_expression()?;
                    if self.eat(&Token::Comma) {
                        let mut items = vec![first];
                        if self.peek() != Some(&Token::RParen) {
                            loop {
                                items.push(self.parse_expression()?);
                                if !self.eat(&Token::Comma) {
                                    break;
                                }
                            }
                        }
                        self.expect(Token::RParen, "')'")?;
                        ExprKind::Tuple(items)
                    } else {
                        self.expect(Token::RParen, "')'")?;
                        first.kind
                    }
                }
            }
            Some(Token::Identifier(_)) => {
                let name = self.parse_scoped_name()?;
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen, "')'")?;
                    ExprKind::FuncCall { func: name, args }
                } else {
                    ExprKind::Ident(name)
                }
            }
            _ => return Err(self.error_expected("an expression")),
        };
        let loc = self.location(start, self.prev_span_end());
        Ok(Expr::new(kind, Some(loc)))
    }

    fn parse_scoped_name(&mut self) -> Result<ScopedName> {
        let mut segments = vec![self.expect_identifier("identifier")?];
        while self.peek() == Some(&Token::Dot) {
            // Only fold `.ident`; a trailing dot is an error here
            match self.peek_at(1) {
                Some(Token::Identifier(_)) => {
                    self.pos += 1;
                    segments.push(self.expect_identifier("identifier")?);
                }
                _ => break,
            }
        }
        Ok(ScopedName::new(segments).expect("lexer produces valid segments"))
    }

    // ---- types ----

    fn parse_type(&mut self) -> Result<TypeExpr> {
        let mut ty = match self.peek() {
            Some(Token::Felt) => {
                self.pos += 1;
                TypeExpr::Felt
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        items.push(self.parse_type()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen, "')'")?;
                TypeExpr::Tuple(items)
            }
            Some(Token::Identifier(_)) => TypeExpr::Named(self.parse_scoped_name()?),
            _ => return Err(self.error_expected("a type")),
        };
        while self.eat(&Token::Star) {
            ty = TypeExpr::Pointer(Box::new(ty));
        }
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_spec::Felt;

    #[test]
    fn test_parse_assert_with_ap_inc() {
        let elements = parse_file("test.cairn", "[ap] = [fp + 1] + 5; ap++\n").unwrap();
        assert_eq!(elements.len(), 1);
        match &elements[0].kind {
            CodeElementKind::AssertEq { ap_inc, .. } => assert!(*ap_inc),
            other => panic!("unexpected element: {other:?}"),
        }
    }

    #[test]
    fn test_parse_function() {
        let source = "func add(a : felt, b : felt) -> (res : felt):\n    return (a + b)\nend\n";
        let elements = parse_file("test.cairn", source).unwrap();
        match &elements[0].kind {
            CodeElementKind::Func {
                name, args, rets, body,
            } => {
                assert_eq!(name, "add");
                assert_eq!(args.len(), 2);
                assert_eq!(rets.len(), 1);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected element: {other:?}"),
        }
    }

    #[test]
    fn test_parse_if_and_chain() {
        let source = "if a == 10 and b == 12:\n    [ap] = 1; ap++\nend\n";
        let elements = parse_file("test.cairn", source).unwrap();
        match &elements[0].kind {
            CodeElementKind::If { condition, .. } => assert_eq!(condition.atoms.len(), 2),
            other => panic!("unexpected element: {other:?}"),
        }
    }

    #[test]
    fn test_parse_conditional_jump() {
        let elements = parse_file("test.cairn", "jmp done if [ap - 1] != 0\n").unwrap();
        match &elements[0].kind {
            CodeElementKind::Jump { target, condition } => {
                assert_eq!(target.to_string(), "done");
                assert!(condition.is_some());
            }
            other => panic!("unexpected element: {other:?}"),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_expr("test.cairn", "1 + 2 * 3").unwrap();
        match expr.kind {
            ExprKind::BinOp { op: BinOp::Add, rhs, .. } => match rhs.kind {
                ExprKind::BinOp { op: BinOp::Mul, .. } => {}
                other => panic!("expected mul on the right: {other:?}"),
            },
            other => panic!("expected top-level add: {other:?}"),
        }
    }

    #[test]
    fn test_parse_cast() {
        let expr = parse_expr("test.cairn", "cast(fp - 3, Point*)").unwrap();
        match expr.kind {
            ExprKind::Cast { ty, .. } => {
                assert_eq!(
                    ty,
                    TypeExpr::Pointer(Box::new(TypeExpr::Named(
                        ScopedName::from_string("Point").unwrap()
                    )))
                );
            }
            other => panic!("expected cast: {other:?}"),
        }
    }

    #[test]
    fn test_parse_dotted_identifier() {
        let expr = parse_expr("test.cairn", "a.b.c").unwrap();
        assert_eq!(
            expr.kind,
            ExprKind::Ident(ScopedName::from_string("a.b.c").unwrap())
        );
    }

    #[test]
    fn test_parse_import() {
        let elements =
            parse_file("test.cairn", "from lib.math import sqrt as isqrt, pow\n").unwrap();
        match &elements[0].kind {
            CodeElementKind::Import { module, items } => {
                assert_eq!(module.to_string(), "lib.math");
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].alias.as_deref(), Some("isqrt"));
            }
            other => panic!("unexpected element: {other:?}"),
        }
    }

    #[test]
    fn test_error_carries_location_and_expectation() {
        let err = parse_file("test.cairn", "const = 5\n").unwrap_err();
        match err {
            ParserError::UnexpectedToken {
                location, expected, ..
            } => {
                assert_eq!(location.start_line, 1);
                assert!(expected.contains("constant name"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_unterminated_hint() {
        let err = parse_file("test.cairn", "%{ open\n").unwrap_err();
        assert!(matches!(err, ParserError::UnterminatedHint { .. }));
    }

    #[test]
    fn test_parse_int_literal_reduced() {
        let expr = parse_expr("t", "42").unwrap();
        assert_eq!(expr.kind, ExprKind::Int(Felt::from(42u64)));
    }

    #[test]
    fn test_parse_hint_element() {
        let elements = parse_file("t", "%{ ids.x = 3 %}\n").unwrap();
        match &elements[0].kind {
            CodeElementKind::Hint { code } => assert_eq!(code.trim(), "ids.x = 3"),
            other => panic!("unexpected element: {other:?}"),
        }
    }
}
