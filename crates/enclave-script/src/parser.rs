//! Recursive-descent parser for the script language.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr        := or_test ["if" or_test "else" expr]
//! or_test     := and_test ("or" and_test)*
//! and_test    := not_test ("and" not_test)*
//! not_test    := "not" not_test | comparison
//! comparison  := arith (comp_op arith)*
//! arith       := term (("+" | "-") term)*
//! term        := factor (("*" | "/" | "//" | "%") factor)*
//! factor      := ("-" | "+") factor | power
//! power       := postfix ["**" factor]
//! postfix     := atom (call | "." NAME | "[" expr_list "]")*
//! ```

use crate::ast::*;
use crate::error::SyntaxError;
use crate::lexer::{tokenize, Span, Token};

/// Maximum nesting of expressions and blocks
const MAX_DEPTH: usize = 100;

/// Parse a whole program
pub fn parse(source: &str) -> Result<Program, SyntaxError> {
    Parser::new(tokenize(source)?).parse_program()
}

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    depth: usize,
    loops: usize,
}

impl Parser {
    /// `tokens` must end with [`Token::Eof`], as produced by [`tokenize`]
    pub fn new(mut tokens: Vec<(Token, Span)>) -> Self {
        if !matches!(tokens.last(), Some((Token::Eof, _))) {
            let end = tokens.last().map(|(_, span)| *span).unwrap_or_default();
            tokens.push((Token::Eof, end));
        }
        Self {
            tokens,
            pos: 0,
            depth: 0,
            loops: 0,
        }
    }

    pub fn parse_program(mut self) -> Result<Program, SyntaxError> {
        let mut body = Vec::new();
        while !self.check(&Token::Eof) {
            if self.eat(&Token::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    // ===== Token cursor =====

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].0
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].1.line
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), SyntaxError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", token, self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, SyntaxError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(SyntaxError::new(
                format!("expected a name, found {}", other),
                self.line(),
            )),
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.line())
    }

    fn invalid(&self) -> SyntaxError {
        self.error(format!("invalid syntax: unexpected {}", self.peek()))
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, SyntaxError>) -> Result<T, SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("too many nested expressions or blocks"));
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), Token::Newline | Token::Semicolon | Token::Eof)
    }

    fn starts_expression(token: &Token) -> bool {
        matches!(
            token,
            Token::Int(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::Bytes(_)
                | Token::Ident(_)
                | Token::None
                | Token::True
                | Token::False
                | Token::LeftParen
                | Token::LeftBracket
                | Token::LeftBrace
                | Token::Minus
                | Token::Plus
                | Token::Not
        )
    }

    // ===== Statements =====

    fn parse_statement(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let line = self.line();
        let kind = match self.peek() {
            Token::If => self.nested(|p| p.parse_if())?,
            Token::While => self.nested(|p| p.parse_while())?,
            Token::For => self.nested(|p| p.parse_for())?,
            Token::Try => self.nested(|p| p.parse_try())?,
            Token::Indent => return Err(self.error("unexpected indent")),
            _ => return self.parse_simple_line(),
        };
        Ok(vec![Stmt { kind, line }])
    }

    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        loop {
            let line = self.line();
            let kind = self.parse_simple()?;
            stmts.push(Stmt { kind, line });

            if self.eat(&Token::Semicolon) {
                if matches!(self.peek(), Token::Newline | Token::Eof) {
                    break;
                }
                continue;
            }
            break;
        }

        if !self.eat(&Token::Newline) && !self.check(&Token::Eof) {
            return Err(self.invalid());
        }
        Ok(stmts)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect(Token::Colon)?;
        if !self.eat(&Token::Newline) {
            return self.parse_simple_line();
        }
        if !self.eat(&Token::Indent) {
            return Err(self.error("expected an indented block"));
        }

        let mut body = Vec::new();
        while !self.eat(&Token::Dedent) {
            if self.check(&Token::Eof) {
                return Err(self.error("unexpected end of input"));
            }
            if self.eat(&Token::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<StmtKind, SyntaxError> {
        // Consumes either `if` or `elif`
        self.advance();
        let test = self.parse_expr()?;
        let body = self.parse_block()?;

        let orelse = if self.check(&Token::Elif) {
            let line = self.line();
            let kind = self.nested(|p| p.parse_if())?;
            vec![Stmt { kind, line }]
        } else if self.eat(&Token::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };

        Ok(StmtKind::If { test, body, orelse })
    }

    fn parse_while(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        let test = self.parse_expr()?;
        let body = self.parse_loop_body()?;
        Ok(StmtKind::While { test, body })
    }

    fn parse_loop_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.loops += 1;
        let body = self.parse_block();
        self.loops -= 1;
        body
    }

    fn parse_for(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();

        let mut targets = vec![self.parse_postfix()?];
        while self.eat(&Token::Comma) {
            if self.check(&Token::In) {
                break;
            }
            targets.push(self.parse_postfix()?);
        }
        let target = if targets.len() == 1 {
            self.to_target(targets.remove(0))?
        } else {
            self.to_target(Expr::Tuple(targets))?
        };

        self.expect(Token::In)?;
        let iter = self.parse_expr_list()?;
        let body = self.parse_loop_body()?;
        Ok(StmtKind::For { target, iter, body })
    }

    fn parse_try(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while self.eat(&Token::Except) {
            let kind = if self.check(&Token::Colon) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            let name = if self.eat(&Token::As) {
                Some(self.expect_ident()?)
            } else {
                None
            };
            let body = self.parse_block()?;
            handlers.push(Handler { kind, name, body });
        }

        let finally = if self.eat(&Token::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finally.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            finally,
        })
    }

    fn parse_simple(&mut self) -> Result<StmtKind, SyntaxError> {
        match self.peek() {
            Token::Pass => {
                self.advance();
                Ok(StmtKind::Pass)
            }
            Token::Break => {
                if self.loops == 0 {
                    return Err(self.error("'break' outside loop"));
                }
                self.advance();
                Ok(StmtKind::Break)
            }
            Token::Continue => {
                if self.loops == 0 {
                    return Err(self.error("'continue' not properly in loop"));
                }
                self.advance();
                Ok(StmtKind::Continue)
            }
            Token::Assert => {
                self.advance();
                let test = self.parse_expr()?;
                let msg = if self.eat(&Token::Comma) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(StmtKind::Assert { test, msg })
            }
            Token::Raise => {
                self.advance();
                if self.at_statement_end() {
                    Ok(StmtKind::Raise(None))
                } else {
                    Ok(StmtKind::Raise(Some(self.parse_expr()?)))
                }
            }
            Token::Del => {
                self.advance();
                let mut targets = Vec::new();
                loop {
                    let expr = self.parse_expr()?;
                    targets.push(self.to_target(expr)?);
                    if !self.eat(&Token::Comma) || self.at_statement_end() {
                        break;
                    }
                }
                Ok(StmtKind::Del(targets))
            }
            Token::Import => {
                self.advance();
                let module = self.expect_ident()?;
                let alias = if self.eat(&Token::As) {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                Ok(StmtKind::Import { module, alias })
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<StmtKind, SyntaxError> {
        let expr = self.parse_expr_list()?;

        if self.check(&Token::Equal) {
            let mut targets = vec![self.to_target(expr)?];
            loop {
                self.advance();
                let value = self.parse_expr_list()?;
                if self.check(&Token::Equal) {
                    targets.push(self.to_target(value)?);
                } else {
                    return Ok(StmtKind::Assign { targets, value });
                }
            }
        }

        let op = match self.peek() {
            Token::PlusEqual => Some(BinaryOp::Add),
            Token::MinusEqual => Some(BinaryOp::Sub),
            Token::StarEqual => Some(BinaryOp::Mul),
            Token::SlashEqual => Some(BinaryOp::Div),
            Token::SlashSlashEqual => Some(BinaryOp::FloorDiv),
            Token::PercentEqual => Some(BinaryOp::Mod),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let target = match self.to_target(expr)? {
                Target::Tuple(_) => {
                    return Err(self.error("illegal expression for augmented assignment"))
                }
                target => target,
            };
            let value = self.parse_expr_list()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        Ok(StmtKind::Expr(expr))
    }

    fn to_target(&self, expr: Expr) -> Result<Target, SyntaxError> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Subscript { object, index } => Ok(Target::Subscript {
                object: *object,
                index: *index,
            }),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|item| self.to_target(item))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Attribute { .. } => Err(self.error("cannot assign to attribute")),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    // ===== Expressions =====

    /// Comma-separated expressions; more than one (or a trailing comma) makes a tuple
    fn parse_expr_list(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_expr()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if !Self::starts_expression(self.peek()) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(|p| {
            let body = p.parse_or()?;
            if !p.eat(&Token::If) {
                return Ok(body);
            }
            let test = p.parse_or()?;
            p.expect(Token::Else)?;
            let orelse = p.parse_expr()?;
            Ok(Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            })
        })
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&Token::Not) {
            let operand = self.nested(|p| p.parse_not())?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();

        loop {
            let op = match self.peek() {
                Token::EqualEqual => CompareOp::Eq,
                Token::BangEqual => CompareOp::NotEq,
                Token::Less => CompareOp::Lt,
                Token::LessEqual => CompareOp::LtE,
                Token::Greater => CompareOp::Gt,
                Token::GreaterEqual => CompareOp::GtE,
                Token::In => CompareOp::In,
                Token::Not if *self.peek_at(1) == Token::In => {
                    self.advance();
                    CompareOp::NotIn
                }
                Token::Is if *self.peek_at(1) == Token::Not => {
                    self.advance();
                    CompareOp::IsNot
                }
                Token::Is => CompareOp::Is,
                _ => break,
            };
            self.advance();
            ops.push((op, self.parse_arith()?));
        }

        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
            })
        }
    }

    fn parse_arith(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::SlashSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.nested(|p| p.parse_factor())?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.parse_postfix()?;
        if !self.eat(&Token::StarStar) {
            return Ok(base);
        }
        let exponent = self.nested(|p| p.parse_factor())?;
        Ok(Expr::Binary {
            op: BinaryOp::Pow,
            left: Box::new(base),
            right: Box::new(exponent),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Token::LeftParen => {
                    self.advance();
                    let (args, kwargs) = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Token::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    expr = Expr::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                Token::LeftBracket => {
                    self.advance();
                    let index = self.parse_expr_list()?;
                    self.expect(Token::RightBracket)?;
                    expr = Expr::Subscript {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), SyntaxError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();

        while !self.eat(&Token::RightParen) {
            if let (Token::Ident(name), Token::Equal) = (self.peek().clone(), self.peek_at(1)) {
                self.advance();
                self.advance();
                if kwargs.iter().any(|(existing, _)| *existing == name) {
                    return Err(self.error(format!("keyword argument repeated: {}", name)));
                }
                kwargs.push((name, self.parse_expr()?));
            } else if !kwargs.is_empty() {
                return Err(self.error("positional argument follows keyword argument"));
            } else {
                args.push(self.parse_expr()?);
            }

            if !self.eat(&Token::Comma) {
                self.expect(Token::RightParen)?;
                break;
            }
        }

        Ok((args, kwargs))
    }

    fn parse_atom(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek().clone() {
            Token::None => {
                self.advance();
                Ok(Expr::None)
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::Int(i) => {
                self.advance();
                Ok(Expr::Int(i))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Expr::Float(f))
            }
            Token::Str(_) | Token::Bytes(_) => self.parse_string_run(),
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Name(name))
            }
            Token::LeftParen => {
                self.advance();
                if self.eat(&Token::RightParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let inner = self.nested(|p| p.parse_expr_list())?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Token::LeftBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.eat(&Token::RightBracket) {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        self.expect(Token::RightBracket)?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::LeftBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.eat(&Token::RightBrace) {
                    let key = self.parse_expr()?;
                    self.expect(Token::Colon)?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        self.expect(Token::RightBrace)?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            _ => Err(self.invalid()),
        }
    }

    /// Adjacent literals concatenate: `'a' 'b'` is `'ab'`
    fn parse_string_run(&mut self) -> Result<Expr, SyntaxError> {
        match self.advance() {
            Token::Str(mut text) => {
                loop {
                    match self.peek() {
                        Token::Str(more) => {
                            text.push_str(more);
                            self.advance();
                        }
                        Token::Bytes(_) => {
                            return Err(self.error("cannot mix bytes and nonbytes literals"))
                        }
                        _ => return Ok(Expr::Str(text)),
                    }
                }
            }
            Token::Bytes(mut bytes) => {
                loop {
                    match self.peek() {
                        Token::Bytes(more) => {
                            bytes.extend_from_slice(more);
                            self.advance();
                        }
                        Token::Str(_) => {
                            return Err(self.error("cannot mix bytes and nonbytes literals"))
                        }
                        _ => return Ok(Expr::Bytes(bytes)),
                    }
                }
            }
            _ => Err(self.invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(source: &str) -> StmtKind {
        let program = parse(source).unwrap();
        assert_eq!(program.body.len(), 1, "{:?}", program.body);
        program.body.into_iter().next().unwrap().kind
    }

    fn expr(source: &str) -> Expr {
        match stmt(source) {
            StmtKind::Expr(e) => e,
            other => panic!("not an expression: {:?}", other),
        }
    }

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.into()))
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            expr("a + b * c"),
            Expr::Binary {
                op: BinaryOp::Add,
                left: name("a"),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: name("b"),
                    right: name("c"),
                }),
            }
        );
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() {
        assert_eq!(
            expr("-2 ** 2"),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(Expr::Binary {
                    op: BinaryOp::Pow,
                    left: Box::new(Expr::Int(2)),
                    right: Box::new(Expr::Int(2)),
                }),
            }
        );
    }

    #[test]
    fn test_chained_comparison() {
        match expr("a < b not in c") {
            Expr::Compare { ops, .. } => {
                let ops: Vec<_> = ops.into_iter().map(|(op, _)| op).collect();
                assert_eq!(ops, vec![CompareOp::Lt, CompareOp::NotIn]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_assignment_forms() {
        assert!(matches!(stmt("x = 1"), StmtKind::Assign { ref targets, .. } if targets.len() == 1));
        assert!(matches!(stmt("a = b = 1"), StmtKind::Assign { ref targets, .. } if targets.len() == 2));
        assert!(matches!(
            stmt("a, b = 1, 2"),
            StmtKind::Assign { ref targets, value: Expr::Tuple(_) } if matches!(targets[0], Target::Tuple(_))
        ));
        assert!(matches!(stmt("d['k'] = 1"), StmtKind::Assign { .. }));
        assert!(matches!(stmt("x += 1"), StmtKind::AugAssign { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_invalid_targets() {
        assert!(parse("1 = x").is_err());
        assert!(parse("f() = 1").is_err());
        assert!(parse("a, b += 1").is_err());
    }

    #[test]
    fn test_semicolons() {
        let program = parse("x = 1; y = 2;").unwrap();
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn test_call_with_keywords() {
        match expr("f(1, shared={'a': 2})") {
            Expr::Call { args, kwargs, .. } => {
                assert_eq!(args, vec![Expr::Int(1)]);
                assert_eq!(kwargs.len(), 1);
                assert_eq!(kwargs[0].0, "shared");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse("f(a=1, 2)").is_err());
        assert!(parse("f(a=1, a=2)").is_err());
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(expr("'a' \"b\""), Expr::Str("ab".into()));
        assert!(parse("'a' b'b'").is_err());
    }

    #[test]
    fn test_collections() {
        assert_eq!(expr("()"), Expr::Tuple(vec![]));
        assert_eq!(expr("(1,)"), Expr::Tuple(vec![Expr::Int(1)]));
        assert_eq!(expr("(1)"), Expr::Int(1));
        assert_eq!(expr("[1, 2,]"), Expr::List(vec![Expr::Int(1), Expr::Int(2)]));
        assert!(matches!(expr("{'a': 1}"), Expr::Dict(ref e) if e.len() == 1));
    }

    #[test]
    fn test_if_elif_else() {
        let source = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
        match stmt(source) {
            StmtKind::If { body, orelse, .. } => {
                assert_eq!(body.len(), 1);
                assert!(matches!(orelse[0].kind, StmtKind::If { ref orelse, .. } if orelse.len() == 1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_single_line_block() {
        assert!(matches!(stmt("while x: x -= 1"), StmtKind::While { ref body, .. } if body.len() == 1));
    }

    #[test]
    fn test_for_loop_target() {
        match stmt("for k, v in items:\n    pass") {
            StmtKind::For { target, .. } => assert!(matches!(target, Target::Tuple(ref t) if t.len() == 2)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_try_except() {
        let source = "try:\n    x\nexcept (KeyError, IndexError) as e:\n    pass\nexcept:\n    pass\nfinally:\n    y\n";
        match stmt(source) {
            StmtKind::Try { handlers, finally, .. } => {
                assert_eq!(handlers.len(), 2);
                assert_eq!(handlers[0].name.as_deref(), Some("e"));
                assert!(handlers[1].kind.is_none());
                assert_eq!(finally.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse("try:\n    x\ny = 1").is_err());
    }

    #[test]
    fn test_line_numbers() {
        let program = parse("\n\nx = 1\n\ny = 2").unwrap();
        assert_eq!(program.body[0].line, 3);
        assert_eq!(program.body[1].line, 5);
    }

    #[test]
    fn test_syntax_errors_report_line() {
        let err = parse("x = 1\ny = (2 +").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse("x = = 1").unwrap_err();
        assert!(err.message.contains("invalid syntax"));
    }

    #[test]
    fn test_break_outside_loop() {
        assert!(parse("break").is_err());
        assert!(parse("if x:\n    continue").is_err());
        assert!(parse("while x:\n    if y:\n        break").is_ok());
    }

    #[test]
    fn test_unexpected_indent() {
        assert!(parse("x = 1\n    y = 2").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(parse(&deep).is_err());
    }
}
