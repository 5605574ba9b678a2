//! 语法分析器
//!
//! 手写递归下降。块结构语句（if / while / for / try）的主体一律要求
//! 花括号。赋值是表达式，求值为被赋的值。`a.b` 在这里脱糖为 `a["b"]`。

use tracing::trace;

use crate::ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, LogicalOp, NodeId, Program, Stmt, StmtKind, UnaryOp,
};
use crate::token::{Coordinate, Token, TokenKind};

/// 语法错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedToken { found: String, expected: String },
    InvalidAssignmentTarget,
    TooManyParameters,
    TooManyArguments,
    TooManyElements,
}

/// 语法错误，包含位置信息
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{coordinate}: {}", kind_message(.kind))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub coordinate: Coordinate,
}

fn kind_message(kind: &ParseErrorKind) -> String {
    match kind {
        ParseErrorKind::UnexpectedToken { found, expected } => {
            format!("unexpected token '{found}', expected {expected}")
        }
        ParseErrorKind::InvalidAssignmentTarget => "invalid assignment target".to_string(),
        ParseErrorKind::TooManyParameters => "functions take at most 255 parameters".to_string(),
        ParseErrorKind::TooManyArguments => "calls take at most 255 arguments".to_string(),
        ParseErrorKind::TooManyElements => {
            "literals hold at most 255 elements".to_string()
        }
    }
}

/// 解析整个 token 序列为一棵程序树
pub fn parse(tokens: Vec<Token>) -> Result<Program, ParseError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        next_id: 0,
    };
    let mut statements = Vec::new();
    while !parser.check(&TokenKind::Eof) {
        statements.push(parser.declaration()?);
    }
    trace!(
        target: "xenon::parser",
        statements = statements.len(),
        nodes = parser.next_id,
        "parse finished"
    );
    Ok(Program {
        statements,
        node_count: parser.next_id,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: NodeId,
}

impl Parser {
    fn fresh_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn line(&self) -> u32 {
        self.current().coordinate.line
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// 若当前 token 匹配则消费并返回 true
    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError {
            kind: ParseErrorKind::UnexpectedToken {
                found: self.current().kind.describe(),
                expected: expected.to_string(),
            },
            coordinate: self.current().coordinate,
        }
    }

    fn error_here(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            coordinate: self.current().coordinate,
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn stmt(&mut self, line: u32, kind: StmtKind) -> Stmt {
        Stmt {
            id: self.fresh_id(),
            line,
            kind,
        }
    }

    fn expr(&mut self, line: u32, kind: ExprKind) -> Expr {
        Expr {
            id: self.fresh_id(),
            line,
            kind,
        }
    }

    // ==================== 语句 ====================

    fn declaration(&mut self) -> Result<Stmt, ParseError> {
        if self.check(&TokenKind::Var) {
            self.var_declaration()
        } else if self.check(&TokenKind::Function) {
            self.function_declaration()
        } else {
            self.statement()
        }
    }

    fn var_declaration(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let name = self.expect_identifier("variable name")?;
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon, "';' after variable declaration")?;
        Ok(self.stmt(line, StmtKind::Var { name, init }))
    }

    fn function_declaration(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let name = self.expect_identifier("function name")?;
        self.expect(&TokenKind::LeftParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                if params.len() >= 255 {
                    return Err(self.error_here(ParseErrorKind::TooManyParameters));
                }
                params.push(self.expect_identifier("parameter name")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen, "')' after parameters")?;
        let body = self.block()?;
        Ok(self.stmt(line, StmtKind::Function(FunctionDecl { name, params, body })))
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        match &self.current().kind {
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Break => {
                let line = self.line();
                self.advance();
                self.expect(&TokenKind::Semicolon, "';' after 'break'")?;
                Ok(self.stmt(line, StmtKind::Break))
            }
            TokenKind::Continue => {
                let line = self.line();
                self.advance();
                self.expect(&TokenKind::Semicolon, "';' after 'continue'")?;
                Ok(self.stmt(line, StmtKind::Continue))
            }
            TokenKind::Try => self.try_statement(),
            TokenKind::Throw => {
                let line = self.line();
                self.advance();
                let value = self.expression()?;
                self.expect(&TokenKind::Semicolon, "';' after throw value")?;
                Ok(self.stmt(line, StmtKind::Throw(value)))
            }
            TokenKind::LeftBrace => {
                let line = self.line();
                let body = self.block()?;
                Ok(self.stmt(line, StmtKind::Block(body)))
            }
            _ => {
                let line = self.line();
                let value = self.expression()?;
                self.expect(&TokenKind::Semicolon, "';' after expression")?;
                Ok(self.stmt(line, StmtKind::Expr(value)))
            }
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::LeftBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            statements.push(self.declaration()?);
        }
        self.expect(&TokenKind::RightBrace, "'}'")?;
        Ok(statements)
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LeftParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen, "')' after condition")?;
        let then_branch = self.block()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                // else if 链：把嵌套 if 包成单语句块
                let nested = self.if_statement()?;
                Some(vec![nested])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(self.stmt(
            line,
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        ))
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LeftParen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen, "')' after condition")?;
        let body = self.block()?;
        Ok(self.stmt(line, StmtKind::While { condition, body }))
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LeftParen, "'(' after 'for'")?;

        let init = if self.eat(&TokenKind::Semicolon) {
            None
        } else if self.check(&TokenKind::Var) {
            Some(Box::new(self.var_declaration()?))
        } else {
            let expr_line = self.line();
            let value = self.expression()?;
            self.expect(&TokenKind::Semicolon, "';' after for initializer")?;
            Some(Box::new(self.stmt(expr_line, StmtKind::Expr(value))))
        };

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon, "';' after for condition")?;

        let step = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::RightParen, "')' after for clauses")?;

        let body = self.block()?;
        Ok(self.stmt(
            line,
            StmtKind::For {
                init,
                condition,
                step,
                body,
            },
        ))
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon, "';' after return value")?;
        Ok(self.stmt(line, StmtKind::Return(value)))
    }

    fn try_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let try_block = self.block()?;
        self.expect(&TokenKind::Catch, "'catch' after try block")?;
        self.expect(&TokenKind::LeftParen, "'(' after 'catch'")?;
        let catch_name = self.expect_identifier("catch binding name")?;
        self.expect(&TokenKind::RightParen, "')' after catch binding")?;
        let catch_block = self.block()?;
        Ok(self.stmt(
            line,
            StmtKind::Try {
                try_block,
                catch_name,
                catch_block,
            },
        ))
    }

    // ==================== 表达式 ====================

    fn expression(&mut self) -> Result<Expr, ParseError> {
        if self.check(&TokenKind::Yield) {
            let line = self.line();
            self.advance();
            // yield 的操作数可省略，后随终结符时产出 null
            let value = match &self.current().kind {
                TokenKind::Semicolon
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
                | TokenKind::Comma => None,
                _ => Some(Box::new(self.expression()?)),
            };
            return Ok(self.expr(line, ExprKind::Yield(value)));
        }
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.logical_or()?;
        if self.check(&TokenKind::Assign) {
            let assign_coordinate = self.current().coordinate;
            self.advance();
            if !matches!(target.kind, ExprKind::Var(_) | ExprKind::Index { .. }) {
                return Err(ParseError {
                    kind: ParseErrorKind::InvalidAssignmentTarget,
                    coordinate: assign_coordinate,
                });
            }
            let line = target.line;
            let value = self.expression()?;
            return Ok(self.expr(
                line,
                ExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
            ));
        }
        Ok(target)
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.logical_and()?;
        while self.check(&TokenKind::OrOr) {
            let line = self.line();
            self.advance();
            let rhs = self.logical_and()?;
            lhs = self.expr(
                line,
                ExprKind::Logical {
                    op: LogicalOp::Or,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.equality()?;
        while self.check(&TokenKind::AndAnd) {
            let line = self.line();
            self.advance();
            let rhs = self.equality()?;
            lhs = self.expr(
                line,
                ExprKind::Logical {
                    op: LogicalOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Equal => BinaryOp::Equal,
                TokenKind::NotEqual => BinaryOp::NotEqual,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.comparison()?;
            lhs = self.binary(line, op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.additive()?;
            lhs = self.binary(line, op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = self.binary(line, op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Asterisk => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.unary()?;
            lhs = self.binary(line, op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn binary(&mut self, line: u32, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        self.expr(
            line,
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match &self.current().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.postfix(),
        };
        let line = self.line();
        self.advance();
        let operand = self.unary()?;
        Ok(self.expr(
            line,
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        ))
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut value = self.primary()?;
        loop {
            match &self.current().kind {
                TokenKind::LeftParen => {
                    let line = self.line();
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RightParen) {
                        loop {
                            if args.len() >= 255 {
                                return Err(self.error_here(ParseErrorKind::TooManyArguments));
                            }
                            args.push(self.expression()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RightParen, "')' after arguments")?;
                    value = self.expr(
                        line,
                        ExprKind::Call {
                            callee: Box::new(value),
                            args,
                        },
                    );
                }
                TokenKind::LeftBracket => {
                    let line = self.line();
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&TokenKind::RightBracket, "']' after index")?;
                    value = self.expr(
                        line,
                        ExprKind::Index {
                            object: Box::new(value),
                            index: Box::new(index),
                        },
                    );
                }
                TokenKind::Dot => {
                    let line = self.line();
                    self.advance();
                    let name = self.expect_identifier("member name after '.'")?;
                    let key = self.expr(line, ExprKind::Str(name));
                    value = self.expr(
                        line,
                        ExprKind::Index {
                            object: Box::new(value),
                            index: Box::new(key),
                        },
                    );
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        let kind = match self.current().kind.clone() {
            TokenKind::Int(v) => {
                self.advance();
                ExprKind::Int(v)
            }
            TokenKind::Float(v) => {
                self.advance();
                ExprKind::Float(v)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::True => {
                self.advance();
                ExprKind::True
            }
            TokenKind::False => {
                self.advance();
                ExprKind::False
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::Identifier(name) => {
                self.advance();
                ExprKind::Var(name)
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(&TokenKind::RightParen, "')' after expression")?;
                return Ok(inner);
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RightBracket) {
                    loop {
                        if elements.len() >= 255 {
                            return Err(self.error_here(ParseErrorKind::TooManyElements));
                        }
                        elements.push(self.expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBracket, "']' after array elements")?;
                ExprKind::Array(elements)
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut entries = Vec::new();
                if !self.check(&TokenKind::RightBrace) {
                    loop {
                        if entries.len() >= 255 {
                            return Err(self.error_here(ParseErrorKind::TooManyElements));
                        }
                        // 键为字符串字面量或标识符简写
                        let key = match self.current().kind.clone() {
                            TokenKind::Str(s) => {
                                self.advance();
                                s
                            }
                            TokenKind::Identifier(name) => {
                                self.advance();
                                name
                            }
                            _ => return Err(self.unexpected("map key")),
                        };
                        self.expect(&TokenKind::Colon, "':' after map key")?;
                        entries.push((key, self.expression()?));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBrace, "'}' after map entries")?;
                ExprKind::Map(entries)
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok(self.expr(line, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(source: &str) -> Result<Program, ParseError> {
        parse(tokenize(source).unwrap())
    }

    #[test]
    fn test_var_and_expression() {
        let program = parse_source("var x = 1 + 2 * 3;").unwrap();
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0].kind {
            StmtKind::Var { name, init } => {
                assert_eq!(name, "x");
                // 乘法绑定更紧
                match &init.as_ref().unwrap().kind {
                    ExprKind::Binary { op, rhs, .. } => {
                        assert_eq!(*op, BinaryOp::Add);
                        assert!(matches!(
                            rhs.kind,
                            ExprKind::Binary {
                                op: BinaryOp::Mul,
                                ..
                            }
                        ));
                    }
                    other => panic!("unexpected init: {other:?}"),
                }
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_function_declaration() {
        let program = parse_source("function add(a, b) { return a + b; }").unwrap();
        match &program.statements[0].kind {
            StmtKind::Function(decl) => {
                assert_eq!(decl.name, "add");
                assert_eq!(decl.params, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(decl.body.len(), 1);
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_member_access_desugars_to_index() {
        let program = parse_source("a.b;").unwrap();
        match &program.statements[0].kind {
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Index { index, .. } => {
                    assert_eq!(index.kind, ExprKind::Str("b".to_string()));
                }
                other => panic!("unexpected expr: {other:?}"),
            },
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_assignment_is_expression() {
        let program = parse_source("var y = x = 3;").unwrap();
        match &program.statements[0].kind {
            StmtKind::Var { init, .. } => {
                assert!(matches!(
                    init.as_ref().unwrap().kind,
                    ExprKind::Assign { .. }
                ));
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse_source("1 = 2;").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidAssignmentTarget);
    }

    #[test]
    fn test_else_if_chain() {
        let program =
            parse_source("if (a) { } else if (b) { } else { }").unwrap();
        match &program.statements[0].kind {
            StmtKind::If { else_branch, .. } => {
                let chained = else_branch.as_ref().unwrap();
                assert_eq!(chained.len(), 1);
                assert!(matches!(chained[0].kind, StmtKind::If { .. }));
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_for_clauses_optional() {
        let program = parse_source("for (;;) { break; }").unwrap();
        match &program.statements[0].kind {
            StmtKind::For {
                init,
                condition,
                step,
                ..
            } => {
                assert!(init.is_none());
                assert!(condition.is_none());
                assert!(step.is_none());
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_try_catch() {
        let program =
            parse_source("try { throw \"boom\"; } catch (e) { print(e); }").unwrap();
        match &program.statements[0].kind {
            StmtKind::Try {
                catch_name,
                try_block,
                catch_block,
            } => {
                assert_eq!(catch_name, "e");
                assert_eq!(try_block.len(), 1);
                assert_eq!(catch_block.len(), 1);
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_yield_without_operand() {
        let program = parse_source("yield;").unwrap();
        match &program.statements[0].kind {
            StmtKind::Expr(expr) => assert!(matches!(expr.kind, ExprKind::Yield(None))),
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_map_literal_keys() {
        let program = parse_source("var m = { \"a\": 1, b: 2 };").unwrap();
        match &program.statements[0].kind {
            StmtKind::Var { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Map(entries) => {
                    assert_eq!(entries[0].0, "a");
                    assert_eq!(entries[1].0, "b");
                }
                other => panic!("unexpected expr: {other:?}"),
            },
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse_source("var x = 1").unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::UnexpectedToken { .. }
        ));
    }
}
