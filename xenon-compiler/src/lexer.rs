//! 词法分析器
//!
//! 一次性扫描整个源文本，输出 token 序列（末尾附 Eof）。
//! 支持 `//` 行注释与 `/* */` 块注释，字符串转义 `\n \t \\ \" \r \0`。

use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::trace;

use crate::token::{Coordinate, Token, TokenKind};

/// 词法错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    UnexpectedChar(char),
    UnterminatedString,
    UnterminatedComment,
    InvalidEscape(char),
    InvalidNumber(String),
}

/// 词法错误，包含位置信息
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{coordinate}: {}", kind_message(.kind))]
pub struct LexError {
    pub kind: LexErrorKind,
    pub coordinate: Coordinate,
}

fn kind_message(kind: &LexErrorKind) -> String {
    match kind {
        LexErrorKind::UnexpectedChar(c) => format!("unexpected character '{c}'"),
        LexErrorKind::UnterminatedString => "unterminated string literal".to_string(),
        LexErrorKind::UnterminatedComment => "unterminated block comment".to_string(),
        LexErrorKind::InvalidEscape(c) => format!("invalid escape sequence '\\{c}'"),
        LexErrorKind::InvalidNumber(s) => format!("invalid number literal '{s}'"),
    }
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("var", TokenKind::Var),
        ("function", TokenKind::Function),
        ("return", TokenKind::Return),
        ("if", TokenKind::If),
        ("else", TokenKind::Else),
        ("while", TokenKind::While),
        ("for", TokenKind::For),
        ("break", TokenKind::Break),
        ("continue", TokenKind::Continue),
        ("true", TokenKind::True),
        ("false", TokenKind::False),
        ("null", TokenKind::Null),
        ("try", TokenKind::Try),
        ("catch", TokenKind::Catch),
        ("throw", TokenKind::Throw),
        ("yield", TokenKind::Yield),
    ])
});

/// 扫描整个源文本
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }
    trace!(target: "xenon::lexer", tokens = tokens.len(), "tokenize finished");
    Ok(tokens)
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    coordinate: Coordinate,
    /// 当前 token 的起始坐标
    start: Coordinate,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            coordinate: Coordinate::default(),
            start: Coordinate::default(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.coordinate.line += 1;
            self.coordinate.column = 1;
        } else {
            self.coordinate.column += 1;
        }
        Some(c)
    }

    /// 若下一字符为 expected 则消费并返回 true
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, kind: LexErrorKind) -> LexError {
        LexError {
            kind,
            coordinate: self.start,
        }
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.start)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments()?;
        self.start = self.coordinate;

        let c = match self.advance() {
            Some(c) => c,
            None => return Ok(self.token(TokenKind::Eof)),
        };

        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Asterisk,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '=' => {
                if self.eat('=') {
                    TokenKind::Equal
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '&' => {
                if self.eat('&') {
                    TokenKind::AndAnd
                } else {
                    return Err(self.error(LexErrorKind::UnexpectedChar('&')));
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::OrOr
                } else {
                    return Err(self.error(LexErrorKind::UnexpectedChar('|')));
                }
            }
            '"' => return self.scan_string(),
            c if c.is_ascii_digit() => return self.scan_number(c),
            c if is_identifier_start(c) => return Ok(self.scan_identifier(c)),
            c => return Err(self.error(LexErrorKind::UnexpectedChar(c))),
        };
        Ok(self.token(kind))
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    // 预读第二个字符，不是注释就交还给调用者
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    match lookahead.peek() {
                        Some('/') => {
                            while let Some(c) = self.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.advance();
                            }
                        }
                        Some('*') => {
                            self.start = self.coordinate;
                            self.advance();
                            self.advance();
                            self.skip_block_comment()?;
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// 块注释不嵌套，遇到第一个 `*/` 即结束
    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        loop {
            match self.advance() {
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(self.error(LexErrorKind::UnterminatedComment)),
            }
        }
    }

    fn scan_string(&mut self) -> Result<Token, LexError> {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some(c) => return Err(self.error(LexErrorKind::InvalidEscape(c))),
                    None => return Err(self.error(LexErrorKind::UnterminatedString)),
                },
                Some('\n') | None => return Err(self.error(LexErrorKind::UnterminatedString)),
                Some(c) => value.push(c),
            }
        }
        Ok(self.token(TokenKind::Str(value)))
    }

    fn scan_number(&mut self, first: char) -> Result<Token, LexError> {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // 小数部分要求点号后至少一位数字，否则把点留给成员访问
        let mut is_float = false;
        if self.peek() == Some('.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('.');
                self.advance();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        // 指数部分：e/E 后可带符号，至少一位数字，否则把 e 留给后面的标识符检查
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            let mut digits_at = lookahead.clone();
            let signed = matches!(lookahead.peek(), Some('+') | Some('-'));
            if signed {
                digits_at.next();
            }
            if digits_at.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                if let Some(c) = self.advance() {
                    text.push(c);
                }
                if signed {
                    if let Some(c) = self.advance() {
                        text.push(c);
                    }
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        // 数字后面直接跟标识符字符视为非法数字
        if self.peek().is_some_and(is_identifier_start) {
            while self.peek().is_some_and(is_identifier_continue) {
                if let Some(c) = self.advance() {
                    text.push(c);
                }
            }
            return Err(self.error(LexErrorKind::InvalidNumber(text)));
        }

        let kind = if is_float {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(_) => return Err(self.error(LexErrorKind::InvalidNumber(text))),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => TokenKind::Int(v),
                Err(_) => return Err(self.error(LexErrorKind::InvalidNumber(text))),
            }
        };
        Ok(self.token(kind))
    }

    fn scan_identifier(&mut self, first: char) -> Token {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if is_identifier_continue(c) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match KEYWORDS.get(text.as_str()) {
            Some(kind) => self.token(kind.clone()),
            None => self.token(TokenKind::Identifier(text)),
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
