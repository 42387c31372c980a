//! Token cursor for statement grammar.

use pgir_sql::{ExprParser, Token, TokenKind, tokenize};

use super::ast::QualifiedName;
use crate::{Error, Result};

/// Position in one tokenized statement.
pub struct Cursor<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Result<Self> {
        let tokens = tokenize(src).map_err(|e| Error::parse(src, e.to_string()))?;
        Ok(Self {
            src,
            tokens,
            pos: 0,
        })
    }

    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(self.src, message)
    }

    fn unexpected(&self, wanted: &str) -> Error {
        match self.peek() {
            Some(tok) => self.error(format!(
                "expected {wanted}, found {:?} at byte {}",
                tok.text(self.src),
                tok.span.start
            )),
            None => self.error(format!("expected {wanted}, found end of statement")),
        }
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    pub fn peek_word(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_word(word))
    }

    pub fn peek_kind(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    /// Consume `word` if it is next.
    pub fn eat_word(&mut self, word: &str) -> bool {
        if self.peek_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the whole word sequence, or nothing.
    pub fn eat_words(&mut self, words: &[&str]) -> bool {
        let matches = words
            .iter()
            .enumerate()
            .all(|(i, w)| self.peek_nth(i).is_some_and(|t| t.is_word(w)));
        if matches {
            self.pos += words.len();
        }
        matches
    }

    pub fn eat_kind(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn eat_op(&mut self, op: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_word(&mut self, word: &str) -> Result<()> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.unexpected(&word.to_ascii_uppercase()))
        }
    }

    pub fn expect_words(&mut self, words: &[&str]) -> Result<()> {
        for word in words {
            self.expect_word(word)?;
        }
        Ok(())
    }

    pub fn expect_kind(&mut self, kind: TokenKind) -> Result<()> {
        if self.eat_kind(kind) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{kind:?}")))
        }
    }

    /// An identifier, folded like the server folds it.
    pub fn ident(&mut self) -> Result<String> {
        match self.peek().and_then(Token::ident) {
            Some(name) => {
                self.pos += 1;
                Ok(name)
            }
            None => Err(self.unexpected("identifier")),
        }
    }

    /// `[schema.]name`.
    pub fn qualified_name(&mut self) -> Result<QualifiedName> {
        let first = self.ident()?;
        if self.peek_kind(TokenKind::Dot) && self.peek_nth(1).and_then(Token::ident).is_some() {
            self.pos += 1;
            let name = self.ident()?;
            return Ok(QualifiedName {
                schema: Some(first),
                name,
            });
        }
        Ok(QualifiedName {
            schema: None,
            name: first,
        })
    }

    /// `a.b.c`, any number of parts.
    pub fn dotted(&mut self) -> Result<Vec<String>> {
        let mut parts = vec![self.ident()?];
        while self.peek_kind(TokenKind::Dot) {
            self.pos += 1;
            parts.push(self.ident()?);
        }
        Ok(parts)
    }

    /// `(a, b, c)`.
    pub fn ident_list(&mut self) -> Result<Vec<String>> {
        self.expect_kind(TokenKind::LParen)?;
        let mut names = Vec::new();
        if self.eat_kind(TokenKind::RParen) {
            return Ok(names);
        }
        loop {
            names.push(self.ident()?);
            if !self.eat_kind(TokenKind::Comma) {
                break;
            }
        }
        self.expect_kind(TokenKind::RParen)?;
        Ok(names)
    }

    /// A string literal's value.
    pub fn string(&mut self) -> Result<String> {
        match self.peek() {
            Some(tok)
                if matches!(
                    tok.kind,
                    TokenKind::String | TokenKind::EscapeString | TokenKind::DollarString
                ) =>
            {
                let value = tok.value.clone();
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.unexpected("string literal")),
        }
    }

    /// A signed integer.
    pub fn integer(&mut self) -> Result<i64> {
        let negative = self.eat_op("-");
        if !negative {
            self.eat_op("+");
        }
        let value = match self.peek() {
            Some(tok) if tok.kind == TokenKind::Number => tok.value.parse::<i64>().ok(),
            _ => None,
        };
        match value {
            Some(v) => {
                self.pos += 1;
                Ok(if negative { -v } else { v })
            }
            None => Err(self.unexpected("integer")),
        }
    }

    /// A type name, in canonical spelling.
    pub fn type_name(&mut self) -> Result<String> {
        let mut parser = ExprParser::at(&self.tokens, self.pos);
        let ty = parser
            .parse_type()
            .map_err(|e| self.error(format!("bad type: {e}")))?;
        self.pos = parser.position();
        Ok(ty)
    }

    /// Whether a type name starts here and is followed by one of `after`
    /// (or the end of the statement).
    pub fn type_then(&self, after: impl Fn(&Token) -> bool) -> bool {
        let mut parser = ExprParser::at(&self.tokens, self.pos);
        if parser.parse_type().is_err() {
            return false;
        }
        self.tokens.get(parser.position()).is_none_or(after)
    }

    /// Source text of tokens `from..self.pos`.
    pub fn text_since(&self, from: usize) -> String {
        match (self.tokens.get(from), self.pos.checked_sub(1).and_then(|i| self.tokens.get(i))) {
            (Some(first), Some(last)) if from < self.pos => {
                self.src[first.span.start..last.span.end].to_string()
            }
            _ => String::new(),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Skip to the end of a parenthesized group whose `(` is next, returning
    /// the text inside.
    pub fn paren_text(&mut self) -> Result<String> {
        self.expect_kind(TokenKind::LParen)?;
        let start = self.pos;
        let mut depth = 1usize;
        while let Some(tok) = self.advance() {
            match tok.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        let end = self.pos - 1;
                        return Ok(self.slice_text(start, end));
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses"))
    }

    /// Text of tokens `start..end`.
    fn slice_text(&self, start: usize, end: usize) -> String {
        if start >= end {
            return String::new();
        }
        self.src[self.tokens[start].span.start..self.tokens[end - 1].span.end].to_string()
    }

    /// Source text of a scalar expression starting here.
    ///
    /// Uses the expression parser to find where the expression ends; when it
    /// cannot parse the text, falls back to [`Cursor::scan_text`].
    pub fn expr_text(&mut self, stop: &[&str]) -> Result<String> {
        let start = self.pos;
        let mut parser = ExprParser::at(&self.tokens, self.pos);
        let end = match parser.parse_expr() {
            Ok(_) if parser.position() > start => Some(parser.position()),
            _ => None,
        };
        match end {
            Some(end) => {
                self.pos = end;
                Ok(self.slice_text(start, end))
            }
            None => self.scan_text(stop),
        }
    }

    /// Scan balanced tokens up to a top-level comma, closing parenthesis or
    /// one of `stop`, returning their text.
    pub fn scan_text(&mut self, stop: &[&str]) -> Result<String> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket if depth == 0 => break,
                TokenKind::RParen | TokenKind::RBracket => depth -= 1,
                TokenKind::Comma if depth == 0 => break,
                TokenKind::Word if depth == 0 && stop.iter().any(|w| tok.is_word(w)) => break,
                _ => {}
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected("expression"));
        }
        Ok(self.slice_text(start, self.pos))
    }

    /// Text from here to the end of the statement.
    pub fn rest_text(&mut self) -> String {
        let start = self.pos;
        self.pos = self.tokens.len();
        self.slice_text(start, self.pos)
    }

    /// Like [`Cursor::rest_text`], but leaves off a trailing word sequence
    /// matching one of `tails`.
    pub fn rest_text_without(&mut self, tails: &[&[&str]]) -> String {
        let start = self.pos;
        let mut end = self.tokens.len();
        for tail in tails {
            let Some(from) = end.checked_sub(tail.len()) else {
                continue;
            };
            if from >= start
                && tail
                    .iter()
                    .enumerate()
                    .all(|(i, w)| self.tokens[from + i].is_word(w))
            {
                end = from;
                break;
            }
        }
        self.pos = self.tokens.len();
        self.slice_text(start, end)
    }

    /// Skip a balanced run of tokens up to a top-level comma or `)`.
    pub fn skip_item(&mut self) {
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => return,
                TokenKind::RParen => depth -= 1,
                TokenKind::Comma if depth == 0 => return,
                _ => {}
            }
            self.pos += 1;
        }
    }

    pub fn expect_end(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of statement"))
        }
    }
}
