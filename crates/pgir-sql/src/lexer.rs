//! SQL tokenizer.

use std::ops::Range;

/// Kinds of tokens produced by [`Lexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword or unquoted identifier.
    Word,
    /// `"double quoted"` identifier.
    QuotedIdent,
    /// `'standard string'`.
    String,
    /// `E'escape string'`; value keeps backslash escapes verbatim.
    EscapeString,
    /// `$tag$dollar quoted$tag$`.
    DollarString,
    Number,
    /// Positional parameter like `$1`.
    Param,
    Operator,
    /// `::`
    Typecast,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,
    Colon,
}

/// A lexed token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Decoded text: identifier as written, string contents without quotes,
    /// or the raw operator/number text.
    pub value: String,
    /// Byte range in the source.
    pub span: Range<usize>,
}

impl Token {
    /// Case-insensitive keyword match on a bare word.
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.value.eq_ignore_ascii_case(keyword)
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.value == op
    }

    /// The identifier this token denotes, folded like the server folds it.
    pub fn ident(&self) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.value.to_lowercase()),
            TokenKind::QuotedIdent => Some(self.value.clone()),
            _ => None,
        }
    }

    /// The source text this token was lexed from.
    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        &src[self.span.clone()]
    }
}

/// Error produced while tokenizing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at byte {position}")]
pub struct LexError {
    pub message: String,
    pub position: usize,
}

/// Characters that may appear in an operator.
const OP_CHARS: &str = "+-*/<>=~!@#%^&|`?";

/// Tokenizer for PostgreSQL SQL text.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Tokenize the whole input, skipping whitespace and comments.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<String>, position: usize) -> LexError {
        LexError {
            message: message.into(),
            position,
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            let rest = self.rest();
            if rest.starts_with("--") {
                match rest.find('\n') {
                    Some(end) => self.pos += end + 1,
                    None => self.pos = self.src.len(),
                }
            } else if rest.starts_with("/*") {
                let start = self.pos;
                self.pos += 2;
                let mut depth = 1;
                while depth > 0 {
                    let rest = self.rest();
                    if rest.is_empty() {
                        return Err(self.error("unterminated block comment", start));
                    }
                    if rest.starts_with("/*") {
                        depth += 1;
                        self.pos += 2;
                    } else if rest.starts_with("*/") {
                        depth -= 1;
                        self.pos += 2;
                    } else {
                        self.bump();
                    }
                }
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            } else {
                return Ok(());
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let (kind, value) = match c {
            '\'' => (TokenKind::String, self.quoted('\'', false)?),
            '"' => {
                let value = self.quoted('"', false)?;
                if value.is_empty() {
                    return Err(self.error("zero-length delimited identifier", start));
                }
                (TokenKind::QuotedIdent, value)
            }
            'e' | 'E' if self.peek_nth(1) == Some('\'') => {
                self.bump();
                (TokenKind::EscapeString, self.quoted('\'', true)?)
            }
            '$' => self.dollar(start)?,
            '0'..='9' => (TokenKind::Number, self.number()),
            '.' if self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                (TokenKind::Number, self.number())
            }
            c if c.is_alphabetic() || c == '_' => (TokenKind::Word, self.word()),
            '(' | ')' | '[' | ']' | ',' | ';' | '.' => {
                self.bump();
                let kind = match c {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    ',' => TokenKind::Comma,
                    ';' => TokenKind::Semicolon,
                    _ => TokenKind::Dot,
                };
                (kind, c.to_string())
            }
            ':' => {
                self.bump();
                if self.peek() == Some(':') {
                    self.bump();
                    (TokenKind::Typecast, "::".to_string())
                } else if self.peek() == Some('=') {
                    self.bump();
                    (TokenKind::Operator, ":=".to_string())
                } else {
                    (TokenKind::Colon, ":".to_string())
                }
            }
            c if OP_CHARS.contains(c) => (TokenKind::Operator, self.operator()),
            other => {
                return Err(self.error(format!("unexpected character {other:?}"), start));
            }
        };

        Ok(Some(Token {
            kind,
            value,
            span: start..self.pos,
        }))
    }

    /// Read a quoted run, where a doubled delimiter stands for itself.
    fn quoted(&mut self, delim: char, backslash_escapes: bool) -> Result<String, LexError> {
        let start = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated quoted text", start)),
                Some('\\') if backslash_escapes => {
                    value.push('\\');
                    if let Some(next) = self.bump() {
                        value.push(next);
                    }
                }
                Some(c) if c == delim => {
                    if self.peek() == Some(delim) {
                        self.bump();
                        value.push(delim);
                        // escape strings stay raw so they can be re-emitted verbatim
                        if backslash_escapes {
                            value.push(delim);
                        }
                    } else {
                        return Ok(value);
                    }
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn dollar(&mut self, start: usize) -> Result<(TokenKind, String), LexError> {
        if self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
            return Ok((TokenKind::Param, self.src[digits_start..self.pos].to_string()));
        }

        // $tag$ ... $tag$
        let rest = self.rest();
        let tag_len = rest[1..]
            .char_indices()
            .find(|&(i, c)| {
                !(c.is_alphanumeric() || c == '_') || (i == 0 && c.is_ascii_digit())
            })
            .map(|(i, _)| i);
        let Some(tag_len) = tag_len.filter(|&i| rest[1 + i..].starts_with('$')) else {
            return Err(self.error("invalid dollar quote", start));
        };
        let tag = &rest[..tag_len + 2];
        let body_start = self.pos + tag.len();
        let Some(body_len) = self.src[body_start..].find(tag) else {
            return Err(self.error("unterminated dollar-quoted string", start));
        };
        let body = self.src[body_start..body_start + body_len].to_string();
        self.pos = body_start + body_len + tag.len();
        Ok((TokenKind::DollarString, body))
    }

    fn number(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.bump();
        }
        // `1..` is not a decimal; leave the dots alone.
        if self.peek() == Some('.') && self.peek_nth(1) != Some('.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_nth(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_nth(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    self.bump();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        self.src[start..self.pos].replace('_', "")
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }

    fn operator(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let rest = self.rest();
            let comment = rest.starts_with("--") || rest.starts_with("/*");
            if !OP_CHARS.contains(c) || (self.pos > start && comment) {
                break;
            }
            self.bump();
        }

        // A multi-character operator cannot end in + or - unless it also
        // contains one of ~ ! @ # % ^ & | ` ?
        let mut op = &self.src[start..self.pos];
        if op.len() > 1 && !op.contains(|c| "~!@#%^&|`?".contains(c)) {
            while op.len() > 1 && (op.ends_with('+') || op.ends_with('-')) {
                op = &op[..op.len() - 1];
            }
            self.pos = start + op.len();
        }
        op.to_string()
    }
}

/// Tokenize `src` in one go.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(src).tokenize()
}
