//! Precedence-climbing parser for scalar expressions.

use crate::{
    Expr, Ident, LexError, LikeKind, Literal, Quantifier, Token, TokenKind, canonical_type,
    is_value_keyword, render_tokens, tokenize,
};

/// Error produced while parsing an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected {found} at byte {position}")]
    Unexpected { found: String, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

/// Binding power of each operator class, loosest first.
pub mod prec {
    pub const OR: u8 = 1;
    pub const AND: u8 = 2;
    pub const NOT: u8 = 3;
    pub const IS: u8 = 4;
    pub const CMP: u8 = 5;
    /// `IN`, `BETWEEN`, `LIKE` and friends.
    pub const LIKE: u8 = 6;
    /// Any operator without a dedicated level (`||`, `->`, `@>` ...).
    pub const OTHER: u8 = 7;
    pub const ADD: u8 = 8;
    pub const MUL: u8 = 9;
    pub const EXP: u8 = 10;
    pub const UNARY: u8 = 11;
    pub const POSTFIX: u8 = 12;
    pub const CAST: u8 = 13;
    pub const PRIMARY: u8 = 14;
}

/// Binding power of an infix operator spelled `op`.
pub fn binary_prec(op: &str) -> u8 {
    match op {
        "OR" => prec::OR,
        "AND" => prec::AND,
        "=" | "<" | ">" | "<=" | ">=" | "<>" => prec::CMP,
        "~~" | "!~~" | "~~*" | "!~~*" => prec::LIKE,
        "+" | "-" => prec::ADD,
        "*" | "/" | "%" => prec::MUL,
        "^" => prec::EXP,
        _ => prec::OTHER,
    }
}

/// Parse a standalone expression; the whole input must be consumed.
///
/// # Example
/// ```
/// use pgir_sql::parse_expr;
/// let expr = parse_expr("(price > 0)").unwrap();
/// assert_eq!(expr.to_string(), "price > 0");
/// ```
pub fn parse_expr(text: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(text)?;
    let mut parser = ExprParser::new(&tokens);
    let expr = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(parser.unexpected(tok));
    }
    Ok(expr)
}

/// Cursor over a token slice that parses expressions and type names.
///
/// Statement parsers share the token stream and hand over to this parser at
/// the start of an embedded expression; [`ExprParser::position`] tells them
/// where it stopped.
pub struct ExprParser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> ExprParser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn at(tokens: &'t [Token], pos: usize) -> Self {
        Self { tokens, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_nth(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + n)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn next(&mut self) -> Result<&'t Token, ExprError> {
        self.advance().ok_or(ExprError::UnexpectedEnd)
    }

    fn unexpected(&self, tok: &Token) -> ExprError {
        ExprError::Unexpected {
            found: format!("{:?} {:?}", tok.kind, tok.value),
            position: tok.span.start,
        }
    }

    fn peek_kind(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn peek_word(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_word(word))
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kind(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kind(&mut self, kind: TokenKind) -> Result<&'t Token, ExprError> {
        let tok = self.next()?;
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(self.unexpected(tok))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), ExprError> {
        let tok = self.next()?;
        if tok.is_word(word) {
            Ok(())
        } else {
            Err(self.unexpected(tok))
        }
    }

    fn ident(&mut self) -> Result<String, ExprError> {
        let tok = self.next()?;
        tok.ident().ok_or_else(|| self.unexpected(tok))
    }

    /// Parse one full expression.
    pub fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_bp(0)
    }

    fn parse_bp(&mut self, min_prec: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_prefix()?;

        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::Typecast => {
                    if prec::CAST < min_prec {
                        break;
                    }
                    self.pos += 1;
                    let ty = self.parse_type()?;
                    lhs = lhs.cast(ty);
                }
                TokenKind::LBracket => {
                    if prec::POSTFIX < min_prec {
                        break;
                    }
                    self.pos += 1;
                    lhs = self.parse_subscript(lhs)?;
                }
                TokenKind::Operator => {
                    let op = if tok.value == "!=" { "<>" } else { tok.value.as_str() };
                    let p = binary_prec(op);
                    if p < min_prec {
                        break;
                    }
                    self.pos += 1;
                    lhs = self.parse_binary(lhs, op.to_string(), p)?;
                }
                TokenKind::Word => {
                    let word = tok.value.to_ascii_lowercase();
                    match word.as_str() {
                        "and" | "or" => {
                            let p = if word == "and" { prec::AND } else { prec::OR };
                            if p < min_prec {
                                break;
                            }
                            self.pos += 1;
                            let rhs = self.parse_bp(p + 1)?;
                            lhs = lhs.binary(word.to_ascii_uppercase(), rhs);
                        }
                        "is" | "isnull" | "notnull" => {
                            if prec::IS < min_prec {
                                break;
                            }
                            self.pos += 1;
                            lhs = match word.as_str() {
                                "isnull" => Expr::IsNull {
                                    expr: Box::new(lhs),
                                    negated: false,
                                },
                                "notnull" => Expr::IsNull {
                                    expr: Box::new(lhs),
                                    negated: true,
                                },
                                _ => self.parse_is(lhs)?,
                            };
                        }
                        "not" => {
                            let next = self.peek_nth(1);
                            let negatable = next.is_some_and(|t| {
                                ["in", "like", "ilike", "between", "similar"]
                                    .iter()
                                    .any(|w| t.is_word(w))
                            });
                            if !negatable || prec::LIKE < min_prec {
                                break;
                            }
                            self.pos += 1;
                            lhs = self.parse_predicate(lhs, true)?;
                        }
                        "in" | "like" | "ilike" | "between" | "similar" => {
                            if prec::LIKE < min_prec {
                                break;
                            }
                            lhs = self.parse_predicate(lhs, false)?;
                        }
                        "collate" => {
                            if prec::POSTFIX < min_prec {
                                break;
                            }
                            self.pos += 1;
                            let collation = self.parse_qualified_name()?;
                            lhs = Expr::Collate {
                                expr: Box::new(lhs),
                                collation,
                            };
                        }
                        "at" => return Err(ExprError::Unsupported("AT TIME ZONE".into())),
                        _ => break,
                    }
                }
                _ => break,
            }
        }

        Ok(lhs)
    }

    fn parse_binary(&mut self, lhs: Expr, op: String, p: u8) -> Result<Expr, ExprError> {
        // x op ANY (...)
        let quantifier = match self.peek() {
            Some(t) if t.is_word("any") || t.is_word("some") => Some(Quantifier::Any),
            Some(t) if t.is_word("all") => Some(Quantifier::All),
            _ => None,
        };
        if let Some(quantifier) = quantifier {
            if self.peek_nth(1).is_some_and(|t| t.kind == TokenKind::LParen) {
                self.pos += 2;
                let right = self.parse_paren_body()?;
                return Ok(Expr::AnyAll {
                    left: Box::new(lhs),
                    op,
                    quantifier,
                    right: Box::new(right),
                });
            }
        }
        let rhs = self.parse_bp(p + 1)?;
        Ok(lhs.binary(op, rhs))
    }

    /// After `IS`.
    fn parse_is(&mut self, lhs: Expr) -> Result<Expr, ExprError> {
        let negated = self.eat_word("not");
        let tok = self.next()?;
        let word = tok.value.to_ascii_lowercase();
        match (tok.kind, word.as_str()) {
            (TokenKind::Word, "null") => Ok(Expr::IsNull {
                expr: Box::new(lhs),
                negated,
            }),
            (TokenKind::Word, "true" | "false" | "unknown") => Ok(Expr::IsBool {
                expr: Box::new(lhs),
                value: word.to_ascii_uppercase(),
                negated,
            }),
            (TokenKind::Word, "distinct") => {
                self.expect_word("from")?;
                let right = self.parse_bp(prec::IS + 1)?;
                Ok(Expr::IsDistinctFrom {
                    left: Box::new(lhs),
                    right: Box::new(right),
                    negated,
                })
            }
            _ => Err(ExprError::Unsupported(format!("IS {}", tok.value))),
        }
    }

    /// `IN`, `LIKE`, `ILIKE`, `SIMILAR TO`, `BETWEEN`, possibly after `NOT`.
    fn parse_predicate(&mut self, lhs: Expr, negated: bool) -> Result<Expr, ExprError> {
        let tok = self.next()?;
        let word = tok.value.to_ascii_lowercase();
        match word.as_str() {
            "in" => {
                self.expect_kind(TokenKind::LParen)?;
                if self.at_subquery() {
                    let query = self.capture_until_close()?;
                    return Ok(Expr::InSubquery {
                        expr: Box::new(lhs),
                        query,
                        negated,
                    });
                }
                let list = self.parse_list(TokenKind::RParen)?;
                Ok(Expr::InList {
                    expr: Box::new(lhs),
                    list,
                    negated,
                })
            }
            "between" => {
                let symmetric = self.eat_word("symmetric");
                if !symmetric {
                    self.eat_word("asymmetric");
                }
                let low = self.parse_bp(prec::LIKE + 1)?;
                self.expect_word("and")?;
                let high = self.parse_bp(prec::LIKE + 1)?;
                Ok(Expr::Between {
                    expr: Box::new(lhs),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                    symmetric,
                })
            }
            "like" | "ilike" | "similar" => {
                let kind = match word.as_str() {
                    "like" => LikeKind::Like,
                    "ilike" => LikeKind::ILike,
                    _ => {
                        self.expect_word("to")?;
                        LikeKind::SimilarTo
                    }
                };
                let pattern = self.parse_bp(prec::LIKE + 1)?;
                let escape = if self.eat_word("escape") {
                    Some(Box::new(self.parse_bp(prec::LIKE + 1)?))
                } else {
                    None
                };
                Ok(Expr::Like {
                    expr: Box::new(lhs),
                    pattern: Box::new(pattern),
                    kind,
                    negated,
                    escape,
                })
            }
            _ => Err(self.unexpected(tok)),
        }
    }

    fn parse_subscript(&mut self, lhs: Expr) -> Result<Expr, ExprError> {
        let lower = if self.peek_kind(TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let slice = self.eat_kind(TokenKind::Colon);
        let upper = if slice && !self.peek_kind(TokenKind::RBracket) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_kind(TokenKind::RBracket)?;
        Ok(Expr::Subscript {
            expr: Box::new(lhs),
            lower,
            upper,
            slice,
        })
    }

    fn parse_prefix(&mut self) -> Result<Expr, ExprError> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Number => Ok(Expr::number(tok.value.clone())),
            TokenKind::String | TokenKind::DollarString => Ok(Expr::string(tok.value.clone())),
            TokenKind::EscapeString => Ok(Expr::Literal(Literal::EscapeString(tok.value.clone()))),
            TokenKind::Param => Ok(Expr::Param(tok.value.clone())),
            TokenKind::Operator => {
                let op = tok.value.clone();
                if op == "-" || op == "+" {
                    if let Some(num) = self.peek().filter(|t| t.kind == TokenKind::Number) {
                        self.pos += 1;
                        let value = if op == "-" {
                            format!("-{}", num.value)
                        } else {
                            num.value.clone()
                        };
                        return Ok(Expr::number(value));
                    }
                }
                let p = if op == "-" || op == "+" {
                    prec::UNARY
                } else {
                    prec::OTHER
                };
                let expr = self.parse_bp(p)?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                })
            }
            TokenKind::LParen => {
                if self.at_subquery() {
                    return Ok(Expr::Subquery(self.capture_until_close()?));
                }
                let first = self.parse_expr()?;
                if self.eat_kind(TokenKind::Comma) {
                    let mut items = vec![first];
                    items.extend(self.parse_list(TokenKind::RParen)?);
                    return Ok(Expr::Row {
                        items,
                        explicit: false,
                    });
                }
                self.expect_kind(TokenKind::RParen)?;
                self.parse_field_access(first)
            }
            TokenKind::Word => self.parse_word(tok),
            TokenKind::QuotedIdent => self.parse_name_or_call(tok),
            _ => Err(self.unexpected(tok)),
        }
    }

    /// `(expr).field`, possibly repeated.
    fn parse_field_access(&mut self, mut expr: Expr) -> Result<Expr, ExprError> {
        while self.peek_kind(TokenKind::Dot)
            && self
                .peek_nth(1)
                .is_some_and(|t| matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdent))
        {
            self.pos += 1;
            let field = self.ident()?;
            expr = Expr::Field {
                expr: Box::new(expr),
                field,
            };
        }
        Ok(expr)
    }

    fn parse_word(&mut self, tok: &'t Token) -> Result<Expr, ExprError> {
        let word = tok.value.to_ascii_lowercase();
        let next_is_paren = self.peek_kind(TokenKind::LParen);
        match word.as_str() {
            "null" => Ok(Expr::Literal(Literal::Null)),
            "true" => Ok(Expr::Literal(Literal::Bool(true))),
            "false" => Ok(Expr::Literal(Literal::Bool(false))),
            "not" => {
                let expr = self.parse_bp(prec::NOT)?;
                Ok(Expr::Unary {
                    op: "NOT".into(),
                    expr: Box::new(expr),
                })
            }
            "case" => self.parse_case(),
            "cast" if next_is_paren => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.expect_word("as")?;
                let ty = self.parse_type()?;
                self.expect_kind(TokenKind::RParen)?;
                Ok(expr.cast(ty))
            }
            "array" => {
                if self.eat_kind(TokenKind::LBracket) {
                    Ok(Expr::Array(self.parse_array_items()?))
                } else if self.eat_kind(TokenKind::LParen) {
                    Ok(Expr::ArraySubquery(self.capture_until_close()?))
                } else {
                    Err(ExprError::UnexpectedEnd)
                }
            }
            "row" if next_is_paren => {
                self.pos += 1;
                let items = if self.eat_kind(TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.parse_list(TokenKind::RParen)?
                };
                Ok(Expr::Row {
                    items,
                    explicit: true,
                })
            }
            "exists" if next_is_paren => {
                self.pos += 1;
                Ok(Expr::Exists(self.capture_until_close()?))
            }
            w if is_value_keyword(w) && !next_is_paren => Ok(Expr::Keyword(w.to_ascii_uppercase())),
            "select" | "from" | "where" | "with" | "values" | "then" | "else" | "end" | "when" => {
                Err(self.unexpected(tok))
            }
            _ => {
                // typed literal: interval '1 day'
                if let Some(lit) = self.peek().filter(|t| t.kind == TokenKind::String) {
                    self.pos += 1;
                    let ty = canonical_type(&word);
                    return Ok(Expr::string(lit.value.clone()).cast(ty));
                }
                self.parse_name_or_call(tok)
            }
        }
    }

    fn parse_name_or_call(&mut self, first: &'t Token) -> Result<Expr, ExprError> {
        let mut parts = vec![first.ident().ok_or_else(|| self.unexpected(first))?];
        while self.peek_kind(TokenKind::Dot) {
            match self.peek_nth(1) {
                Some(t) if t.is_op("*") => {
                    self.pos += 2;
                    parts.push("*".into());
                    return Ok(Expr::Column(parts));
                }
                Some(t) if matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdent) => {
                    self.pos += 1;
                    parts.push(self.ident()?);
                }
                _ => break,
            }
        }

        if !self.eat_kind(TokenKind::LParen) {
            return Ok(Expr::Column(parts));
        }

        let mut distinct = false;
        let mut star = false;
        let mut args = Vec::new();
        if self.peek().is_some_and(|t| t.is_op("*")) {
            self.pos += 1;
            star = true;
            self.expect_kind(TokenKind::RParen)?;
        } else if !self.eat_kind(TokenKind::RParen) {
            distinct = self.eat_word("distinct");
            if !distinct {
                self.eat_word("all");
            }
            if self.peek_word("variadic") {
                return Err(ExprError::Unsupported("VARIADIC argument".into()));
            }
            loop {
                args.push(self.parse_expr()?);
                if self.peek_word("order") {
                    return Err(ExprError::Unsupported("ordered aggregate".into()));
                }
                if self.peek().is_some_and(|t| t.is_op("=>")) {
                    return Err(ExprError::Unsupported("named argument".into()));
                }
                if self.eat_kind(TokenKind::Comma) {
                    continue;
                }
                self.expect_kind(TokenKind::RParen)?;
                break;
            }
        }

        for word in ["filter", "over", "within"] {
            if self.peek_word(word) {
                return Err(ExprError::Unsupported(word.to_ascii_uppercase()));
            }
        }

        Ok(Expr::Function {
            name: parts,
            args,
            distinct,
            star,
        })
    }

    fn parse_case(&mut self) -> Result<Expr, ExprError> {
        let operand = if self.peek_word("when") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let mut branches = Vec::new();
        while self.eat_word("when") {
            let when = self.parse_expr()?;
            self.expect_word("then")?;
            let then = self.parse_expr()?;
            branches.push((when, then));
        }
        let else_result = if self.eat_word("else") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_word("end")?;
        Ok(Expr::Case {
            operand,
            branches,
            else_result,
        })
    }

    /// Items after `ARRAY[`; nested bare brackets are sub-arrays.
    fn parse_array_items(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if self.eat_kind(TokenKind::RBracket) {
            return Ok(items);
        }
        loop {
            if self.eat_kind(TokenKind::LBracket) {
                items.push(Expr::Array(self.parse_array_items()?));
            } else {
                items.push(self.parse_expr()?);
            }
            if self.eat_kind(TokenKind::Comma) {
                continue;
            }
            self.expect_kind(TokenKind::RBracket)?;
            return Ok(items);
        }
    }

    /// Comma-separated expressions up to and including `close`.
    fn parse_list(&mut self, close: TokenKind) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        loop {
            items.push(self.parse_expr()?);
            if self.eat_kind(TokenKind::Comma) {
                continue;
            }
            self.expect_kind(close)?;
            return Ok(items);
        }
    }

    /// Body of `ANY (...)`: a subquery or a single expression.
    fn parse_paren_body(&mut self) -> Result<Expr, ExprError> {
        if self.at_subquery() {
            return Ok(Expr::Subquery(self.capture_until_close()?));
        }
        let expr = self.parse_expr()?;
        self.expect_kind(TokenKind::RParen)?;
        Ok(expr)
    }

    fn at_subquery(&self) -> bool {
        ["select", "with", "values"]
            .iter()
            .any(|w| self.peek_word(w))
    }

    /// Consume tokens up to the `)` closing an already-consumed `(`,
    /// returning the canonical text in between.
    fn capture_until_close(&mut self) -> Result<String, ExprError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(tok) = self.advance() {
            match tok.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => {
                    return Ok(render_tokens(&self.tokens[start..self.pos - 1]));
                }
                TokenKind::RParen => depth -= 1,
                _ => {}
            }
        }
        Err(ExprError::UnexpectedEnd)
    }

    fn parse_qualified_name(&mut self) -> Result<String, ExprError> {
        let mut name = Ident(self.ident()?).to_string();
        while self.peek_kind(TokenKind::Dot) {
            self.pos += 1;
            name.push('.');
            name.push_str(&Ident(self.ident()?).to_string());
        }
        Ok(name)
    }

    /// Parse a type name and return its canonical spelling.
    pub fn parse_type(&mut self) -> Result<String, ExprError> {
        let first = self.next()?;
        if !matches!(first.kind, TokenKind::Word | TokenKind::QuotedIdent) {
            return Err(self.unexpected(first));
        }
        let head = first.value.to_ascii_lowercase();
        let mut text = match first.kind {
            TokenKind::QuotedIdent => Ident(&first.value).to_string(),
            _ => head.clone(),
        };
        while self.peek_kind(TokenKind::Dot) {
            self.pos += 1;
            text.push('.');
            text.push_str(&Ident(self.ident()?).to_string());
        }

        match head.as_str() {
            "double" if self.eat_word("precision") => text.push_str(" precision"),
            "character" | "char" | "bit" if self.eat_word("varying") => text.push_str(" varying"),
            "interval" => {
                if ["year", "month", "day", "hour", "minute", "second"]
                    .iter()
                    .any(|w| self.peek_word(w))
                {
                    return Err(ExprError::Unsupported("interval fields".into()));
                }
            }
            _ => {}
        }

        if self.eat_kind(TokenKind::LParen) {
            let mut mods = Vec::new();
            loop {
                let tok = self.next()?;
                match tok.kind {
                    TokenKind::Number | TokenKind::Word => mods.push(tok.value.clone()),
                    TokenKind::Operator if tok.value == "-" => {
                        let num = self.expect_kind(TokenKind::Number)?;
                        mods.push(format!("-{}", num.value));
                    }
                    _ => return Err(self.unexpected(tok)),
                }
                if self.eat_kind(TokenKind::Comma) {
                    continue;
                }
                self.expect_kind(TokenKind::RParen)?;
                break;
            }
            text.push('(');
            text.push_str(&mods.join(","));
            text.push(')');
        }

        if matches!(head.as_str(), "timestamp" | "time") {
            let with = if self.peek_word("with") {
                Some(" with time zone")
            } else if self.peek_word("without") {
                Some(" without time zone")
            } else {
                None
            };
            if let Some(suffix) = with {
                if self.peek_nth(1).is_some_and(|t| t.is_word("time")) {
                    self.pos += 1;
                    self.expect_word("time")?;
                    self.expect_word("zone")?;
                    text.push_str(suffix);
                }
            }
        }

        while self.peek_kind(TokenKind::LBracket) {
            self.pos += 1;
            self.eat_kind(TokenKind::Number);
            self.expect_kind(TokenKind::RBracket)?;
            text.push_str("[]");
        }

        Ok(canonical_type(&text))
    }
}

/// Parse a standalone type name.
pub fn parse_type(text: &str) -> Result<String, ExprError> {
    let tokens = tokenize(text)?;
    let mut parser = ExprParser::new(&tokens);
    let ty = parser.parse_type()?;
    if let Some(tok) = parser.peek() {
        return Err(parser.unexpected(tok));
    }
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(text: &str) -> String {
        parse_expr(text).unwrap().to_string()
    }

    #[test]
    fn precedence_drops_redundant_parens() {
        assert_eq!(roundtrip("((a + b)) * c"), "(a + b) * c");
        assert_eq!(roundtrip("(a * b) + c"), "a * b + c");
        assert_eq!(roundtrip("((a > 0) AND (b > 0))"), "a > 0 AND b > 0");
        assert_eq!(roundtrip("(a OR b) AND c"), "(a OR b) AND c");
        assert_eq!(roundtrip("NOT (a AND b)"), "NOT (a AND b)");
    }

    #[test]
    fn casts_use_canonical_types() {
        assert_eq!(roundtrip("x::character varying(20)"), "x::varchar(20)");
        assert_eq!(roundtrip("CAST(x AS int4)"), "x::integer");
        assert_eq!(
            roundtrip("now()::timestamp with time zone"),
            "now()::timestamptz"
        );
        assert_eq!(roundtrip("(a + 1)::bigint"), "(a + 1)::bigint");
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(parse_expr("-1").unwrap(), Expr::number("-1"));
        assert_eq!(roundtrip("a - -1"), "a - -1");
        assert_eq!(roundtrip("-(a)"), "-a");
    }

    #[test]
    fn any_and_in_lists() {
        assert_eq!(
            roundtrip("status = ANY (ARRAY['a'::text, 'b'::text])"),
            "status = ANY (ARRAY['a'::text, 'b'::text])"
        );
        assert_eq!(roundtrip("x NOT IN (1,2)"), "x NOT IN (1, 2)");
    }

    #[test]
    fn keywords_and_case() {
        assert_eq!(roundtrip("current_timestamp"), "CURRENT_TIMESTAMP");
        assert_eq!(
            roundtrip("case when a then 1 else 2 end"),
            "CASE WHEN a THEN 1 ELSE 2 END"
        );
        assert_eq!(roundtrip("Coalesce(A, 0)"), "COALESCE(a, 0)");
    }

    #[test]
    fn unsupported_constructs_error() {
        assert!(matches!(
            parse_expr("extract(epoch from now())"),
            Err(ExprError::Unexpected { .. })
        ));
        assert!(matches!(
            parse_expr("count(*) over ()"),
            Err(ExprError::Unsupported(_))
        ));
    }

    #[test]
    fn parser_stops_at_foreign_words() {
        let tokens = tokenize("now() NOT NULL").unwrap();
        let mut parser = ExprParser::new(&tokens);
        let expr = parser.parse_expr().unwrap();
        assert_eq!(expr.to_string(), "now()");
        assert_eq!(parser.position(), 3);
    }

    #[test]
    fn types_parse_standalone() {
        assert_eq!(parse_type("double precision[]").unwrap(), "double precision[]");
        assert_eq!(parse_type("numeric(10, 2)").unwrap(), "numeric(10,2)");
        assert_eq!(parse_type("timestamp(3) without time zone").unwrap(), "timestamp(3)");
    }
}
